//! # Move Engine
//!
//! Turns a move request into the smallest number of tracker round trips.
//!
//! | Stage | Type | Round trips |
//! |-------|------|-------------|
//! | Field schema | [`FieldSchemaCache`] | one per project |
//! | Item fetch | [`QueryPlanner`] | one (targeted) or one paginated (full) |
//! | Sub-issues | [`HierarchyCollector`] | one per repository per level |
//! | Workflow rules | [`WorkflowValidator`] | release discovery only |
//! | Field writes | [`BatchExecutor`] | one batch, sequential on failure |
//! | Labels | [`LabelManager`] | one per changed item |
//!
//! [`Mover`] runs the stages in order.

mod hierarchy;
mod labels;
mod mover;
mod mutation;
mod planner;
mod schema;
mod workflow;

#[cfg(test)]
pub(crate) mod fixtures;

pub use hierarchy::{Collection, HierarchyCollector};
pub use labels::{LabelChange, LabelManager};
pub use mover::{MoveError, MoveReport, MoveRequest, Mover, PreparedMove, Target, DEFAULT_DEPTH};
pub use mutation::{BatchExecutor, MutationError, MutationReport, PlannedUpdate, UpdateFailure};
pub use planner::{FetchStrategy, ItemIndex, Plan, PlanError, QueryPlanner};
pub use schema::{FieldSchemaCache, ResolvedValue, SchemaError};
pub use workflow::{
    discover_active_releases, CurrentStatus, ItemOutcome, ReleaseChange, Transition, ValidationContext,
    ValidationError, ValidationReport, ValidationSummary, WorkflowValidator,
};

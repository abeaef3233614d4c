//! Domain models for gh-pmu
//!
//! Plain data and parsing, no I/O.

mod issue;
mod item;
mod status;
pub mod checklist;

pub use issue::{group_by_repo, IssueRef, IssueRefError, RepoName};
pub use item::{
    BatchUpdateResult, FieldUpdate, FieldValue, FieldValues, HierarchyNode, IssueState,
    PendingChange, ProjectItem,
};
pub use status::{Priority, Status, TagError};

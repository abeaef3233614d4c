//! gh-pmu - bulk field updates for GitHub Projects
//!
//! Moves issues between statuses, priorities and releases on a project
//! board, optionally together with their sub-issues, while keeping the
//! number of API round trips small and enforcing IDPF workflow rules.

pub mod api;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod storage;

pub use domain::{IssueRef, Priority, ProjectItem, Status};
pub use engine::{MoveReport, MoveRequest, Mover};

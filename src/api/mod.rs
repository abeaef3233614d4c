//! # Project Tracking API
//!
//! Everything the engine needs from the hosted tracker, behind one trait.
//!
//! | Implementation | Purpose |
//! |----------------|---------|
//! | [`GhClient`] | Talks to GitHub through the authenticated `gh` CLI |
//! | [`MemoryApi`] | In-memory board with call log and failure injection |
//!
//! Calls are synchronous and sequential. Pagination and the batch-size
//! ceiling are handled inside the implementation.

mod gh;
mod memory;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BatchUpdateResult, IssueRef, IssueState, ProjectItem, RepoName};

pub use gh::GhClient;
pub use memory::{ApiCall, MemoryApi};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("gh command failed: {0}")]
    Command(String),

    #[error("GraphQL error: {0}")]
    Graphql(String),

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// An issue as returned by the tracker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Node ID
    pub id: String,
    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub state: IssueState,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Issue {
    pub fn issue_ref(&self) -> IssueRef {
        IssueRef::new(&self.owner, &self.repo, self.number)
    }
}

/// A project board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub owner: String,
    pub number: u64,
    pub title: String,
}

/// Data type of a project field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDataType {
    Text,
    SingleSelect,
    Number,
    Date,
    Iteration,
    Other,
}

impl FieldDataType {
    /// Parses GitHub's `ProjectV2FieldType`
    pub fn from_github(s: &str) -> Self {
        match s {
            "TEXT" => FieldDataType::Text,
            "SINGLE_SELECT" => FieldDataType::SingleSelect,
            "NUMBER" => FieldDataType::Number,
            "DATE" => FieldDataType::Date,
            "ITERATION" => FieldDataType::Iteration,
            _ => FieldDataType::Other,
        }
    }
}

/// One option of a single-select field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub id: String,
    pub name: String,
}

/// Field metadata for a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub id: String,
    pub name: String,
    pub data_type: FieldDataType,
    #[serde(default)]
    pub options: Vec<FieldOption>,
}

impl FieldSchema {
    pub fn option(&self, name: &str) -> Option<&FieldOption> {
        self.options
            .iter()
            .find(|o| o.name.eq_ignore_ascii_case(name))
    }

    pub fn option_names(&self) -> Vec<&str> {
        self.options.iter().map(|o| o.name.as_str()).collect()
    }
}

/// Optional narrowing for a full item fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub repository: Option<RepoName>,
    pub limit: Option<usize>,
}

/// A direct child returned by a sub-issue query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubIssue {
    pub number: u64,
    pub title: String,
    pub state: IssueState,
    /// Empty when the child lives in the parent's repository
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub repo: String,
}

/// Value half of a resolved update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateValue {
    Text { text: String },
    SingleSelect { option_id: String, name: String },
    Clear,
}

impl UpdateValue {
    /// The value as it reads on the board
    pub fn display(&self) -> &str {
        match self {
            UpdateValue::Text { text } => text,
            UpdateValue::SingleSelect { name, .. } => name,
            UpdateValue::Clear => "",
        }
    }
}

/// A field update with concrete field and option IDs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUpdate {
    pub item_id: String,
    pub field_id: String,
    pub field_name: String,
    pub value: UpdateValue,
}

/// The remote tracker
pub trait ProjectApi {
    fn get_issue(&self, issue: &IssueRef) -> ApiResult<Issue>;

    fn get_project(&self, owner: &str, number: u64) -> ApiResult<Project>;

    fn get_project_fields(&self, project_id: &str) -> ApiResult<Vec<FieldSchema>>;

    /// Full fetch of every item on the board
    fn get_project_items(&self, project_id: &str, filter: &ItemFilter)
        -> ApiResult<Vec<ProjectItem>>;

    /// Targeted fetch for an explicit set of issues
    fn get_project_items_by_issues(
        &self,
        project_id: &str,
        refs: &[IssueRef],
    ) -> ApiResult<Vec<ProjectItem>>;

    /// Direct children of several issues in one repository
    fn get_sub_issues_batch(
        &self,
        owner: &str,
        repo: &str,
        numbers: &[u64],
    ) -> ApiResult<HashMap<u64, Vec<SubIssue>>>;

    fn set_project_item_field(&self, project_id: &str, update: &ResolvedUpdate) -> ApiResult<()>;

    /// Returns one result per update, in order
    fn batch_update_project_item_fields(
        &self,
        project_id: &str,
        updates: &[ResolvedUpdate],
    ) -> ApiResult<Vec<BatchUpdateResult>>;

    fn get_open_issues_by_label(&self, owner: &str, repo: &str, label: &str)
        -> ApiResult<Vec<Issue>>;

    fn add_label_to_issue(&self, issue: &IssueRef, issue_id: &str, label: &str) -> ApiResult<()>;

    fn remove_label_from_issue(
        &self,
        issue: &IssueRef,
        issue_id: &str,
        label: &str,
    ) -> ApiResult<()>;
}

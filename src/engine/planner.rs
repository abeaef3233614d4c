//! Query planning
//!
//! Non-recursive moves fetch exactly the requested issues. Recursive moves
//! fetch the whole board, since membership of the final set is only known
//! after the hierarchy is walked.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::api::{ApiError, ItemFilter, ProjectApi};
use crate::domain::{IssueRef, ProjectItem, RepoName};

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("None of the requested issues could be resolved: {}", .missing.join(", "))]
    NoValidIssues { missing: Vec<String> },

    #[error("Failed to fetch project items: {0}")]
    Fetch(#[source] ApiError),
}

/// How items were fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStrategy {
    Targeted,
    Full,
}

/// Fetched items keyed by issue
#[derive(Debug, Default, Clone)]
pub struct ItemIndex {
    items: HashMap<(String, String, u64), ProjectItem>,
}

impl ItemIndex {
    pub fn get(&self, issue: &IssueRef) -> Option<&ProjectItem> {
        self.items.get(&issue.key())
    }

    pub fn insert(&mut self, item: ProjectItem) {
        self.items.insert(item.issue_ref().key(), item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<ProjectItem> for ItemIndex {
    fn from_iter<I: IntoIterator<Item = ProjectItem>>(iter: I) -> Self {
        let mut index = ItemIndex::default();
        for item in iter {
            index.insert(item);
        }
        index
    }
}

/// Result of planning a fetch
#[derive(Debug)]
pub struct Plan {
    /// Requested items that resolved, in request order
    pub items: Vec<ProjectItem>,

    /// Everything fetched
    pub index: ItemIndex,

    pub strategy: FetchStrategy,

    /// True when a targeted fetch failed and a full fetch replaced it
    pub fell_back: bool,

    pub warnings: Vec<String>,
}

pub struct QueryPlanner<'a> {
    api: &'a dyn ProjectApi,
    project_id: &'a str,
    repos: &'a [RepoName],
}

impl<'a> QueryPlanner<'a> {
    /// `repos` restricts which repositories requested issues may live in;
    /// empty allows any
    pub fn new(api: &'a dyn ProjectApi, project_id: &'a str, repos: &'a [RepoName]) -> Self {
        Self {
            api,
            project_id,
            repos,
        }
    }

    pub fn plan_and_fetch(&self, refs: &[IssueRef], recursive: bool) -> Result<Plan, PlanError> {
        let (fetched, strategy, fell_back) = if recursive {
            (self.full_fetch(ItemFilter::default())?, FetchStrategy::Full, false)
        } else {
            match self.api.get_project_items_by_issues(self.project_id, refs) {
                Ok(items) => (items, FetchStrategy::Targeted, false),
                Err(e) => {
                    debug!(error = %e, "targeted fetch failed, retrying with a full fetch");
                    (self.full_fetch(self.narrow_filter())?, FetchStrategy::Full, true)
                }
            }
        };
        debug!(?strategy, count = fetched.len(), "fetched project items");

        let index: ItemIndex = fetched.into_iter().collect();
        let mut items = Vec::new();
        let mut warnings = Vec::new();
        let mut missing = Vec::new();
        let mut seen = HashSet::new();

        for r in refs {
            if !seen.insert(r.key()) {
                continue;
            }

            if !self.allows(r) {
                warnings.push(format!(
                    "{} is not in a configured repository, skipping",
                    r
                ));
                missing.push(r.to_string());
                continue;
            }

            match index.get(r) {
                Some(item) => items.push(item.clone()),
                None => {
                    warnings.push(self.describe_missing(r));
                    missing.push(r.to_string());
                }
            }
        }

        if items.is_empty() {
            return Err(PlanError::NoValidIssues { missing });
        }

        Ok(Plan {
            items,
            index,
            strategy,
            fell_back,
            warnings,
        })
    }

    fn full_fetch(&self, filter: ItemFilter) -> Result<Vec<ProjectItem>, PlanError> {
        self.api
            .get_project_items(self.project_id, &filter)
            .map_err(PlanError::Fetch)
    }

    /// With a single allowed repository the full fetch can skip the rest
    fn narrow_filter(&self) -> ItemFilter {
        match self.repos {
            [only] => ItemFilter {
                repository: Some(only.clone()),
                limit: None,
            },
            _ => ItemFilter::default(),
        }
    }

    fn allows(&self, issue: &IssueRef) -> bool {
        self.repos.is_empty()
            || self
                .repos
                .iter()
                .any(|repo| repo.matches(&issue.owner, &issue.repo))
    }

    fn describe_missing(&self, issue: &IssueRef) -> String {
        match self.api.get_issue(issue) {
            Ok(_) => format!("{} is not in the project, skipping", issue),
            Err(ApiError::NotFound(_)) => format!("{} was not found, skipping", issue),
            Err(e) => format!("{} could not be looked up ({}), skipping", issue, e),
        }
    }
}

//! Move orchestration
//!
//! [`Mover::prepare`] does every read and every check: it resolves field
//! values against the schema, fetches items, walks sub-issues and runs the
//! workflow rules. Nothing is written until [`Mover::apply`].
//!
//! ```text
//! prepare: values -> plan -> collect -> dedup -> validate -> changes
//! apply:   batch write -> record values -> labels
//! ```

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info};

use crate::api::{ApiError, Project, ProjectApi};
use crate::domain::{FieldUpdate, IssueRef, PendingChange, Priority, ProjectItem, RepoName, Status};
use crate::storage::Config;

use super::hierarchy::{Collection, HierarchyCollector};
use super::labels::{LabelChange, LabelManager};
use super::mutation::{BatchExecutor, MutationError, MutationReport, PlannedUpdate};
use super::planner::{FetchStrategy, PlanError, QueryPlanner};
use super::schema::{FieldSchemaCache, ResolvedValue, SchemaError};
use super::workflow::{
    discover_active_releases, CurrentStatus, ReleaseChange, Transition, ValidationContext, ValidationReport,
    WorkflowValidator,
};

/// Default sub-issue depth for recursive moves
pub const DEFAULT_DEPTH: usize = 10;

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("No issues given")]
    NoIssues,

    #[error("Nothing to change: pass --status, --priority, --branch or --backlog")]
    NoChanges,

    #[error("--branch and --backlog cannot be used together")]
    ConflictingBranch,

    #[error("--branch needs a release name")]
    EmptyBranch,

    #[error("Failed to load project {owner}/{number}: {source}")]
    Project {
        owner: String,
        number: u64,
        #[source]
        source: ApiError,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Validation(#[from] ValidationReport),
}

/// What to move and where
#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub issues: Vec<IssueRef>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub branch: Option<String>,

    /// Clear the branch and, without an explicit status, move to backlog
    pub backlog: bool,

    pub recursive: bool,
    pub depth: usize,
    pub force: bool,

    /// Replaces the configured repositories
    pub repo: Option<RepoName>,
}

impl Default for MoveRequest {
    fn default() -> Self {
        Self {
            issues: Vec::new(),
            status: None,
            priority: None,
            branch: None,
            backlog: false,
            recursive: false,
            depth: DEFAULT_DEPTH,
            force: false,
            repo: None,
        }
    }
}

impl MoveRequest {
    pub fn validate(&self) -> Result<(), MoveError> {
        if self.issues.is_empty() {
            return Err(MoveError::NoIssues);
        }
        if self.branch.is_some() && self.backlog {
            return Err(MoveError::ConflictingBranch);
        }
        if matches!(&self.branch, Some(b) if b.trim().is_empty()) {
            return Err(MoveError::EmptyBranch);
        }
        if self.status.is_none() && self.priority.is_none() && self.branch.is_none() && !self.backlog
        {
            return Err(MoveError::NoChanges);
        }
        Ok(())
    }

    /// Status the move sets, if any
    pub fn target_status(&self) -> Option<Status> {
        match (self.status, self.backlog) {
            (Some(status), _) => Some(status),
            (None, true) => Some(Status::Backlog),
            (None, false) => None,
        }
    }

    fn release_change(&self) -> ReleaseChange<'_> {
        match (&self.branch, self.backlog) {
            (Some(branch), _) => ReleaseChange::Set(branch.trim()),
            (None, true) => ReleaseChange::Clear,
            (None, false) => ReleaseChange::Keep,
        }
    }

    fn label_change(&self) -> Option<LabelChange> {
        if self.branch.is_some() {
            Some(LabelChange::Assign)
        } else if self.backlog {
            Some(LabelChange::Unassign)
        } else {
            None
        }
    }
}

/// An item that will be changed
#[derive(Debug, Clone)]
pub struct Target {
    pub item: ProjectItem,

    /// 0 for requested issues, otherwise the sub-issue depth
    pub depth: usize,

    pub updates: Vec<PlannedUpdate>,
}

/// A checked move, ready to write or to preview
#[derive(Debug)]
pub struct PreparedMove {
    pub project: Project,
    pub targets: Vec<Target>,

    /// One per requested issue on recursive moves
    pub hierarchy: Vec<Collection>,

    pub strategy: FetchStrategy,
    pub warnings: Vec<String>,

    /// At least one item passed only because of `--force`
    pub forced: bool,

    pub label_change: Option<LabelChange>,
}

impl PreparedMove {
    pub fn updates(&self) -> impl Iterator<Item = &PlannedUpdate> {
        self.targets.iter().flat_map(|t| t.updates.iter())
    }

    pub fn update_count(&self) -> usize {
        self.updates().count()
    }
}

/// What happened when a prepared move was written
#[derive(Debug)]
pub struct MoveReport {
    pub mutation: MutationReport,

    /// Targets with successful updates applied to their field values
    pub items: Vec<ProjectItem>,

    /// Label failures; never fatal
    pub warnings: Vec<String>,

    /// Workflow rules were bypassed with `--force`
    pub forced: bool,
}

impl MoveReport {
    /// Error listing failed updates, if any
    pub fn error(&self) -> Option<MutationError> {
        self.mutation.error()
    }
}

pub struct Mover<'a> {
    api: &'a dyn ProjectApi,
    config: &'a Config,
    schema: FieldSchemaCache,
}

impl<'a> Mover<'a> {
    pub fn new(api: &'a dyn ProjectApi, config: &'a Config) -> Self {
        Self {
            api,
            config,
            schema: FieldSchemaCache::new(),
        }
    }

    /// Reads and checks everything; writes nothing
    pub fn prepare(&mut self, request: &MoveRequest) -> Result<PreparedMove, MoveError> {
        request.validate()?;

        let owner = &self.config.project.owner;
        let number = self.config.project.number;
        let project = self
            .api
            .get_project(owner, number)
            .map_err(|source| MoveError::Project {
                owner: owner.clone(),
                number,
                source,
            })?;

        let values = self.resolve_values(&project.id, request)?;

        let repos = match &request.repo {
            Some(repo) => vec![repo.clone()],
            None => self.config.repositories(),
        };
        let plan = QueryPlanner::new(self.api, &project.id, &repos)
            .plan_and_fetch(&request.issues, request.recursive)?;
        let mut warnings = plan.warnings;

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for item in &plan.items {
            if seen.insert(item.item_id.clone()) {
                targets.push(Target {
                    item: item.clone(),
                    depth: 0,
                    updates: Vec::new(),
                });
            }
        }

        let mut hierarchy = Vec::new();
        if request.recursive {
            let collector = HierarchyCollector::new(self.api, &plan.index);
            for root in &plan.items {
                let collection = collector.collect(&root.issue_ref(), request.depth);
                warnings.extend(collection.warnings.iter().cloned());

                for node in collection.tracked() {
                    let Some(item) = plan.index.get(&node.issue) else {
                        continue;
                    };
                    if seen.insert(item.item_id.clone()) {
                        targets.push(Target {
                            item: item.clone(),
                            depth: node.depth,
                            updates: Vec::new(),
                        });
                    }
                }
                hierarchy.push(collection);
            }
        }

        let forced = self.check_workflow(request, &targets, &repos, &mut warnings)?;

        for target in &mut targets {
            target.updates = planned_updates(&target.item, &values);
        }

        debug!(
            targets = targets.len(),
            updates = targets.iter().map(|t| t.updates.len()).sum::<usize>(),
            "prepared move"
        );

        Ok(PreparedMove {
            project,
            targets,
            hierarchy,
            strategy: plan.strategy,
            warnings,
            forced,
            label_change: request.label_change(),
        })
    }

    /// Writes a prepared move
    pub fn apply(&self, prepared: PreparedMove) -> MoveReport {
        let updates: Vec<PlannedUpdate> = prepared.updates().cloned().collect();
        let mutation = BatchExecutor::new(self.api, &prepared.project.id).apply(&updates);

        let mut items: Vec<ProjectItem> = prepared.targets.into_iter().map(|t| t.item).collect();
        for applied in &mutation.applied {
            if let Some(item) = items.iter_mut().find(|i| i.item_id == applied.item_id) {
                item.fields.set(&applied.field, &applied.value);
            }
        }

        let mut warnings = Vec::new();
        if let Some(change) = prepared.label_change {
            let manager = LabelManager::new(self.api, &self.config.labels.assigned);
            let branch_field = self.config.branch_field();

            for applied in mutation
                .applied
                .iter()
                .filter(|u| u.field.eq_ignore_ascii_case(branch_field))
            {
                if let Some(item) = items.iter().find(|i| i.item_id == applied.item_id) {
                    warnings.extend(manager.sync_labels(item, change));
                }
            }
        }

        info!(
            applied = mutation.applied.len(),
            failed = mutation.failures.len(),
            "move finished"
        );

        MoveReport {
            mutation,
            items,
            warnings,
            forced: prepared.forced,
        }
    }

    /// Maps the request to schema-checked values, before any item is fetched
    fn resolve_values(
        &mut self,
        project_id: &str,
        request: &MoveRequest,
    ) -> Result<Vec<ResolvedValue>, SchemaError> {
        let config = self.config;
        let mut wanted: Vec<(&str, String)> = Vec::new();

        if let Some(status) = request.target_status() {
            wanted.push((config.status_field(), config.status_option(status)));
        }
        if let Some(priority) = request.priority {
            wanted.push((config.priority_field(), config.priority_option(priority)));
        }
        if let Some(branch) = &request.branch {
            wanted.push((config.branch_field(), branch.trim().to_string()));
        }
        if request.backlog {
            wanted.push((config.branch_field(), String::new()));
        }

        wanted
            .into_iter()
            .map(|(field, value)| self.schema.resolve(self.api, project_id, field, &value))
            .collect()
    }

    /// Runs workflow rules on every target; true when `--force` was needed
    fn check_workflow(
        &self,
        request: &MoveRequest,
        targets: &[Target],
        repos: &[RepoName],
        warnings: &mut Vec<String>,
    ) -> Result<bool, ValidationReport> {
        let validator = WorkflowValidator::new(self.config.is_idpf(), request.force);
        if !validator.is_enabled() {
            return Ok(false);
        }

        let status_field = self.config.status_field();
        let branch_field = self.config.branch_field();

        let target_status = request.target_status();
        let leaves_backlog = target_status.is_some_and(|s| !s.is_backlog())
            && targets
                .iter()
                .any(|t| current_status(self.config, status_field, &t.item).is_backlog());
        let active_releases = if leaves_backlog {
            self.active_releases(repos, warnings)
        } else {
            Vec::new()
        };

        let transition = Transition {
            status: target_status,
            release: request.release_change(),
        };
        let summary = validator.validate_all(targets.iter().map(|t| {
            (
                ValidationContext {
                    number: t.item.number,
                    current_status: current_status(self.config, status_field, &t.item),
                    current_release: t.item.field(branch_field),
                    body: &t.item.body,
                    active_releases: &active_releases,
                },
                transition,
            )
        }))?;

        warnings.extend(summary.warnings);
        Ok(summary.bypassed > 0)
    }

    /// Release discovery failures skip the release rule instead of failing
    fn active_releases(&self, repos: &[RepoName], warnings: &mut Vec<String>) -> Vec<String> {
        let Some(repo) = repos.first() else {
            return Vec::new();
        };
        let releases = &self.config.releases;

        match discover_active_releases(self.api, repo, &releases.label, &releases.title_prefix) {
            Ok(found) => found,
            Err(e) => {
                debug!(repo = %repo, error = %e, "could not discover active releases");
                warnings.push(format!(
                    "Could not discover active releases in {}: {}; release check skipped",
                    repo, e
                ));
                Vec::new()
            }
        }
    }
}

fn current_status<'i>(
    config: &Config,
    status_field: &str,
    item: &'i ProjectItem,
) -> CurrentStatus<'i> {
    CurrentStatus::classify(item.field(status_field), |value| config.status_tag(value))
}

/// One update per field for an item; later values for the same field win
fn planned_updates(item: &ProjectItem, values: &[ResolvedValue]) -> Vec<PlannedUpdate> {
    let mut change = PendingChange::new();
    for value in values {
        change.set(FieldUpdate::new(
            &item.item_id,
            item.number,
            &value.field_name,
            value.value.display(),
        ));
    }

    change
        .into_updates()
        .into_iter()
        .filter_map(|update| {
            let value = values
                .iter()
                .rev()
                .find(|v| v.field_name.eq_ignore_ascii_case(&update.field))?;
            Some(PlannedUpdate {
                resolved: value.for_item(&update.item_id),
                update,
            })
        })
        .collect()
}

//! Batched field writes
//!
//! All updates go out in one batch call. If that call fails outright, or
//! returns the wrong number of results, every update is retried one at a
//! time. Individual failures never stop the others and nothing is rolled
//! back.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{ProjectApi, ResolvedUpdate};
use crate::domain::FieldUpdate;

/// An update with its schema IDs attached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpdate {
    pub update: FieldUpdate,
    pub resolved: ResolvedUpdate,
}

/// One update that did not land
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateFailure {
    pub number: u64,
    pub item_id: String,
    pub field: String,
    pub reason: String,
}

impl fmt::Display for UpdateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} could not be updated: {}", self.number, self.reason)
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct MutationReport {
    pub applied: Vec<FieldUpdate>,
    pub failures: Vec<UpdateFailure>,

    /// Updates were sent one at a time after the batch call failed
    pub sequential: bool,
}

impl MutationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Error describing every failure, if there were any
    pub fn error(&self) -> Option<MutationError> {
        if self.failures.is_empty() {
            return None;
        }
        Some(MutationError {
            failures: self.failures.clone(),
            applied: self.applied.len(),
        })
    }
}

#[derive(Debug, Error)]
#[error("{}", describe(.failures, .applied))]
pub struct MutationError {
    pub failures: Vec<UpdateFailure>,
    pub applied: usize,
}

fn describe(failures: &[UpdateFailure], applied: &usize) -> String {
    let lines: Vec<String> = failures.iter().map(|f| f.to_string()).collect();
    format!(
        "{} update(s) failed, {} applied:\n  {}",
        failures.len(),
        applied,
        lines.join("\n  ")
    )
}

pub struct BatchExecutor<'a> {
    api: &'a dyn ProjectApi,
    project_id: &'a str,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(api: &'a dyn ProjectApi, project_id: &'a str) -> Self {
        Self { api, project_id }
    }

    pub fn apply(&self, updates: &[PlannedUpdate]) -> MutationReport {
        if updates.is_empty() {
            return MutationReport::default();
        }

        let resolved: Vec<ResolvedUpdate> = updates.iter().map(|u| u.resolved.clone()).collect();

        match self
            .api
            .batch_update_project_item_fields(self.project_id, &resolved)
        {
            Ok(results) if results.len() == updates.len() => {
                debug!(count = results.len(), "batch update finished");
                let mut report = MutationReport::default();
                for (planned, result) in updates.iter().zip(results) {
                    if result.success {
                        report.applied.push(planned.update.clone());
                    } else {
                        let reason = result
                            .error
                            .unwrap_or_else(|| "unknown error".to_string());
                        report.failures.push(failure(planned, reason));
                    }
                }
                report
            }
            Ok(results) => {
                warn!(
                    expected = updates.len(),
                    got = results.len(),
                    "batch returned a mismatched result count, retrying one at a time"
                );
                self.apply_sequential(updates)
            }
            Err(e) => {
                warn!(error = %e, "batch update failed, retrying one at a time");
                self.apply_sequential(updates)
            }
        }
    }

    fn apply_sequential(&self, updates: &[PlannedUpdate]) -> MutationReport {
        let mut report = MutationReport {
            sequential: true,
            ..Default::default()
        };

        for planned in updates {
            match self.api.set_project_item_field(self.project_id, &planned.resolved) {
                Ok(()) => report.applied.push(planned.update.clone()),
                Err(e) => report.failures.push(failure(planned, e.to_string())),
            }
        }

        report
    }
}

fn failure(planned: &PlannedUpdate, reason: String) -> UpdateFailure {
    UpdateFailure {
        number: planned.update.number,
        item_id: planned.update.item_id.clone(),
        field: planned.update.field.clone(),
        reason,
    }
}

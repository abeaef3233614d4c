//! IDPF workflow rules
//!
//! Checked for every target before anything is written:
//!
//! 1. Moving to `in_review` or `done` needs a non-empty body. Not bypassable.
//! 2. Moving to `in_review` or `done` needs every checklist item ticked.
//!    `--force` turns this into a warning.
//! 3. Leaving backlog needs a release that matches an active release.
//!    Skipped when no active releases exist.
//!
//! Failures from all items are collected into one [`ValidationReport`].

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::api::{ApiResult, ProjectApi};
use crate::domain::{checklist, RepoName, Status};

/// A rule violation on one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub number: u64,
    pub message: String,
    pub suggestion: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}: {}\n    {}", self.number, self.message, self.suggestion)
    }
}

/// Every violation found in one move
#[derive(Debug, Error)]
#[error("{}", summarize(.errors))]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

fn summarize(errors: &[ValidationError]) -> String {
    let mut out = format!("Workflow validation failed for {} item(s):", errors.len());
    for e in errors {
        out.push_str("\n  ");
        out.push_str(&e.to_string());
    }
    out
}

/// Status field of an item as found on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentStatus<'a> {
    Empty,
    Known(Status),

    /// An option with no matching status, e.g. `Blocked`
    Other(&'a str),
}

impl<'a> CurrentStatus<'a> {
    /// Classifies a raw field value; `tag` maps option names to statuses
    pub fn classify(raw: Option<&'a str>, tag: impl Fn(&str) -> Option<Status>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => CurrentStatus::Empty,
            Some(value) => tag(value).map_or(CurrentStatus::Other(value), CurrentStatus::Known),
        }
    }

    /// Empty counts as backlog; unrecognized options do not
    pub fn is_backlog(&self) -> bool {
        match self {
            CurrentStatus::Empty => true,
            CurrentStatus::Known(status) => status.is_backlog(),
            CurrentStatus::Other(_) => false,
        }
    }
}

/// Current state of one item
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub number: u64,
    pub current_status: CurrentStatus<'a>,

    pub current_release: Option<&'a str>,
    pub body: &'a str,
    pub active_releases: &'a [String],
}

/// What the move does to the release field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseChange<'a> {
    Keep,
    Set(&'a str),
    Clear,
}

/// The change requested for an item
#[derive(Debug, Clone, Copy)]
pub struct Transition<'a> {
    pub status: Option<Status>,
    pub release: ReleaseChange<'a>,
}

/// Outcome for one item
#[derive(Debug, Default)]
pub struct ItemOutcome {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,

    /// A rule was skipped because of `--force`
    pub bypassed: bool,
}

/// Outcome for a whole move that passed
#[derive(Debug, Default)]
pub struct ValidationSummary {
    pub warnings: Vec<String>,

    /// Items that passed only because of `--force`
    pub bypassed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkflowValidator {
    enabled: bool,
    force: bool,
}

impl WorkflowValidator {
    /// `enabled` is false for projects without the IDPF framework
    pub fn new(enabled: bool, force: bool) -> Self {
        Self { enabled, force }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn validate(&self, ctx: &ValidationContext<'_>, transition: &Transition<'_>) -> ItemOutcome {
        let mut outcome = ItemOutcome::default();
        if !self.enabled {
            return outcome;
        }
        let Some(target) = transition.status else {
            return outcome;
        };

        if target.requires_completion() {
            self.check_completion(ctx, target, &mut outcome);
        }

        let leaving_backlog = ctx.current_status.is_backlog();
        if leaving_backlog && !target.is_backlog() && !ctx.active_releases.is_empty() {
            check_release(ctx, transition.release, &mut outcome);
        }

        outcome
    }

    fn check_completion(&self, ctx: &ValidationContext<'_>, target: Status, outcome: &mut ItemOutcome) {
        if ctx.body.trim().is_empty() {
            outcome.errors.push(ValidationError {
                number: ctx.number,
                message: "Issue body is empty".to_string(),
                suggestion: format!(
                    "Add a description and acceptance criteria before moving to {}",
                    target
                ),
            });
            return;
        }

        let count = checklist::scan(ctx.body);
        if count.is_complete() {
            return;
        }

        if self.force {
            outcome.bypassed = true;
            outcome.warnings.push(format!(
                "#{}: {} unchecked checklist item(s), continuing because of --force",
                ctx.number, count.unchecked
            ));
        } else {
            outcome.errors.push(ValidationError {
                number: ctx.number,
                message: format!(
                    "{} of {} checklist item(s) unchecked",
                    count.unchecked,
                    count.total()
                ),
                suggestion: "Complete the checklist or pass --force".to_string(),
            });
        }
    }

    /// Validates every item and fails with all violations at once
    pub fn validate_all<'a>(
        &self,
        items: impl IntoIterator<Item = (ValidationContext<'a>, Transition<'a>)>,
    ) -> Result<ValidationSummary, ValidationReport> {
        let mut summary = ValidationSummary::default();
        let mut errors = Vec::new();

        for (ctx, transition) in items {
            let outcome = self.validate(&ctx, &transition);
            errors.extend(outcome.errors);
            summary.warnings.extend(outcome.warnings);
            if outcome.bypassed {
                summary.bypassed += 1;
            }
        }

        if errors.is_empty() {
            Ok(summary)
        } else {
            Err(ValidationReport { errors })
        }
    }
}

fn check_release(ctx: &ValidationContext<'_>, change: ReleaseChange<'_>, outcome: &mut ItemOutcome) {
    let release = match change {
        ReleaseChange::Set(r) => Some(r),
        ReleaseChange::Clear => None,
        ReleaseChange::Keep => ctx.current_release.filter(|r| !r.trim().is_empty()),
    };
    let active = ctx.active_releases.join(", ");

    match release {
        None => outcome.errors.push(ValidationError {
            number: ctx.number,
            message: "Moving out of backlog requires a release assignment".to_string(),
            suggestion: format!("Pass --branch with one of: {}", active),
        }),
        Some(r) if !ctx.active_releases.iter().any(|a| a.eq_ignore_ascii_case(r.trim())) => {
            outcome.errors.push(ValidationError {
                number: ctx.number,
                message: format!("Release '{}' is not active", r),
                suggestion: format!("Active releases: {}", active),
            })
        }
        Some(_) => {}
    }
}

/// Release names from open tracker issues, e.g. `Release: v2.0` gives `v2.0`
pub fn discover_active_releases(
    api: &dyn ProjectApi,
    repo: &RepoName,
    label: &str,
    title_prefix: &str,
) -> ApiResult<Vec<String>> {
    let releases: Vec<String> = api
        .get_open_issues_by_label(&repo.owner, &repo.repo, label)?
        .into_iter()
        .filter_map(|issue| {
            issue
                .title
                .strip_prefix(title_prefix)
                .map(|name| name.trim().to_string())
        })
        .filter(|name| !name.is_empty())
        .collect();

    debug!(repo = %repo, ?releases, "discovered active releases");
    Ok(releases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Issue;
    use crate::domain::IssueState;
    use crate::engine::fixtures::board;

    const DONE_BODY: &str = "Acceptance:\n\n- [x] parses\n- [x] renders\n";
    const OPEN_BODY: &str = "Acceptance:\n\n- [x] parses\n- [ ] renders\n- [ ] documented\n";

    fn ctx<'a>(body: &'a str, status: CurrentStatus<'a>, releases: &'a [String]) -> ValidationContext<'a> {
        ValidationContext {
            number: 7,
            current_status: status,
            current_release: None,
            body,
            active_releases: releases,
        }
    }

    fn to(status: Status) -> Transition<'static> {
        Transition {
            status: Some(status),
            release: ReleaseChange::Keep,
        }
    }

    #[test]
    fn disabled_validator_passes_everything() {
        let validator = WorkflowValidator::new(false, false);
        let outcome = validator.validate(&ctx("", CurrentStatus::Known(Status::Ready), &[]), &to(Status::Done));
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn empty_body_blocks_done_even_with_force() {
        let validator = WorkflowValidator::new(true, true);
        let outcome = validator.validate(
            &ctx("   \n", CurrentStatus::Known(Status::InProgress), &[]),
            &to(Status::Done),
        );
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].message, "Issue body is empty");
    }

    #[test]
    fn unchecked_items_block_review() {
        let validator = WorkflowValidator::new(true, false);
        let outcome = validator.validate(
            &ctx(OPEN_BODY, CurrentStatus::Known(Status::InProgress), &[]),
            &to(Status::InReview),
        );
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].message, "2 of 3 checklist item(s) unchecked");
    }

    #[test]
    fn force_turns_checklist_into_warning() {
        let validator = WorkflowValidator::new(true, true);
        let outcome = validator.validate(
            &ctx(OPEN_BODY, CurrentStatus::Known(Status::InProgress), &[]),
            &to(Status::Done),
        );
        assert!(outcome.errors.is_empty());
        assert!(outcome.bypassed);
        assert!(outcome.warnings[0].contains("2 unchecked"));
    }

    #[test]
    fn complete_checklist_needs_no_force() {
        let validator = WorkflowValidator::new(true, true);
        let outcome = validator.validate(
            &ctx(DONE_BODY, CurrentStatus::Known(Status::InProgress), &[]),
            &to(Status::Done),
        );
        assert!(outcome.errors.is_empty());
        assert!(outcome.warnings.is_empty());
        assert!(!outcome.bypassed);
    }

    #[test]
    fn fenced_checklist_items_are_not_counted() {
        let body = "Done.\n\n- [x] shipped\n\n```md\n- [ ] example only\n```\n";
        let validator = WorkflowValidator::new(true, false);
        let outcome = validator.validate(&ctx(body, CurrentStatus::Known(Status::InReview), &[]), &to(Status::Done));
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn leaving_backlog_requires_release() {
        let releases = vec!["v2.0".to_string()];
        let validator = WorkflowValidator::new(true, false);

        let outcome = validator.validate(
            &ctx("body", CurrentStatus::Known(Status::Backlog), &releases),
            &to(Status::Ready),
        );
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].suggestion.contains("v2.0"));

        let with_release = Transition {
            status: Some(Status::Ready),
            release: ReleaseChange::Set("V2.0"),
        };
        let outcome = validator.validate(&ctx("body", CurrentStatus::Known(Status::Backlog), &releases), &with_release);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn existing_release_counts() {
        let releases = vec!["v2.0".to_string()];
        let validator = WorkflowValidator::new(true, false);
        let mut context = ctx("body", CurrentStatus::Empty, &releases);
        context.current_release = Some("v2.0");

        let outcome = validator.validate(&context, &to(Status::InProgress));
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn empty_status_counts_as_backlog() {
        let releases = vec!["v2.0".to_string()];
        let validator = WorkflowValidator::new(true, false);
        let outcome = validator.validate(
            &ctx("body", CurrentStatus::Empty, &releases),
            &to(Status::Ready),
        );
        assert_eq!(
            outcome.errors[0].message,
            "Moving out of backlog requires a release assignment"
        );
    }

    #[test]
    fn custom_status_is_not_backlog() {
        let releases = vec!["v2.0".to_string()];
        let validator = WorkflowValidator::new(true, false);
        let outcome = validator.validate(
            &ctx("body", CurrentStatus::Other("Blocked"), &releases),
            &to(Status::InProgress),
        );
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn classify_tells_empty_from_unrecognized() {
        let tag = |s: &str| s.parse::<Status>().ok();
        assert_eq!(CurrentStatus::classify(None, tag), CurrentStatus::Empty);
        assert_eq!(CurrentStatus::classify(Some("  "), tag), CurrentStatus::Empty);
        assert_eq!(
            CurrentStatus::classify(Some("backlog"), tag),
            CurrentStatus::Known(Status::Backlog)
        );
        assert_eq!(
            CurrentStatus::classify(Some("Blocked"), tag),
            CurrentStatus::Other("Blocked")
        );
    }

    #[test]
    fn inactive_release_is_rejected() {
        let releases = vec!["v2.0".to_string()];
        let validator = WorkflowValidator::new(true, false);
        let transition = Transition {
            status: Some(Status::Ready),
            release: ReleaseChange::Set("v1.0"),
        };

        let outcome = validator.validate(&ctx("body", CurrentStatus::Known(Status::Backlog), &releases), &transition);
        assert_eq!(outcome.errors[0].message, "Release 'v1.0' is not active");
    }

    #[test]
    fn release_rule_skipped_without_active_releases() {
        let validator = WorkflowValidator::new(true, false);
        let outcome = validator.validate(&ctx("body", CurrentStatus::Known(Status::Backlog), &[]), &to(Status::Ready));
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn failures_are_aggregated() {
        let validator = WorkflowValidator::new(true, false);
        let mut second = ctx("", CurrentStatus::Known(Status::Ready), &[]);
        second.number = 8;

        let report = validator
            .validate_all(vec![
                (ctx(OPEN_BODY, CurrentStatus::Known(Status::Ready), &[]), to(Status::Done)),
                (second, to(Status::Done)),
            ])
            .unwrap_err();

        assert_eq!(report.errors.len(), 2);
        let text = report.to_string();
        assert!(text.starts_with("Workflow validation failed for 2 item(s):"));
        assert!(text.contains("#7:"));
        assert!(text.contains("#8: Issue body is empty"));
    }

    #[test]
    fn discovers_releases_from_tracker_issues() {
        let tracker = |number: u64, title: &str, state: IssueState| Issue {
            id: format!("R{}", number),
            owner: "acme".to_string(),
            repo: "widgets".to_string(),
            number,
            title: title.to_string(),
            body: String::new(),
            state,
            labels: vec!["release".to_string()],
        };
        let api = board()
            .with_issue(tracker(50, "Release: v2.0", IssueState::Open))
            .with_issue(tracker(51, "Release: v1.0", IssueState::Closed))
            .with_issue(tracker(52, "Planning notes", IssueState::Open));

        let releases =
            discover_active_releases(&api, &RepoName::new("acme", "widgets"), "release", "Release: ")
                .unwrap();
        assert_eq!(releases, vec!["v2.0".to_string()]);
    }
}

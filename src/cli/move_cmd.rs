//! `gh-pmu move` command

use std::io::IsTerminal;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;
use dialoguer::{theme::ColorfulTheme, Confirm};
use serde::Serialize;

use super::output::Output;
use crate::api::GhClient;
use crate::domain::{IssueRef, Priority, RepoName, TagError};
use crate::engine::{Collection, MoveReport, MoveRequest, Mover, PreparedMove, DEFAULT_DEPTH};
use crate::storage::Config;

#[derive(Args, Debug)]
pub struct MoveArgs {
    /// Issues to move: `42`, `#42`, `owner/repo#42` or an issue URL
    #[arg(required = true)]
    pub issues: Vec<String>,

    /// Target status (backlog, ready, in_progress, in_review, done or a board option name)
    #[arg(long, short = 's')]
    pub status: Option<String>,

    /// Target priority (p0, p1, p2)
    #[arg(long, short = 'p')]
    pub priority: Option<String>,

    /// Release to assign
    #[arg(long, short = 'b', conflicts_with = "backlog")]
    pub branch: Option<String>,

    /// Return to backlog and clear the release
    #[arg(long)]
    pub backlog: bool,

    /// Also move sub-issues
    #[arg(long, short = 'r')]
    pub recursive: bool,

    /// Maximum sub-issue depth with --recursive
    #[arg(long, default_value_t = DEFAULT_DEPTH)]
    pub depth: usize,

    /// Show what would change without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt for recursive moves
    #[arg(long, short = 'y')]
    pub yes: bool,

    /// Move even when the checklist is incomplete
    #[arg(long)]
    pub force: bool,

    /// Repository for bare issue numbers, replacing the configured ones
    #[arg(long, short = 'R')]
    pub repo: Option<String>,
}

#[derive(Serialize)]
struct ChangeView {
    field: String,
    from: String,
    to: String,
}

#[derive(Serialize)]
struct ItemView {
    #[serde(skip)]
    item_id: String,
    issue: String,
    title: String,
    depth: usize,
    changes: Vec<ChangeView>,
}

pub fn run(args: MoveArgs, config_path: Option<&Path>, output: &Output) -> Result<()> {
    let config = load_config(config_path)?;
    let request = build_request(&args, &config)?;

    output.verbose_ctx(
        "move",
        &format!(
            "project {}/{}, {} issue(s), recursive={}, depth={}",
            config.project.owner,
            config.project.number,
            request.issues.len(),
            request.recursive,
            request.depth
        ),
    );

    let client = GhClient::new();
    let mut mover = Mover::new(&client, &config);
    let prepared = mover.prepare(&request)?;

    output.verbose_ctx(
        "move",
        &format!(
            "{:?} fetch, {} target(s), {} update(s)",
            prepared.strategy,
            prepared.targets.len(),
            prepared.update_count()
        ),
    );

    if args.dry_run {
        print_preview(output, &prepared);
        return Ok(());
    }

    for warning in &prepared.warnings {
        output.warn(warning);
    }

    if request.recursive && !args.yes && !confirm(&prepared)? {
        output.success("Cancelled, no changes made");
        return Ok(());
    }

    let views = item_views(&prepared);
    let mut warnings = prepared.warnings.clone();
    let report = mover.apply(prepared);
    warnings.extend(report.warnings.iter().cloned());
    print_report(output, &views, &warnings, &report);

    match report.error() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            Config::load_from_dir(&cwd)
        }
    }
}

fn build_request(args: &MoveArgs, config: &Config) -> Result<MoveRequest> {
    let repo = args.repo.as_deref().map(RepoName::parse).transpose()?;
    let default_repo = repo.clone().or_else(|| config.default_repo());

    let issues = args
        .issues
        .iter()
        .map(|s| IssueRef::parse(s, default_repo.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;

    let status = args
        .status
        .as_deref()
        .map(|s| {
            config
                .status_tag(s)
                .ok_or_else(|| TagError::UnknownStatus(s.to_string()))
        })
        .transpose()?;

    let priority = args
        .priority
        .as_deref()
        .map(str::parse::<Priority>)
        .transpose()?;

    Ok(MoveRequest {
        issues,
        status,
        priority,
        branch: args.branch.clone(),
        backlog: args.backlog,
        recursive: args.recursive,
        depth: args.depth,
        force: args.force,
        repo,
    })
}

fn confirm(prepared: &PreparedMove) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        bail!(
            "Recursive move of {} item(s) needs confirmation: pass --yes",
            prepared.targets.len()
        );
    }

    let answer = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!(
            "Update {} item(s) ({} sub-issue(s))?",
            prepared.targets.len(),
            prepared.targets.iter().filter(|t| t.depth > 0).count()
        ))
        .default(false)
        .interact()?;
    Ok(answer)
}

fn item_views(prepared: &PreparedMove) -> Vec<ItemView> {
    prepared
        .targets
        .iter()
        .map(|t| ItemView {
            item_id: t.item.item_id.clone(),
            issue: t.item.issue_ref().to_string(),
            title: t.item.title.clone(),
            depth: t.depth,
            changes: t
                .updates
                .iter()
                .map(|u| ChangeView {
                    field: u.update.field.clone(),
                    from: t.item.field(&u.update.field).unwrap_or_default().to_string(),
                    to: u.update.value.clone(),
                })
                .collect(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Preview,
    Applied,
}

/// Warnings for stderr, plus the `--force` notice when rules were bypassed
fn notices(warnings: &[String], forced: bool, stage: Stage) -> Vec<String> {
    let mut out = warnings.to_vec();
    if forced {
        out.push(
            match stage {
                Stage::Preview => "Workflow rules would be bypassed with --force",
                Stage::Applied => "Moved with --force: IDPF workflow rules may have been violated",
            }
            .to_string(),
        );
    }
    out
}

fn describe_change(change: &ChangeView) -> String {
    let show = |v: &str| {
        if v.is_empty() {
            "(empty)".to_string()
        } else {
            v.to_string()
        }
    };
    format!("{}: {} -> {}", change.field, show(&change.from), show(&change.to))
}

fn print_preview(output: &Output, prepared: &PreparedMove) {
    let views = item_views(prepared);

    if output.is_json() {
        output.data(&serde_json::json!({
            "dry_run": true,
            "project": prepared.project.title,
            "items": views,
            "hierarchy": prepared.hierarchy,
            "warnings": prepared.warnings,
            "forced": prepared.forced,
        }));
        return;
    }

    output.line(&format!(
        "Dry run: would update {} item(s) on {}",
        views.len(),
        prepared.project.title
    ));
    for view in &views {
        output.line(&format!("  {} {}", view.issue, view.title));
        for change in &view.changes {
            output.line(&format!("      {}", describe_change(change)));
        }
    }

    for collection in &prepared.hierarchy {
        print_tree(output, collection);
    }

    for warning in notices(&prepared.warnings, prepared.forced, Stage::Preview) {
        output.warn(&warning);
    }
}

fn print_tree(output: &Output, collection: &Collection) {
    if collection.nodes.is_empty() {
        return;
    }

    output.line("");
    output.line(&format!("Sub-issues of {}:", collection.root));
    for node in &collection.nodes {
        let indent = "  ".repeat(node.depth);
        let suffix = if node.is_tracked() {
            ""
        } else {
            " (not in project, skipped)"
        };
        output.line(&format!("{}{} {}{}", indent, node.issue, node.title, suffix));
    }
}

fn print_report(output: &Output, views: &[ItemView], warnings: &[String], report: &MoveReport) {
    let mutation = &report.mutation;
    let applied = |view: &ItemView, change: &ChangeView| {
        mutation
            .applied
            .iter()
            .any(|u| u.item_id == view.item_id && u.field == change.field)
    };

    if output.is_json() {
        output.data(&serde_json::json!({
            "success": mutation.is_success(),
            "items": views,
            "applied": mutation.applied.len(),
            "failures": mutation.failures,
            "sequential": mutation.sequential,
            "warnings": warnings,
            "forced": report.forced,
        }));
        return;
    }

    for view in views {
        for change in view.changes.iter().filter(|c| applied(view, c)) {
            output.line(&format!("Updated {}: {}", view.issue, describe_change(change)));
        }
    }
    for warning in notices(&report.warnings, report.forced, Stage::Applied) {
        output.warn(&warning);
    }

    output.line(&format!(
        "{} of {} update(s) applied",
        mutation.applied.len(),
        mutation.applied.len() + mutation.failures.len()
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProjectItem, Status};
    use crate::engine::fixtures::{board, item, sub, widgets};

    const IDPF: &str =
        "project: {owner: acme, number: 3}\nrepositories: [acme/widgets]\nframework: idpf\n";

    fn with_body(number: u64, status: &str, body: &str) -> ProjectItem {
        ProjectItem {
            body: body.to_string(),
            ..item(number, status)
        }
    }

    fn forced_done() -> MoveRequest {
        MoveRequest {
            issues: vec![widgets(1)],
            status: Some(Status::Done),
            force: true,
            ..Default::default()
        }
    }

    #[test]
    fn preview_keeps_force_and_traversal_warnings() {
        let api = board()
            .with_item(with_body(1, "In progress", "- [x] one\n- [ ] two\n"))
            .with_children(&widgets(1), vec![sub(2)])
            .fail_sub_issues("acme", "widgets");
        let config = Config::from_yaml(IDPF).unwrap();
        let mut mover = Mover::new(&api, &config);

        let mut request = forced_done();
        request.recursive = true;
        let prepared = mover.prepare(&request).unwrap();

        let shown = notices(&prepared.warnings, prepared.forced, Stage::Preview);
        assert!(shown.iter().any(|w| w.contains("1 unchecked checklist item(s)")));
        assert!(shown.iter().any(|w| w.contains("acme/widgets")));
        assert_eq!(
            shown.last().map(String::as_str),
            Some("Workflow rules would be bypassed with --force")
        );
        assert_eq!(api.mutation_calls(), 0);
    }

    #[test]
    fn forced_move_reports_possible_violation() {
        let api = board().with_item(with_body(1, "In progress", "- [ ] pending\n"));
        let config = Config::from_yaml(IDPF).unwrap();
        let mut mover = Mover::new(&api, &config);

        let prepared = mover.prepare(&forced_done()).unwrap();
        let report = mover.apply(prepared);
        assert!(report.error().is_none());

        let shown = notices(&report.warnings, report.forced, Stage::Applied);
        assert_eq!(
            shown,
            vec!["Moved with --force: IDPF workflow rules may have been violated".to_string()]
        );
    }

    #[test]
    fn no_notice_without_force() {
        assert!(notices(&[], false, Stage::Applied).is_empty());
        assert_eq!(notices(&["a".to_string()], false, Stage::Preview), vec!["a".to_string()]);
    }

    #[test]
    fn change_shows_empty_values() {
        let change = ChangeView {
            field: "Release".to_string(),
            from: String::new(),
            to: "v2.0".to_string(),
        };
        assert_eq!(describe_change(&change), "Release: (empty) -> v2.0");
    }
}

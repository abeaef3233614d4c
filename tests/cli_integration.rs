//! CLI integration tests for gh-pmu
//!
//! These cover argument handling and configuration loading, which all
//! happen before the first call to GitHub.

use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const CONFIG: &str = "project:\n  owner: acme\n  number: 3\nrepositories:\n  - acme/widgets\n";

/// Get a command instance for the gh-pmu binary
fn pmu_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("gh-pmu"));
    cmd.env_remove("GH_PMU_CONFIG");
    cmd
}

/// Create a temporary directory holding a .gh-pmu.yml
fn setup_repo(config: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".gh-pmu.yml"), config).unwrap();
    dir
}

// =============================================================================
// Help
// =============================================================================

#[test]
fn test_help_lists_move() {
    pmu_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("move"));
}

#[test]
fn test_move_help_lists_flags() {
    pmu_cmd()
        .args(["move", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--recursive"))
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--backlog"))
        .stdout(predicate::str::contains("--depth"));
}

#[test]
fn test_move_requires_issues() {
    pmu_cmd().args(["move", "--status", "ready"]).assert().failure();
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_missing_config() {
    let dir = TempDir::new().unwrap();

    pmu_cmd()
        .current_dir(dir.path())
        .args(["move", "1", "--status", "ready"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No .gh-pmu.yml found"));
}

#[test]
fn test_config_found_from_subdirectory() {
    let dir = setup_repo(CONFIG);
    let nested = dir.path().join("src");
    fs::create_dir_all(&nested).unwrap();

    // Loading succeeds, so the failure comes from the request itself
    pmu_cmd()
        .current_dir(&nested)
        .args(["move", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to change"));
}

#[test]
fn test_explicit_config_path() {
    let dir = setup_repo(CONFIG);
    let elsewhere = TempDir::new().unwrap();

    pmu_cmd()
        .current_dir(elsewhere.path())
        .arg("--config")
        .arg(dir.path().join(".gh-pmu.yml"))
        .args(["move", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Nothing to change"));
}

#[test]
fn test_explicit_config_missing_file() {
    let dir = TempDir::new().unwrap();

    pmu_cmd()
        .arg("--config")
        .arg(dir.path().join("nope.yml"))
        .args(["move", "1", "--status", "ready"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config"));
}

#[test]
fn test_invalid_config() {
    let dir = setup_repo("repositories:\n  - acme/widgets\n");

    pmu_cmd()
        .current_dir(dir.path())
        .args(["move", "1", "--status", "ready"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("project.owner is required"));
}

// =============================================================================
// Request validation
// =============================================================================

#[test]
fn test_invalid_repo_format() {
    let dir = setup_repo(CONFIG);

    pmu_cmd()
        .current_dir(dir.path())
        .args(["move", "1", "--status", "ready", "--repo", "widgets"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid repository format 'widgets'"));
}

#[test]
fn test_branch_conflicts_with_backlog() {
    let dir = setup_repo(CONFIG);

    pmu_cmd()
        .current_dir(dir.path())
        .args(["move", "1", "--branch", "v2", "--backlog"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

#[test]
fn test_unknown_status() {
    let dir = setup_repo(CONFIG);

    pmu_cmd()
        .current_dir(dir.path())
        .args(["move", "1", "--status", "blocked"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown status 'blocked'"));
}

#[test]
fn test_unknown_priority() {
    let dir = setup_repo(CONFIG);

    pmu_cmd()
        .current_dir(dir.path())
        .args(["move", "1", "--priority", "urgent"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown priority 'urgent'"));
}

#[test]
fn test_bare_number_needs_repository() {
    let dir = setup_repo("project:\n  owner: acme\n  number: 3\n");

    pmu_cmd()
        .current_dir(dir.path())
        .args(["move", "7", "--status", "ready"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Issue #7 needs a repository"));
}

#[test]
fn test_invalid_issue_reference() {
    let dir = setup_repo(CONFIG);

    pmu_cmd()
        .current_dir(dir.path())
        .args(["move", "abc", "--status", "ready"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid issue reference 'abc'"));
}

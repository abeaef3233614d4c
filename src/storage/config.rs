//! Configuration handling for gh-pmu
//!
//! Configuration lives in `.gh-pmu.yml` at the repository root. Callers pass
//! the starting directory or file path explicitly; nothing here reads the
//! process working directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Priority, RepoName, Status};

pub const CONFIG_FILE: &str = ".gh-pmu.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No .gh-pmu.yml found in {0} or any parent directory")]
    NotFound(PathBuf),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The project board this repository uses
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ProjectConfig {
    /// User or organization login that owns the project
    pub owner: String,

    /// Project number as shown in its URL
    pub number: u64,
}

/// Workflow framework declared by the project
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    #[default]
    None,
    #[serde(alias = "IDPF")]
    Idpf,
}

/// A project field plus alias → option-name mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMapping {
    /// Field name on the board
    pub field: String,

    /// Alias (e.g. `in_progress`) to option name (e.g. `In progress`)
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

fn default_status_name(status: Status) -> &'static str {
    match status {
        Status::Backlog => "Backlog",
        Status::Ready => "Ready",
        Status::InProgress => "In progress",
        Status::InReview => "In review",
        Status::Done => "Done",
    }
}

fn default_priority_name(priority: Priority) -> &'static str {
    match priority {
        Priority::P0 => "P0",
        Priority::P1 => "P1",
        Priority::P2 => "P2",
    }
}

fn default_status_mapping() -> FieldMapping {
    FieldMapping {
        field: "Status".to_string(),
        values: Status::ALL
            .iter()
            .map(|s| (s.key().to_string(), default_status_name(*s).to_string()))
            .collect(),
    }
}

fn default_priority_mapping() -> FieldMapping {
    FieldMapping {
        field: "Priority".to_string(),
        values: Priority::ALL
            .iter()
            .map(|p| (p.key().to_string(), default_priority_name(*p).to_string()))
            .collect(),
    }
}

/// Free-text field holding the release/branch assignment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BranchField {
    pub field: String,
}

impl Default for BranchField {
    fn default() -> Self {
        Self {
            field: "Release".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldsConfig {
    #[serde(default = "default_status_mapping")]
    pub status: FieldMapping,

    #[serde(default = "default_priority_mapping")]
    pub priority: FieldMapping,

    #[serde(default)]
    pub branch: BranchField,
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            status: default_status_mapping(),
            priority: default_priority_mapping(),
            branch: BranchField::default(),
        }
    }
}

/// How active releases are discovered
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReleaseConfig {
    /// Label carried by release tracker issues
    pub label: String,

    /// Title prefix of tracker issues; the rest of the title is the release name
    pub title_prefix: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            label: "release".to_string(),
            title_prefix: "Release: ".to_string(),
        }
    }
}

/// Bookkeeping labels
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LabelConfig {
    /// Added when an item gets a branch, removed on backlog
    pub assigned: String,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            assigned: "assigned".to_string(),
        }
    }
}

/// Repository configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,

    /// `owner/repo` entries; the first is the default for bare issue numbers
    pub repositories: Vec<String>,

    pub framework: Framework,

    pub fields: FieldsConfig,

    pub releases: ReleaseConfig,

    pub labels: LabelConfig,
}

impl Config {
    /// Parses and validates YAML
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Failed to load config: {}", path.display()))
    }

    /// Finds `.gh-pmu.yml` in `start` or a parent directory
    pub fn discover(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();

        loop {
            let candidate = current.join(CONFIG_FILE);
            if candidate.is_file() {
                return Some(candidate);
            }

            if !current.pop() {
                return None;
            }
        }
    }

    /// Discovers and loads configuration starting at `start`
    pub fn load_from_dir(start: &Path) -> Result<Self> {
        let path =
            Self::discover(start).ok_or_else(|| ConfigError::NotFound(start.to_path_buf()))?;
        Self::load(&path)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.project.owner.trim().is_empty() {
            return Err(ConfigError::Invalid("project.owner is required".to_string()));
        }
        if self.project.number == 0 {
            return Err(ConfigError::Invalid("project.number is required".to_string()));
        }
        for repo in &self.repositories {
            RepoName::parse(repo).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    /// Configured repositories
    pub fn repositories(&self) -> Vec<RepoName> {
        self.repositories
            .iter()
            .filter_map(|r| RepoName::parse(r).ok())
            .collect()
    }

    /// Repository used for bare issue numbers
    pub fn default_repo(&self) -> Option<RepoName> {
        self.repositories().into_iter().next()
    }

    pub fn is_idpf(&self) -> bool {
        self.framework == Framework::Idpf
    }

    pub fn status_field(&self) -> &str {
        &self.fields.status.field
    }

    pub fn priority_field(&self) -> &str {
        &self.fields.priority.field
    }

    pub fn branch_field(&self) -> &str {
        &self.fields.branch.field
    }

    /// Option name the board uses for a status
    pub fn status_option(&self, status: Status) -> String {
        self.fields
            .status
            .values
            .get(status.key())
            .cloned()
            .unwrap_or_else(|| default_status_name(status).to_string())
    }

    /// Option name the board uses for a priority
    pub fn priority_option(&self, priority: Priority) -> String {
        self.fields
            .priority
            .values
            .get(priority.key())
            .cloned()
            .unwrap_or_else(|| default_priority_name(priority).to_string())
    }

    /// Maps a board option name back to its status
    pub fn status_tag(&self, option_name: &str) -> Option<Status> {
        let option_name = option_name.trim();
        if option_name.is_empty() {
            return None;
        }

        Status::ALL
            .iter()
            .copied()
            .find(|s| self.status_option(*s).eq_ignore_ascii_case(option_name))
            .or_else(|| option_name.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
project:
  owner: acme
  number: 3
repositories:
  - acme/widgets
  - acme/tools
framework: idpf
fields:
  status:
    field: Status
    values:
      backlog: Icebox
      in_progress: Doing
"#;

    #[test]
    fn parse_full_config() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.project.owner, "acme");
        assert_eq!(config.project.number, 3);
        assert!(config.is_idpf());
        assert_eq!(config.default_repo(), Some(RepoName::new("acme", "widgets")));
        assert_eq!(config.repositories().len(), 2);
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = Config::from_yaml("project: {owner: acme, number: 1}").unwrap();
        assert!(!config.is_idpf());
        assert_eq!(config.branch_field(), "Release");
        assert_eq!(config.priority_field(), "Priority");
        assert_eq!(config.status_option(Status::InReview), "In review");
        assert_eq!(config.priority_option(Priority::P1), "P1");
        assert_eq!(config.releases.title_prefix, "Release: ");
        assert_eq!(config.labels.assigned, "assigned");
    }

    #[test]
    fn aliases_resolve_both_ways() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.status_option(Status::Backlog), "Icebox");
        assert_eq!(config.status_option(Status::InProgress), "Doing");
        // Not in the custom map, falls back to the default name
        assert_eq!(config.status_option(Status::Done), "Done");

        assert_eq!(config.status_tag("icebox"), Some(Status::Backlog));
        assert_eq!(config.status_tag("Doing"), Some(Status::InProgress));
        assert_eq!(config.status_tag("Done"), Some(Status::Done));
        assert_eq!(config.status_tag(""), None);
        assert_eq!(config.status_tag("Blocked"), None);
    }

    #[test]
    fn framework_accepts_uppercase() {
        let config = Config::from_yaml("project: {owner: a, number: 1}\nframework: IDPF").unwrap();
        assert!(config.is_idpf());
    }

    #[test]
    fn missing_project_is_invalid() {
        assert!(matches!(
            Config::from_yaml("repositories: [acme/widgets]"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn bad_repository_is_invalid() {
        let err = Config::from_yaml("project: {owner: a, number: 1}\nrepositories: [widgets]")
            .unwrap_err();
        assert!(err.to_string().contains("owner/repo"));
    }

    #[test]
    fn discover_walks_up() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), SAMPLE).unwrap();
        let nested = dir.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        let found = Config::discover(&nested).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE));

        let config = Config::load_from_dir(&nested).unwrap();
        assert_eq!(config.project.number, 3);
    }

    #[test]
    fn discover_without_config() {
        let dir = TempDir::new().unwrap();
        assert!(Config::discover(dir.path()).is_none());
        assert!(Config::load_from_dir(dir.path()).is_err());
    }
}

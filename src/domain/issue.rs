//! Issue references
//!
//! Accepted forms:
//! - `42` or `#42` (resolved against a default repository)
//! - `owner/repo#42`
//! - `https://github.com/owner/repo/issues/42`

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static REPO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)$").expect("valid regex"));

static QUALIFIED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)#(\d+)$").expect("valid regex")
});

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://github\.com/([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+)/(?:issues|pull)/(\d+)/?$")
        .expect("valid regex")
});

#[derive(Debug, Error, PartialEq)]
pub enum IssueRefError {
    #[error("Invalid repository format '{0}': expected 'owner/repo'")]
    InvalidRepoFormat(String),

    #[error("Invalid issue reference '{0}': expected a number, 'owner/repo#N' or an issue URL")]
    InvalidReference(String),

    #[error("Issue #{0} needs a repository: pass --repo or configure one in .gh-pmu.yml")]
    MissingRepository(u64),
}

/// An `owner/repo` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoName {
    pub owner: String,
    pub repo: String,
}

impl RepoName {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }

    /// Parses `owner/repo`
    pub fn parse(s: &str) -> Result<Self, IssueRefError> {
        let caps = REPO_RE
            .captures(s.trim())
            .ok_or_else(|| IssueRefError::InvalidRepoFormat(s.to_string()))?;
        Ok(Self::new(&caps[1], &caps[2]))
    }

    /// Case-insensitive comparison, matching how GitHub treats names
    pub fn matches(&self, owner: &str, repo: &str) -> bool {
        self.owner.eq_ignore_ascii_case(owner) && self.repo.eq_ignore_ascii_case(repo)
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// Identifies an issue independently of any project-internal IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IssueRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl IssueRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }

    /// Parses a reference, using `default_repo` for bare numbers
    pub fn parse(input: &str, default_repo: Option<&RepoName>) -> Result<Self, IssueRefError> {
        let s = input.trim();

        if let Some(caps) = QUALIFIED_RE.captures(s).or_else(|| URL_RE.captures(s)) {
            let number = caps[3]
                .parse()
                .map_err(|_| IssueRefError::InvalidReference(input.to_string()))?;
            return Ok(Self::new(&caps[1], &caps[2], number));
        }

        let digits = s.strip_prefix('#').unwrap_or(s);
        let number: u64 = digits
            .parse()
            .map_err(|_| IssueRefError::InvalidReference(input.to_string()))?;

        match default_repo {
            Some(repo) => Ok(Self::new(&repo.owner, &repo.repo, number)),
            None => Err(IssueRefError::MissingRepository(number)),
        }
    }

    pub fn repo_name(&self) -> RepoName {
        RepoName::new(&self.owner, &self.repo)
    }

    /// True when both refs point at the same issue, ignoring name case
    pub fn same_issue(&self, other: &IssueRef) -> bool {
        self.number == other.number && self.repo_name().matches(&other.owner, &other.repo)
    }

    /// Lowercased key for map lookups
    pub fn key(&self) -> (String, String, u64) {
        (
            self.owner.to_ascii_lowercase(),
            self.repo.to_ascii_lowercase(),
            self.number,
        )
    }
}

/// Groups refs by repository, keeping first-seen order of both repos and numbers
pub fn group_by_repo(refs: &[IssueRef]) -> Vec<(RepoName, Vec<u64>)> {
    let mut groups: Vec<(RepoName, Vec<u64>)> = Vec::new();
    for r in refs {
        match groups
            .iter_mut()
            .find(|(repo, _)| repo.matches(&r.owner, &r.repo))
        {
            Some((_, numbers)) => numbers.push(r.number),
            None => groups.push((r.repo_name(), vec![r.number])),
        }
    }
    groups
}

impl fmt::Display for IssueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

//! Canonical workflow tags
//!
//! Raw strings from the command line are turned into these tags once.
//! Mapping a tag to the option name a project actually uses is the job
//! of the configuration layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TagError {
    #[error("Unknown status '{0}': expected one of backlog, ready, in_progress, in_review, done")]
    UnknownStatus(String),

    #[error("Unknown priority '{0}': expected one of p0, p1, p2")]
    UnknownPriority(String),
}

/// Board status of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Backlog,
    Ready,
    InProgress,
    InReview,
    Done,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Backlog,
        Status::Ready,
        Status::InProgress,
        Status::InReview,
        Status::Done,
    ];

    /// Config key for this status
    pub fn key(&self) -> &'static str {
        match self {
            Status::Backlog => "backlog",
            Status::Ready => "ready",
            Status::InProgress => "in_progress",
            Status::InReview => "in_review",
            Status::Done => "done",
        }
    }

    /// Statuses that require a finished body and checklist
    pub fn requires_completion(&self) -> bool {
        matches!(self, Status::InReview | Status::Done)
    }

    pub fn is_backlog(&self) -> bool {
        matches!(self, Status::Backlog)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Normalizes `In Progress`, `in-progress` and `inprogress` to one form
fn normalize(s: &str) -> String {
    s.trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .collect()
}

impl FromStr for Status {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "backlog" => Ok(Status::Backlog),
            "ready" | "todo" => Ok(Status::Ready),
            "inprogress" => Ok(Status::InProgress),
            "inreview" | "review" => Ok(Status::InReview),
            "done" => Ok(Status::Done),
            _ => Err(TagError::UnknownStatus(s.to_string())),
        }
    }
}

/// Item priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    P0,
    P1,
    P2,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::P0, Priority::P1, Priority::P2];

    pub fn key(&self) -> &'static str {
        match self {
            Priority::P0 => "p0",
            Priority::P1 => "p1",
            Priority::P2 => "p2",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Priority {
    type Err = TagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "p0" => Ok(Priority::P0),
            "p1" => Ok(Priority::P1),
            "p2" => Ok(Priority::P2),
            _ => Err(TagError::UnknownPriority(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_common_spellings() {
        assert_eq!("in_progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("In Progress".parse::<Status>().unwrap(), Status::InProgress);
        assert_eq!("in-review".parse::<Status>().unwrap(), Status::InReview);
        assert_eq!("DONE".parse::<Status>().unwrap(), Status::Done);
    }

    #[test]
    fn unknown_status() {
        assert_eq!(
            "shipped".parse::<Status>(),
            Err(TagError::UnknownStatus("shipped".to_string()))
        );
    }

    #[test]
    fn completion_statuses() {
        let gated: Vec<_> = Status::ALL
            .iter()
            .filter(|s| s.requires_completion())
            .collect();
        assert_eq!(gated, vec![&Status::InReview, &Status::Done]);
    }

    #[test]
    fn priority_roundtrip_key() {
        for p in Priority::ALL {
            assert_eq!(p.key().parse::<Priority>().unwrap(), p);
        }
        assert!("p9".parse::<Priority>().is_err());
    }
}

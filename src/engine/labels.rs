//! Bookkeeping label kept in step with the release field
//!
//! Label writes happen after the field writes and can never fail a move.

use serde::Serialize;
use tracing::debug;

use crate::api::ProjectApi;
use crate::domain::ProjectItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelChange {
    /// The item was given a release
    Assign,
    /// The item went back to backlog
    Unassign,
}

pub struct LabelManager<'a> {
    api: &'a dyn ProjectApi,
    label: &'a str,
}

impl<'a> LabelManager<'a> {
    pub fn new(api: &'a dyn ProjectApi, label: &'a str) -> Self {
        Self { api, label }
    }

    /// Applies the label change, returning a warning instead of an error
    pub fn sync_labels(&self, item: &ProjectItem, change: LabelChange) -> Option<String> {
        let issue = item.issue_ref();
        let result = match change {
            LabelChange::Assign => self.api.add_label_to_issue(&issue, &item.issue_id, self.label),
            LabelChange::Unassign if !item.state.is_open() => return None,
            LabelChange::Unassign => {
                self.api
                    .remove_label_from_issue(&issue, &item.issue_id, self.label)
            }
        };

        match result {
            Ok(()) => None,
            Err(e) => {
                debug!(issue = %issue, label = self.label, error = %e, "label update failed");
                Some(format!(
                    "#{}: could not update label '{}': {}",
                    item.number, self.label, e
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiCall;
    use crate::domain::IssueState;
    use crate::engine::fixtures::{board, item, widgets};

    #[test]
    fn assign_adds_label() {
        let api = board().with_item(item(1, "Ready"));
        let manager = LabelManager::new(&api, "assigned");

        assert_eq!(manager.sync_labels(&item(1, "Ready"), LabelChange::Assign), None);
        assert_eq!(api.labels_for(&widgets(1)), vec!["assigned".to_string()]);
    }

    #[test]
    fn unassign_removes_label() {
        let api = board().with_item(item(1, "Ready"));
        let manager = LabelManager::new(&api, "assigned");

        manager.sync_labels(&item(1, "Ready"), LabelChange::Assign);
        manager.sync_labels(&item(1, "Ready"), LabelChange::Unassign);
        assert!(api.labels_for(&widgets(1)).is_empty());
    }

    #[test]
    fn closed_items_are_skipped_on_unassign() {
        let api = board();
        let manager = LabelManager::new(&api, "assigned");
        let mut closed = item(1, "Done");
        closed.state = IssueState::Closed;

        assert_eq!(manager.sync_labels(&closed, LabelChange::Unassign), None);
        assert_eq!(api.count(|c| matches!(c, ApiCall::RemoveLabel { .. })), 0);
    }

    #[test]
    fn failures_become_warnings() {
        let api = board().fail_labels();
        let manager = LabelManager::new(&api, "assigned");

        let warning = manager
            .sync_labels(&item(4, "Ready"), LabelChange::Assign)
            .unwrap();
        assert!(warning.starts_with("#4: could not update label 'assigned'"));
    }
}

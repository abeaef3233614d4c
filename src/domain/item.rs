//! Project items and the changes applied to them

use serde::{Deserialize, Serialize};

use super::issue::IssueRef;

/// Open/closed state of the underlying issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
}

impl IssueState {
    pub fn is_open(&self) -> bool {
        matches!(self, IssueState::Open)
    }

    /// Parses GitHub's `OPEN`/`CLOSED`
    pub fn from_github(s: &str) -> Self {
        if s.eq_ignore_ascii_case("closed") {
            IssueState::Closed
        } else {
            IssueState::Open
        }
    }
}

/// One `{field, value}` pair as read from the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field: String,
    pub value: String,
}

impl FieldValue {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Ordered field values; lookups ignore field-name case
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValues(Vec<FieldValue>);

impl FieldValues {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|f| f.field.eq_ignore_ascii_case(field))
            .map(|f| f.value.as_str())
    }

    /// Sets a value in place, appending when the field is new. Empty clears.
    pub fn set(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.0.retain(|f| !f.field.eq_ignore_ascii_case(field));
            return;
        }
        match self.0.iter_mut().find(|f| f.field.eq_ignore_ascii_case(field)) {
            Some(existing) => existing.value = value.to_string(),
            None => self.0.push(FieldValue::new(field, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldValue> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<FieldValue> for FieldValues {
    fn from_iter<I: IntoIterator<Item = FieldValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A row on the project board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectItem {
    /// Project-internal item ID
    pub item_id: String,

    /// Node ID of the underlying issue
    pub issue_id: String,

    pub owner: String,
    pub repo: String,
    pub number: u64,
    pub title: String,
    pub state: IssueState,

    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "FieldValues::is_empty")]
    pub fields: FieldValues,
}

impl ProjectItem {
    pub fn issue_ref(&self) -> IssueRef {
        IssueRef::new(&self.owner, &self.repo, self.number)
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }
}

/// A node discovered while walking an item's sub-issues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub issue: IssueRef,

    /// 1 for a direct child of the root
    pub depth: usize,

    /// None when the issue is not on the board
    pub item_id: Option<String>,

    pub title: String,
    pub state: IssueState,

    #[serde(default)]
    pub body: String,

    #[serde(default, skip_serializing_if = "FieldValues::is_empty")]
    pub fields: FieldValues,
}

impl HierarchyNode {
    pub fn is_tracked(&self) -> bool {
        self.item_id.is_some()
    }
}

/// One atomic field change. An empty value clears the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldUpdate {
    pub item_id: String,

    /// Issue number, for reporting
    pub number: u64,

    pub field: String,
    pub value: String,
}

impl FieldUpdate {
    pub fn new(
        item_id: impl Into<String>,
        number: u64,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            number,
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn is_clear(&self) -> bool {
        self.value.is_empty()
    }
}

/// All updates for one item, at most one per field
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PendingChange {
    updates: Vec<FieldUpdate>,
}

impl PendingChange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an update, replacing an earlier one for the same field
    pub fn set(&mut self, update: FieldUpdate) {
        match self
            .updates
            .iter_mut()
            .find(|u| u.field.eq_ignore_ascii_case(&update.field))
        {
            Some(existing) => *existing = update,
            None => self.updates.push(update),
        }
    }

    pub fn updates(&self) -> &[FieldUpdate] {
        &self.updates
    }

    pub fn into_updates(self) -> Vec<FieldUpdate> {
        self.updates
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }
}

/// Outcome of one update inside a batch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUpdateResult {
    pub item_id: String,
    pub field: String,
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchUpdateResult {
    pub fn ok(item_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            field: field.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(
        item_id: impl Into<String>,
        field: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            field: field.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_values_lookup_ignores_case() {
        let fields: FieldValues = vec![FieldValue::new("Status", "Ready")].into_iter().collect();
        assert_eq!(fields.get("status"), Some("Ready"));
        assert_eq!(fields.get("Priority"), None);
    }

    #[test]
    fn field_values_set_and_clear() {
        let mut fields = FieldValues::new();
        fields.set("Status", "Ready");
        fields.set("status", "Done");
        assert_eq!(fields.iter().count(), 1);
        assert_eq!(fields.get("Status"), Some("Done"));

        fields.set("Status", "");
        assert!(fields.is_empty());
    }

    #[test]
    fn pending_change_keeps_one_update_per_field() {
        let mut change = PendingChange::new();
        change.set(FieldUpdate::new("I1", 1, "Status", "Ready"));
        change.set(FieldUpdate::new("I1", 1, "Priority", "P1"));
        change.set(FieldUpdate::new("I1", 1, "status", "Done"));

        let updates = change.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].value, "Done");
    }

    #[test]
    fn issue_state_from_github() {
        assert_eq!(IssueState::from_github("CLOSED"), IssueState::Closed);
        assert_eq!(IssueState::from_github("OPEN"), IssueState::Open);
        assert!(IssueState::Open.is_open());
    }
}

//! Shared board fixtures for engine tests

use crate::api::{FieldDataType, FieldOption, FieldSchema, MemoryApi, Project, SubIssue};
use crate::domain::{FieldValue, FieldValues, IssueRef, IssueState, ProjectItem};

pub fn project() -> Project {
    Project {
        id: "P1".to_string(),
        owner: "acme".to_string(),
        number: 3,
        title: "Roadmap".to_string(),
    }
}

fn select(id: &str, name: &str, options: &[&str]) -> FieldSchema {
    FieldSchema {
        id: id.to_string(),
        name: name.to_string(),
        data_type: FieldDataType::SingleSelect,
        options: options
            .iter()
            .map(|o| FieldOption {
                id: format!("{}-{}", id, o.to_lowercase().replace(' ', "-")),
                name: o.to_string(),
            })
            .collect(),
    }
}

/// Board with Status, Priority and Release fields and no items
pub fn board() -> MemoryApi {
    MemoryApi::new(project())
        .with_field(select(
            "F-status",
            "Status",
            &["Backlog", "Ready", "In progress", "In review", "Done"],
        ))
        .with_field(select("F-priority", "Priority", &["P0", "P1", "P2"]))
        .with_field(FieldSchema {
            id: "F-release".to_string(),
            name: "Release".to_string(),
            data_type: FieldDataType::Text,
            options: vec![],
        })
}

pub fn widgets(number: u64) -> IssueRef {
    IssueRef::new("acme", "widgets", number)
}

/// Open item in acme/widgets with the given status (empty for none)
pub fn item(number: u64, status: &str) -> ProjectItem {
    let fields: FieldValues = if status.is_empty() {
        FieldValues::new()
    } else {
        vec![FieldValue::new("Status", status)].into_iter().collect()
    };

    ProjectItem {
        item_id: format!("I{}", number),
        issue_id: format!("N{}", number),
        owner: "acme".to_string(),
        repo: "widgets".to_string(),
        number,
        title: format!("Issue {}", number),
        state: IssueState::Open,
        body: String::new(),
        fields,
    }
}

/// Child in the parent's repository
pub fn sub(number: u64) -> SubIssue {
    SubIssue {
        number,
        title: format!("Issue {}", number),
        state: IssueState::Open,
        owner: String::new(),
        repo: String::new(),
    }
}

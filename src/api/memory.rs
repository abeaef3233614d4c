//! In-memory tracker
//!
//! Holds a single board. Every call is logged so callers can assert on
//! round trips, and individual operations can be made to fail.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::{BatchUpdateResult, IssueRef, ProjectItem};

use super::{
    ApiError, ApiResult, FieldSchema, Issue, ItemFilter, Project, ProjectApi, ResolvedUpdate,
    SubIssue,
};

type IssueKey = (String, String, u64);

fn key(owner: &str, repo: &str, number: u64) -> IssueKey {
    IssueRef::new(owner, repo, number).key()
}

/// A recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    GetIssue(IssueRef),
    GetProject,
    GetProjectFields,
    GetProjectItems,
    GetProjectItemsByIssues(usize),
    GetSubIssuesBatch {
        owner: String,
        repo: String,
        numbers: Vec<u64>,
    },
    SetProjectItemField {
        item_id: String,
        field: String,
    },
    BatchUpdate(usize),
    GetOpenIssuesByLabel(String),
    AddLabel {
        number: u64,
        label: String,
    },
    RemoveLabel {
        number: u64,
        label: String,
    },
}

#[derive(Debug, Default)]
struct Failures {
    schema: bool,
    targeted_fetch: bool,
    full_fetch: bool,
    batch: bool,
    short_batch: bool,
    labels: bool,
    sub_issue_repos: HashSet<(String, String)>,
    items: HashSet<String>,
}

/// A board held in memory
#[derive(Debug)]
pub struct MemoryApi {
    project: Project,
    fields: Vec<FieldSchema>,
    items: RefCell<Vec<ProjectItem>>,
    issues: Vec<Issue>,
    children: HashMap<IssueKey, Vec<SubIssue>>,
    labels: RefCell<HashMap<IssueKey, BTreeSet<String>>>,
    calls: RefCell<Vec<ApiCall>>,
    failures: Failures,
}

impl MemoryApi {
    pub fn new(project: Project) -> Self {
        Self {
            project,
            fields: Vec::new(),
            items: RefCell::new(Vec::new()),
            issues: Vec::new(),
            children: HashMap::new(),
            labels: RefCell::new(HashMap::new()),
            calls: RefCell::new(Vec::new()),
            failures: Failures::default(),
        }
    }

    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_item(self, item: ProjectItem) -> Self {
        self.items.borrow_mut().push(item);
        self
    }

    /// Adds an issue that is not necessarily on the board
    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    pub fn with_children(mut self, parent: &IssueRef, children: Vec<SubIssue>) -> Self {
        self.children
            .entry(parent.key())
            .or_default()
            .extend(children);
        self
    }

    pub fn fail_schema(mut self) -> Self {
        self.failures.schema = true;
        self
    }

    pub fn fail_targeted_fetch(mut self) -> Self {
        self.failures.targeted_fetch = true;
        self
    }

    pub fn fail_full_fetch(mut self) -> Self {
        self.failures.full_fetch = true;
        self
    }

    /// Makes the whole batch call error out
    pub fn fail_batch(mut self) -> Self {
        self.failures.batch = true;
        self
    }

    /// Makes the batch call drop its last result
    pub fn short_batch_results(mut self) -> Self {
        self.failures.short_batch = true;
        self
    }

    pub fn fail_labels(mut self) -> Self {
        self.failures.labels = true;
        self
    }

    pub fn fail_sub_issues(mut self, owner: &str, repo: &str) -> Self {
        self.failures
            .sub_issue_repos
            .insert((owner.to_ascii_lowercase(), repo.to_ascii_lowercase()));
        self
    }

    /// Makes every update to this item fail, batched or single
    pub fn fail_item(mut self, item_id: &str) -> Self {
        self.failures.items.insert(item_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    /// Number of calls that write field values
    pub fn mutation_calls(&self) -> usize {
        self.count(|c| {
            matches!(
                c,
                ApiCall::SetProjectItemField { .. } | ApiCall::BatchUpdate(_)
            )
        })
    }

    pub fn item(&self, item_id: &str) -> Option<ProjectItem> {
        self.items
            .borrow()
            .iter()
            .find(|i| i.item_id == item_id)
            .cloned()
    }

    pub fn labels_for(&self, issue: &IssueRef) -> Vec<String> {
        self.labels
            .borrow()
            .get(&issue.key())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, call: ApiCall) {
        self.calls.borrow_mut().push(call);
    }

    fn apply(&self, update: &ResolvedUpdate) -> ApiResult<()> {
        if self.failures.items.contains(&update.item_id) {
            return Err(ApiError::Graphql(format!(
                "item {} is locked",
                update.item_id
            )));
        }

        let mut items = self.items.borrow_mut();
        let item = items
            .iter_mut()
            .find(|i| i.item_id == update.item_id)
            .ok_or_else(|| ApiError::NotFound(format!("item {}", update.item_id)))?;
        item.fields.set(&update.field_name, update.value.display());
        Ok(())
    }
}

impl ProjectApi for MemoryApi {
    fn get_issue(&self, issue: &IssueRef) -> ApiResult<Issue> {
        self.record(ApiCall::GetIssue(issue.clone()));

        if let Some(item) = self
            .items
            .borrow()
            .iter()
            .find(|i| i.issue_ref().same_issue(issue))
        {
            return Ok(Issue {
                id: item.issue_id.clone(),
                owner: item.owner.clone(),
                repo: item.repo.clone(),
                number: item.number,
                title: item.title.clone(),
                body: item.body.clone(),
                state: item.state,
                labels: self.labels_for(issue),
            });
        }

        self.issues
            .iter()
            .find(|i| i.issue_ref().same_issue(issue))
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("issue {}", issue)))
    }

    fn get_project(&self, owner: &str, number: u64) -> ApiResult<Project> {
        self.record(ApiCall::GetProject);

        if self.project.owner.eq_ignore_ascii_case(owner) && self.project.number == number {
            Ok(self.project.clone())
        } else {
            Err(ApiError::NotFound(format!("project {}/{}", owner, number)))
        }
    }

    fn get_project_fields(&self, _project_id: &str) -> ApiResult<Vec<FieldSchema>> {
        self.record(ApiCall::GetProjectFields);

        if self.failures.schema {
            return Err(ApiError::Command("HTTP 502 from api.github.com".to_string()));
        }
        Ok(self.fields.clone())
    }

    fn get_project_items(
        &self,
        _project_id: &str,
        filter: &ItemFilter,
    ) -> ApiResult<Vec<ProjectItem>> {
        self.record(ApiCall::GetProjectItems);

        if self.failures.full_fetch {
            return Err(ApiError::Command("HTTP 502 from api.github.com".to_string()));
        }

        let items = self.items.borrow();
        let matching = items.iter().filter(|i| match &filter.repository {
            Some(repo) => repo.matches(&i.owner, &i.repo),
            None => true,
        });

        Ok(match filter.limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    fn get_project_items_by_issues(
        &self,
        _project_id: &str,
        refs: &[IssueRef],
    ) -> ApiResult<Vec<ProjectItem>> {
        self.record(ApiCall::GetProjectItemsByIssues(refs.len()));

        if self.failures.targeted_fetch {
            return Err(ApiError::Graphql(
                "Field 'projectItems' doesn't exist on type 'Issue'".to_string(),
            ));
        }

        Ok(self
            .items
            .borrow()
            .iter()
            .filter(|i| refs.iter().any(|r| r.same_issue(&i.issue_ref())))
            .cloned()
            .collect())
    }

    fn get_sub_issues_batch(
        &self,
        owner: &str,
        repo: &str,
        numbers: &[u64],
    ) -> ApiResult<HashMap<u64, Vec<SubIssue>>> {
        self.record(ApiCall::GetSubIssuesBatch {
            owner: owner.to_string(),
            repo: repo.to_string(),
            numbers: numbers.to_vec(),
        });

        if self
            .failures
            .sub_issue_repos
            .contains(&(owner.to_ascii_lowercase(), repo.to_ascii_lowercase()))
        {
            return Err(ApiError::Command(format!(
                "sub-issue query for {}/{} timed out",
                owner, repo
            )));
        }

        Ok(numbers
            .iter()
            .map(|n| {
                let children = self
                    .children
                    .get(&key(owner, repo, *n))
                    .cloned()
                    .unwrap_or_default();
                (*n, children)
            })
            .collect())
    }

    fn set_project_item_field(&self, _project_id: &str, update: &ResolvedUpdate) -> ApiResult<()> {
        self.record(ApiCall::SetProjectItemField {
            item_id: update.item_id.clone(),
            field: update.field_name.clone(),
        });
        self.apply(update)
    }

    fn batch_update_project_item_fields(
        &self,
        _project_id: &str,
        updates: &[ResolvedUpdate],
    ) -> ApiResult<Vec<BatchUpdateResult>> {
        self.record(ApiCall::BatchUpdate(updates.len()));

        if self.failures.batch {
            return Err(ApiError::Command("connection reset by peer".to_string()));
        }

        let mut results: Vec<_> = updates
            .iter()
            .map(|u| match self.apply(u) {
                Ok(()) => BatchUpdateResult::ok(&u.item_id, &u.field_name),
                Err(e) => BatchUpdateResult::failed(&u.item_id, &u.field_name, e.to_string()),
            })
            .collect();

        if self.failures.short_batch {
            results.pop();
        }

        Ok(results)
    }

    fn get_open_issues_by_label(
        &self,
        owner: &str,
        repo: &str,
        label: &str,
    ) -> ApiResult<Vec<Issue>> {
        self.record(ApiCall::GetOpenIssuesByLabel(label.to_string()));

        Ok(self
            .issues
            .iter()
            .filter(|i| {
                i.state.is_open()
                    && i.owner.eq_ignore_ascii_case(owner)
                    && i.repo.eq_ignore_ascii_case(repo)
                    && i.labels.iter().any(|l| l.eq_ignore_ascii_case(label))
            })
            .cloned()
            .collect())
    }

    fn add_label_to_issue(&self, issue: &IssueRef, _issue_id: &str, label: &str) -> ApiResult<()> {
        self.record(ApiCall::AddLabel {
            number: issue.number,
            label: label.to_string(),
        });

        if self.failures.labels {
            return Err(ApiError::Command("label service unavailable".to_string()));
        }

        self.labels
            .borrow_mut()
            .entry(issue.key())
            .or_default()
            .insert(label.to_string());
        Ok(())
    }

    fn remove_label_from_issue(
        &self,
        issue: &IssueRef,
        _issue_id: &str,
        label: &str,
    ) -> ApiResult<()> {
        self.record(ApiCall::RemoveLabel {
            number: issue.number,
            label: label.to_string(),
        });

        if self.failures.labels {
            return Err(ApiError::Command("label service unavailable".to_string()));
        }

        if let Some(set) = self.labels.borrow_mut().get_mut(&issue.key()) {
            set.remove(label);
        }
        Ok(())
    }
}

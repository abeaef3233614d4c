//! GitHub transport through the `gh` CLI
//!
//! GraphQL documents go to `gh api graphql --input -` as a JSON body on
//! stdin; label changes use the REST endpoints. `gh` owns authentication
//! and host selection.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::{
    group_by_repo, BatchUpdateResult, FieldValue, FieldValues, IssueRef, IssueState, ProjectItem,
};

use super::{
    ApiError, ApiResult, FieldDataType, FieldOption, FieldSchema, Issue, ItemFilter, Project,
    ProjectApi, ResolvedUpdate, SubIssue, UpdateValue,
};

/// Aliased mutations per GraphQL document
const BATCH_CEILING: usize = 50;

/// Items per page for full fetches
const PAGE_SIZE: usize = 100;

const ITEM_FIELDS: &str = r#"
    fieldValues(first: 20) {
      nodes {
        ... on ProjectV2ItemFieldSingleSelectValue { name field { ... on ProjectV2FieldCommon { name } } }
        ... on ProjectV2ItemFieldTextValue { text field { ... on ProjectV2FieldCommon { name } } }
      }
    }"#;

const ISSUE_FIELDS: &str = "id number title body state repository { name owner { login } }";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    path: Vec<Value>,
}

impl GraphqlError {
    fn is_not_found(&self) -> bool {
        self.kind.as_deref() == Some("NOT_FOUND")
    }

    fn alias(&self) -> Option<&str> {
        self.path.first().and_then(Value::as_str)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<Option<T>>,
    #[serde(default)]
    page_info: Option<PageInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwnerNode {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RepoNode {
    name: String,
    owner: OwnerNode,
}

#[derive(Debug, Deserialize)]
struct IssueNode {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    repository: Option<RepoNode>,
}

#[derive(Debug, Deserialize)]
struct FieldValueNode {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    field: Option<Named>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemNode {
    id: String,
    #[serde(default)]
    content: Option<IssueNode>,
    #[serde(default)]
    field_values: Option<Connection<FieldValueNode>>,
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueProjectItem {
    id: String,
    project: ProjectRef,
    #[serde(default)]
    field_values: Option<Connection<FieldValueNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetedIssueNode {
    #[serde(flatten)]
    issue: IssueNode,
    project_items: Connection<IssueProjectItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldNode {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    options: Vec<FieldOption>,
}

#[derive(Debug, Deserialize)]
struct LabeledIssueNode {
    id: String,
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    labels: Connection<Named>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubIssueParent {
    sub_issues: Connection<IssueNode>,
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> ApiResult<T> {
    serde_json::from_value(value).map_err(|e| ApiError::Parse(format!("{}: {}", what, e)))
}

/// Walks a JSON path, failing with `NotFound` on null
fn pointer(data: &Value, path: &str, what: &str) -> ApiResult<Value> {
    match data.pointer(path) {
        Some(Value::Null) | None => Err(ApiError::NotFound(what.to_string())),
        Some(v) => Ok(v.clone()),
    }
}

fn quote(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Percent-encodes a REST path segment
fn encode_segment(s: &str) -> String {
    s.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}

fn field_values(conn: Option<Connection<FieldValueNode>>) -> FieldValues {
    conn.map(|c| c.nodes)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter_map(|node| {
            let field = node.field.and_then(|f| f.name)?;
            let value = node.name.or(node.text)?;
            Some(FieldValue::new(field, value))
        })
        .collect()
}

fn to_project_item(
    item_id: String,
    issue: IssueNode,
    fields: Option<Connection<FieldValueNode>>,
) -> Option<ProjectItem> {
    let repository = issue.repository?;
    Some(ProjectItem {
        item_id,
        issue_id: issue.id?,
        owner: repository.owner.login,
        repo: repository.name,
        number: issue.number?,
        title: issue.title.unwrap_or_default(),
        state: IssueState::from_github(issue.state.as_deref().unwrap_or("OPEN")),
        body: issue.body.unwrap_or_default(),
        fields: field_values(fields),
    })
}

/// Client for the GitHub API via `gh`
#[derive(Debug, Clone)]
pub struct GhClient {
    program: PathBuf,
}

impl GhClient {
    /// Uses `gh` from PATH
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("gh"),
        }
    }

    /// Uses a specific `gh` executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Runs `gh api` with the given args, optionally feeding stdin
    fn run(&self, args: &[&str], stdin: Option<&str>) -> ApiResult<(bool, String, String)> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ApiError::Command(format!(
                    "failed to spawn {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if let Some(input) = stdin {
            let mut pipe = child
                .stdin
                .take()
                .ok_or_else(|| ApiError::Command("stdin not available".to_string()))?;
            pipe.write_all(input.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ))
    }

    /// Sends a GraphQL document and returns the raw response
    fn graphql(&self, query: &str, variables: Value) -> ApiResult<GraphqlResponse> {
        let body = json!({ "query": query, "variables": variables }).to_string();
        debug!(bytes = body.len(), "graphql request");

        let (ok, stdout, stderr) = self.run(&["api", "graphql", "--input", "-"], Some(&body))?;

        // gh exits non-zero on GraphQL errors but still prints the body
        match serde_json::from_str::<GraphqlResponse>(&stdout) {
            Ok(response) => Ok(response),
            Err(_) if !ok => Err(ApiError::Command(stderr)),
            Err(e) => Err(ApiError::Parse(e.to_string())),
        }
    }

    /// Sends a query and fails on any error
    fn query(&self, query: &str, variables: Value) -> ApiResult<Value> {
        let response = self.graphql(query, variables)?;
        if let Some(err) = response.errors.first() {
            return Err(if err.is_not_found() {
                ApiError::NotFound(err.message.clone())
            } else {
                ApiError::Graphql(err.message.clone())
            });
        }
        response
            .data
            .ok_or_else(|| ApiError::Parse("response has no data".to_string()))
    }

    /// Sends a query, tolerating NOT_FOUND errors for missing aliases
    fn query_partial(&self, query: &str) -> ApiResult<Value> {
        let response = self.graphql(query, json!({}))?;
        if let Some(err) = response.errors.iter().find(|e| !e.is_not_found()) {
            return Err(ApiError::Graphql(err.message.clone()));
        }
        response
            .data
            .ok_or_else(|| ApiError::Parse("response has no data".to_string()))
    }

    fn rest(&self, method: &str, path: &str, fields: &[String]) -> ApiResult<()> {
        let mut args = vec!["api", "--method", method, path];
        for f in fields {
            args.push("-f");
            args.push(f);
        }
        debug!(method, path, "rest request");

        let (ok, _stdout, stderr) = self.run(&args, None)?;
        if ok {
            Ok(())
        } else if stderr.contains("404") {
            Err(ApiError::NotFound(path.to_string()))
        } else {
            Err(ApiError::Command(stderr))
        }
    }

    fn project_for(&self, kind: &str, owner: &str, number: u64) -> ApiResult<Project> {
        let query = format!(
            "query($login: String!, $number: Int!) {{ {kind}(login: $login) {{ projectV2(number: $number) {{ id title number }} }} }}"
        );
        let data = self.query(&query, json!({ "login": owner, "number": number }))?;
        let node = pointer(
            &data,
            &format!("/{kind}/projectV2"),
            &format!("project {}/{}", owner, number),
        )?;

        #[derive(Deserialize)]
        struct ProjectNode {
            id: String,
            title: String,
            number: u64,
        }
        let node: ProjectNode = decode(node, "project")?;

        Ok(Project {
            id: node.id,
            owner: owner.to_string(),
            number: node.number,
            title: node.title,
        })
    }

    fn items_page(
        &self,
        project_id: &str,
        cursor: Option<&str>,
    ) -> ApiResult<Connection<ItemNode>> {
        let query = format!(
            "query($id: ID!, $cursor: String) {{ node(id: $id) {{ ... on ProjectV2 {{ items(first: {PAGE_SIZE}, after: $cursor) {{ pageInfo {{ hasNextPage endCursor }} nodes {{ id content {{ ... on Issue {{ {ISSUE_FIELDS} }} }} {ITEM_FIELDS} }} }} }} }} }}"
        );
        let data = self.query(&query, json!({ "id": project_id, "cursor": cursor }))?;
        decode(pointer(&data, "/node/items", "project items")?, "project items")
    }

    fn send_batch(
        &self,
        project_id: &str,
        chunk: &[ResolvedUpdate],
    ) -> ApiResult<Vec<BatchUpdateResult>> {
        let mut params = vec!["$project: ID!".to_string()];
        let mut body = Vec::new();
        let mut variables = serde_json::Map::new();
        variables.insert("project".to_string(), json!(project_id));

        for (i, update) in chunk.iter().enumerate() {
            params.push(format!("$i{i}: ID!, $f{i}: ID!"));
            variables.insert(format!("i{i}"), json!(update.item_id));
            variables.insert(format!("f{i}"), json!(update.field_id));

            match &update.value {
                UpdateValue::Clear => body.push(format!(
                    "u{i}: clearProjectV2ItemFieldValue(input: {{projectId: $project, itemId: $i{i}, fieldId: $f{i}}}) {{ projectV2Item {{ id }} }}"
                )),
                value => {
                    params.push(format!("$v{i}: ProjectV2FieldValue!"));
                    variables.insert(format!("v{i}"), field_value_input(value));
                    body.push(format!(
                        "u{i}: updateProjectV2ItemFieldValue(input: {{projectId: $project, itemId: $i{i}, fieldId: $f{i}, value: $v{i}}}) {{ projectV2Item {{ id }} }}"
                    ));
                }
            }
        }

        let document = format!("mutation({}) {{ {} }}", params.join(", "), body.join(" "));
        let response = self.graphql(&document, Value::Object(variables))?;

        let data = match response.data {
            Some(Value::Null) | None => {
                let message = response
                    .errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "empty response".to_string());
                return Err(ApiError::Graphql(message));
            }
            Some(data) => data,
        };

        Ok(chunk
            .iter()
            .enumerate()
            .map(|(i, update)| {
                let alias = format!("u{i}");
                let error = response
                    .errors
                    .iter()
                    .find(|e| e.alias() == Some(alias.as_str()));
                let landed = data.get(&alias).map(|v| !v.is_null()).unwrap_or(false);

                match (landed, error) {
                    (true, None) => BatchUpdateResult::ok(&update.item_id, &update.field_name),
                    (_, Some(e)) => {
                        BatchUpdateResult::failed(&update.item_id, &update.field_name, &e.message)
                    }
                    (false, None) => BatchUpdateResult::failed(
                        &update.item_id,
                        &update.field_name,
                        "no result returned",
                    ),
                }
            })
            .collect())
    }
}

impl Default for GhClient {
    fn default() -> Self {
        Self::new()
    }
}

fn field_value_input(value: &UpdateValue) -> Value {
    match value {
        UpdateValue::Text { text } => json!({ "text": text }),
        UpdateValue::SingleSelect { option_id, .. } => json!({ "singleSelectOptionId": option_id }),
        UpdateValue::Clear => Value::Null,
    }
}

impl ProjectApi for GhClient {
    fn get_issue(&self, issue: &IssueRef) -> ApiResult<Issue> {
        let query = "query($owner: String!, $repo: String!, $number: Int!) { repository(owner: $owner, name: $repo) { issue(number: $number) { id number title body state labels(first: 50) { nodes { name } } } } }";
        let data = self.query(
            query,
            json!({ "owner": issue.owner, "repo": issue.repo, "number": issue.number }),
        )?;
        let node: LabeledIssueNode = decode(
            pointer(&data, "/repository/issue", &format!("issue {}", issue))?,
            "issue",
        )?;

        Ok(Issue {
            id: node.id,
            owner: issue.owner.clone(),
            repo: issue.repo.clone(),
            number: node.number,
            title: node.title,
            body: node.body.unwrap_or_default(),
            state: IssueState::from_github(&node.state),
            labels: node.labels.nodes.into_iter().flatten().filter_map(|l| l.name).collect(),
        })
    }

    fn get_project(&self, owner: &str, number: u64) -> ApiResult<Project> {
        match self.project_for("organization", owner, number) {
            Ok(project) => Ok(project),
            Err(e) => {
                debug!(error = %e, "organization project lookup failed, trying user");
                self.project_for("user", owner, number)
            }
        }
    }

    fn get_project_fields(&self, project_id: &str) -> ApiResult<Vec<FieldSchema>> {
        let query = "query($id: ID!) { node(id: $id) { ... on ProjectV2 { fields(first: 100) { nodes { ... on ProjectV2FieldCommon { id name dataType } ... on ProjectV2SingleSelectField { options { id name } } } } } } }";
        let data = self.query(query, json!({ "id": project_id }))?;
        let fields: Connection<FieldNode> = decode(
            pointer(&data, "/node/fields", &format!("fields of {}", project_id))?,
            "project fields",
        )?;

        Ok(fields
            .nodes
            .into_iter()
            .flatten()
            .filter_map(|f| {
                Some(FieldSchema {
                    id: f.id?,
                    name: f.name?,
                    data_type: FieldDataType::from_github(f.data_type.as_deref().unwrap_or("")),
                    options: f.options,
                })
            })
            .collect())
    }

    fn get_project_items(
        &self,
        project_id: &str,
        filter: &ItemFilter,
    ) -> ApiResult<Vec<ProjectItem>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.items_page(project_id, cursor.as_deref())?;

            for node in page.nodes.into_iter().flatten() {
                let Some(content) = node.content else { continue };
                let Some(item) = to_project_item(node.id, content, node.field_values) else {
                    continue;
                };
                if let Some(repo) = &filter.repository {
                    if !repo.matches(&item.owner, &item.repo) {
                        continue;
                    }
                }
                items.push(item);
                if filter.limit.is_some_and(|limit| items.len() >= limit) {
                    return Ok(items);
                }
            }

            match page.page_info {
                Some(PageInfo {
                    has_next_page: true,
                    end_cursor: Some(next),
                }) => cursor = Some(next),
                _ => break,
            }
        }

        debug!(count = items.len(), "full fetch complete");
        Ok(items)
    }

    fn get_project_items_by_issues(
        &self,
        project_id: &str,
        refs: &[IssueRef],
    ) -> ApiResult<Vec<ProjectItem>> {
        let mut selections = Vec::new();
        for (r, (repo, numbers)) in group_by_repo(refs).into_iter().enumerate() {
            let issues: Vec<String> = numbers
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    format!(
                        "i{i}: issue(number: {n}) {{ {ISSUE_FIELDS} projectItems(first: 20) {{ nodes {{ id project {{ id }} {ITEM_FIELDS} }} }} }}"
                    )
                })
                .collect();
            selections.push(format!(
                "r{r}: repository(owner: {}, name: {}) {{ {} }}",
                quote(&repo.owner),
                quote(&repo.repo),
                issues.join(" ")
            ));
        }

        let data = self.query_partial(&format!("query {{ {} }}", selections.join(" ")))?;

        let mut items = Vec::new();
        for repo in data.as_object().into_iter().flat_map(|o| o.values()) {
            for issue in repo.as_object().into_iter().flat_map(|o| o.values()) {
                if issue.is_null() {
                    continue;
                }
                let node: TargetedIssueNode = decode(issue.clone(), "issue")?;
                let on_board = node
                    .project_items
                    .nodes
                    .into_iter()
                    .flatten()
                    .find(|pi| pi.project.id == project_id);
                if let Some(pi) = on_board {
                    if let Some(item) = to_project_item(pi.id, node.issue, pi.field_values) {
                        items.push(item);
                    }
                }
            }
        }

        debug!(requested = refs.len(), found = items.len(), "targeted fetch complete");
        Ok(items)
    }

    fn get_sub_issues_batch(
        &self,
        owner: &str,
        repo: &str,
        numbers: &[u64],
    ) -> ApiResult<HashMap<u64, Vec<SubIssue>>> {
        if numbers.is_empty() {
            return Ok(HashMap::new());
        }

        let issues: Vec<String> = numbers
            .iter()
            .enumerate()
            .map(|(i, n)| {
                format!(
                    "i{i}: issue(number: {n}) {{ subIssues(first: 50) {{ nodes {{ number title state repository {{ name owner {{ login }} }} }} }} }}"
                )
            })
            .collect();
        let query = format!(
            "query {{ repository(owner: {}, name: {}) {{ {} }} }}",
            quote(owner),
            quote(repo),
            issues.join(" ")
        );

        let data = self.query_partial(&query)?;
        let repository = pointer(&data, "/repository", &format!("{}/{}", owner, repo))?;

        let mut children = HashMap::new();
        for (i, number) in numbers.iter().enumerate() {
            let parent = match repository.get(format!("i{i}")) {
                Some(Value::Null) | None => continue,
                Some(v) => v.clone(),
            };
            let parent: SubIssueParent = decode(parent, "sub-issues")?;
            let subs = parent
                .sub_issues
                .nodes
                .into_iter()
                .flatten()
                .filter_map(|node| {
                    let (child_owner, child_repo) = node
                        .repository
                        .map(|r| (r.owner.login, r.name))
                        .unwrap_or_default();
                    Some(SubIssue {
                        number: node.number?,
                        title: node.title.unwrap_or_default(),
                        state: IssueState::from_github(node.state.as_deref().unwrap_or("OPEN")),
                        owner: child_owner,
                        repo: child_repo,
                    })
                })
                .collect();
            children.insert(*number, subs);
        }

        Ok(children)
    }

    fn set_project_item_field(&self, project_id: &str, update: &ResolvedUpdate) -> ApiResult<()> {
        let vars = json!({
            "project": project_id,
            "item": update.item_id,
            "field": update.field_id,
            "value": field_value_input(&update.value),
        });

        let query = match update.value {
            UpdateValue::Clear => "mutation($project: ID!, $item: ID!, $field: ID!) { clearProjectV2ItemFieldValue(input: {projectId: $project, itemId: $item, fieldId: $field}) { projectV2Item { id } } }",
            _ => "mutation($project: ID!, $item: ID!, $field: ID!, $value: ProjectV2FieldValue!) { updateProjectV2ItemFieldValue(input: {projectId: $project, itemId: $item, fieldId: $field, value: $value}) { projectV2Item { id } } }",
        };

        self.query(query, vars).map(|_| ())
    }

    fn batch_update_project_item_fields(
        &self,
        project_id: &str,
        updates: &[ResolvedUpdate],
    ) -> ApiResult<Vec<BatchUpdateResult>> {
        let mut results = Vec::with_capacity(updates.len());
        for chunk in updates.chunks(BATCH_CEILING) {
            debug!(size = chunk.len(), "sending mutation batch");
            results.extend(self.send_batch(project_id, chunk)?);
        }
        Ok(results)
    }

    fn get_open_issues_by_label(
        &self,
        owner: &str,
        repo: &str,
        label: &str,
    ) -> ApiResult<Vec<Issue>> {
        let query = "query($owner: String!, $repo: String!, $label: String!) { repository(owner: $owner, name: $repo) { issues(first: 100, states: OPEN, labels: [$label]) { nodes { id number title body state labels(first: 20) { nodes { name } } } } } }";
        let data = self.query(query, json!({ "owner": owner, "repo": repo, "label": label }))?;
        let issues: Connection<LabeledIssueNode> = decode(
            pointer(&data, "/repository/issues", &format!("{}/{}", owner, repo))?,
            "issues",
        )?;

        Ok(issues
            .nodes
            .into_iter()
            .flatten()
            .map(|node| Issue {
                id: node.id,
                owner: owner.to_string(),
                repo: repo.to_string(),
                number: node.number,
                title: node.title,
                body: node.body.unwrap_or_default(),
                state: IssueState::from_github(&node.state),
                labels: node.labels.nodes.into_iter().flatten().filter_map(|l| l.name).collect(),
            })
            .collect())
    }

    fn add_label_to_issue(&self, issue: &IssueRef, _issue_id: &str, label: &str) -> ApiResult<()> {
        let path = format!("repos/{}/{}/issues/{}/labels", issue.owner, issue.repo, issue.number);
        self.rest("POST", &path, &[format!("labels[]={}", label)])
    }

    fn remove_label_from_issue(
        &self,
        issue: &IssueRef,
        _issue_id: &str,
        label: &str,
    ) -> ApiResult<()> {
        let path = format!(
            "repos/{}/{}/issues/{}/labels/{}",
            issue.owner,
            issue.repo,
            issue.number,
            encode_segment(label)
        );
        self.rest("DELETE", &path, &[])
    }
}

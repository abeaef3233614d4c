//! Sub-issue traversal
//!
//! Breadth-first with an explicit frontier. Each level costs one sub-issue
//! query per repository present in that level, so a tree of L levels in one
//! repository costs L queries regardless of its width.
//!
//! There is no cycle detection: the depth bound is what stops the walk.

use serde::Serialize;
use tracing::debug;

use crate::api::{ProjectApi, SubIssue};
use crate::domain::{group_by_repo, HierarchyNode, IssueRef};

use super::planner::ItemIndex;

/// Everything found below one root
#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub root: IssueRef,

    /// Descendants in breadth-first order
    pub nodes: Vec<HierarchyNode>,

    pub warnings: Vec<String>,

    /// Sub-issue queries issued
    #[serde(skip)]
    pub batch_calls: usize,
}

impl Collection {
    /// Descendants that are on the board
    pub fn tracked(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.iter().filter(|n| n.is_tracked())
    }

    /// Descendants that exist but are not on the board
    pub fn untracked(&self) -> impl Iterator<Item = &HierarchyNode> {
        self.nodes.iter().filter(|n| !n.is_tracked())
    }
}

pub struct HierarchyCollector<'a> {
    api: &'a dyn ProjectApi,
    index: &'a ItemIndex,
}

impl<'a> HierarchyCollector<'a> {
    pub fn new(api: &'a dyn ProjectApi, index: &'a ItemIndex) -> Self {
        Self { api, index }
    }

    /// Walks sub-issues of `root` down to `max_depth` levels
    pub fn collect(&self, root: &IssueRef, max_depth: usize) -> Collection {
        let mut collection = Collection {
            root: root.clone(),
            nodes: Vec::new(),
            warnings: Vec::new(),
            batch_calls: 0,
        };

        let mut frontier = vec![root.clone()];
        let mut depth = 0;

        while !frontier.is_empty() && depth < max_depth {
            let mut next = Vec::new();

            for (repo, numbers) in group_by_repo(&frontier) {
                collection.batch_calls += 1;

                let children = match self
                    .api
                    .get_sub_issues_batch(&repo.owner, &repo.repo, &numbers)
                {
                    Ok(children) => children,
                    Err(e) => {
                        debug!(repo = %repo, depth, error = %e, "sub-issue fetch failed");
                        collection.warnings.push(format!(
                            "Could not fetch sub-issues in {} at depth {}: {} (not expanding further)",
                            repo, depth, e
                        ));
                        continue;
                    }
                };

                for number in &numbers {
                    for child in children.get(number).into_iter().flatten() {
                        let issue = child_ref(&repo.owner, &repo.repo, child);
                        next.push(issue.clone());
                        collection.nodes.push(self.node(issue, depth + 1, child));
                    }
                }
            }

            debug!(root = %root, depth = depth + 1, found = next.len(), "collected level");
            frontier = next;
            depth += 1;
        }

        collection
    }

    fn node(&self, issue: IssueRef, depth: usize, child: &SubIssue) -> HierarchyNode {
        match self.index.get(&issue) {
            Some(item) => HierarchyNode {
                depth,
                item_id: Some(item.item_id.clone()),
                title: item.title.clone(),
                state: item.state,
                body: item.body.clone(),
                fields: item.fields.clone(),
                issue,
            },
            None => HierarchyNode {
                depth,
                item_id: None,
                title: child.title.clone(),
                state: child.state,
                body: String::new(),
                fields: Default::default(),
                issue,
            },
        }
    }
}

/// Children with no repository live in their parent's
fn child_ref(owner: &str, repo: &str, child: &SubIssue) -> IssueRef {
    let owner = if child.owner.is_empty() {
        owner
    } else {
        &child.owner
    };
    let repo = if child.repo.is_empty() {
        repo
    } else {
        &child.repo
    };
    IssueRef::new(owner, repo, child.number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiCall, MemoryApi};
    use crate::domain::IssueState;
    use crate::engine::fixtures::{board, item, sub, widgets};
    use proptest::prelude::*;

    fn index(api: &MemoryApi) -> ItemIndex {
        api.get_project_items("P1", &Default::default())
            .unwrap()
            .into_iter()
            .collect()
    }

    fn numbers(collection: &Collection) -> Vec<u64> {
        collection.nodes.iter().map(|n| n.issue.number).collect()
    }

    #[test]
    fn depth_one_stops_at_children() {
        let api = board()
            .with_item(item(1, "Backlog"))
            .with_item(item(2, "Backlog"))
            .with_item(item(3, "Backlog"))
            .with_item(item(4, "Backlog"))
            .with_children(&widgets(1), vec![sub(2), sub(3)])
            .with_children(&widgets(2), vec![sub(4)]);
        let index = index(&api);

        let collection = HierarchyCollector::new(&api, &index).collect(&widgets(1), 1);

        assert_eq!(numbers(&collection), vec![2, 3]);
        assert!(collection.nodes.iter().all(|n| n.depth == 1));
        assert_eq!(collection.batch_calls, 1);
    }

    #[test]
    fn depth_zero_fetches_nothing() {
        let api = board()
            .with_item(item(1, "Backlog"))
            .with_children(&widgets(1), vec![sub(2)]);
        let index = index(&api);

        let collection = HierarchyCollector::new(&api, &index).collect(&widgets(1), 0);

        assert!(collection.nodes.is_empty());
        assert_eq!(api.count(|c| matches!(c, ApiCall::GetSubIssuesBatch { .. })), 0);
    }

    #[test]
    fn one_query_per_level() {
        let api = board()
            .with_item(item(1, "Backlog"))
            .with_children(&widgets(1), vec![sub(2), sub(3)])
            .with_children(&widgets(2), vec![sub(4), sub(5)])
            .with_children(&widgets(3), vec![sub(6)]);
        let index = index(&api);

        let collection = HierarchyCollector::new(&api, &index).collect(&widgets(1), 10);

        // root level, children level, grandchildren level
        assert_eq!(collection.batch_calls, 3);
        assert_eq!(numbers(&collection), vec![2, 3, 4, 5, 6]);
        assert_eq!(
            api.calls()
                .into_iter()
                .filter_map(|c| match c {
                    ApiCall::GetSubIssuesBatch { numbers, .. } => Some(numbers),
                    _ => None,
                })
                .collect::<Vec<_>>(),
            vec![vec![1], vec![2, 3], vec![4, 5, 6]]
        );
    }

    #[test]
    fn tracked_and_untracked_nodes() {
        let api = board()
            .with_item(item(1, "Backlog"))
            .with_item(item(2, "Ready"))
            .with_children(&widgets(1), vec![sub(2), sub(3)]);
        let index = index(&api);

        let collection = HierarchyCollector::new(&api, &index).collect(&widgets(1), 10);

        let tracked: Vec<_> = collection.tracked().map(|n| n.issue.number).collect();
        let untracked: Vec<_> = collection.untracked().map(|n| n.issue.number).collect();
        assert_eq!(tracked, vec![2]);
        assert_eq!(untracked, vec![3]);
        assert_eq!(collection.nodes[0].item_id.as_deref(), Some("I2"));
        assert_eq!(collection.nodes[0].fields.get("Status"), Some("Ready"));
    }

    #[test]
    fn cross_repo_children_are_grouped_per_repo() {
        let mut tool = item(8, "Backlog");
        tool.repo = "tools".to_string();
        let foreign = SubIssue {
            number: 8,
            title: "Tooling".to_string(),
            state: IssueState::Open,
            owner: "acme".to_string(),
            repo: "tools".to_string(),
        };
        let api = board()
            .with_item(item(1, "Backlog"))
            .with_item(tool)
            .with_children(&widgets(1), vec![sub(2), foreign])
            .with_children(&IssueRef::new("acme", "tools", 8), vec![sub(9)]);
        let index = index(&api);

        let collection = HierarchyCollector::new(&api, &index).collect(&widgets(1), 10);

        let grandchild = collection
            .nodes
            .iter()
            .find(|n| n.issue.number == 9)
            .unwrap();
        assert_eq!(grandchild.issue, IssueRef::new("acme", "tools", 9));
        // #1, then #2 and tools#8 (two repos), then tools#9
        assert_eq!(collection.batch_calls, 4);
    }

    #[test]
    fn fetch_error_is_a_warning() {
        let api = board()
            .with_item(item(1, "Backlog"))
            .with_children(&widgets(1), vec![sub(2)])
            .fail_sub_issues("acme", "widgets");
        let index = index(&api);

        let collection = HierarchyCollector::new(&api, &index).collect(&widgets(1), 10);

        assert!(collection.nodes.is_empty());
        assert_eq!(collection.warnings.len(), 1);
        assert!(collection.warnings[0].contains("acme/widgets"));
    }

    #[test]
    fn cycle_terminates_at_depth_bound() {
        let api = board()
            .with_item(item(1, "Backlog"))
            .with_item(item(2, "Backlog"))
            .with_children(&widgets(1), vec![sub(2)])
            .with_children(&widgets(2), vec![sub(1)]);
        let index = index(&api);

        let collection = HierarchyCollector::new(&api, &index).collect(&widgets(1), 5);

        assert_eq!(numbers(&collection), vec![2, 1, 2, 1, 2]);
        assert_eq!(collection.batch_calls, 5);
    }

    /// Builds a chain 1 -> 2 -> ... -> levels, each node with `width` leaves
    fn chain(levels: u64, width: u64) -> MemoryApi {
        let mut api = board().with_item(item(1, "Backlog"));
        for level in 1..levels {
            let mut children = vec![sub(level + 1)];
            for leaf in 0..width {
                children.push(sub(1000 * level + leaf));
            }
            api = api.with_children(&widgets(level), children);
        }
        api
    }

    proptest! {
        #[test]
        fn never_exceeds_max_depth(levels in 1u64..8, width in 0u64..4, max_depth in 0usize..10) {
            let api = chain(levels, width);
            let index = index(&api);

            let collection = HierarchyCollector::new(&api, &index).collect(&widgets(1), max_depth);

            prop_assert!(collection.nodes.iter().all(|n| n.depth >= 1 && n.depth <= max_depth));
            prop_assert!(collection.batch_calls <= max_depth);
        }

        #[test]
        fn batch_calls_match_level_count(levels in 1u64..8, width in 0u64..4) {
            let api = chain(levels, width);
            let index = index(&api);

            let collection = HierarchyCollector::new(&api, &index).collect(&widgets(1), 10);

            prop_assert_eq!(collection.batch_calls as u64, levels);
        }
    }
}

//! Checklist scanning for issue bodies
//!
//! Uses pulldown-cmark's task-list extension, so `- [ ]` lines inside
//! fenced or indented code blocks are never counted.

use pulldown_cmark::{Event, Options, Parser};

/// Checked and unchecked task-list items in a body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecklistCount {
    pub checked: usize,
    pub unchecked: usize,
}

impl ChecklistCount {
    pub fn total(&self) -> usize {
        self.checked + self.unchecked
    }

    pub fn is_complete(&self) -> bool {
        self.unchecked == 0
    }
}

/// Counts task-list items outside code blocks
pub fn scan(body: &str) -> ChecklistCount {
    let mut count = ChecklistCount::default();

    for event in Parser::new_ext(body, Options::ENABLE_TASKLISTS) {
        if let Event::TaskListMarker(checked) = event {
            if checked {
                count.checked += 1;
            } else {
                count.unchecked += 1;
            }
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_checked_and_unchecked() {
        let body = "## Acceptance\n\n- [x] parser\n- [ ] docs\n- [X] tests\n";
        let count = scan(body);
        assert_eq!(count.checked, 2);
        assert_eq!(count.unchecked, 1);
        assert!(!count.is_complete());
    }

    #[test]
    fn empty_body_is_complete() {
        assert_eq!(scan(""), ChecklistCount::default());
        assert!(scan("just prose").is_complete());
    }

    #[test]
    fn fenced_items_are_ignored() {
        let body = "- [x] real\n\n```markdown\n- [ ] example\n- [x] example\n```\n";
        let count = scan(body);
        assert_eq!(count.checked, 1);
        assert_eq!(count.unchecked, 0);
    }

    #[test]
    fn tilde_fences_are_ignored() {
        let body = "~~~\n- [ ] example\n~~~\n";
        assert_eq!(scan(body).total(), 0);
    }

    #[test]
    fn indented_code_is_ignored() {
        let body = "Template:\n\n    - [ ] illustrative\n    - [ ] illustrative\n\n- [x] done\n";
        let count = scan(body);
        assert_eq!(count.unchecked, 0);
        assert_eq!(count.checked, 1);
    }

    #[test]
    fn nested_items_are_counted() {
        let body = "- [x] parent\n  - [ ] child\n";
        let count = scan(body);
        assert_eq!(count.checked, 1);
        assert_eq!(count.unchecked, 1);
    }
}

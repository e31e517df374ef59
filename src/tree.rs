//! Subject tree aggregation.
//!
//! Observed subjects are folded into a token hierarchy with per-node counts.
//! Each node keeps its own count (messages whose subject ends there) and an
//! aggregate count (its own plus all descendants). Aggregates are maintained
//! incrementally; [`SubjectNode::computed_total`] recomputes them from the
//! leaves and must always agree.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::PatternError;
use crate::subject::{SubjectPattern, DELIMITER};

/// One token position in the subject hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SubjectNode {
    /// Token at this position (empty for the root).
    pub label: String,
    /// Full subject path from the root (empty for the root).
    pub path: String,
    /// Messages whose subject ends exactly here.
    pub count: u64,
    /// `count` plus the counts of all descendants.
    pub total: u64,
    /// Children keyed by token, in lexicographic order.
    pub children: BTreeMap<String, SubjectNode>,
}

impl SubjectNode {
    fn child(label: &str, parent_path: &str) -> Self {
        let path = if parent_path.is_empty() {
            label.to_string()
        } else {
            format!("{parent_path}{DELIMITER}{label}")
        };
        Self {
            label: label.to_string(),
            path,
            ..Self::default()
        }
    }

    /// Whether this node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Aggregate count recomputed from scratch.
    #[must_use]
    pub fn computed_total(&self) -> u64 {
        self.count + self.children.values().map(Self::computed_total).sum::<u64>()
    }

    /// Finds a descendant by its full subject path.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&Self> {
        let mut node = self;
        for token in path.split(DELIMITER) {
            node = node.children.get(token)?;
        }
        Some(node)
    }

    /// Subject pattern selecting this node in the tree browser.
    ///
    /// Nodes with children select everything below them (`<path>.>`); leaves
    /// select their exact subject.
    ///
    /// # Errors
    ///
    /// Fails for the root or when the path contains wildcard syntax.
    pub fn selection_pattern(&self) -> Result<SubjectPattern, PatternError> {
        if self.is_leaf() {
            SubjectPattern::exact(&self.path)
        } else {
            SubjectPattern::below(&self.path)
        }
    }

    /// Depth-first walk yielding `(depth, node)`, children in lexicographic order.
    pub fn walk(&self) -> impl Iterator<Item = (usize, &Self)> {
        let mut stack: Vec<(usize, &Self)> = self.children.values().rev().map(|c| (0, c)).collect();
        std::iter::from_fn(move || {
            let (depth, node) = stack.pop()?;
            stack.extend(node.children.values().rev().map(|c| (depth + 1, c)));
            Some((depth, node))
        })
    }
}

/// Incrementally maintained subject hierarchy.
#[derive(Debug, Clone, Default)]
pub struct SubjectTree {
    root: SubjectNode,
}

impl SubjectTree {
    /// Empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from a sequence of subjects.
    pub fn from_subjects<'a>(subjects: impl IntoIterator<Item = &'a str>) -> Self {
        let mut tree = Self::new();
        for s in subjects {
            tree.observe(s);
        }
        tree
    }

    /// Counts one occurrence of `subject`, creating nodes as needed.
    pub fn observe(&mut self, subject: &str) {
        let mut node = &mut self.root;
        node.total += 1;
        for token in subject.split(DELIMITER) {
            let parent_path = node.path.clone();
            node = node
                .children
                .entry(token.to_string())
                .or_insert_with(|| SubjectNode::child(token, &parent_path));
            node.total += 1;
        }
        node.count += 1;
    }

    /// Read-only copy of the current tree.
    #[must_use]
    pub fn snapshot(&self) -> SubjectNode {
        self.root.clone()
    }

    /// Borrowed view of the root.
    #[must_use]
    pub const fn root(&self) -> &SubjectNode {
        &self.root
    }

    /// Total number of observed messages.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.root.total
    }

    /// Clears all state.
    pub fn reset(&mut self) {
        self.root = SubjectNode::default();
    }
}

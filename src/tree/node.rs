//! In-memory tree shape built by [`super::build`] (spec §4.D).
//!
//! An arena of [`Node`]s rather than a pointer tree: the builder works
//! breadth-first/stack-wise over candidate splits and collapses nodes
//! in place during pruning, which is simplest over a flat `Vec` indexed
//! by node id.

use super::rule::Rule;
use std::collections::BTreeMap;

pub struct Node {
    pub id: usize,
    pub parent: Option<usize>,
    /// The rule on the edge from `parent` to this node; `None` at the root.
    pub rule: Option<Rule>,
    pub children: Vec<usize>,
    /// label id -> occurrence count, computed once when the node is created;
    /// backs entropy/IGR recomputation, post-pruning's error estimate, and
    /// the leaf's majority label.
    pub label_count: BTreeMap<i64, u64>,
    pub is_leaf: bool,
    /// Set once `is_leaf` becomes true: majority label among `label_count`.
    pub leaf_label: Option<i64>,
}

impl Node {
    pub fn total(&self) -> u64 {
        self.label_count.values().sum()
    }

    /// Majority label, ties broken by lowest label id for determinism.
    pub fn majority_label(&self) -> Option<i64> {
        self.label_count
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&label, _)| label)
    }

    /// Count of rows agreeing with the majority label, i.e. how many this
    /// node would get right if collapsed to a leaf right now.
    pub fn majority_correct(&self) -> u64 {
        self.label_count.values().copied().max().unwrap_or(0)
    }
}

/// A built tree: a flat node arena, root always at index 0.
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    pub fn root(&self) -> &Node {
        &self.nodes[0]
    }

    /// Walk from the root applying `rule.matches` against `row_value`,
    /// stopping at the first leaf. Mirrors the forest's persisted-tree walk
    /// (spec §4.E) but entirely in memory, used by `rebuild()` to
    /// re-evaluate candidate trees before committing them.
    pub fn predict_row(&self, get_value: impl FnMut(usize) -> crate::value::Value) -> crate::error::Result<i64> {
        self.predict_row_node(get_value).map(|(_, label)| label)
    }

    /// As [`Self::predict_row`] but also returns the landed-on leaf's node
    /// id, needed by `rebuild()` to map back to the freshly inserted
    /// persistent treenode.
    pub fn predict_row_node(&self, mut get_value: impl FnMut(usize) -> crate::value::Value) -> crate::error::Result<(usize, i64)> {
        let mut node = self.root();
        loop {
            if node.is_leaf {
                let label = node.leaf_label.ok_or_else(|| crate::error::Error::InternalError("leaf node missing label".into()))?;
                return Ok((node.id, label));
            }
            let mut matched = None;
            for &child_id in &node.children {
                let child = &self.nodes[child_id];
                let rule = child.rule.as_ref().expect("non-root node must carry a rule");
                let value = get_value(rule.feature_index);
                if rule.matches(value, "feature")? {
                    matched = Some(child_id);
                    break;
                }
            }
            match matched {
                Some(id) => node = &self.nodes[id],
                None => return Err(crate::error::Error::RuleNotMatched),
            }
        }
    }
}

//! Iterative, explicit-stack tree builder with pre-pruning, post-pruning,
//! and same-label leaf collapsing (spec §4.D steps 3-6). Grounded on
//! `gaenari::method::decision_tree::engine::split_tree`,
//! `check_early_stop_for_pruning`, `post_pruning`, and `combine_same_label`
//! (the last carries the original's 65536-iteration safety bound against a
//! pathological collapse cascade).

use super::engine::{self, IgrResult};
use super::node::{Node, Tree};
use crate::dataframe::Dataframe;
use std::collections::BTreeMap;

pub struct TreeBuilder {
    /// Minimum row count a node must hold to be considered for splitting;
    /// below this it is forced to a leaf.
    pub min_instances: u64,
    /// Post-pruning weight (spec §4.D, `decision_tree.engine.hpp`'s
    /// `post_pruning`): a terminal node collapses to a leaf when
    /// `parent_err < child_err * pruning_weight`. Must be `>= 1.0` — below
    /// that the source disables post-pruning outright rather than pruning
    /// more aggressively.
    pub pruning_weight: f64,
    /// Pre-pruning weight (spec §4.D, `check_early_stop_for_pruning`): a
    /// split is discarded in favor of a leaf when
    /// `child_err * early_stop_weight >= parent_err`. `0.0` disables early
    /// stopping entirely (every beneficial split is taken).
    pub early_stop_weight: f64,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self { min_instances: 2, pruning_weight: 1.0, early_stop_weight: 0.0 }
    }
}

struct Frame {
    rows: Vec<usize>,
    parent: Option<usize>,
    rule: Option<super::rule::Rule>,
    /// Nominal feature columns already split on along this root-to-frame
    /// path; a nominal split fully partitions its domain so reusing the
    /// same nominal column lower in the same branch can never improve IGR.
    excluded_nominal: Vec<usize>,
}

impl TreeBuilder {
    pub fn build(&self, df: &Dataframe, x_cols: &[usize], y_col: usize) -> Tree {
        let mut nodes: Vec<Node> = Vec::new();
        let mut stack = vec![Frame {
            rows: (0..df.rows()).collect(),
            parent: None,
            rule: None,
            excluded_nominal: Vec::new(),
        }];

        while let Some(frame) = stack.pop() {
            let label_count = engine::label_counts(df, &frame.rows, y_col);
            let id = nodes.len();
            nodes.push(Node {
                id,
                parent: frame.parent,
                rule: frame.rule,
                children: Vec::new(),
                label_count: label_count.clone(),
                is_leaf: true,
                leaf_label: None,
            });
            if let Some(pid) = frame.parent {
                nodes[pid].children.push(id);
            }

            let total: u64 = label_count.values().sum();
            let s = engine::calc_s(&label_count);

            if total >= self.min_instances.max(2) && s > 0.0 && !x_cols.is_empty() {
                if let Some((col, result)) = self.pick_best_split(df, &frame.rows, x_cols, y_col, s, &frame.excluded_nominal) {
                    if self.passes_early_stop(total, &label_count, &result) {
                        nodes[id].is_leaf = false;
                        let field_type = df.column_info(col).field_type;
                        let mut excluded = frame.excluded_nominal.clone();
                        if field_type.is_nominal() {
                            excluded.push(col);
                        }
                        for branch in result.branches {
                            stack.push(Frame { rows: branch.rows, parent: Some(id), rule: Some(branch.rule), excluded_nominal: excluded.clone() });
                        }
                    }
                }
            }

            if nodes[id].is_leaf {
                nodes[id].leaf_label = nodes[id].majority_label();
            }
        }

        let mut tree = Tree { nodes };
        self.post_pruning(&mut tree);
        combine_same_label(&mut tree);
        tree
    }

    fn pick_best_split(
        &self,
        df: &Dataframe,
        rows: &[usize],
        x_cols: &[usize],
        y_col: usize,
        s: f64,
        excluded_nominal: &[usize],
    ) -> Option<(usize, IgrResult)> {
        let mut best: Option<(usize, IgrResult)> = None;
        for &col in x_cols {
            if excluded_nominal.contains(&col) {
                continue;
            }
            let field_type = df.column_info(col).field_type;
            let result = engine::igr_for_feature(df, rows, col, y_col, s, field_type);
            if result.stop_criteria || result.branches.len() < 2 {
                continue;
            }
            if result.branches.iter().any(|b| b.rows.is_empty()) {
                continue;
            }
            let is_better = match &best {
                None => true,
                Some((_, current)) => result.igr > current.igr,
            };
            if is_better {
                best = Some((col, result));
            }
        }
        best.filter(|(_, result)| result.igr > 0.0)
    }

    /// Spec §4.D "pre-pruning": discard the split (early-stop to a leaf)
    /// when `child_err * early_stop_weight >= parent_err`; `0.0` disables
    /// the check and always takes the split.
    fn passes_early_stop(&self, total: u64, label_count: &BTreeMap<i64, u64>, result: &IgrResult) -> bool {
        if self.early_stop_weight == 0.0 {
            return true;
        }

        let leaf_correct = label_count.values().copied().max().unwrap_or(0);
        let leaf_error_rate = (total - leaf_correct) as f64 / total as f64;

        let mut split_errors = 0u64;
        for branch in &result.branches {
            let branch_total: u64 = branch.label_counts.values().sum();
            let branch_correct = branch.label_counts.values().copied().max().unwrap_or(0);
            split_errors += branch_total - branch_correct;
        }
        let split_error_rate = split_errors as f64 / total as f64;
        let weighted_split_error_rate = split_error_rate * self.early_stop_weight;

        leaf_error_rate > weighted_split_error_rate
    }

    /// Spec §4.D "post-pruning" (`decision_tree.engine.hpp`'s
    /// `post_pruning`): bottom-up, collapse a terminal node to a single leaf
    /// when `parent_err < child_err * pruning_weight`. A `pruning_weight`
    /// below `1.0` disables post-pruning entirely, matching the source's
    /// `if (weight < 1.0) return false;` guard.
    fn post_pruning(&self, tree: &mut Tree) {
        if self.pruning_weight < 1.0 {
            return;
        }
        let order = post_order(tree, 0);
        for id in order {
            if tree.nodes[id].is_leaf || tree.nodes[id].children.is_empty() {
                continue;
            }
            let node_total = tree.nodes[id].total();
            if node_total == 0 {
                continue;
            }
            let leaf_error = node_total - tree.nodes[id].majority_correct();
            let subtree_error = subtree_error(tree, id);

            let leaf_error_rate = leaf_error as f64 / node_total as f64;
            let subtree_error_rate = subtree_error as f64 / node_total as f64;
            let weighted_subtree_error_rate = subtree_error_rate * self.pruning_weight;

            if leaf_error_rate < weighted_subtree_error_rate {
                tree.nodes[id].is_leaf = true;
                tree.nodes[id].leaf_label = tree.nodes[id].majority_label();
                tree.nodes[id].children.clear();
            }
        }
    }
}

fn post_order(tree: &Tree, id: usize) -> Vec<usize> {
    let mut order = Vec::new();
    fn walk(tree: &Tree, id: usize, order: &mut Vec<usize>) {
        for &c in &tree.nodes[id].children {
            walk(tree, c, order);
        }
        order.push(id);
    }
    walk(tree, id, &mut order);
    order
}

fn subtree_error(tree: &Tree, id: usize) -> u64 {
    let node = &tree.nodes[id];
    if node.is_leaf || node.children.is_empty() {
        return node.total() - node.majority_correct();
    }
    node.children.iter().map(|&c| subtree_error(tree, c)).sum()
}

/// Collapse a parent whose children are all leaves sharing the same label
/// into a single leaf. Cascades upward (a newly collapsed node may let its
/// own parent collapse next pass), bounded against runaway cascades on a
/// pathological tree shape.
fn combine_same_label(tree: &mut Tree) {
    const MAX_ITERATIONS: u32 = 65536;
    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for id in 0..tree.nodes.len() {
            if tree.nodes[id].is_leaf || tree.nodes[id].children.is_empty() {
                continue;
            }
            let children = tree.nodes[id].children.clone();
            let all_leaves = children.iter().all(|&c| tree.nodes[c].is_leaf);
            if !all_leaves {
                continue;
            }
            let first_label = tree.nodes[children[0]].leaf_label;
            let same_label = children.iter().all(|&c| tree.nodes[c].leaf_label == first_label);
            if same_label {
                tree.nodes[id].is_leaf = true;
                tree.nodes[id].leaf_label = first_label;
                tree.nodes[id].children.clear();
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// One leaf predicts its majority label for every row it holds; the
/// confusion matrix is the union of (true label, predicted label) counts
/// across all leaves (spec §9 Supplemented Features, `confusion_matrix`).
pub fn derive_confusion_matrix(tree: &Tree) -> BTreeMap<(i64, i64), u64> {
    let mut cm = BTreeMap::new();
    for node in &tree.nodes {
        if !node.is_leaf {
            continue;
        }
        let Some(predicted) = node.leaf_label else { continue };
        for (&true_label, &count) in &node.label_count {
            *cm.entry((true_label, predicted)).or_insert(0) += count;
        }
    }
    cm
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataframe::{ColumnInfo, Dataframe};
    use crate::value::{FieldType, Value};

    fn weather_df() -> Dataframe {
        let outlook = vec![0, 0, 1, 2, 2, 2, 1, 0, 0, 2, 0, 1, 1, 2];
        let temp = vec![85.0, 80.0, 83.0, 70.0, 68.0, 65.0, 64.0, 72.0, 69.0, 75.0, 75.0, 72.0, 81.0, 71.0];
        let play = vec![0, 0, 1, 1, 1, 0, 1, 0, 1, 1, 1, 1, 1, 0];
        Dataframe::new(vec![
            (ColumnInfo { name: "outlook".into(), field_type: FieldType::TextId }, outlook.into_iter().map(Value::Int).collect()),
            (ColumnInfo { name: "temperature".into(), field_type: FieldType::Real }, temp.into_iter().map(Value::Real).collect()),
            (ColumnInfo { name: "play".into(), field_type: FieldType::TextId }, play.into_iter().map(Value::Int).collect()),
        ])
    }

    #[test]
    fn builds_tree_with_at_least_one_split() {
        let df = weather_df();
        let builder = TreeBuilder::default();
        let tree = builder.build(&df, &[0, 1], 2);
        assert!(tree.nodes.len() > 1);
        assert!(tree.nodes.iter().any(|n| n.is_leaf));
    }

    #[test]
    fn every_leaf_has_a_label() {
        let df = weather_df();
        let builder = TreeBuilder::default();
        let tree = builder.build(&df, &[0, 1], 2);
        for node in &tree.nodes {
            if node.is_leaf {
                assert!(node.leaf_label.is_some());
            }
        }
    }

    #[test]
    fn confusion_matrix_covers_every_row() {
        let df = weather_df();
        let builder = TreeBuilder::default();
        let tree = builder.build(&df, &[0, 1], 2);
        let cm = derive_confusion_matrix(&tree);
        let total: u64 = cm.values().sum();
        assert_eq!(total, df.rows() as u64);
    }

    #[test]
    fn pure_node_never_splits() {
        let df = Dataframe::new(vec![
            (ColumnInfo { name: "x".into(), field_type: FieldType::TextId }, vec![Value::Int(0), Value::Int(1)]),
            (ColumnInfo { name: "y".into(), field_type: FieldType::TextId }, vec![Value::Int(7), Value::Int(7)]),
        ]);
        let builder = TreeBuilder::default();
        let tree = builder.build(&df, &[0], 1);
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.nodes[0].leaf_label, Some(7));
    }
}

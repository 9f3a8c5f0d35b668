//! Forest Model (spec §4.E): the persistent counterpart of a trained
//! in-memory [`crate::tree::Tree`]. Holds no mutable state of its own beyond
//! two caches — the treenode-children cache and the first-generation-root
//! id, set once per process lifetime and never invalidated.

use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::Connection;

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::storage::ops::{self, TreeNodeRow};
use crate::storage::schema;
use crate::tree::{Rule, Tree};
use crate::value::Value;

/// Outcome of a predict walk (spec §4.E "Predict walk").
pub enum PredictOutcome {
    /// Reached a `type=leaf` leaf directly.
    Leaf { treenode_id: i64, leaf_info_id: i64, label_index: i64, correct_count: i64, total_count: i64, accuracy: f64 },
    /// No child matched anywhere along the walk, but a `go_to_generation`
    /// leaf was matched earlier and is returned as the fallback.
    /// `failing_parent_treenode_id` is the node at which no child matched —
    /// dynamic rule extension (spec §4.F step 2) attaches under it, not
    /// under the returned middle leaf's own parent.
    MiddleNode { treenode_id: i64, leaf_info_id: i64, label_index: i64, correct_count: i64, total_count: i64, accuracy: f64, failing_parent_treenode_id: i64 },
    /// No child matched and no middle fallback exists; carries the treenode
    /// id at which the walk got stuck.
    NotFound { parent_treenode_id: i64 },
}

/// Pre-order insertion of a freshly trained tree (spec §4.E "Insertion of a
/// trained tree"). Builds an in-memory-node-id → persistent-treenode-id map
/// and updates `generation.root_ref_treenode_id`. Stack-based, matching the
/// iterative style the spec's Design Notes mandate for tree traversal.
pub fn insert_tree(conn: &Connection, generation_id: i64, tree: &Tree) -> Result<(i64, HashMap<usize, i64>)> {
    let mut id_map: HashMap<usize, i64> = HashMap::new();
    let mut root_persistent_id: Option<i64> = None;
    let mut stack = vec![tree.root().id];

    while let Some(node_id) = stack.pop() {
        let node = &tree.nodes[node_id];
        let parent_persistent_id = match node.parent {
            Some(pid) => Some(*id_map.get(&pid).expect("parent must be inserted before its child")),
            None => None,
        };

        let rule_id = match &node.rule {
            Some(rule) => Some(ops::add_rule(conn, rule)?),
            None => None,
        };

        let leaf_info_id = if node.is_leaf {
            let label = node.leaf_label.ok_or_else(|| Error::internal("leaf node missing a label"))?;
            let total = node.total();
            let correct = node.majority_correct();
            let accuracy = if total > 0 { correct as f64 / total as f64 } else { 0.0 };
            Some(ops::add_leaf_info(conn, label, schema::LEAF_INFO_TYPE_LEAF, None, correct as i64, total as i64, accuracy)?)
        } else {
            None
        };

        let treenode_id = ops::add_treenode(conn, generation_id, parent_persistent_id, rule_id, leaf_info_id)?;
        id_map.insert(node_id, treenode_id);
        if node.parent.is_none() {
            root_persistent_id = Some(treenode_id);
        }

        stack.extend(node.children.iter().copied());
    }

    let root_persistent_id = root_persistent_id.ok_or_else(|| Error::internal("inserted tree has no root"))?;
    ops::update_generation_root(conn, generation_id, root_persistent_id)?;
    Ok((root_persistent_id, id_map))
}

/// The treenode-children cache and first-root cache shared by the
/// controller across `predict`/`update`/`rebuild` calls (spec §4.G, §9
/// "Cyclic mutable caches").
pub struct Forest {
    treenode_cache: Cache<i64, Vec<TreeNodeRow>>,
    first_root: Mutex<Option<i64>>,
}

impl Forest {
    pub fn new(capacity: usize, survive_size: usize) -> Result<Self> {
        Ok(Self { treenode_cache: Cache::new(capacity, survive_size)?, first_root: Mutex::new(None) })
    }

    /// Cached `generation(id=min).root_ref_treenode_id`, loaded once and
    /// never invalidated (spec §4.E step 1, §9 "first-root cache").
    pub fn first_root(&self, conn: &Connection) -> Result<i64> {
        let mut slot = self.first_root.lock().expect("forest mutex poisoned");
        if let Some(id) = *slot {
            return Ok(id);
        }
        let id = ops::get_first_root_ref_treenode_id(conn)?;
        *slot = Some(id);
        Ok(id)
    }

    /// Children of `parent_treenode_id`, via the treenode cache.
    pub fn children(&self, conn: &Connection, parent_treenode_id: i64) -> Result<Vec<TreeNodeRow>> {
        self.treenode_cache.get(parent_treenode_id, || ops::get_treenode_children(conn, parent_treenode_id))
    }

    /// Dynamic rule extension invalidates the parent's cached children list
    /// (spec §4.F step 2, §9).
    pub fn invalidate_children(&self, parent_treenode_id: i64) {
        self.treenode_cache.erase(&parent_treenode_id);
    }

    /// Parent treenode ids currently holding a cached children list
    /// (SPEC_FULL.md §9.3 cache/store verification helpers).
    pub fn cached_parent_ids(&self) -> Vec<i64> {
        self.treenode_cache.keys()
    }

    pub fn clear_all_caches(&self) {
        self.treenode_cache.clear();
        // the first-root cache is intentionally never cleared: generation 0's
        // root never changes once written (spec §9).
    }

    /// The predict walk (spec §4.E "Predict walk"). `get_value` maps a
    /// feature index in the declared X vector to its runtime value;
    /// `feature_name` maps the same index to its declared field name, used
    /// only to report a precise [`Error::FeatureNotFound`]/
    /// [`Error::InvalidDataType`].
    pub fn predict(&self, conn: &Connection, mut get_value: impl FnMut(usize) -> Option<Value>, feature_name: impl Fn(usize) -> String) -> Result<PredictOutcome> {
        let mut current = self.first_root(conn)?;
        let mut last_middle: Option<TreeNodeRow> = None;

        loop {
            let children = self.children(conn, current)?;
            let mut matched: Option<&TreeNodeRow> = None;
            for child in &children {
                let rule = child.rule.as_ref().expect("non-root treenode must carry a rule");
                let feature_index = rule.feature_index as usize;
                let name = feature_name(feature_index);
                let value = get_value(feature_index).ok_or_else(|| Error::FeatureNotFound(name.clone()))?;
                let as_rule = Rule { feature_index, rule_type: rule.rule_type, value_type: rule.value_type, value_integer: rule.value_integer, value_real: rule.value_real };
                if as_rule.matches(value, &name)? {
                    matched = Some(child);
                    break;
                }
            }

            match matched {
                Some(child) if child.is_leaf_node() => {
                    let leaf = child.leaf_info.as_ref().unwrap();
                    if leaf.is_go_to_generation {
                        let next_root = ops::get_root_ref_treenode_id(conn, leaf.go_to_ref_generation_id.ok_or_else(|| Error::internal("go_to_generation leaf missing target generation"))?)?;
                        last_middle = Some(child.clone());
                        current = next_root;
                        continue;
                    }
                    return Ok(PredictOutcome::Leaf {
                        treenode_id: child.id,
                        leaf_info_id: leaf.id,
                        label_index: leaf.label_index,
                        correct_count: leaf.correct_count,
                        total_count: leaf.total_count,
                        accuracy: leaf.accuracy,
                    });
                }
                Some(child) => {
                    current = child.id;
                }
                None => {
                    return match last_middle {
                        Some(middle) => {
                            let leaf = middle.leaf_info.unwrap();
                            Ok(PredictOutcome::MiddleNode {
                                treenode_id: middle.id,
                                leaf_info_id: leaf.id,
                                label_index: leaf.label_index,
                                correct_count: leaf.correct_count,
                                total_count: leaf.total_count,
                                accuracy: leaf.accuracy,
                                failing_parent_treenode_id: current,
                            })
                        }
                        None => Ok(PredictOutcome::NotFound { parent_treenode_id: current }),
                    };
                }
            }
        }
    }
}

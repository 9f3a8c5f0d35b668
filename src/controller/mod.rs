//! Incremental Controller (spec §4.F): the only public entry point that
//! mutates model state. Every method runs inside one
//! [`Storage::transaction`] call, so a crash mid-update leaves either the
//! old state or the fully-applied new state, never something in between.
//!
//! Grounded on `supul_t::model`'s `insert_chunk`/`update`/`rebuild`/`predict`
//! orchestration in `model.hpp`, re-expressed as a struct of owned
//! subsystems (`Storage`, `StringTable`, `Forest`) behind a connection-level
//! mutex rather than the source's member functions over a shared `db`.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rusqlite::Transaction;

use crate::config::{Attributes, ModelConfig, Property};
use crate::csv_ingest::CsvReader;
use crate::dataframe::{ColumnInfo, Dataframe};
use crate::error::{Error, Result};
use crate::forest::{self, Forest, PredictOutcome};
use crate::storage::{ops, Outcome, Storage};
use crate::string_table::StringTable;
use crate::tree::{RuleType, TreeBuilder};
use crate::value::{FieldType, Value};

/// Children-list cache sizing (spec §4.G): generous enough that a typical
/// tree's internal nodes all fit, per the teacher's own cache defaults.
const FOREST_CACHE_CAPACITY: usize = 256;
const FOREST_CACHE_SURVIVE: usize = 64;

pub struct PredictResult {
    pub label: String,
    pub label_index: i64,
    pub correct_count: i64,
    pub total_count: i64,
    pub accuracy: f64,
}

pub struct Controller {
    storage: Storage,
    string_table: Mutex<StringTable>,
    forest: Forest,
    attributes: Attributes,
    property: Mutex<Property>,
    base_dir: PathBuf,
}

impl Controller {
    /// Opens a project previously laid out by [`crate::project::create`]:
    /// loads `property.txt`/`conf/attributes.json`, opens (and, if new,
    /// initializes) the SQLite database named by `db.dbname`, and rehydrates
    /// the String Table from storage.
    pub fn open(base_dir: &Path) -> Result<Self> {
        let property = crate::project::load_property(base_dir)?;
        let attributes = crate::project::load_attributes(base_dir)?;

        let db_type = property.require_str("db.type")?;
        if db_type != "sqlite" {
            return Err(Error::NotSupportedYet(format!("db.type {db_type:?}")));
        }
        let dbname = property.require_str("db.dbname")?;
        let db_path = base_dir.join("sqlite").join(format!("{dbname}.db"));
        let storage = Storage::open(&db_path)?;
        storage.init_schema(&attributes.instance_fields())?;

        let entries = storage.transaction(false, |tx| Ok(Outcome::Commit(ops::load_string_table_entries(tx)?)))?;
        let string_table = StringTable::from_entries(entries)?;

        let forest = Forest::new(FOREST_CACHE_CAPACITY, FOREST_CACHE_SURVIVE)?;

        Ok(Self {
            storage,
            string_table: Mutex::new(string_table),
            forest,
            attributes,
            property: Mutex::new(property),
            base_dir: base_dir.to_path_buf(),
        })
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn model_config(&self) -> ModelConfig {
        ModelConfig::from_property(&self.property.lock().expect("property mutex poisoned"))
    }

    /// X fields then the single Y field, in that order — the column order
    /// every training dataframe uses, so `rule.feature_index` (set from the
    /// dataframe column index) always indexes into the X list alone.
    fn xy_fields(&self) -> Vec<(String, FieldType)> {
        let mut fields = self.attributes.x_fields();
        fields.push(self.attributes.y_field());
        fields
    }

    fn y_col(&self) -> usize {
        self.attributes.x.len()
    }

    // --------------------------------------------------------------- insert

    /// Ingests a CSV file as one new chunk (spec §4.F "insert_chunk",
    /// SPEC_FULL.md §9.4). Columns are matched to every declared field by
    /// header name; `csv.pad_on_mismatch` (default false) controls whether a
    /// short row is padded with empty cells or rejected.
    pub fn insert_chunk_csv(&self, csv_path: &Path) -> Result<()> {
        let fields = self.attributes.instance_fields();
        let pad = self.property.lock().expect("property mutex poisoned").get_bool("csv.pad_on_mismatch", false);

        self.storage.transaction(true, |tx| {
            let chunk_id = ops::add_chunk(tx, now_timestamp())?;
            let mut reader = CsvReader::open(csv_path, &fields, pad)?;
            let mut string_table = self.string_table.lock().expect("string table mutex poisoned");
            let mut row_count: i64 = 0;

            while let Some(row) = reader.next_row()? {
                let mut values = Vec::with_capacity(fields.len());
                for ((name, field_type), raw) in fields.iter().zip(row.iter()) {
                    let value = match field_type {
                        FieldType::TextId => Value::Int(string_table.add(raw) as i64),
                        FieldType::Real => {
                            Value::Real(raw.parse::<f64>().map_err(|_| Error::InvalidDataType(format!("field {name:?}: {raw:?} is not a real number")))?)
                        }
                        FieldType::Text => return Err(Error::NotSupportedYet("TEXT field type in instance data".into())),
                        FieldType::Integer | FieldType::BigInt | FieldType::SmallInt => {
                            Value::Int(raw.parse::<i64>().map_err(|_| Error::InvalidDataType(format!("field {name:?}: {raw:?} is not an integer")))?)
                        }
                    };
                    values.push(value);
                }
                let instance_id = ops::add_instance(tx, &fields, &values)?;
                ops::add_instance_info(tx, instance_id, chunk_id)?;
                row_count += 1;
            }

            let storage_max_id = ops::get_string_table_max_id(tx)?;
            let pending: Vec<(i32, String)> = string_table.pending(storage_max_id).into_iter().map(|(id, text)| (id, text.to_string())).collect();
            if !pending.is_empty() {
                let refs: Vec<(i32, &str)> = pending.iter().map(|(id, text)| (*id, text.as_str())).collect();
                ops::insert_string_table_entries(tx, &refs)?;
                string_table.mark_flushed(pending.last().unwrap().0);
            }

            ops::update_chunk_total_count(tx, chunk_id, row_count)?;
            ops::add_global_counts(tx, row_count, 0, 0, 0)?;

            let config = self.model_config();
            if let Some(limit) = config.chunk_limit {
                let global = ops::get_global(tx)?;
                if global.instance_count > limit.upper_bound {
                    self.apply_chunk_limit(tx, limit.lower_bound)?;
                }
            }

            log::info!("insert_chunk_csv: chunk {chunk_id}, {row_count} rows from {}", csv_path.display());
            Ok(Outcome::Commit(()))
        })
    }

    /// Evicts chunks oldest-first until one more eviction would push the
    /// instance count below `lower_bound` (spec §4.F "chunk_limit").
    fn apply_chunk_limit(&self, tx: &Transaction, lower_bound: i64) -> Result<()> {
        let chunks = ops::get_chunk_list_oldest_first(tx)?;
        let mut projected = ops::get_global(tx)?.instance_count;
        for (chunk_id, total_count) in chunks {
            if projected - total_count < lower_bound {
                break;
            }
            self.remove_chunk(tx, chunk_id)?;
            projected -= total_count;
        }
        Ok(())
    }

    /// Deletes a chunk and every instance/instance_info row it owns,
    /// subtracting its contribution from `leaf_info`, `global`, and
    /// `global_confusion_matrix` so the conservation invariants (spec §3)
    /// hold for the surviving data (spec §4.F "remove_chunk").
    fn remove_chunk(&self, tx: &Transaction, chunk_id: i64) -> Result<()> {
        let y_field = self.attributes.y_field().0;
        let rows = ops::get_leaf_info_by_chunk_id(tx, chunk_id, &y_field)?;

        let mut leaf_delta: HashMap<i64, (i64, i64)> = HashMap::new();
        let mut cm_delta: BTreeMap<(i64, i64), i64> = BTreeMap::new();
        let mut correct = 0i64;
        let mut weak_total = 0i64;
        let total = rows.len() as i64;

        for (leaf_info_id, actual, predicted, weak_count) in &rows {
            let entry = leaf_delta.entry(*leaf_info_id).or_insert((0, 0));
            entry.1 += 1;
            if actual == predicted {
                entry.0 += 1;
                correct += 1;
            }
            weak_total += weak_count;
            *cm_delta.entry((*actual, *predicted)).or_insert(0) += 1;
        }

        let updated = ops::get_chunk_updated(tx, chunk_id)?;
        let chunk_total_count = ops::get_total_count_by_chunk_id(tx, chunk_id)?;
        if updated && chunk_total_count != total {
            return Err(Error::internal("remove_chunk: chunk total_count disagrees with instance_info rows"));
        }
        let updated_delta = if updated { chunk_total_count } else { 0 };

        for ((actual, predicted), count) in &cm_delta {
            ops::bump_global_confusion_matrix(tx, *actual, *predicted, -*count)?;
        }
        for (leaf_info_id, (correct_delta, total_delta)) in &leaf_delta {
            ops::update_leaf_info(tx, *leaf_info_id, -*correct_delta, -*total_delta)?;
        }

        let global = ops::get_global(tx)?;
        let new_instance_count = global.instance_count - chunk_total_count;
        let new_updated = global.updated_instance_count - updated_delta;
        let new_correct = global.instance_correct_count - correct;
        let new_weak = global.acc_weak_instance_count - weak_total;
        if new_instance_count < 0 || new_updated < 0 || new_correct < 0 || new_weak < 0 {
            return Err(Error::internal("remove_chunk: global counters would go negative"));
        }
        let new_accuracy = if new_updated != 0 { new_correct as f64 / new_updated as f64 } else { 0.0 };
        ops::set_global_absolute(
            tx,
            &ops::GlobalRow {
                instance_count: new_instance_count,
                updated_instance_count: new_updated,
                instance_correct_count: new_correct,
                instance_accuracy: new_accuracy,
                acc_weak_instance_count: new_weak,
            },
        )?;

        ops::delete_instance_by_chunk_id(tx, chunk_id)?;
        ops::delete_instance_info_by_chunk_id(tx, chunk_id)?;
        ops::delete_chunk_by_id(tx, chunk_id)?;

        self.forest.clear_all_caches();
        log::warn!("remove_chunk: evicted chunk {chunk_id} ({chunk_total_count} instances)");
        Ok(())
    }

    // --------------------------------------------------------------- update

    /// Folds every not-yet-updated chunk into the current forest (spec §4.F
    /// "update"): trains the very first generation if none exists yet, walks
    /// each instance to a leaf (extending the tree dynamically for unseen
    /// nominal values), and rolls the per-instance results up into
    /// `leaf_info`, `global`, and `global_confusion_matrix`.
    pub fn update(&self) -> Result<()> {
        self.storage.transaction(true, |tx| {
            let not_updated_chunk_ids = ops::get_not_updated_chunk_ids(tx)?;
            if not_updated_chunk_ids.is_empty() {
                return Ok(Outcome::Rollback(()));
            }

            let fields = self.xy_fields();
            let y_col = self.y_col();

            let first_tree = ops::get_is_generation_empty(tx)?;
            if first_tree {
                self.build_first_tree(tx, &fields, y_col)?;
            }

            let mut leaf_increments: HashMap<i64, (i64, i64)> = HashMap::new();
            let mut confusion: BTreeMap<(i64, i64), i64> = BTreeMap::new();
            let mut total_correct = 0i64;
            let mut total_updated = 0i64;

            for chunk_id in not_updated_chunk_ids {
                let rows = ops::get_instance_by_chunk_id(tx, chunk_id, &fields)?;
                let chunk_total = rows.len() as i64;
                let mut chunk_correct = 0i64;

                for (instance_id, values) in rows {
                    let instance_map: HashMap<String, Value> = fields.iter().zip(values.iter()).map(|((name, _), v)| (name.clone(), *v)).collect();
                    let ground_truth = values[y_col].as_int().ok_or_else(|| Error::internal("y column value is not an integer label"))?;

                    let (leaf_treenode_id, leaf_info_id, predicted, newly_added) = self.resolve_leaf(tx, &instance_map, ground_truth)?;
                    let correct = predicted == ground_truth;

                    ops::update_instance_info(tx, instance_id, leaf_treenode_id, correct)?;
                    *confusion.entry((ground_truth, predicted)).or_insert(0) += 1;
                    if !newly_added && !first_tree {
                        let entry = leaf_increments.entry(leaf_info_id).or_insert((0, 0));
                        entry.1 += 1;
                        if correct {
                            entry.0 += 1;
                        }
                    }
                    if correct {
                        chunk_correct += 1;
                    }
                }

                let chunk_accuracy = if chunk_total != 0 { chunk_correct as f64 / chunk_total as f64 } else { 0.0 };
                ops::update_chunk(tx, chunk_id, true, chunk_correct, chunk_total, chunk_accuracy)?;
                total_correct += chunk_correct;
                total_updated += chunk_total;
            }

            for (leaf_info_id, (correct_delta, total_delta)) in leaf_increments {
                ops::update_leaf_info(tx, leaf_info_id, correct_delta, total_delta)?;
            }

            let updated_instance_count_delta = if first_tree {
                let global = ops::get_global(tx)?;
                if global.updated_instance_count != total_updated {
                    return Err(Error::internal("update: first generation's instance count disagrees with the re-walked chunk total"));
                }
                0
            } else {
                total_updated
            };
            ops::add_global_counts(tx, 0, updated_instance_count_delta, total_correct, 0)?;

            let global = ops::get_global(tx)?;
            let accuracy = if global.updated_instance_count != 0 { global.instance_correct_count as f64 / global.updated_instance_count as f64 } else { 0.0 };
            ops::set_global_instance_accuracy(tx, accuracy)?;

            for ((actual, predicted), count) in confusion {
                ops::bump_global_confusion_matrix(tx, actual, predicted, count)?;
            }

            log::info!("update: {total_updated} instances processed, {total_correct} correct");
            Ok(Outcome::Commit(()))
        })
    }

    /// Trains generation 0 from every instance not yet covered by a
    /// prediction. `global.updated_instance_count` is set up front so the
    /// accuracy the caller later derives never divides by zero; the counts
    /// `insert_tree` stamps onto each leaf already reflect the training
    /// labels exactly, so the caller must not double-apply leaf increments
    /// for these same rows.
    fn build_first_tree(&self, tx: &Transaction, fields: &[(String, FieldType)], y_col: usize) -> Result<()> {
        let rows = ops::get_not_updated_instance(tx, fields)?;
        let instance_count = rows.len() as i64;
        if instance_count == 0 {
            return Err(Error::internal("build_first_tree: no instances available to train the first generation"));
        }
        ops::set_global_updated_instance_count(tx, instance_count)?;

        let df = dataframe_from_rows(fields, &rows);
        let x_cols: Vec<usize> = (0..y_col).collect();
        let tree = TreeBuilder::default().build(&df, &x_cols, y_col);

        let generation_id = ops::add_generation(tx, now_timestamp())?;
        forest::insert_tree(tx, generation_id, &tree)?;

        let cm = crate::tree::derive_confusion_matrix(&tree);
        let correct: i64 = cm.iter().filter(|((a, p), _)| a == p).map(|(_, &c)| c as i64).sum();
        let accuracy = correct as f64 / instance_count as f64;
        ops::update_generation_etc(tx, generation_id, instance_count, 0, 0.0, 0.0, 0.0, 0.0, accuracy)?;

        log::info!("build_first_tree: generation {generation_id}, {instance_count} instances, accuracy {accuracy:.3}");
        Ok(())
    }

    /// Walks one instance to a leaf, extending the tree on the spot if the
    /// walk runs off the end of the tree (spec §4.F "dynamic rule
    /// extension"). Returns `(leaf_treenode_id, leaf_info_id, predicted_label, newly_added)`.
    fn resolve_leaf(&self, tx: &Transaction, instance_map: &HashMap<String, Value>, ground_truth: i64) -> Result<(i64, i64, i64, bool)> {
        let x_fields = self.attributes.x_fields();
        let outcome = self.forest.predict(tx, |idx| instance_map.get(&x_fields[idx].0).copied(), |idx| x_fields[idx].0.clone())?;
        match outcome {
            PredictOutcome::Leaf { treenode_id, leaf_info_id, label_index, .. } => Ok((treenode_id, leaf_info_id, label_index, false)),
            PredictOutcome::MiddleNode { failing_parent_treenode_id, .. } => self.extend_leaf(tx, failing_parent_treenode_id, instance_map, ground_truth, &x_fields),
            PredictOutcome::NotFound { parent_treenode_id } => self.extend_leaf(tx, parent_treenode_id, instance_map, ground_truth, &x_fields),
        }
    }

    /// Copies a sibling's rule, changes only `value_integer` to the unseen
    /// nominal value observed, and attaches a fresh leaf under
    /// `parent_treenode_id` predicting `ground_truth` (spec §4.F step 2).
    /// Documented precondition: only ever reached for `TEXT_ID`/`Equal`
    /// splits, since numeric splits partition the whole domain and can never
    /// leave a value unmatched.
    fn extend_leaf(&self, tx: &Transaction, parent_treenode_id: i64, instance_map: &HashMap<String, Value>, ground_truth: i64, x_fields: &[(String, FieldType)]) -> Result<(i64, i64, i64, bool)> {
        let siblings = self.forest.children(tx, parent_treenode_id)?;
        let sibling = siblings.first().ok_or_else(|| Error::internal("dynamic rule extension: parent treenode has no existing children to copy a rule from"))?;
        let rule = sibling.rule.as_ref().ok_or_else(|| Error::internal("dynamic rule extension: sibling treenode has no rule"))?;
        if rule.rule_type != RuleType::Equal {
            return Err(Error::internal("dynamic rule extension only supports nominal (Equal) rules"));
        }

        let feature_name = &x_fields[rule.feature_index as usize].0;
        let new_value = instance_map.get(feature_name).and_then(Value::as_int).ok_or_else(|| Error::FeatureNotFound(feature_name.clone()))?;

        let new_rule_id = ops::copy_rule(tx, rule.id)?;
        ops::update_rule_value_integer(tx, new_rule_id, new_value)?;
        let generation_id = ops::get_generation_id_by_treenode_id(tx, parent_treenode_id)?;
        let leaf_info_id = ops::add_leaf_info(tx, ground_truth, crate::storage::schema::LEAF_INFO_TYPE_LEAF, None, 1, 1, 1.0)?;
        let treenode_id = ops::add_treenode(tx, generation_id, Some(parent_treenode_id), Some(new_rule_id), Some(leaf_info_id))?;

        self.forest.invalidate_children(parent_treenode_id);
        log::warn!("dynamic rule extension: new leaf under parent {parent_treenode_id} for unseen value {new_value} of {feature_name:?}");
        Ok((treenode_id, leaf_info_id, ground_truth, true))
    }

    // -------------------------------------------------------------- rebuild

    /// Retrains a fresh tree over every instance routed to a weak leaf (spec
    /// §4.F "rebuild"): flips qualifying leaves to `go_to_generation`,
    /// builds a candidate tree on their accumulated instances, and commits
    /// it only if it strictly improves on their prior correct count.
    pub fn rebuild(&self) -> Result<()> {
        self.storage.transaction(true, |tx| {
            let config = self.model_config();
            let weak_ids = ops::get_weak_treenode_ids(tx, config.weak_accuracy, config.weak_total_count)?;
            if weak_ids.is_empty() {
                return Ok(Outcome::Rollback(()));
            }

            let before_global = ops::get_global(tx)?;
            let generation_id = ops::add_generation(tx, now_timestamp())?;
            ops::update_leaf_info_by_go_to_generation_id(tx, generation_id, config.weak_accuracy, config.weak_total_count)?;
            self.forest.clear_all_caches();

            let fields = self.xy_fields();
            let y_col = self.y_col();
            let rows = ops::get_instance_by_go_to_generation_id(tx, generation_id, &fields)?;
            if rows.is_empty() {
                return Ok(Outcome::Rollback(()));
            }
            let before_weak_correct = ops::get_correct_instance_count_by_go_to_generation_id(tx, generation_id)?;

            let training_rows: Vec<(i64, Vec<Value>)> = rows.iter().map(|(id, _, values)| (*id, values.clone())).collect();
            let df = dataframe_from_rows(&fields, &training_rows);
            let x_cols: Vec<usize> = (0..y_col).collect();
            let tree = TreeBuilder::default().build(&df, &x_cols, y_col);

            let mut predicted_node = Vec::with_capacity(df.rows());
            let mut predicted_label = Vec::with_capacity(df.rows());
            let mut after_correct = 0i64;
            for r in 0..df.rows() {
                let (node_id, label) = tree.predict_row_node(|col| df.get_raw(r, col))?;
                if label == df.get_raw(r, y_col).as_int().expect("y column is TextId-typed and always holds an integer label") {
                    after_correct += 1;
                }
                predicted_node.push(node_id);
                predicted_label.push(label);
            }

            if after_correct <= before_weak_correct {
                log::info!("rebuild: candidate for generation {generation_id} did not improve ({after_correct} <= {before_weak_correct}), discarded");
                return Ok(Outcome::Rollback(()));
            }

            let (_root_id, id_map) = forest::insert_tree(tx, generation_id, &tree)?;

            let mut before_cm: BTreeMap<(i64, i64), i64> = BTreeMap::new();
            let mut after_cm: BTreeMap<(i64, i64), i64> = BTreeMap::new();
            for (i, (instance_id, prior_label, values)) in rows.iter().enumerate() {
                let ground_truth = values[y_col].as_int().ok_or_else(|| Error::internal("y column value is not an integer label"))?;
                let predicted = predicted_label[i];
                let treenode_id = *id_map.get(&predicted_node[i]).ok_or_else(|| Error::internal("rebuild: predicted node missing from insertion map"))?;
                ops::update_instance_info_with_weak_count_increment(tx, *instance_id, treenode_id, predicted == ground_truth)?;
                *before_cm.entry((ground_truth, *prior_label)).or_insert(0) += 1;
                *after_cm.entry((ground_truth, predicted)).or_insert(0) += 1;
            }

            let rows_len = rows.len() as i64;
            ops::add_global_counts(tx, 0, 0, after_correct - before_weak_correct, rows_len)?;
            let after_global = ops::get_global(tx)?;
            let after_accuracy = if after_global.updated_instance_count != 0 { after_global.instance_correct_count as f64 / after_global.updated_instance_count as f64 } else { 0.0 };
            ops::set_global_instance_accuracy(tx, after_accuracy)?;

            let mut cm_keys: BTreeSet<(i64, i64)> = before_cm.keys().copied().collect();
            cm_keys.extend(after_cm.keys().copied());
            for key in cm_keys {
                let diff = after_cm.get(&key).copied().unwrap_or(0) - before_cm.get(&key).copied().unwrap_or(0);
                if diff != 0 {
                    ops::bump_global_confusion_matrix(tx, key.0, key.1, diff)?;
                }
            }

            let weak_instance_ratio = if before_global.updated_instance_count != 0 { rows_len as f64 / before_global.updated_instance_count as f64 } else { 0.0 };
            let before_weak_accuracy = before_weak_correct as f64 / rows_len as f64;
            let after_weak_accuracy = after_correct as f64 / rows_len as f64;
            ops::update_generation_etc(tx, generation_id, rows_len, rows_len, weak_instance_ratio, before_weak_accuracy, after_weak_accuracy, before_global.instance_accuracy, after_accuracy)?;

            log::info!("rebuild: generation {generation_id}, {rows_len} instances, accuracy {before_weak_accuracy:.3} -> {after_weak_accuracy:.3}");
            Ok(Outcome::Commit(()))
        })
    }

    // -------------------------------------------------------------- predict

    /// Predicts a label for a raw `{field name: text}` map, converting each
    /// value through the declared field type (spec §4.F "predict").
    pub fn predict(&self, x: &HashMap<String, String>) -> Result<PredictResult> {
        let x_fields = self.attributes.x_fields();
        let mut typed: HashMap<String, Value> = HashMap::with_capacity(x_fields.len());
        for (name, field_type) in &x_fields {
            let Some(raw) = x.get(name) else { continue };
            let value = match field_type {
                FieldType::Real => Value::Real(raw.parse::<f64>().map_err(|_| Error::InvalidDataType(format!("field {name:?}: {raw:?} is not a real number")))?),
                FieldType::TextId => {
                    let id = self.string_table.lock().expect("string table mutex poisoned").lookup_id(raw).ok_or_else(|| Error::InvalidDataType(format!("field {name:?}: unknown value {raw:?}")))?;
                    Value::Int(id as i64)
                }
                FieldType::Text => return Err(Error::NotSupportedYet("TEXT field type in predict input".into())),
                FieldType::Integer | FieldType::BigInt | FieldType::SmallInt => {
                    Value::Int(raw.parse::<i64>().map_err(|_| Error::InvalidDataType(format!("field {name:?}: {raw:?} is not an integer")))?)
                }
            };
            typed.insert(name.clone(), value);
        }
        self.predict_typed(&typed)
    }

    fn predict_typed(&self, x: &HashMap<String, Value>) -> Result<PredictResult> {
        self.storage.transaction(false, |tx| {
            let x_fields = self.attributes.x_fields();
            let outcome = self.forest.predict(tx, |idx| x.get(&x_fields[idx].0).copied(), |idx| x_fields[idx].0.clone())?;
            let (label_index, correct_count, total_count, accuracy) = match outcome {
                PredictOutcome::Leaf { label_index, correct_count, total_count, accuracy, .. } => (label_index, correct_count, total_count, accuracy),
                PredictOutcome::MiddleNode { label_index, correct_count, total_count, accuracy, .. } => (label_index, correct_count, total_count, accuracy),
                PredictOutcome::NotFound { .. } => return Err(Error::RuleNotMatched),
            };
            let label = self
                .string_table
                .lock()
                .expect("string table mutex poisoned")
                .lookup_text(label_index as i32)
                .map(str::to_string)
                .unwrap_or_default();
            Ok(Outcome::Commit(PredictResult { label, label_index, correct_count, total_count, accuracy }))
        })
    }

    // ----------------------------------------------------------- diagnostics

    /// Count/correct conservation and accuracy derivation (spec §3, §8;
    /// SPEC_FULL.md §9.3 "cache/store verification helpers").
    pub fn verify_global(&self) -> Result<()> {
        self.storage.transaction(false, |tx| {
            let global = ops::get_global(tx)?;
            let leaf_total = ops::get_sum_leaf_info_total_count(tx)?;
            let updated_instances = ops::get_updated_instance_count(tx)?;
            let cm_total: i64 = ops::get_global_confusion_matrix(tx)?.iter().map(|(_, _, c)| c).sum();
            if leaf_total != global.updated_instance_count || updated_instances != global.updated_instance_count || cm_total != global.updated_instance_count {
                return Err(Error::internal(format!(
                    "count conservation violated: leaf_info_total={leaf_total} instance_info_updated={updated_instances} \
                     confusion_matrix_total={cm_total} global.updated_instance_count={}",
                    global.updated_instance_count
                )));
            }

            let correct_instances = ops::get_instance_correct_count(tx)?;
            let cm_correct: i64 = ops::get_global_confusion_matrix(tx)?.iter().filter(|(a, p, _)| a == p).map(|(_, _, c)| c).sum();
            if correct_instances != global.instance_correct_count || cm_correct != global.instance_correct_count {
                return Err(Error::internal("correct conservation violated"));
            }

            let expected_accuracy = if global.updated_instance_count != 0 { global.instance_correct_count as f64 / global.updated_instance_count as f64 } else { 0.0 };
            if (expected_accuracy - global.instance_accuracy).abs() > 1e-9 {
                return Err(Error::internal("accuracy derivation violated"));
            }
            Ok(Outcome::Commit(()))
        })
    }

    /// Every cached treenode-children list still matches what storage would
    /// return fresh (SPEC_FULL.md §9.3).
    pub fn verify_cache(&self) -> Result<()> {
        self.storage.transaction(false, |tx| {
            for parent_id in self.forest.cached_parent_ids() {
                let cached = self.forest.children(tx, parent_id)?;
                let fresh = ops::get_treenode_children(tx, parent_id)?;
                if cached.len() != fresh.len() || cached.iter().zip(fresh.iter()).any(|(c, f)| c.id != f.id) {
                    return Err(Error::internal(format!("treenode cache mismatch for parent {parent_id}")));
                }
            }
            Ok(Outcome::Commit(()))
        })
    }
}

fn dataframe_from_rows(fields: &[(String, FieldType)], rows: &[(i64, Vec<Value>)]) -> Dataframe {
    let mut columns: Vec<(ColumnInfo, Vec<Value>)> = fields
        .iter()
        .map(|(name, field_type)| (ColumnInfo { name: name.clone(), field_type: *field_type }, Vec::with_capacity(rows.len())))
        .collect();
    for (_, values) in rows {
        for (col, value) in values.iter().enumerate() {
            columns[col].1.push(*value);
        }
    }
    Dataframe::new(columns)
}

/// `YYYYMMDDHHMMSS` as an integer, the format `chunk.datetime`/
/// `generation.datetime` store (spec §6 report.json `datetime_as_index`).
fn now_timestamp() -> i64 {
    chrono::Utc::now().format("%Y%m%d%H%M%S").to_string().parse().expect("formatted timestamp always parses as an integer")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldType;

    const WEATHER_CSV: &str = "outlook,temperature,play\n\
sunny,85,no\n\
sunny,80,no\n\
overcast,83,yes\n\
rainy,70,yes\n\
rainy,68,yes\n\
rainy,65,no\n\
overcast,64,yes\n\
sunny,72,no\n\
sunny,69,yes\n\
rainy,75,yes\n\
sunny,75,yes\n\
overcast,72,yes\n\
overcast,81,yes\n\
rainy,71,no\n";

    fn setup_weather_project() -> (tempfile::TempDir, Controller) {
        let dir = tempfile::tempdir().expect("tempdir");
        crate::project::create(dir.path()).unwrap();
        crate::project::add_field(dir.path(), "outlook", FieldType::TextId).unwrap();
        crate::project::add_field(dir.path(), "temperature", FieldType::Real).unwrap();
        crate::project::add_field(dir.path(), "play", FieldType::TextId).unwrap();
        crate::project::x(dir.path(), &["outlook".to_string(), "temperature".to_string()]).unwrap();
        crate::project::y(dir.path(), "play").unwrap();
        let controller = Controller::open(dir.path()).unwrap();
        (dir, controller)
    }

    #[test]
    fn insert_update_predict_round_trip() {
        let (dir, controller) = setup_weather_project();
        let csv_path = dir.path().join("chunk1.csv");
        std::fs::write(&csv_path, WEATHER_CSV).unwrap();

        controller.insert_chunk_csv(&csv_path).unwrap();
        controller.update().unwrap();
        controller.verify_global().unwrap();
        controller.verify_cache().unwrap();

        let mut x = HashMap::new();
        x.insert("outlook".to_string(), "sunny".to_string());
        x.insert("temperature".to_string(), "85".to_string());
        let result = controller.predict(&x).unwrap();
        assert!(!result.label.is_empty());
    }

    #[test]
    fn second_identical_chunk_updates_without_rebuild_drift() {
        let (dir, controller) = setup_weather_project();
        let csv_path = dir.path().join("chunk1.csv");
        std::fs::write(&csv_path, WEATHER_CSV).unwrap();
        controller.insert_chunk_csv(&csv_path).unwrap();
        controller.update().unwrap();

        let csv_path2 = dir.path().join("chunk2.csv");
        std::fs::write(&csv_path2, WEATHER_CSV).unwrap();
        controller.insert_chunk_csv(&csv_path2).unwrap();
        controller.update().unwrap();
        controller.verify_global().unwrap();

        controller.rebuild().unwrap();
        controller.verify_global().unwrap();
    }

    #[test]
    fn unseen_nominal_value_extends_tree_dynamically() {
        let (dir, controller) = setup_weather_project();
        let csv_path = dir.path().join("chunk1.csv");
        std::fs::write(&csv_path, WEATHER_CSV).unwrap();
        controller.insert_chunk_csv(&csv_path).unwrap();
        controller.update().unwrap();

        let csv_path2 = dir.path().join("chunk2.csv");
        std::fs::write(&csv_path2, "outlook,temperature,play\nfoggy,77,yes\n").unwrap();
        controller.insert_chunk_csv(&csv_path2).unwrap();
        controller.update().unwrap();
        controller.verify_global().unwrap();
    }

    #[test]
    fn predict_before_any_tree_exists_is_rule_not_matched() {
        let (_dir, controller) = setup_weather_project();
        let mut x = HashMap::new();
        x.insert("outlook".to_string(), "sunny".to_string());
        x.insert("temperature".to_string(), "85".to_string());
        assert!(controller.predict(&x).is_err());
    }

    #[test]
    fn chunk_limit_evicts_oldest_chunk_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        crate::project::create(dir.path()).unwrap();
        crate::project::add_field(dir.path(), "outlook", FieldType::TextId).unwrap();
        crate::project::add_field(dir.path(), "temperature", FieldType::Real).unwrap();
        crate::project::add_field(dir.path(), "play", FieldType::TextId).unwrap();
        crate::project::x(dir.path(), &["outlook".to_string(), "temperature".to_string()]).unwrap();
        crate::project::y(dir.path(), "play").unwrap();
        crate::project::set_property(dir.path(), "limit.chunk.use", "true").unwrap();
        crate::project::set_property(dir.path(), "limit.chunk.instance_lower_bound", "14").unwrap();
        crate::project::set_property(dir.path(), "limit.chunk.instance_upper_bound", "20").unwrap();
        let controller = Controller::open(dir.path()).unwrap();

        let csv_path = dir.path().join("chunk1.csv");
        std::fs::write(&csv_path, WEATHER_CSV).unwrap();
        controller.insert_chunk_csv(&csv_path).unwrap();
        controller.update().unwrap();

        let csv_path2 = dir.path().join("chunk2.csv");
        std::fs::write(&csv_path2, WEATHER_CSV).unwrap();
        controller.insert_chunk_csv(&csv_path2).unwrap();

        controller
            .storage
            .transaction(false, |tx| {
                let global = ops::get_global(tx)?;
                assert!(global.instance_count < 28);
                assert!(global.instance_count >= 14);
                Ok(Outcome::Commit(()))
            })
            .unwrap();
    }
}

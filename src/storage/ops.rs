//! SQL operations over the ten-table schema, grounded on the query surface
//! of `supul_t::model`/`db::base` in `model.hpp`. Free functions taking
//! `&rusqlite::Connection` (a `Transaction` derefs to one) rather than
//! methods on [`super::Storage`], since every call happens inside a
//! [`super::Storage::transaction`] closure.

use crate::error::{Error, Result};
use crate::tree::{Rule, RuleType, ValueType};
use crate::value::{FieldType, Value};
use rusqlite::{params, Connection, OptionalExtension};

use super::schema::*;

// ---------------------------------------------------------------- global

pub struct GlobalRow {
    pub instance_count: i64,
    pub updated_instance_count: i64,
    pub instance_correct_count: i64,
    pub instance_accuracy: f64,
    pub acc_weak_instance_count: i64,
}

pub fn get_global(conn: &Connection) -> Result<GlobalRow> {
    conn.query_row(
        "SELECT instance_count, updated_instance_count, instance_correct_count, instance_accuracy, acc_weak_instance_count FROM global WHERE id = 1",
        [],
        |row| {
            Ok(GlobalRow {
                instance_count: row.get(0)?,
                updated_instance_count: row.get(1)?,
                instance_correct_count: row.get(2)?,
                instance_accuracy: row.get(3)?,
                acc_weak_instance_count: row.get(4)?,
            })
        },
    )
    .map_err(Error::from)
}

/// Adds (can be negative, for `remove_chunk`) to the four accumulator
/// columns in one statement.
pub fn add_global_counts(
    conn: &Connection,
    instance_count_delta: i64,
    updated_instance_count_delta: i64,
    instance_correct_count_delta: i64,
    acc_weak_instance_count_delta: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE global SET instance_count = instance_count + ?1, updated_instance_count = updated_instance_count + ?2, \
         instance_correct_count = instance_correct_count + ?3, acc_weak_instance_count = acc_weak_instance_count + ?4 WHERE id = 1",
        params![instance_count_delta, updated_instance_count_delta, instance_correct_count_delta, acc_weak_instance_count_delta],
    )?;
    Ok(())
}

pub fn set_global_instance_accuracy(conn: &Connection, accuracy: f64) -> Result<()> {
    conn.execute("UPDATE global SET instance_accuracy = ?1 WHERE id = 1", params![accuracy])?;
    Ok(())
}

pub fn set_global_updated_instance_count(conn: &Connection, value: i64) -> Result<()> {
    conn.execute("UPDATE global SET updated_instance_count = ?1 WHERE id = 1", params![value])?;
    Ok(())
}

pub fn set_global_absolute(conn: &Connection, g: &GlobalRow) -> Result<()> {
    conn.execute(
        "UPDATE global SET instance_count = ?1, updated_instance_count = ?2, instance_correct_count = ?3, \
         instance_accuracy = ?4, acc_weak_instance_count = ?5 WHERE id = 1",
        params![g.instance_count, g.updated_instance_count, g.instance_correct_count, g.instance_accuracy, g.acc_weak_instance_count],
    )?;
    Ok(())
}

// ----------------------------------------------------------------- chunk

pub fn add_chunk(conn: &Connection, datetime: i64) -> Result<i64> {
    conn.execute("INSERT INTO chunk (datetime, updated, initial_correct_count, total_count, initial_accuracy) VALUES (?1, 0, 0, 0, 0.0)", params![datetime])?;
    Ok(conn.last_insert_rowid())
}

pub fn update_chunk_total_count(conn: &Connection, chunk_id: i64, total_count: i64) -> Result<()> {
    conn.execute("UPDATE chunk SET total_count = ?1 WHERE id = ?2", params![total_count, chunk_id])?;
    Ok(())
}

pub fn update_chunk(conn: &Connection, chunk_id: i64, updated: bool, correct_count: i64, total_count: i64, accuracy: f64) -> Result<()> {
    conn.execute(
        "UPDATE chunk SET updated = ?1, initial_correct_count = ?2, total_count = ?3, initial_accuracy = ?4 WHERE id = ?5",
        params![updated as i64, correct_count, total_count, accuracy, chunk_id],
    )?;
    Ok(())
}

pub fn get_not_updated_chunk_ids(conn: &Connection) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM chunk WHERE updated = 0 ORDER BY id")?;
    let ids = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<Vec<i64>>>()?;
    Ok(ids)
}

/// Oldest-first `(chunk_id, total_count)`, used by `chunk_limit`'s eviction sweep.
pub fn get_chunk_list_oldest_first(conn: &Connection) -> Result<Vec<(i64, i64)>> {
    let mut stmt = conn.prepare("SELECT id, total_count FROM chunk ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_chunk_updated(conn: &Connection, chunk_id: i64) -> Result<bool> {
    let updated: i64 = conn.query_row("SELECT updated FROM chunk WHERE id = ?1", params![chunk_id], |row| row.get(0))?;
    Ok(updated != 0)
}

pub fn get_total_count_by_chunk_id(conn: &Connection, chunk_id: i64) -> Result<i64> {
    conn.query_row("SELECT total_count FROM chunk WHERE id = ?1", params![chunk_id], |row| row.get(0)).map_err(Error::from)
}

pub fn delete_instance_by_chunk_id(conn: &Connection, chunk_id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM instance WHERE id IN (SELECT ref_instance_id FROM instance_info WHERE ref_chunk_id = ?1)",
        params![chunk_id],
    )?;
    Ok(())
}

pub fn delete_instance_info_by_chunk_id(conn: &Connection, chunk_id: i64) -> Result<()> {
    conn.execute("DELETE FROM instance_info WHERE ref_chunk_id = ?1", params![chunk_id])?;
    Ok(())
}

pub fn delete_chunk_by_id(conn: &Connection, chunk_id: i64) -> Result<()> {
    conn.execute("DELETE FROM chunk WHERE id = ?1", params![chunk_id])?;
    Ok(())
}

// --------------------------------------------------------------- instance

fn value_to_sql(v: Value) -> rusqlite::types::Value {
    match v {
        Value::Int(i) => rusqlite::types::Value::Integer(i),
        Value::Real(r) => rusqlite::types::Value::Real(r),
    }
}

fn sql_to_value(v: rusqlite::types::ValueRef, field_type: FieldType) -> Value {
    match field_type {
        FieldType::Real => Value::Real(v.as_f64().unwrap_or(0.0)),
        _ => Value::Int(v.as_i64().unwrap_or(0)),
    }
}

pub fn add_instance(conn: &Connection, fields: &[(String, FieldType)], values: &[Value]) -> Result<i64> {
    let columns: Vec<String> = fields.iter().map(|(name, _)| format!("\"{name}\"")).collect();
    let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("?{i}")).collect();
    let sql = format!("INSERT INTO instance ({}) VALUES ({})", columns.join(", "), placeholders.join(", "));
    let boxed: Vec<Box<dyn rusqlite::ToSql>> = values.iter().map(|v| Box::new(value_to_sql(*v)) as Box<dyn rusqlite::ToSql>).collect();
    let refs: Vec<&dyn rusqlite::ToSql> = boxed.iter().map(|b| b.as_ref()).collect();
    conn.execute(&sql, refs.as_slice())?;
    Ok(conn.last_insert_rowid())
}

pub fn add_instance_info(conn: &Connection, instance_id: i64, chunk_id: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO instance_info (ref_instance_id, ref_chunk_id, ref_leaf_treenode_id, weak_count, correct) VALUES (?1, ?2, NULL, 0, NULL)",
        params![instance_id, chunk_id],
    )?;
    Ok(conn.last_insert_rowid())
}

fn select_columns_sql(fields: &[(String, FieldType)]) -> String {
    fields.iter().map(|(name, _)| format!("instance.\"{name}\"")).collect::<Vec<_>>().join(", ")
}

fn read_row(row: &rusqlite::Row, fields: &[(String, FieldType)], offset: usize) -> rusqlite::Result<Vec<Value>> {
    fields
        .iter()
        .enumerate()
        .map(|(i, (_, field_type))| row.get_ref(offset + i).map(|v| sql_to_value(v, *field_type)))
        .collect()
}

/// `(instance.id, x+y values)` for every instance not yet covered by an
/// `instance_info.correct` prediction (spec §4.F "update").
pub fn get_not_updated_instance(conn: &Connection, fields: &[(String, FieldType)]) -> Result<Vec<(i64, Vec<Value>)>> {
    let sql = format!(
        "SELECT instance.id, {} FROM instance JOIN instance_info ON instance_info.ref_instance_id = instance.id WHERE instance_info.correct IS NULL",
        select_columns_sql(fields)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)?, read_row(row, fields, 1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_instance_by_chunk_id(conn: &Connection, chunk_id: i64, fields: &[(String, FieldType)]) -> Result<Vec<(i64, Vec<Value>)>> {
    let sql = format!(
        "SELECT instance.id, {} FROM instance JOIN instance_info ON instance_info.ref_instance_id = instance.id WHERE instance_info.ref_chunk_id = ?1",
        select_columns_sql(fields)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![chunk_id], |row| Ok((row.get::<_, i64>(0)?, read_row(row, fields, 1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// `(instance.id, prior leaf label, x+y values)` for instances whose current
/// leaf routes through a `go_to_generation` leaf pointing at `generation_id`
/// (spec §4.F "rebuild").
pub fn get_instance_by_go_to_generation_id(conn: &Connection, generation_id: i64, fields: &[(String, FieldType)]) -> Result<Vec<(i64, i64, Vec<Value>)>> {
    let sql = format!(
        "SELECT instance.id, leaf_info.label_index, {} \
         FROM instance \
         JOIN instance_info ON instance_info.ref_instance_id = instance.id \
         JOIN treenode ON treenode.id = instance_info.ref_leaf_treenode_id \
         JOIN leaf_info ON leaf_info.id = treenode.ref_leaf_info_id \
         WHERE leaf_info.go_to_ref_generation_id = ?1",
        select_columns_sql(fields)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![generation_id], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, read_row(row, fields, 2)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_correct_instance_count_by_go_to_generation_id(conn: &Connection, generation_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM instance_info \
         JOIN treenode ON treenode.id = instance_info.ref_leaf_treenode_id \
         JOIN leaf_info ON leaf_info.id = treenode.ref_leaf_info_id \
         WHERE leaf_info.go_to_ref_generation_id = ?1 AND instance_info.correct = 1",
        params![generation_id],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

pub fn update_instance_info(conn: &Connection, instance_id: i64, leaf_treenode_id: i64, correct: bool) -> Result<()> {
    conn.execute(
        "UPDATE instance_info SET ref_leaf_treenode_id = ?1, correct = ?2 WHERE ref_instance_id = ?3",
        params![leaf_treenode_id, correct as i64, instance_id],
    )?;
    Ok(())
}

pub fn update_instance_info_with_weak_count_increment(conn: &Connection, instance_id: i64, leaf_treenode_id: i64, correct: bool) -> Result<()> {
    conn.execute(
        "UPDATE instance_info SET ref_leaf_treenode_id = ?1, correct = ?2, weak_count = weak_count + 1 WHERE ref_instance_id = ?3",
        params![leaf_treenode_id, correct as i64, instance_id],
    )?;
    Ok(())
}

// ------------------------------------------------------------- generation

pub fn add_generation(conn: &Connection, datetime: i64) -> Result<i64> {
    conn.execute("INSERT INTO generation (datetime, root_ref_treenode_id) VALUES (?1, NULL)", params![datetime])?;
    Ok(conn.last_insert_rowid())
}

pub fn update_generation_root(conn: &Connection, generation_id: i64, root_ref_treenode_id: i64) -> Result<()> {
    conn.execute("UPDATE generation SET root_ref_treenode_id = ?1 WHERE id = ?2", params![root_ref_treenode_id, generation_id])?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn update_generation_etc(
    conn: &Connection,
    generation_id: i64,
    instance_count: i64,
    weak_instance_count: i64,
    weak_instance_ratio: f64,
    before_weak_instance_accuracy: f64,
    after_weak_instance_accuracy: f64,
    before_instance_accuracy: f64,
    after_instance_accuracy: f64,
) -> Result<()> {
    conn.execute(
        "UPDATE generation SET instance_count = ?1, weak_instance_count = ?2, weak_instance_ratio = ?3, \
         before_weak_instance_accuracy = ?4, after_weak_instance_accuracy = ?5, before_instance_accuracy = ?6, after_instance_accuracy = ?7 \
         WHERE id = ?8",
        params![
            instance_count,
            weak_instance_count,
            weak_instance_ratio,
            before_weak_instance_accuracy,
            after_weak_instance_accuracy,
            before_instance_accuracy,
            after_instance_accuracy,
            generation_id
        ],
    )?;
    Ok(())
}

pub fn get_is_generation_empty(conn: &Connection) -> Result<bool> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM generation", [], |row| row.get(0))?;
    Ok(count == 0)
}

pub fn get_root_ref_treenode_id(conn: &Connection, generation_id: i64) -> Result<i64> {
    conn.query_row("SELECT root_ref_treenode_id FROM generation WHERE id = ?1", params![generation_id], |row| row.get(0)).map_err(Error::from)
}

pub fn get_first_root_ref_treenode_id(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT root_ref_treenode_id FROM generation ORDER BY id ASC LIMIT 1", [], |row| row.get(0)).map_err(Error::from)
}

pub fn get_generation_id_by_treenode_id(conn: &Connection, treenode_id: i64) -> Result<i64> {
    conn.query_row("SELECT ref_generation_id FROM treenode WHERE id = ?1", params![treenode_id], |row| row.get(0)).map_err(Error::from)
}

// -------------------------------------------------------------- rule/leaf

fn rule_type_tag(t: RuleType) -> i64 {
    match t {
        RuleType::Equal => RULE_TYPE_EQUAL,
        RuleType::Le => RULE_TYPE_LE,
        RuleType::Lt => RULE_TYPE_LT,
        RuleType::Gt => RULE_TYPE_GT,
        RuleType::Ge => RULE_TYPE_GE,
    }
}

fn rule_type_from_tag(tag: i64) -> Result<RuleType> {
    match tag {
        RULE_TYPE_EQUAL => Ok(RuleType::Equal),
        RULE_TYPE_LE => Ok(RuleType::Le),
        RULE_TYPE_LT => Ok(RuleType::Lt),
        RULE_TYPE_GT => Ok(RuleType::Gt),
        RULE_TYPE_GE => Ok(RuleType::Ge),
        other => Err(Error::internal(format!("unknown rule_type tag {other}"))),
    }
}

pub fn add_rule(conn: &Connection, rule: &Rule) -> Result<i64> {
    let value_type = match rule.value_type {
        ValueType::Integer => VALUE_TYPE_INTEGER,
        ValueType::Real => VALUE_TYPE_REAL,
    };
    conn.execute(
        "INSERT INTO rule (feature_index, rule_type, value_type, value_integer, value_real) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![rule.feature_index as i64, rule_type_tag(rule.rule_type), value_type, rule.value_integer, rule.value_real],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Duplicates a rule row, used when extending the tree for an unseen
/// nominal value (spec §4.F "dynamic rule extension").
pub fn copy_rule(conn: &Connection, rule_id: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO rule (feature_index, rule_type, value_type, value_integer, value_real) \
         SELECT feature_index, rule_type, value_type, value_integer, value_real FROM rule WHERE id = ?1",
        params![rule_id],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_rule_value_integer(conn: &Connection, rule_id: i64, value: i64) -> Result<()> {
    conn.execute("UPDATE rule SET value_integer = ?1 WHERE id = ?2", params![value, rule_id])?;
    Ok(())
}

pub fn add_leaf_info(conn: &Connection, label_index: i64, leaf_type: i64, go_to_ref_generation_id: Option<i64>, correct_count: i64, total_count: i64, accuracy: f64) -> Result<i64> {
    conn.execute(
        "INSERT INTO leaf_info (label_index, type, go_to_ref_generation_id, correct_count, total_count, accuracy) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![label_index, leaf_type, go_to_ref_generation_id, correct_count, total_count, accuracy],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_leaf_info(conn: &Connection, leaf_info_id: i64, increment_correct_count: i64, increment_total_count: i64) -> Result<()> {
    conn.execute(
        "UPDATE leaf_info SET correct_count = correct_count + ?1, total_count = total_count + ?2, \
         accuracy = CAST(correct_count + ?1 AS REAL) / (total_count + ?2) WHERE id = ?3",
        params![increment_correct_count, increment_total_count, leaf_info_id],
    )?;
    Ok(())
}

/// Flips every `leaf` whose `(accuracy, total_count)` satisfies the weak
/// condition into `go_to_generation`, returning the affected leaf_info ids
/// (spec §4.F "weak-leaf detection").
pub fn update_leaf_info_by_go_to_generation_id(conn: &Connection, generation_id: i64, accuracy_upper: f64, total_lower: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare("SELECT id FROM leaf_info WHERE type = ?1 AND accuracy <= ?2 AND total_count >= ?3")?;
    let ids: Vec<i64> = stmt.query_map(params![LEAF_INFO_TYPE_LEAF, accuracy_upper, total_lower], |row| row.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
    conn.execute(
        "UPDATE leaf_info SET type = ?1, go_to_ref_generation_id = ?2 WHERE type = ?3 AND accuracy <= ?4 AND total_count >= ?5",
        params![LEAF_INFO_TYPE_GO_TO_GENERATION, generation_id, LEAF_INFO_TYPE_LEAF, accuracy_upper, total_lower],
    )?;
    Ok(ids)
}

pub fn get_weak_treenode_ids(conn: &Connection, accuracy_upper: f64, total_lower: i64) -> Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT treenode.id FROM treenode JOIN leaf_info ON leaf_info.id = treenode.ref_leaf_info_id \
         WHERE leaf_info.type = ?1 AND leaf_info.accuracy <= ?2 AND leaf_info.total_count >= ?3",
    )?;
    let ids = stmt.query_map(params![LEAF_INFO_TYPE_LEAF, accuracy_upper, total_lower], |row| row.get(0))?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

// ------------------------------------------------------------- treenode

#[derive(Clone)]
pub struct RuleRow {
    pub id: i64,
    pub feature_index: i64,
    pub rule_type: RuleType,
    pub value_type: ValueType,
    pub value_integer: i64,
    pub value_real: f64,
}

#[derive(Clone)]
pub struct LeafInfoRow {
    pub id: i64,
    pub label_index: i64,
    pub is_go_to_generation: bool,
    pub go_to_ref_generation_id: Option<i64>,
    pub correct_count: i64,
    pub total_count: i64,
    pub accuracy: f64,
}

#[derive(Clone)]
pub struct TreeNodeRow {
    pub id: i64,
    pub rule: Option<RuleRow>,
    pub leaf_info: Option<LeafInfoRow>,
}

impl TreeNodeRow {
    pub fn is_leaf_node(&self) -> bool {
        self.leaf_info.is_some()
    }
}

pub fn add_treenode(conn: &Connection, generation_id: i64, parent_treenode_id: Option<i64>, rule_id: Option<i64>, leaf_info_id: Option<i64>) -> Result<i64> {
    conn.execute(
        "INSERT INTO treenode (ref_generation_id, ref_parent_treenode_id, ref_rule_id, ref_leaf_info_id) VALUES (?1, ?2, ?3, ?4)",
        params![generation_id, parent_treenode_id, rule_id, leaf_info_id],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Every child of `parent_treenode_id`, LEFT-joined with its rule and
/// leaf_info (only a leaf carries `leaf_info`).
pub fn get_treenode_children(conn: &Connection, parent_treenode_id: i64) -> Result<Vec<TreeNodeRow>> {
    let mut stmt = conn.prepare(
        "SELECT treenode.id, \
                rule.id, rule.feature_index, rule.rule_type, rule.value_type, rule.value_integer, rule.value_real, \
                leaf_info.id, leaf_info.label_index, leaf_info.type, leaf_info.go_to_ref_generation_id, leaf_info.correct_count, leaf_info.total_count, leaf_info.accuracy \
         FROM treenode \
         LEFT JOIN rule ON rule.id = treenode.ref_rule_id \
         LEFT JOIN leaf_info ON leaf_info.id = treenode.ref_leaf_info_id \
         WHERE treenode.ref_parent_treenode_id = ?1",
    )?;
    let rows = stmt
        .query_map(params![parent_treenode_id], |row| {
            let rule = match row.get::<_, Option<i64>>(1)? {
                None => None,
                Some(rule_id) => Some(RuleRow {
                    id: rule_id,
                    feature_index: row.get(2)?,
                    rule_type: rule_type_from_tag(row.get(3)?).unwrap_or(RuleType::Equal),
                    value_type: if row.get::<_, i64>(4)? == VALUE_TYPE_REAL { ValueType::Real } else { ValueType::Integer },
                    value_integer: row.get(5)?,
                    value_real: row.get(6)?,
                }),
            };
            let leaf_info = match row.get::<_, Option<i64>>(7)? {
                None => None,
                Some(id) => Some(LeafInfoRow {
                    id,
                    label_index: row.get(8)?,
                    is_go_to_generation: row.get::<_, i64>(9)? == LEAF_INFO_TYPE_GO_TO_GENERATION,
                    go_to_ref_generation_id: row.get(10)?,
                    correct_count: row.get(11)?,
                    total_count: row.get(12)?,
                    accuracy: row.get(13)?,
                }),
            };
            Ok(TreeNodeRow { id: row.get(0)?, rule, leaf_info })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// -------------------------------------------------------------- strings

pub fn get_string_table_max_id(conn: &Connection) -> Result<i32> {
    let max: Option<i32> = conn.query_row("SELECT MAX(id) FROM string_table", [], |row| row.get(0)).optional()?.flatten();
    Ok(max.unwrap_or(-1))
}

pub fn insert_string_table_entries(conn: &Connection, entries: &[(i32, &str)]) -> Result<()> {
    for (id, text) in entries {
        conn.execute("INSERT INTO string_table (id, text) VALUES (?1, ?2)", params![id, text])?;
    }
    Ok(())
}

pub fn load_string_table_entries(conn: &Connection) -> Result<Vec<(i32, String)>> {
    let mut stmt = conn.prepare("SELECT id, text FROM string_table ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ---------------------------------------------------------- confusion matrix

pub fn get_global_confusion_matrix(conn: &Connection) -> Result<Vec<(i64, i64, i64)>> {
    let mut stmt = conn.prepare("SELECT actual, predicted, count FROM global_confusion_matrix")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Returns `false` (and updates nothing) if no row exists yet for this
/// `(actual, predicted)` pair — the caller then calls
/// [`add_global_confusion_matrix_item`] and retries.
pub fn update_global_confusion_matrix_item_increment(conn: &Connection, actual: i64, predicted: i64, increment: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE global_confusion_matrix SET count = count + ?1 WHERE actual = ?2 AND predicted = ?3",
        params![increment, actual, predicted],
    )?;
    Ok(changed > 0)
}

pub fn add_global_confusion_matrix_item(conn: &Connection, actual: i64, predicted: i64) -> Result<()> {
    conn.execute("INSERT OR IGNORE INTO global_confusion_matrix (actual, predicted, count) VALUES (?1, ?2, 0)", params![actual, predicted])?;
    Ok(())
}

/// Increments-or-inserts in one call, mirroring the retry pattern every
/// confusion-matrix update site in `model.hpp` repeats inline.
pub fn bump_global_confusion_matrix(conn: &Connection, actual: i64, predicted: i64, increment: i64) -> Result<()> {
    if !update_global_confusion_matrix_item_increment(conn, actual, predicted, increment)? {
        add_global_confusion_matrix_item(conn, actual, predicted)?;
        if !update_global_confusion_matrix_item_increment(conn, actual, predicted, increment)? {
            return Err(Error::internal("failed to update global_confusion_matrix after insert"));
        }
    }
    Ok(())
}

// ------------------------------------------------------------- diagnostics

pub fn get_sum_leaf_info_total_count(conn: &Connection) -> Result<i64> {
    let v: Option<i64> = conn.query_row("SELECT SUM(total_count) FROM leaf_info", [], |row| row.get(0))?;
    Ok(v.unwrap_or(0))
}

pub fn get_sum_weak_count(conn: &Connection) -> Result<i64> {
    let v: Option<i64> = conn.query_row("SELECT SUM(weak_count) FROM instance_info", [], |row| row.get(0))?;
    Ok(v.unwrap_or(0))
}

pub fn get_instance_count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM instance", [], |row| row.get(0)).map_err(Error::from)
}

pub fn get_updated_instance_count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM instance_info WHERE correct IS NOT NULL", [], |row| row.get(0)).map_err(Error::from)
}

pub fn get_instance_correct_count(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM instance_info WHERE correct = 1", [], |row| row.get(0)).map_err(Error::from)
}

/// Full chunk history, oldest first (`report.json`'s `chunk_history` category).
pub struct ChunkHistoryRow {
    pub id: i64,
    pub datetime: i64,
    pub updated: bool,
    pub correct_count: i64,
    pub total_count: i64,
    pub accuracy: f64,
}

pub fn get_chunk_history(conn: &Connection) -> Result<Vec<ChunkHistoryRow>> {
    let mut stmt = conn.prepare("SELECT id, datetime, updated, initial_correct_count, total_count, initial_accuracy FROM chunk ORDER BY id ASC")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ChunkHistoryRow {
                id: row.get(0)?,
                datetime: row.get(1)?,
                updated: row.get::<_, i64>(2)? != 0,
                correct_count: row.get(3)?,
                total_count: row.get(4)?,
                accuracy: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Full generation history, oldest first (`report.json`'s `generation_history` category).
pub struct GenerationHistoryRow {
    pub id: i64,
    pub datetime: i64,
    pub instance_count: i64,
    pub weak_instance_count: i64,
    pub weak_instance_ratio: f64,
    pub before_weak_instance_accuracy: f64,
    pub after_weak_instance_accuracy: f64,
    pub before_instance_accuracy: f64,
    pub after_instance_accuracy: f64,
}

pub fn get_generation_history(conn: &Connection) -> Result<Vec<GenerationHistoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, datetime, instance_count, weak_instance_count, weak_instance_ratio, \
                before_weak_instance_accuracy, after_weak_instance_accuracy, before_instance_accuracy, after_instance_accuracy \
         FROM generation ORDER BY id ASC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(GenerationHistoryRow {
                id: row.get(0)?,
                datetime: row.get(1)?,
                instance_count: row.get(2)?,
                weak_instance_count: row.get(3)?,
                weak_instance_ratio: row.get(4)?,
                before_weak_instance_accuracy: row.get(5)?,
                after_weak_instance_accuracy: row.get(6)?,
                before_instance_accuracy: row.get(7)?,
                after_instance_accuracy: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// `(leaf_info_id, actual, predicted, weak_count)` for every instance in a
/// chunk, used by `remove_chunk` to subtract its contribution from the
/// global confusion matrix and leaf_info counters.
pub fn get_leaf_info_by_chunk_id(conn: &Connection, chunk_id: i64, y_field: &str) -> Result<Vec<(i64, i64, i64, i64)>> {
    let sql = format!(
        "SELECT leaf_info.id, instance.\"{y_field}\", leaf_info.label_index, instance_info.weak_count \
         FROM instance_info \
         JOIN treenode ON treenode.id = instance_info.ref_leaf_treenode_id \
         JOIN leaf_info ON leaf_info.id = treenode.ref_leaf_info_id \
         JOIN instance ON instance.id = instance_info.ref_instance_id \
         WHERE instance_info.ref_chunk_id = ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![chunk_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

//! Fixed ten-table schema (spec §3), grounded verbatim on
//! `supul::db::schema` (`schema.hpp`). Table/column names and the
//! `leaf_info.type`/`predict_status` tag values are constants rather than
//! an enum-driven DDL generator — the table set is closed and never grows
//! at runtime, unlike the C++ source's `type::table` array indexing.

use crate::value::FieldType;

pub const TABLE_INSTANCE: &str = "instance";
pub const TABLE_INSTANCE_INFO: &str = "instance_info";
pub const TABLE_CHUNK: &str = "chunk";
pub const TABLE_GENERATION: &str = "generation";
pub const TABLE_TREENODE: &str = "treenode";
pub const TABLE_RULE: &str = "rule";
pub const TABLE_LEAF_INFO: &str = "leaf_info";
pub const TABLE_STRING_TABLE: &str = "string_table";
pub const TABLE_GLOBAL: &str = "global";
pub const TABLE_GLOBAL_CONFUSION_MATRIX: &str = "global_confusion_matrix";

/// `leaf_info.type` (spec §3 Rule/leaf tag).
pub const LEAF_INFO_TYPE_LEAF: i64 = 1;
pub const LEAF_INFO_TYPE_GO_TO_GENERATION: i64 = 2;

/// `rule.rule_type`/`rule.value_type` tags, matching [`crate::tree::RuleType`]/
/// [`crate::tree::ValueType`]'s discriminant order.
pub const RULE_TYPE_EQUAL: i64 = 0;
pub const RULE_TYPE_LE: i64 = 1;
pub const RULE_TYPE_LT: i64 = 2;
pub const RULE_TYPE_GT: i64 = 3;
pub const RULE_TYPE_GE: i64 = 4;

pub const VALUE_TYPE_INTEGER: i64 = 0;
pub const VALUE_TYPE_REAL: i64 = 1;

pub const SCHEMA_VERSION: i64 = 1;

pub fn sql_field_type(t: FieldType) -> &'static str {
    match t {
        FieldType::Integer | FieldType::BigInt | FieldType::SmallInt | FieldType::TextId => "INTEGER",
        FieldType::Real => "REAL",
        FieldType::Text => "TEXT",
    }
}

/// Builds the `CREATE TABLE instance (...)` statement from the declared
/// attributes fields (spec §3 "Instance"); every other table's DDL is fixed.
pub fn create_instance_table_sql(fields: &[(String, FieldType)]) -> String {
    let mut cols = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for (name, field_type) in fields {
        cols.push(format!("\"{}\" {} NOT NULL", name, sql_field_type(*field_type)));
    }
    format!("CREATE TABLE IF NOT EXISTS instance ({})", cols.join(", "))
}

pub const CREATE_INSTANCE_INFO_TABLE: &str = "
CREATE TABLE IF NOT EXISTS instance_info (
    id INTEGER PRIMARY KEY,
    ref_instance_id INTEGER NOT NULL,
    ref_chunk_id INTEGER NOT NULL,
    ref_leaf_treenode_id INTEGER,
    weak_count INTEGER NOT NULL DEFAULT 0,
    correct INTEGER
);
CREATE INDEX IF NOT EXISTS idx_instance_info_ref_instance_id ON instance_info(ref_instance_id);
CREATE INDEX IF NOT EXISTS idx_instance_info_ref_chunk_id ON instance_info(ref_chunk_id);
CREATE INDEX IF NOT EXISTS idx_instance_info_ref_leaf_treenode_id ON instance_info(ref_leaf_treenode_id);
";

pub const CREATE_CHUNK_TABLE: &str = "
CREATE TABLE IF NOT EXISTS chunk (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    datetime INTEGER NOT NULL,
    updated INTEGER NOT NULL DEFAULT 0,
    initial_correct_count INTEGER NOT NULL DEFAULT 0,
    total_count INTEGER NOT NULL DEFAULT 0,
    initial_accuracy REAL NOT NULL DEFAULT 0.0
);
CREATE INDEX IF NOT EXISTS idx_chunk_updated ON chunk(updated);
";

pub const CREATE_GENERATION_TABLE: &str = "
CREATE TABLE IF NOT EXISTS generation (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    datetime INTEGER NOT NULL,
    root_ref_treenode_id INTEGER,
    instance_count INTEGER NOT NULL DEFAULT 0,
    weak_instance_count INTEGER NOT NULL DEFAULT 0,
    weak_instance_ratio REAL NOT NULL DEFAULT 0.0,
    before_weak_instance_accuracy REAL NOT NULL DEFAULT 0.0,
    after_weak_instance_accuracy REAL NOT NULL DEFAULT 0.0,
    before_instance_accuracy REAL NOT NULL DEFAULT 0.0,
    after_instance_accuracy REAL NOT NULL DEFAULT 0.0
);
";

pub const CREATE_TREENODE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS treenode (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ref_generation_id INTEGER NOT NULL,
    ref_parent_treenode_id INTEGER,
    ref_rule_id INTEGER,
    ref_leaf_info_id INTEGER
);
CREATE INDEX IF NOT EXISTS idx_treenode_ref_rule_id ON treenode(ref_rule_id);
CREATE INDEX IF NOT EXISTS idx_treenode_ref_leaf_info_id ON treenode(ref_leaf_info_id);
CREATE INDEX IF NOT EXISTS idx_treenode_ref_parent_treenode_id ON treenode(ref_parent_treenode_id);
CREATE INDEX IF NOT EXISTS idx_treenode_ref_generation_id ON treenode(ref_generation_id);
";

pub const CREATE_RULE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS rule (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    feature_index INTEGER NOT NULL,
    rule_type INTEGER NOT NULL,
    value_type INTEGER NOT NULL,
    value_integer INTEGER NOT NULL DEFAULT 0,
    value_real REAL NOT NULL DEFAULT 0.0
);
";

pub const CREATE_LEAF_INFO_TABLE: &str = "
CREATE TABLE IF NOT EXISTS leaf_info (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    label_index INTEGER NOT NULL,
    type INTEGER NOT NULL,
    go_to_ref_generation_id INTEGER,
    correct_count INTEGER NOT NULL DEFAULT 0,
    total_count INTEGER NOT NULL DEFAULT 0,
    accuracy REAL NOT NULL DEFAULT 0.0
);
CREATE INDEX IF NOT EXISTS idx_leaf_info_total_count ON leaf_info(total_count);
CREATE INDEX IF NOT EXISTS idx_leaf_info_accuracy ON leaf_info(accuracy);
CREATE INDEX IF NOT EXISTS idx_leaf_info_go_to_ref_generation_id ON leaf_info(go_to_ref_generation_id);
";

pub const CREATE_STRING_TABLE_TABLE: &str = "
CREATE TABLE IF NOT EXISTS string_table (
    id INTEGER PRIMARY KEY,
    text TEXT NOT NULL UNIQUE
);
";

pub const CREATE_GLOBAL_TABLE: &str = "
CREATE TABLE IF NOT EXISTS global (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    instance_count INTEGER NOT NULL DEFAULT 0,
    updated_instance_count INTEGER NOT NULL DEFAULT 0,
    instance_correct_count INTEGER NOT NULL DEFAULT 0,
    instance_accuracy REAL NOT NULL DEFAULT 0.0,
    acc_weak_instance_count INTEGER NOT NULL DEFAULT 0
);
";

pub const CREATE_GLOBAL_CONFUSION_MATRIX_TABLE: &str = "
CREATE TABLE IF NOT EXISTS global_confusion_matrix (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    actual INTEGER NOT NULL,
    predicted INTEGER NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    UNIQUE(actual, predicted)
);
";

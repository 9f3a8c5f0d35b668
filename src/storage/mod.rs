//! Storage Engine (spec §4.C): the ten-table schema over an embedded
//! SQLite database (`rusqlite`, bundled), replacing the teacher's
//! `tokio-postgres` client — see DESIGN.md for why. A single
//! `std::sync::Mutex<Connection>` enforces the single-writer model (spec
//! §5); readers and writers alike go through [`Storage::transaction`], which
//! maps the model's "exclusive" flag onto SQLite's `IMMEDIATE` transaction
//! mode so a writer transaction cannot silently downgrade to a later
//! upgrade-conflict.

pub mod ops;
pub mod schema;

use crate::error::Result;
use crate::value::FieldType;
use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;

/// What a transaction closure decides to do with its own writes.
pub enum Outcome<T> {
    Commit(T),
    Rollback(T),
}

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(30))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Creates every table (the `instance` table's columns come from the
    /// declared attributes) and seeds the single `global` row. Idempotent.
    pub fn init_schema(&self, instance_fields: &[(String, FieldType)]) -> Result<()> {
        let conn = self.conn.lock().expect("storage mutex poisoned");
        conn.execute_batch(&schema::create_instance_table_sql(instance_fields))?;
        conn.execute_batch(schema::CREATE_INSTANCE_INFO_TABLE)?;
        conn.execute_batch(schema::CREATE_CHUNK_TABLE)?;
        conn.execute_batch(schema::CREATE_GENERATION_TABLE)?;
        conn.execute_batch(schema::CREATE_TREENODE_TABLE)?;
        conn.execute_batch(schema::CREATE_RULE_TABLE)?;
        conn.execute_batch(schema::CREATE_LEAF_INFO_TABLE)?;
        conn.execute_batch(schema::CREATE_STRING_TABLE_TABLE)?;
        conn.execute_batch(schema::CREATE_GLOBAL_TABLE)?;
        conn.execute_batch(schema::CREATE_GLOBAL_CONFUSION_MATRIX_TABLE)?;
        conn.execute(
            "INSERT OR IGNORE INTO global (id, schema_version, instance_count, updated_instance_count, instance_correct_count, instance_accuracy, acc_weak_instance_count) VALUES (1, ?1, 0, 0, 0, 0.0, 0)",
            [schema::SCHEMA_VERSION],
        )?;
        Ok(())
    }

    /// Runs `f` inside a transaction. `exclusive` maps to SQLite's
    /// `IMMEDIATE` behavior (spec §4.C "exclusive transaction"); plain reads
    /// use the default deferred behavior.
    pub fn transaction<F, T>(&self, exclusive: bool, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<Outcome<T>>,
    {
        let mut conn = self.conn.lock().expect("storage mutex poisoned");
        let behavior = if exclusive { TransactionBehavior::Immediate } else { TransactionBehavior::Deferred };
        let tx = conn.transaction_with_behavior(behavior)?;
        match f(&tx)? {
            Outcome::Commit(value) => {
                tx.commit()?;
                Ok(value)
            }
            Outcome::Rollback(value) => {
                tx.rollback()?;
                Ok(value)
            }
        }
    }
}

//! String Table (spec §4.A): a bijection between nominal text values and
//! dense, stable 32-bit ids. Grounded on `gaenari::common::string_table.hpp`
//! — ids are assigned consecutively from 0 and, once bound, are immutable
//! (spec §3 invariant 7).
//!
//! Single-writer: the controller is the only caller that mutates a table,
//! behind its own lock. Readers only ever see committed entries because
//! `flush` is the sole path that persists new bindings.

use crate::error::{Error, Result};
use std::collections::HashMap;

pub struct StringTable {
    id_by_text: HashMap<String, i32>,
    text_by_id: Vec<String>,
    /// highest id already persisted to storage; `flush` only writes ids past this.
    flushed_max_id: i32,
}

impl StringTable {
    pub fn new() -> Self {
        Self {
            id_by_text: HashMap::new(),
            text_by_id: Vec::new(),
            flushed_max_id: -1,
        }
    }

    /// Rehydrate from storage: `entries` must be ordered by ascending id,
    /// with no gaps, starting at 0 — the invariant storage is required to
    /// maintain (spec §3 invariant 7).
    pub fn from_entries(entries: Vec<(i32, String)>) -> Result<Self> {
        let mut table = Self::new();
        for (id, text) in entries {
            table.add_with_id(&text, id)?;
        }
        table.flushed_max_id = table.text_by_id.len() as i32 - 1;
        Ok(table)
    }

    /// Returns the existing id if `text` is already bound, otherwise assigns
    /// `current_max + 1` and binds it. Does not persist — call `flush`.
    pub fn add(&mut self, text: &str) -> i32 {
        if let Some(&id) = self.id_by_text.get(text) {
            return id;
        }
        let id = self.text_by_id.len() as i32;
        self.text_by_id.push(text.to_string());
        self.id_by_text.insert(text.to_string(), id);
        id
    }

    /// Used when loading from storage (or replaying a known binding). Fails
    /// if `id` is already bound to a different text, or `text` is already
    /// bound to a different id (spec §4.A).
    pub fn add_with_id(&mut self, text: &str, id: i32) -> Result<()> {
        if let Some(existing) = self.text_by_id.get(id as usize) {
            if existing != text {
                return Err(Error::InternalError(format!(
                    "string table id {id} already bound to a different text"
                )));
            }
            return Ok(());
        }
        if let Some(&existing_id) = self.id_by_text.get(text) {
            if existing_id != id {
                return Err(Error::InternalError(format!(
                    "string table text {text:?} already bound to a different id"
                )));
            }
        }
        if id as usize != self.text_by_id.len() {
            return Err(Error::InternalError(format!(
                "string table ids must be assigned consecutively from 0, got {id} expected {}",
                self.text_by_id.len()
            )));
        }
        self.text_by_id.push(text.to_string());
        self.id_by_text.insert(text.to_string(), id);
        Ok(())
    }

    pub fn lookup_id(&self, text: &str) -> Option<i32> {
        self.id_by_text.get(text).copied()
    }

    pub fn lookup_text(&self, id: i32) -> Option<&str> {
        self.text_by_id.get(id as usize).map(String::as_str)
    }

    /// Entries not yet persisted, i.e. ids strictly greater than
    /// `storage_max_id`. The caller persists them and then calls
    /// `mark_flushed`.
    pub fn pending(&self, storage_max_id: i32) -> Vec<(i32, &str)> {
        let start = (storage_max_id + 1).max(0) as usize;
        self.text_by_id[start.min(self.text_by_id.len())..]
            .iter()
            .enumerate()
            .map(|(i, text)| ((start + i) as i32, text.as_str()))
            .collect()
    }

    pub fn mark_flushed(&mut self, max_id: i32) {
        self.flushed_max_id = max_id;
    }

    pub fn len(&self) -> usize {
        self.text_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text_by_id.is_empty()
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut t = StringTable::new();
        let a = t.add("sunny");
        let b = t.add("sunny");
        assert_eq!(a, b);
        assert_eq!(t.lookup_text(a), Some("sunny"));
    }

    #[test]
    fn ids_assigned_consecutively() {
        let mut t = StringTable::new();
        assert_eq!(t.add("a"), 0);
        assert_eq!(t.add("b"), 1);
        assert_eq!(t.add("a"), 0);
        assert_eq!(t.add("c"), 2);
    }

    #[test]
    fn lookup_text_roundtrip() {
        let mut t = StringTable::new();
        let id = t.add("overcast");
        assert_eq!(t.lookup_text(t.add("overcast")), Some("overcast"));
        assert_eq!(id, t.lookup_id("overcast").unwrap());
    }

    #[test]
    fn add_with_id_rejects_conflicting_text() {
        let mut t = StringTable::new();
        t.add_with_id("a", 0).unwrap();
        assert!(t.add_with_id("b", 0).is_err());
    }

    #[test]
    fn pending_only_returns_unflushed() {
        let mut t = StringTable::new();
        t.add("a");
        t.add("b");
        assert_eq!(t.pending(-1).len(), 2);
        t.mark_flushed(0);
        assert_eq!(t.pending(0).len(), 1);
        assert_eq!(t.pending(0)[0].1, "b");
    }
}

//! `property.txt` loader (spec §6): flat `key=value` lines, `#` comments,
//! blank lines ignored. Grounded on `supul::impl::property.hpp`'s key space
//! (`ver`, `db.type`, `db.dbname`, `db.tablename.prefix`,
//! `model.weak_treenode_condition.*`, `limit.chunk.*`).

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

pub struct Property {
    values: BTreeMap<String, String>,
}

impl Property {
    pub fn new() -> Self {
        Self { values: BTreeMap::new() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::InvalidParameter(format!("property.txt line {}: expected key=value, got {raw:?}", lineno + 1))
            })?;
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Self { values })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = String::new();
        for (key, value) in &self.values {
            text.push_str(key);
            text.push('=');
            text.push_str(value);
            text.push('\n');
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn require_str(&self, key: &str) -> Result<&str> {
        self.get_str(key).ok_or_else(|| Error::InvalidParameter(format!("missing required property {key:?}")))
    }

    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get_str(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get_str(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_str(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }
}

impl Default for Property {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_value_lines() {
        let p = Property::parse("ver=1\n# comment\n\ndb.type=sqlite\ndb.dbname=model\n").unwrap();
        assert_eq!(p.get_str("ver"), Some("1"));
        assert_eq!(p.get_str("db.type"), Some("sqlite"));
    }

    #[test]
    fn typed_getters_fall_back_to_default() {
        let p = Property::parse("model.weak_treenode_condition.accuracy=0.9\n").unwrap();
        assert_eq!(p.get_f64("model.weak_treenode_condition.accuracy", 0.8), 0.9);
        assert_eq!(p.get_f64("model.weak_treenode_condition.missing", 0.8), 0.8);
        assert_eq!(p.get_i64("limit.chunk.instance_lower_bound", 100), 100);
    }

    #[test]
    fn rejects_malformed_line() {
        assert!(Property::parse("not-a-kv-line\n").is_err());
    }

    #[test]
    fn set_then_save_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("property.txt");
        let mut p = Property::new();
        p.set("ver", "1");
        p.save(&path).unwrap();
        let loaded = Property::load(&path).unwrap();
        assert_eq!(loaded.get_str("ver"), Some("1"));
    }
}

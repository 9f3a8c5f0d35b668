//! `conf/attributes.json` (spec §6): declared fields plus the X list and
//! single Y name. Grounded on `supul::type::attributes`; `revision` is
//! reserved for a future schema-evolution format and must currently be 0
//! (spec §6, §7 `not_supported_yet`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::value::FieldType;

const RESERVED_FIELD_NAME: &str = "id";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attributes {
    pub revision: i64,
    pub fields: BTreeMap<String, FieldType>,
    pub x: Vec<String>,
    pub y: String,
}

impl Attributes {
    pub fn new() -> Self {
        Self { revision: 0, fields: BTreeMap::new(), x: Vec::new(), y: String::new() }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let attrs: Self = serde_json::from_str(&text)?;
        attrs.validate()?;
        Ok(attrs)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let text = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, text)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.revision != 0 {
            return Err(Error::NotSupportedYet(format!("attributes.revision {} (only 0 is supported)", self.revision)));
        }
        if self.fields.contains_key(RESERVED_FIELD_NAME) {
            return Err(Error::InvalidParameter("field name \"id\" is reserved".into()));
        }
        for name in &self.x {
            if !self.fields.contains_key(name) {
                return Err(Error::InvalidParameter(format!("x field {name:?} not declared in fields")));
            }
        }
        if !self.y.is_empty() && !self.fields.contains_key(&self.y) {
            return Err(Error::InvalidParameter(format!("y field {:?} not declared in fields", self.y)));
        }
        Ok(())
    }

    /// Append-only field evolution (SPEC_FULL.md §9.1): a field name already
    /// present, or the reserved `id` name, is rejected.
    pub fn add_field(&mut self, name: &str, field_type: FieldType) -> Result<()> {
        if name == RESERVED_FIELD_NAME {
            return Err(Error::InvalidParameter("field name \"id\" is reserved".into()));
        }
        if self.fields.contains_key(name) {
            return Err(Error::InvalidParameter(format!("field {name:?} already declared")));
        }
        self.fields.insert(name.to_string(), field_type);
        Ok(())
    }

    pub fn set_x(&mut self, names: &[String]) -> Result<()> {
        for name in names {
            if !self.fields.contains_key(name) {
                return Err(Error::InvalidParameter(format!("x field {name:?} not declared in fields")));
            }
        }
        self.x = names.to_vec();
        Ok(())
    }

    pub fn set_y(&mut self, name: &str) -> Result<()> {
        if !self.fields.contains_key(name) {
            return Err(Error::InvalidParameter(format!("y field {name:?} not declared in fields")));
        }
        self.y = name.to_string();
        Ok(())
    }

    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).copied()
    }

    /// `(name, type)` for the X list, in declared order.
    pub fn x_fields(&self) -> Vec<(String, FieldType)> {
        self.x.iter().map(|name| (name.clone(), self.fields[name])).collect()
    }

    pub fn y_field(&self) -> (String, FieldType) {
        (self.y.clone(), self.fields[&self.y])
    }

    /// Every declared field, in a deterministic order — the column order of
    /// the `instance` table.
    pub fn instance_fields(&self) -> Vec<(String, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.clone(), *ty)).collect()
    }
}

impl Default for Attributes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Attributes {
        let mut a = Attributes::new();
        a.add_field("outlook", FieldType::TextId).unwrap();
        a.add_field("temperature", FieldType::Real).unwrap();
        a.add_field("play", FieldType::TextId).unwrap();
        a.set_x(&["outlook".into(), "temperature".into()]).unwrap();
        a.set_y("play").unwrap();
        a
    }

    #[test]
    fn rejects_reserved_id_field() {
        let mut a = Attributes::new();
        assert!(a.add_field("id", FieldType::Integer).is_err());
    }

    #[test]
    fn rejects_duplicate_field() {
        let mut a = sample();
        assert!(a.add_field("outlook", FieldType::TextId).is_err());
    }

    #[test]
    fn rejects_x_field_not_declared() {
        let mut a = Attributes::new();
        assert!(a.set_x(&["missing".into()]).is_err());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attributes.json");
        let a = sample();
        a.save(&path).unwrap();
        let loaded = Attributes::load(&path).unwrap();
        assert_eq!(loaded.x, a.x);
        assert_eq!(loaded.y, a.y);
    }

    #[test]
    fn nonzero_revision_is_not_supported() {
        let mut a = sample();
        a.revision = 1;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attributes.json");
        std::fs::write(&path, serde_json::to_string(&a).unwrap()).unwrap();
        assert!(matches!(Attributes::load(&path), Err(Error::NotSupportedYet(_))));
    }
}

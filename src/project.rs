//! Project scaffolding (spec §6 "File layout", SPEC_FULL.md §9.1): lays out
//! `property.txt` and `conf/attributes.json` under a base directory, and
//! guards mutating scaffolding calls once the project has been opened by an
//! [`crate::Engine`] — changing declared fields or properties out from under
//! a running engine would desynchronize `attributes.json` from the already-
//! created `instance` table. Grounded on `supul::api`'s project.* surface,
//! whose C++ `opened` flag we realize as a lock file since ours are free
//! functions operating on a directory rather than methods on a live object.

use std::path::{Path, PathBuf};

use crate::config::{Attributes, Property};
use crate::error::{Error, Result};
use crate::value::FieldType;

const LOCK_FILE_NAME: &str = ".engine_open";

pub(crate) fn lock_path(base_dir: &Path) -> PathBuf {
    base_dir.join(LOCK_FILE_NAME)
}

fn attributes_path(base_dir: &Path) -> PathBuf {
    base_dir.join("conf").join("attributes.json")
}

pub fn property_path(base_dir: &Path) -> PathBuf {
    base_dir.join("property.txt")
}

fn guard_not_open(base_dir: &Path) -> Result<()> {
    if lock_path(base_dir).exists() {
        return Err(Error::InvalidParameter("project is already open; close it before changing scaffolding".into()));
    }
    Ok(())
}

/// Lays out a fresh project: `property.txt` with the required keys defaulted
/// (`ver=1, db.type=sqlite, db.dbname=model`) and an empty `conf/attributes.json`.
/// Idempotent: an existing `property.txt`/`attributes.json` is left alone.
pub fn create(base_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(base_dir)?;
    std::fs::create_dir_all(base_dir.join("conf"))?;
    std::fs::create_dir_all(base_dir.join("sqlite"))?;

    let property_path = property_path(base_dir);
    if !property_path.exists() {
        let mut property = Property::new();
        property.set("ver", "1");
        property.set("db.type", "sqlite");
        property.set("db.dbname", "model");
        property.save(&property_path)?;
    }

    let attributes_path = attributes_path(base_dir);
    if !attributes_path.exists() {
        Attributes::new().save(&attributes_path)?;
    }
    Ok(())
}

pub fn set_property(base_dir: &Path, name: &str, value: &str) -> Result<()> {
    guard_not_open(base_dir)?;
    let path = property_path(base_dir);
    let mut property = Property::load(&path)?;
    property.set(name, value);
    property.save(&path)
}

pub fn add_field(base_dir: &Path, name: &str, field_type: FieldType) -> Result<()> {
    guard_not_open(base_dir)?;
    let path = attributes_path(base_dir);
    let mut attributes = Attributes::load(&path)?;
    attributes.add_field(name, field_type)?;
    attributes.save(&path)
}

pub fn x(base_dir: &Path, names: &[String]) -> Result<()> {
    guard_not_open(base_dir)?;
    let path = attributes_path(base_dir);
    let mut attributes = Attributes::load(&path)?;
    attributes.set_x(names)?;
    attributes.save(&path)
}

pub fn y(base_dir: &Path, name: &str) -> Result<()> {
    guard_not_open(base_dir)?;
    let path = attributes_path(base_dir);
    let mut attributes = Attributes::load(&path)?;
    attributes.set_y(name)?;
    attributes.save(&path)
}

/// Loads the project's declared attributes, for callers (the Engine) that
/// need them without mutating anything.
pub fn load_attributes(base_dir: &Path) -> Result<Attributes> {
    Attributes::load(&attributes_path(base_dir))
}

pub fn load_property(base_dir: &Path) -> Result<Property> {
    Property::load(&property_path(base_dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_idempotent_and_scaffolds_defaults() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path()).unwrap();
        create(dir.path()).unwrap();
        let property = load_property(dir.path()).unwrap();
        assert_eq!(property.get_str("db.type"), Some("sqlite"));
    }

    #[test]
    fn add_field_then_x_then_y() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path()).unwrap();
        add_field(dir.path(), "outlook", FieldType::TextId).unwrap();
        add_field(dir.path(), "play", FieldType::TextId).unwrap();
        x(dir.path(), &["outlook".to_string()]).unwrap();
        y(dir.path(), "play").unwrap();
        let attributes = load_attributes(dir.path()).unwrap();
        assert_eq!(attributes.x, vec!["outlook".to_string()]);
        assert_eq!(attributes.y, "play");
    }

    #[test]
    fn mutating_scaffolding_rejected_while_locked() {
        let dir = tempfile::tempdir().unwrap();
        create(dir.path()).unwrap();
        std::fs::write(lock_path(dir.path()), "").unwrap();
        assert!(set_property(dir.path(), "ver", "2").is_err());
    }
}

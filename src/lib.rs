//! `supul`: an incremental decision-tree classifier with persistent,
//! multi-generation model state (spec §1). The crate root exposes
//! [`Engine`], a thin `lifetime.*`/`project.*`/`model.*`/`report.*`/`misc.*`
//! facade over [`controller::Controller`] and [`project`], grounded on
//! `supul::api`'s free-function surface — the source exposes these as
//! top-level C-callable functions guarded by a global `opened` flag; here
//! they are methods on an owned `Engine` so the guard is just "do you hold
//! one".

pub mod cache;
pub mod config;
pub mod controller;
pub mod csv_ingest;
pub mod dataframe;
pub mod error;
pub mod forest;
pub mod project;
pub mod report;
pub mod storage;
pub mod string_table;
pub mod tree;
pub mod value;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::{json, Value as Json};

pub use config::{Attributes, ModelConfig, Property};
pub use controller::{Controller, PredictResult};
pub use error::{Error, Result};
pub use report::{Category, ReportOptions, ALL_CATEGORIES};
pub use value::FieldType;

/// The open handle spec §6's `lifetime.open`/`lifetime.close` describe.
/// Holding one means the project's scaffolding is locked (spec §9.1): no
/// `project.*` mutation succeeds until this is dropped or `close`d.
pub struct Engine {
    base_dir: PathBuf,
    controller: Controller,
}

impl Engine {
    /// `lifetime.open(base_dir) -> bool`. Writes the `.engine_open` lock
    /// file project.rs's scaffolding guards check for, then opens the
    /// controller against the project's existing `property.txt`/
    /// `attributes.json`/database.
    pub fn open(base_dir: &Path) -> Result<Self> {
        std::fs::write(project::lock_path(base_dir), "")?;
        match Controller::open(base_dir) {
            Ok(controller) => Ok(Self { base_dir: base_dir.to_path_buf(), controller }),
            Err(e) => {
                let _ = std::fs::remove_file(project::lock_path(base_dir));
                Err(e)
            }
        }
    }

    /// `lifetime.close()`. Consumes the engine and removes the lock file,
    /// re-enabling `project.*` scaffolding mutation.
    pub fn close(self) -> Result<()> {
        std::fs::remove_file(project::lock_path(&self.base_dir))?;
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn attributes(&self) -> &Attributes {
        self.controller.attributes()
    }

    // ---------------------------------------------------------- model.*

    /// `model.insert_chunk_csv(path) -> bool`.
    pub fn insert_chunk_csv(&self, csv_path: &Path) -> Result<bool> {
        self.controller.insert_chunk_csv(csv_path)?;
        Ok(true)
    }

    /// `model.update() -> bool`.
    pub fn update(&self) -> Result<bool> {
        self.controller.update()?;
        Ok(true)
    }

    /// `model.rebuild() -> bool`.
    pub fn rebuild(&self) -> Result<bool> {
        self.controller.rebuild()?;
        Ok(true)
    }

    /// `model.predict({feature:value,...}) -> {label, label_index,
    /// correct_count, total_count, accuracy, error?, errormsg?}`. Unlike
    /// [`Controller::predict`] this never returns `Err`: failures are
    /// folded into the same JSON shape the source's C-callable API returns,
    /// since `predict` is meant to be a leaf call a caller can render
    /// directly without a try/catch around every feature dict.
    pub fn predict(&self, x: &HashMap<String, String>) -> Json {
        match self.controller.predict(x) {
            Ok(PredictResult { label, label_index, correct_count, total_count, accuracy }) => json!({
                "label": label,
                "label_index": label_index,
                "correct_count": correct_count,
                "total_count": total_count,
                "accuracy": accuracy,
            }),
            Err(e) => json!({
                "error": true,
                "errormsg": misc::errmsg(&e),
            }),
        }
    }

    // --------------------------------------------------------- report.*

    pub fn report_json(&self, categories: &[Category], options: ReportOptions) -> Result<Json> {
        report::generate(self.controller.storage(), categories, options)
    }

    pub fn verify_global(&self) -> Result<()> {
        self.controller.verify_global()
    }

    pub fn verify_cache(&self) -> Result<()> {
        self.controller.verify_cache()
    }
}

/// `misc.*` (spec §6): process-wide, stateless informational calls — no
/// global last-error slot is kept, since every fallible call in this crate
/// already returns its own `Result`/`Error` value instead of relying on a
/// side channel.
pub mod misc {
    use crate::error::Error;

    /// `misc.version()`.
    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// `misc.errmsg()`, given the `Error` a caller just received.
    pub fn errmsg(error: &Error) -> String {
        error.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::FieldType;

    fn scaffold_weather_project(dir: &Path) {
        project::create(dir).unwrap();
        project::add_field(dir, "outlook", FieldType::TextId).unwrap();
        project::add_field(dir, "temperature", FieldType::Real).unwrap();
        project::add_field(dir, "play", FieldType::TextId).unwrap();
        project::x(dir, &["outlook".to_string(), "temperature".to_string()]).unwrap();
        project::y(dir, "play").unwrap();
    }

    #[test]
    fn open_locks_scaffolding_and_close_unlocks_it() {
        let dir = tempfile::tempdir().unwrap();
        scaffold_weather_project(dir.path());

        let engine = Engine::open(dir.path()).unwrap();
        assert!(project::set_property(dir.path(), "ver", "2").is_err());
        engine.close().unwrap();
        assert!(project::set_property(dir.path(), "ver", "2").is_ok());
    }

    #[test]
    fn open_failure_does_not_leave_a_stale_lock() {
        let dir = tempfile::tempdir().unwrap();
        // no scaffolding at all: attributes.json/property.txt are missing, Controller::open fails.
        assert!(Engine::open(dir.path()).is_err());
        assert!(!project::lock_path(dir.path()).exists());
    }

    #[test]
    fn predict_without_any_trained_generation_reports_an_in_band_error() {
        let dir = tempfile::tempdir().unwrap();
        scaffold_weather_project(dir.path());
        let engine = Engine::open(dir.path()).unwrap();

        let mut x = HashMap::new();
        x.insert("outlook".to_string(), "sunny".to_string());
        x.insert("temperature".to_string(), "85".to_string());
        let result = engine.predict(&x);
        assert_eq!(result["error"], true);
        assert!(result["errormsg"].is_string());
    }

    #[test]
    fn misc_version_matches_cargo_package_version() {
        assert_eq!(misc::version(), env!("CARGO_PKG_VERSION"));
    }
}

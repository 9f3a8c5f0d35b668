//! `report.json` (spec §6, SPEC_FULL.md §9.2): read-only JSON snapshots of
//! model state, grounded on `supul/impl/report.hpp`'s category functions.
//! Every category is a plain query over already-committed storage — no
//! write, no cache interaction — so each runs in its own short read
//! transaction rather than going through [`crate::controller::Controller`].

use serde_json::{json, Value as Json};

use crate::error::Result;
use crate::storage::{ops, Storage};
use crate::string_table::StringTable;

/// Options accepted by [`generate`], mirroring `report.hpp`'s `option` struct.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportOptions {
    /// Replace `chunk.datetime`/`generation.datetime` wall-clock stamps with
    /// their 0-based position in history. Useful for diffing two reports
    /// taken at different times without timestamp noise.
    pub datetime_as_index: bool,
}

/// `report.json` categories, matching `report.hpp`'s category enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Global,
    ChunkHistory,
    ConfusionMatrix,
    GenerationHistory,
}

pub const ALL_CATEGORIES: [Category; 4] = [Category::Global, Category::ChunkHistory, Category::ConfusionMatrix, Category::GenerationHistory];

/// Builds the requested categories into one JSON object, keyed by category
/// name (`"global"`, `"chunk_history"`, `"confusion_matrix"`,
/// `"generation_history"`).
pub fn generate(storage: &Storage, categories: &[Category], options: ReportOptions) -> Result<Json> {
    storage.transaction(false, |tx| {
        let mut out = serde_json::Map::new();
        for category in categories {
            let (key, value) = match category {
                Category::Global => ("global", global(tx)?),
                Category::ChunkHistory => ("chunk_history", chunk_history(tx, options)?),
                Category::ConfusionMatrix => ("confusion_matrix", confusion_matrix(tx)?),
                Category::GenerationHistory => ("generation_history", generation_history(tx, options)?),
            };
            out.insert(key.to_string(), value);
        }
        Ok(crate::storage::Outcome::Commit(Json::Object(out)))
    })
}

fn global(conn: &rusqlite::Connection) -> Result<Json> {
    let g = ops::get_global(conn)?;
    Ok(json!({
        "instance_count": g.instance_count,
        "updated_instance_count": g.updated_instance_count,
        "instance_correct_count": g.instance_correct_count,
        "instance_accuracy": g.instance_accuracy,
        "acc_weak_instance_count": g.acc_weak_instance_count,
    }))
}

fn chunk_history(conn: &rusqlite::Connection, options: ReportOptions) -> Result<Json> {
    let rows = ops::get_chunk_history(conn)?;
    let entries: Vec<Json> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            json!({
                "id": row.id,
                "datetime": if options.datetime_as_index { index as i64 } else { row.datetime },
                "updated": row.updated,
                "correct_count": row.correct_count,
                "total_count": row.total_count,
                "accuracy": row.accuracy,
            })
        })
        .collect();
    Ok(Json::Array(entries))
}

fn generation_history(conn: &rusqlite::Connection, options: ReportOptions) -> Result<Json> {
    let rows = ops::get_generation_history(conn)?;
    let entries: Vec<Json> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| {
            json!({
                "id": row.id,
                "datetime": if options.datetime_as_index { index as i64 } else { row.datetime },
                "instance_count": row.instance_count,
                "weak_instance_count": row.weak_instance_count,
                "weak_instance_ratio": row.weak_instance_ratio,
                "before_weak_instance_accuracy": row.before_weak_instance_accuracy,
                "after_weak_instance_accuracy": row.after_weak_instance_accuracy,
                "before_instance_accuracy": row.before_instance_accuracy,
                "after_instance_accuracy": row.after_instance_accuracy,
            })
        })
        .collect();
    Ok(Json::Array(entries))
}

/// Confusion-matrix cells with `actual`/`predicted` resolved back to their
/// nominal text via the string table, since the persisted matrix only holds
/// label ids.
fn confusion_matrix(conn: &rusqlite::Connection) -> Result<Json> {
    let entries = ops::load_string_table_entries(conn)?;
    let string_table = StringTable::from_entries(entries)?;
    let cells = ops::get_global_confusion_matrix(conn)?;
    let rows: Vec<Json> = cells
        .into_iter()
        .map(|(actual, predicted, count)| {
            json!({
                "actual": string_table.lookup_text(actual as i32).unwrap_or("?"),
                "predicted": string_table.lookup_text(predicted as i32).unwrap_or("?"),
                "count": count,
            })
        })
        .collect();
    Ok(Json::Array(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn open_with_schema() -> Storage {
        let storage = Storage::open_in_memory().unwrap();
        storage.init_schema(&[("outlook".to_string(), crate::value::FieldType::TextId), ("play".to_string(), crate::value::FieldType::TextId)]).unwrap();
        storage
    }

    #[test]
    fn global_reports_zeroed_state_on_an_empty_store() {
        let storage = open_with_schema();
        let report = generate(&storage, &ALL_CATEGORIES, ReportOptions::default()).unwrap();
        assert_eq!(report["global"]["instance_count"], 0);
        assert!(report["chunk_history"].as_array().unwrap().is_empty());
        assert!(report["confusion_matrix"].as_array().unwrap().is_empty());
        assert!(report["generation_history"].as_array().unwrap().is_empty());
    }

    #[test]
    fn chunk_history_reflects_inserted_chunks() {
        let storage = open_with_schema();
        storage
            .transaction(true, |tx| {
                ops::add_chunk(tx, 20260101000000)?;
                ops::add_chunk(tx, 20260102000000)?;
                Ok(crate::storage::Outcome::Commit(()))
            })
            .unwrap();

        let report = generate(&storage, &[Category::ChunkHistory], ReportOptions::default()).unwrap();
        let chunks = report["chunk_history"].as_array().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0]["datetime"], 20260101000000i64);

        let indexed = generate(&storage, &[Category::ChunkHistory], ReportOptions { datetime_as_index: true }).unwrap();
        let chunks = indexed["chunk_history"].as_array().unwrap();
        assert_eq!(chunks[0]["datetime"], 0);
        assert_eq!(chunks[1]["datetime"], 1);
    }

    #[test]
    fn confusion_matrix_resolves_label_text() {
        let storage = open_with_schema();
        storage
            .transaction(true, |tx| {
                ops::insert_string_table_entries(tx, &[(0, "yes"), (1, "no")])?;
                ops::bump_global_confusion_matrix(tx, 0, 0, 5)?;
                ops::bump_global_confusion_matrix(tx, 0, 1, 2)?;
                Ok(crate::storage::Outcome::Commit(()))
            })
            .unwrap();

        let report = generate(&storage, &[Category::ConfusionMatrix], ReportOptions::default()).unwrap();
        let cells = report["confusion_matrix"].as_array().unwrap();
        assert_eq!(cells.len(), 2);
        assert!(cells.iter().any(|c| c["actual"] == "yes" && c["predicted"] == "yes" && c["count"] == 5));
        assert!(cells.iter().any(|c| c["actual"] == "yes" && c["predicted"] == "no" && c["count"] == 2));
    }
}

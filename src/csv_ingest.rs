//! CSV ingestion adapter (spec §6 "CSV format", SPEC_FULL.md §9.4): a thin
//! wrapper over the `csv` crate rather than a hand-rolled parser. Columns are
//! matched against `conf/attributes.json`'s declared fields by header name,
//! not position — the spec only requires "every declared field must appear".

use std::path::Path;

use crate::error::{Error, Result};
use crate::value::FieldType;

/// Streams CSV rows, reordering each row's cells into the declared field
/// order regardless of the file's own column order.
pub struct CsvReader {
    inner: csv::Reader<std::fs::File>,
    /// `column_positions[i]` is the CSV column index holding `fields[i]`.
    column_positions: Vec<usize>,
    pad_on_mismatch: bool,
}

impl CsvReader {
    /// `pad_on_mismatch`: a row with fewer columns than the header is padded
    /// with empty cells instead of rejected (spec §6's reader flag).
    pub fn open(path: &Path, fields: &[(String, FieldType)], pad_on_mismatch: bool) -> Result<Self> {
        let mut inner = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let header = inner.headers()?.clone();
        let mut column_positions = Vec::with_capacity(fields.len());
        for (name, _) in fields {
            let pos = header
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| Error::InvalidParameter(format!("csv file missing declared field {name:?}")))?;
            column_positions.push(pos);
        }
        Ok(Self { inner, column_positions, pad_on_mismatch })
    }

    /// Next row's cells, reordered into declared-field order. `None` at EOF.
    pub fn next_row(&mut self) -> Result<Option<Vec<String>>> {
        let mut record = csv::StringRecord::new();
        if !self.inner.read_record(&mut record)? {
            return Ok(None);
        }
        let mut out = Vec::with_capacity(self.column_positions.len());
        for &pos in &self.column_positions {
            match record.get(pos) {
                Some(cell) => out.push(cell.to_string()),
                None if self.pad_on_mismatch => out.push(String::new()),
                None => return Err(Error::InvalidParameter(format!("csv row {} has too few columns", record.position().map(|p| p.line()).unwrap_or(0)))),
            }
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> Vec<(String, FieldType)> {
        vec![("outlook".into(), FieldType::TextId), ("temperature".into(), FieldType::Real), ("play".into(), FieldType::TextId)]
    }

    #[test]
    fn matches_columns_by_header_name_regardless_of_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "play,temperature,outlook\nyes,72.0,sunny\nno,65.0,rainy\n").unwrap();
        let mut reader = CsvReader::open(&path, &fields(), false).unwrap();
        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row, vec!["sunny".to_string(), "72.0".to_string(), "yes".to_string()]);
        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row, vec!["rainy".to_string(), "65.0".to_string(), "no".to_string()]);
        assert!(reader.next_row().unwrap().is_none());
    }

    #[test]
    fn rejects_missing_declared_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        std::fs::write(&path, "temperature,outlook\n72.0,sunny\n").unwrap();
        assert!(CsvReader::open(&path, &fields(), false).is_err());
    }
}

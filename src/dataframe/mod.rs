//! Dataframe (spec §4.B): an append-free, reference-counted column matrix.
//!
//! Columns carry a declared [`FieldType`]; cells are [`Value`]. The tree
//! builder only ever needs read access, so the public surface mirrors the
//! source's `rows()/cols()/column_info/get_raw/get_value` plus row
//! iteration, shallow copy (shared storage, separate column selection) and
//! deep copy.

use crate::value::{FieldType, Value};
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub field_type: FieldType,
}

/// Column-major storage, shared via `Rc` so a shallow copy (different column
/// selection, same underlying data) is cheap.
struct Columns {
    infos: Vec<ColumnInfo>,
    data: Vec<Vec<Value>>,
    rows: usize,
}

#[derive(Clone)]
pub struct Dataframe {
    columns: Rc<Columns>,
    /// indices into `columns.data`, allowing a shallow "view" to select a
    /// subset/reorder of columns without copying cell data.
    selection: Rc<Vec<usize>>,
}

impl Dataframe {
    /// Build from named columns of equal length.
    pub fn new(columns: Vec<(ColumnInfo, Vec<Value>)>) -> Self {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        for (info, values) in &columns {
            assert_eq!(values.len(), rows, "column {} length mismatch", info.name);
        }
        let (infos, data): (Vec<_>, Vec<_>) = columns.into_iter().unzip();
        let selection = (0..infos.len()).collect();
        Self {
            columns: Rc::new(Columns { infos, data, rows }),
            selection: Rc::new(selection),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn rows(&self) -> usize {
        self.columns.rows
    }

    pub fn cols(&self) -> usize {
        self.selection.len()
    }

    pub fn column_info(&self, col: usize) -> &ColumnInfo {
        &self.columns.infos[self.selection[col]]
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.selection.iter().map(|&i| self.columns.infos[i].name.as_str()).collect()
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.selection.iter().position(|&i| self.columns.infos[i].name == name)
    }

    pub fn get_raw(&self, row: usize, col: usize) -> Value {
        self.columns.data[self.selection[col]][row]
    }

    /// Typed accessor; identical payload to `get_raw` in this port since
    /// `Value` is already the typed representation (no raw-union decode
    /// needed, unlike the C++ source).
    pub fn get_value(&self, row: usize, col: usize) -> Value {
        self.get_raw(row, col)
    }

    pub fn row(&self, row: usize) -> Vec<Value> {
        (0..self.cols()).map(|c| self.get_raw(row, c)).collect()
    }

    pub fn row_as_map(&self, row: usize) -> std::collections::HashMap<String, Value> {
        (0..self.cols())
            .map(|c| (self.column_info(c).name.clone(), self.get_raw(row, c)))
            .collect()
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = Vec<Value>> + '_ {
        (0..self.rows()).map(move |r| self.row(r))
    }

    /// Shallow copy selecting/reordering a subset of columns by name;
    /// shares underlying cell storage with `self`.
    pub fn select(&self, names: &[&str]) -> Self {
        let selection: Vec<usize> = names
            .iter()
            .map(|name| {
                self.selection
                    .iter()
                    .position(|&i| self.columns.infos[i].name == *name)
                    .map(|pos| self.selection[pos])
                    .unwrap_or_else(|| panic!("column {name} not found"))
            })
            .collect();
        Self {
            columns: Rc::clone(&self.columns),
            selection: Rc::new(selection),
        }
    }

    /// Deep copy: fully independent storage.
    pub fn deep_copy(&self) -> Self {
        let infos: Vec<ColumnInfo> = (0..self.cols()).map(|c| self.column_info(c).clone()).collect();
        let data: Vec<Vec<Value>> = (0..self.cols())
            .map(|c| (0..self.rows()).map(|r| self.get_raw(r, c)).collect())
            .collect();
        let rows = self.rows();
        Self {
            columns: Rc::new(Columns { infos, data, rows }),
            selection: Rc::new((0..self.cols()).collect()),
        }
    }

    /// A row-index subset view used by the tree builder, which never
    /// materializes a full `Dataframe`, just walks `row_selections: &[usize]`
    /// against `self` directly (spec §4.D).
    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataframe {
        Dataframe::new(vec![
            (
                ColumnInfo { name: "a".into(), field_type: FieldType::Integer },
                vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            ),
            (
                ColumnInfo { name: "b".into(), field_type: FieldType::Real },
                vec![Value::Real(1.5), Value::Real(2.5), Value::Real(3.5)],
            ),
        ])
    }

    #[test]
    fn rows_cols_and_get() {
        let df = sample();
        assert_eq!(df.rows(), 3);
        assert_eq!(df.cols(), 2);
        assert_eq!(df.get_raw(1, 0), Value::Int(2));
        assert_eq!(df.get_raw(2, 1), Value::Real(3.5));
    }

    #[test]
    fn select_is_shallow_and_reorders() {
        let df = sample();
        let view = df.select(&["b", "a"]);
        assert_eq!(view.column_info(0).name, "b");
        assert_eq!(view.get_raw(0, 0), Value::Real(1.5));
        assert_eq!(view.get_raw(0, 1), Value::Int(1));
    }

    #[test]
    fn deep_copy_is_independent() {
        let df = sample();
        let copy = df.deep_copy();
        assert_eq!(copy.rows(), df.rows());
        assert_eq!(copy.get_raw(0, 0), df.get_raw(0, 0));
    }
}

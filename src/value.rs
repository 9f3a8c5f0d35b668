//! Typed value domain shared by the Dataframe, Tree Builder, and Storage
//! Engine (spec §3: "Instance" attributes and §4.B "cells store a primitive
//! 8-byte raw value").
//!
//! The C++ source unions four primitives behind one raw cell; the idiomatic
//! Rust equivalent is a tagged enum rather than a raw union, so `Value` plays
//! that role here. `TEXT_ID` cells hold the String Table id in `Value::Int`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Declared semantic type of a field (spec §6, `conf/attributes.json`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "INTEGER")]
    Integer,
    #[serde(rename = "BIGINT")]
    BigInt,
    #[serde(rename = "SMALLINT")]
    SmallInt,
    #[serde(rename = "REAL")]
    Real,
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "TEXT_ID")]
    TextId,
}

impl FieldType {
    /// Integer-family types compare as `Value::Int`, REAL as `Value::Real`.
    /// `TEXT` is not splittable and cannot appear in the X list (spec §3
    /// rule well-formedness only names TEXT_ID, REAL, and INTEGER-family).
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::BigInt | FieldType::SmallInt | FieldType::Real)
    }

    pub fn is_nominal(&self) -> bool {
        matches!(self, FieldType::TextId)
    }

    pub fn is_integer_family(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::BigInt | FieldType::SmallInt | FieldType::TextId)
    }
}

/// A runtime cell value. Ordering is total for numeric-sort purposes in the
/// tree builder's numeric split sweep (`f64` cannot derive `Ord`, so we
/// implement it manually assuming no NaNs reach training data).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Real(f64),
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Real(a), Value::Real(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Int(a), Value::Real(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Real(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Value::Int(i) => i.hash(state),
            Value::Real(r) => r.to_bits().hash(state),
        }
    }
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Real(_) => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(r) => Some(*r),
            Value::Int(_) => None,
        }
    }
}

//! Rule predicate (spec §3 "Rule" entity, §9 Design Notes: "model rules as a
//! tagged variant ... with a single evaluator matching on the tag").

use crate::error::{Error, Result};
use crate::value::{FieldType, Value};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleType {
    Equal,
    Le,
    Lt,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Integer,
    Real,
}

/// `{feature_index, op, value}` — evaluated by a single `matches` function,
/// never per-node function pointers (spec §9).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub feature_index: usize,
    pub rule_type: RuleType,
    pub value_type: ValueType,
    pub value_integer: i64,
    pub value_real: f64,
}

impl Rule {
    pub fn equal_int(feature_index: usize, value: i64) -> Self {
        Self { feature_index, rule_type: RuleType::Equal, value_type: ValueType::Integer, value_integer: value, value_real: 0.0 }
    }

    pub fn numeric(feature_index: usize, rule_type: RuleType, value: f64) -> Self {
        Self { feature_index, rule_type, value_type: ValueType::Real, value_integer: 0, value_real: value }
    }

    /// Rule well-formedness (spec §3 invariant 6): TEXT_ID only ever takes
    /// `Equal`/`Integer`; REAL only ever takes a comparison/`Real`;
    /// INTEGER-family takes any comparison with `Integer`.
    pub fn well_formed_for(&self, field_type: FieldType) -> bool {
        match field_type {
            FieldType::TextId => self.rule_type == RuleType::Equal && self.value_type == ValueType::Integer,
            FieldType::Real => self.rule_type != RuleType::Equal && self.value_type == ValueType::Real,
            FieldType::Integer | FieldType::BigInt | FieldType::SmallInt => self.value_type == ValueType::Integer,
            FieldType::Text => false,
        }
    }

    /// Evaluate this rule's predicate against one feature value. A type
    /// mismatch between the rule and the supplied value is `InvalidDataType`
    /// (spec §4.E step 3); this is intentional (spec §9 Design Notes).
    pub fn matches(&self, value: Value, feature_name: &str) -> Result<bool> {
        match (self.value_type, value) {
            (ValueType::Integer, Value::Int(v)) => Ok(match self.rule_type {
                RuleType::Equal => v == self.value_integer,
                RuleType::Le => v <= self.value_integer,
                RuleType::Lt => v < self.value_integer,
                RuleType::Gt => v > self.value_integer,
                RuleType::Ge => v >= self.value_integer,
            }),
            (ValueType::Real, Value::Real(v)) => Ok(match self.rule_type {
                RuleType::Equal => v == self.value_real,
                RuleType::Le => v <= self.value_real,
                RuleType::Lt => v < self.value_real,
                RuleType::Gt => v > self.value_real,
                RuleType::Ge => v >= self.value_real,
            }),
            _ => Err(Error::InvalidDataType(feature_name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_int_matches() {
        let r = Rule::equal_int(0, 7);
        assert!(r.matches(Value::Int(7), "x").unwrap());
        assert!(!r.matches(Value::Int(8), "x").unwrap());
    }

    #[test]
    fn numeric_le_matches() {
        let r = Rule::numeric(1, RuleType::Le, 10.0);
        assert!(r.matches(Value::Real(10.0), "y").unwrap());
        assert!(!r.matches(Value::Real(10.1), "y").unwrap());
    }

    #[test]
    fn type_mismatch_is_invalid_data_type() {
        let r = Rule::equal_int(0, 7);
        assert!(matches!(r.matches(Value::Real(7.0), "x"), Err(Error::InvalidDataType(_))));
    }

    #[test]
    fn well_formedness() {
        assert!(Rule::equal_int(0, 1).well_formed_for(FieldType::TextId));
        assert!(!Rule::equal_int(0, 1).well_formed_for(FieldType::Real));
        assert!(Rule::numeric(0, RuleType::Gt, 1.0).well_formed_for(FieldType::Real));
        assert!(!Rule::numeric(0, RuleType::Equal, 1.0).well_formed_for(FieldType::Real));
    }
}

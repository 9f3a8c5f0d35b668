//! Entropy / information-gain-ratio calculations (spec §4.D step 2),
//! grounded on `gaenari::method::decision_tree::engine` (`calc_S`,
//! `calc_entropy`, `calc_weighted_entropy_sum`,
//! `calc_igr_{nominal,numeric}_default_strategy`).

use super::rule::{Rule, RuleType};
use crate::dataframe::Dataframe;
use crate::value::{FieldType, Value};
use std::collections::BTreeMap;

/// (label id -> occurrence count) among a row selection.
pub fn label_counts(df: &Dataframe, rows: &[usize], y_col: usize) -> BTreeMap<i64, u64> {
    let mut counts = BTreeMap::new();
    for &r in rows {
        let label = df.get_raw(r, y_col).as_int().expect("y column must be TEXT_ID/integer");
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

fn entropy(counts: &BTreeMap<i64, u64>, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let mut e = 0.0;
    for &c in counts.values() {
        if c == 0 {
            continue;
        }
        let p = c as f64 / total as f64;
        e -= p * p.log2();
    }
    e
}

/// Parent entropy `S` (spec §4.D: `S = -Σ p·log2(p)`).
pub fn calc_s(counts: &BTreeMap<i64, u64>) -> f64 {
    let total: u64 = counts.values().sum();
    entropy(counts, total)
}

/// One candidate split: the rule and the row indices it routes.
pub struct SplitBranch {
    pub rule: Rule,
    pub rows: Vec<usize>,
    pub label_counts: BTreeMap<i64, u64>,
}

pub struct IgrResult {
    pub igr: f64,
    pub stop_criteria: bool,
    pub branches: Vec<SplitBranch>,
}

/// Nominal split: one branch per observed distinct value, IG divided by the
/// split's intrinsic information (spec §4.D "Nominal").
pub fn igr_nominal(df: &Dataframe, rows: &[usize], feature_col: usize, y_col: usize, s: f64) -> IgrResult {
    let mut value_label_count: BTreeMap<i64, BTreeMap<i64, u64>> = BTreeMap::new();
    for &r in rows {
        let value = df.get_raw(r, feature_col).as_int().expect("nominal feature must be TEXT_ID");
        let label = df.get_raw(r, y_col).as_int().expect("y column must be TEXT_ID/integer");
        *value_label_count.entry(value).or_default().entry(label).or_insert(0) += 1;
    }

    let total = rows.len() as u64;
    let mut weighted = 0.0;
    let mut intrinsic = 0.0;
    for counts in value_label_count.values() {
        let value_total: u64 = counts.values().sum();
        let weight = value_total as f64 / total as f64;
        weighted += weight * entropy(counts, value_total);
        intrinsic -= weight * weight.log2();
    }

    let ig = s - weighted;
    if intrinsic == 0.0 {
        return IgrResult { igr: 0.0, stop_criteria: true, branches: Vec::new() };
    }

    let mut branches = Vec::new();
    for (&value, counts) in &value_label_count {
        let branch_rows: Vec<usize> = rows
            .iter()
            .copied()
            .filter(|&r| df.get_raw(r, feature_col).as_int() == Some(value))
            .collect();
        branches.push(SplitBranch {
            rule: Rule::equal_int(feature_col, value),
            rows: branch_rows,
            label_counts: counts.clone(),
        });
    }

    IgrResult { igr: ig / intrinsic, stop_criteria: false, branches }
}

/// Numeric split: sweep sorted distinct values, pick the threshold with
/// minimum weighted entropy, emit exactly `Le`/`Gt` branches (spec §4.D
/// "Numeric" — IG equals IGR, no intrinsic-information division).
pub fn igr_numeric(df: &Dataframe, rows: &[usize], feature_col: usize, y_col: usize, s: f64) -> IgrResult {
    let mut value_label_count: BTreeMap<Value, BTreeMap<i64, u64>> = BTreeMap::new();
    for &r in rows {
        let value = df.get_raw(r, feature_col);
        let label = df.get_raw(r, y_col).as_int().expect("y column must be TEXT_ID/integer");
        *value_label_count.entry(value).or_default().entry(label).or_insert(0) += 1;
    }

    let mut total_counts: BTreeMap<i64, u64> = BTreeMap::new();
    for counts in value_label_count.values() {
        for (&label, &c) in counts {
            *total_counts.entry(label).or_insert(0) += c;
        }
    }
    let total = rows.len() as u64;

    let mut acc: BTreeMap<i64, u64> = BTreeMap::new();
    let mut rest = total_counts.clone();
    let mut best_entropy = f64::MAX;
    let mut best_split_value: Option<Value> = None;
    let mut best_acc = BTreeMap::new();
    let mut best_rest = BTreeMap::new();

    for (&value, counts) in &value_label_count {
        for (&label, &c) in counts {
            *acc.entry(label).or_insert(0) += c;
            *rest.entry(label).or_insert(0) -= c;
        }
        let acc_total: u64 = acc.values().sum();
        let rest_total: u64 = rest.values().sum();
        let weighted = (acc_total as f64 / total as f64) * entropy(&acc, acc_total)
            + (rest_total as f64 / total as f64) * entropy(&rest, rest_total);
        if weighted < best_entropy {
            best_entropy = weighted;
            best_split_value = Some(value);
            best_acc = acc.clone();
            best_rest = rest.clone();
        }
    }

    let ig = s - best_entropy;
    let split_value = match best_split_value {
        Some(v) => v.as_real().unwrap_or_else(|| v.as_int().unwrap() as f64),
        None => return IgrResult { igr: 0.0, stop_criteria: true, branches: Vec::new() },
    };

    let le_rows: Vec<usize> = rows
        .iter()
        .copied()
        .filter(|&r| df.get_raw(r, feature_col).as_real().map(|v| v <= split_value).unwrap_or(false))
        .collect();
    let gt_rows: Vec<usize> = rows
        .iter()
        .copied()
        .filter(|&r| df.get_raw(r, feature_col).as_real().map(|v| v > split_value).unwrap_or(false))
        .collect();

    IgrResult {
        igr: ig,
        stop_criteria: false,
        branches: vec![
            SplitBranch { rule: Rule::numeric(feature_col, RuleType::Le, split_value), rows: le_rows, label_counts: best_acc },
            SplitBranch { rule: Rule::numeric(feature_col, RuleType::Gt, split_value), rows: gt_rows, label_counts: best_rest },
        ],
    }
}

pub fn igr_for_feature(df: &Dataframe, rows: &[usize], feature_col: usize, y_col: usize, s: f64, field_type: FieldType) -> IgrResult {
    if field_type.is_nominal() {
        igr_nominal(df, rows, feature_col, y_col, s)
    } else {
        igr_numeric(df, rows, feature_col, y_col, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataframe::ColumnInfo;

    fn weather_df() -> Dataframe {
        // outlook(0) temperature(1) play(2)
        let outlook = vec![0, 0, 1, 2, 2, 2, 1, 0, 0, 2, 0, 1, 1, 2]; // sunny=0 overcast=1 rainy=2
        let temp = vec![85.0, 80.0, 83.0, 70.0, 68.0, 65.0, 64.0, 72.0, 69.0, 75.0, 75.0, 72.0, 81.0, 71.0];
        let play = vec![0, 0, 1, 1, 1, 0, 1, 0, 1, 1, 1, 1, 1, 0]; // no=0 yes=1
        Dataframe::new(vec![
            (ColumnInfo { name: "outlook".into(), field_type: FieldType::TextId }, outlook.into_iter().map(Value::Int).collect()),
            (ColumnInfo { name: "temperature".into(), field_type: FieldType::Real }, temp.into_iter().map(Value::Real).collect()),
            (ColumnInfo { name: "play".into(), field_type: FieldType::TextId }, play.into_iter().map(Value::Int).collect()),
        ])
    }

    #[test]
    fn nominal_igr_positive_for_informative_feature() {
        let df = weather_df();
        let rows: Vec<usize> = (0..df.rows()).collect();
        let counts = label_counts(&df, &rows, 2);
        let s = calc_s(&counts);
        let r = igr_nominal(&df, &rows, 0, 2, s);
        assert!(!r.stop_criteria);
        assert!(r.igr > 0.0);
        assert_eq!(r.branches.len(), 3);
    }

    #[test]
    fn numeric_split_produces_two_branches() {
        let df = weather_df();
        let rows: Vec<usize> = (0..df.rows()).collect();
        let counts = label_counts(&df, &rows, 2);
        let s = calc_s(&counts);
        let r = igr_numeric(&df, &rows, 1, 2, s);
        assert_eq!(r.branches.len(), 2);
        assert_eq!(r.branches.iter().map(|b| b.rows.len()).sum::<usize>(), rows.len());
    }

    #[test]
    fn single_class_entropy_is_zero() {
        let mut counts = BTreeMap::new();
        counts.insert(1, 10);
        assert_eq!(calc_s(&counts), 0.0);
    }
}

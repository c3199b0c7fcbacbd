//! Per-source configuration describing how a raw table maps onto the
//! canonical observation shape. These are declarations, not logic: the
//! reconciliation core never branches on source identity.

use std::str::FromStr;

use itertools::Itertools;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::error::EpimergeError;
use crate::observation::Metric;
use crate::COL;

/// How a source's counts are shaped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// Row-per-(date, location) table. `cumulative` marks running totals
    /// that must be converted to day-over-day deltas.
    TimeSeries { cumulative: bool },
    /// Row-per-case microdata. Each row is one case; rows are grouped by
    /// (date, `group_columns`) and the group size becomes the value of
    /// `metric`. Case-line counts are daily increments by construction.
    CaseLine {
        metric: Metric,
        /// Canonical (post-rename) column names to group by.
        group_columns: Vec<String>,
    },
}

/// Declared mapping from one raw source table to the canonical shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Country every row belongs to, for tables that carry no country
    /// column of their own.
    pub country_code: Option<String>,
    /// Raw column name -> canonical field name (a `COL` constant or a
    /// metric name). Unmapped raw columns are dropped.
    pub column_map: Vec<(String, String)>,
    /// chrono format string for the mapped date column, e.g. `%d/%m/%Y`.
    pub date_format: String,
    pub kind: SourceKind,
}

impl SourceSpec {
    /// The metric columns this map produces.
    pub fn metrics(&self) -> Vec<Metric> {
        self.column_map
            .iter()
            .filter_map(|(_, canonical)| Metric::from_str(canonical).ok())
            .collect_vec()
    }

    /// Check the map against an actual table before any row is processed:
    /// every mapped raw column must exist, every target must be a canonical
    /// field or metric name, targets must be distinct, and a date column
    /// must be declared. A violation is a configuration error, not a data
    /// quality problem, so it fails the source rather than dropping rows.
    pub fn validate(&self, source: &str, table: &DataFrame) -> Result<(), EpimergeError> {
        let missing: Vec<String> = self
            .column_map
            .iter()
            .filter(|(raw, _)| table.column(raw).is_err())
            .map(|(raw, _)| raw.clone())
            .collect();
        if !missing.is_empty() {
            return Err(EpimergeError::MissingColumns {
                source_name: source.to_string(),
                columns: missing,
            });
        }
        let mut seen = Vec::with_capacity(self.column_map.len());
        for (_, canonical) in &self.column_map {
            let known = COL::CANONICAL_FIELDS.contains(&canonical.as_str())
                || Metric::from_str(canonical).is_ok();
            if !known {
                return Err(EpimergeError::UnknownField {
                    source_name: source.to_string(),
                    field: canonical.clone(),
                });
            }
            if seen.contains(canonical) {
                return Err(EpimergeError::DuplicateField {
                    source_name: source.to_string(),
                    field: canonical.clone(),
                });
            }
            seen.push(canonical.clone());
        }
        if !seen.iter().any(|canonical| canonical == COL::DATE) {
            return Err(EpimergeError::NoDateColumn {
                source_name: source.to_string(),
            });
        }
        if let SourceKind::CaseLine { group_columns, .. } = &self.kind {
            let unmapped = group_columns
                .iter()
                .filter(|column| !seen.contains(*column))
                .cloned()
                .collect_vec();
            if !unmapped.is_empty() {
                return Err(EpimergeError::MissingColumns {
                    source_name: source.to_string(),
                    columns: unmapped,
                });
            }
        }
        Ok(())
    }
}

/// Convenience constructor for the adapter stubs.
pub fn column_map(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(raw, canonical)| (raw.to_string(), canonical.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use polars::df;

    use super::*;

    fn spec() -> SourceSpec {
        SourceSpec {
            country_code: Some("AU".to_string()),
            column_map: column_map(&[
                ("Date", COL::DATE),
                ("State", COL::SUBREGION1_CODE),
                ("Cases", "confirmed"),
            ]),
            date_format: "%Y-%m-%d".to_string(),
            kind: SourceKind::TimeSeries { cumulative: true },
        }
    }

    #[test]
    fn valid_spec_passes_validation() {
        let table = df!(
            "Date" => ["2020-03-01"],
            "State" => ["NSW"],
            "Cases" => ["5"],
        )
        .unwrap();
        assert!(spec().validate("au", &table).is_ok());
        assert_eq!(spec().metrics(), vec![Metric::Confirmed]);
    }

    #[test]
    fn missing_raw_columns_fail_fast() {
        let table = df!("Date" => ["2020-03-01"]).unwrap();
        let err = spec().validate("au", &table).unwrap_err();
        match err {
            EpimergeError::MissingColumns { source_name: source, columns } => {
                assert_eq!(source, "au");
                assert_eq!(columns, vec!["State".to_string(), "Cases".to_string()]);
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn unknown_canonical_targets_are_config_errors() {
        let mut bad = spec();
        bad.column_map.push(("Extra".to_string(), "vibes".to_string()));
        let table = df!(
            "Date" => ["2020-03-01"],
            "State" => ["NSW"],
            "Cases" => ["5"],
            "Extra" => ["x"],
        )
        .unwrap();
        assert!(matches!(
            bad.validate("au", &table),
            Err(EpimergeError::UnknownField { .. })
        ));
    }

    #[test]
    fn a_date_column_is_required() {
        let mut bad = spec();
        bad.column_map.retain(|(_, canonical)| canonical != COL::DATE);
        let table = df!(
            "State" => ["NSW"],
            "Cases" => ["5"],
        )
        .unwrap();
        assert!(matches!(
            bad.validate("au", &table),
            Err(EpimergeError::NoDateColumn { .. })
        ));
    }
}

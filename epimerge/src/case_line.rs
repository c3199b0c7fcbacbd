//! Aggregation of row-per-case microdata into daily grouped counts.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use polars::prelude::*;

use crate::diagnostics::SourceDiagnostics;

/// One aggregated group: every case sharing a report date and the same
/// values across the requested group columns, in the caller's column order.
/// Missing cells group under the empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedCount {
    pub date: NaiveDate,
    pub groups: Vec<String>,
    pub count: i64,
}

/// Group case-line records by the cross product of report date and the
/// requested group columns; the count is the number of rows in each group.
/// This yields daily incremental counts directly, so no differencing is ever
/// applied downstream. Rows whose date fails to parse are dropped before
/// grouping and counted in `diagnostics`.
pub fn aggregate(
    table: &DataFrame,
    date_column: &str,
    group_columns: &[String],
    date_format: &str,
    diagnostics: &mut SourceDiagnostics,
) -> Result<Vec<GroupedCount>> {
    let dates = table.column(date_column)?.str()?;
    let mut group_cols = Vec::with_capacity(group_columns.len());
    for name in group_columns {
        group_cols.push(table.column(name)?.str()?);
    }

    let mut counts: BTreeMap<(NaiveDate, Vec<String>), i64> = BTreeMap::new();
    for idx in 0..table.height() {
        let parsed = dates
            .get(idx)
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), date_format).ok());
        let Some(date) = parsed else {
            diagnostics.unparseable_dates += 1;
            continue;
        };
        let groups: Vec<String> = group_cols
            .iter()
            .map(|col| col.get(idx).unwrap_or_default().trim().to_string())
            .collect();
        *counts.entry((date, groups)).or_insert(0) += 1;
    }

    Ok(counts
        .into_iter()
        .map(|((date, groups), count)| GroupedCount {
            date,
            groups,
            count,
        })
        .collect())
}

//! Conversion of heterogeneous per-source tables into the uniform
//! observation stream.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::NaiveDate;
use log::debug;
use polars::prelude::*;

use crate::case_line::{self, GroupedCount};
use crate::diagnostics::SourceDiagnostics;
use crate::location::{Gazetteer, LocationKey};
use crate::observation::{Metric, Observation};
use crate::source_spec::{SourceKind, SourceSpec};
use crate::COL;

/// Normalize one raw source table into observations. Column-map validation
/// fails fast before any row is processed; after that, bad dates and
/// unresolved locations are dropped row-by-row and counted, never raised.
pub fn normalize(
    source: &str,
    table: &DataFrame,
    spec: &SourceSpec,
    gazetteer: &Gazetteer,
) -> Result<(Vec<Observation>, SourceDiagnostics)> {
    let mut diagnostics = SourceDiagnostics {
        source: source.to_string(),
        rows_in: table.height() as u64,
        ..Default::default()
    };
    spec.validate(source, table)?;
    let renamed = rename_columns(table, spec)?;

    let observations = match &spec.kind {
        SourceKind::TimeSeries { cumulative } => {
            let observations =
                extract_observations(&renamed, spec, gazetteer, &mut diagnostics)?;
            if *cumulative {
                grouped_diff(observations)
            } else {
                observations
            }
        }
        SourceKind::CaseLine {
            metric,
            group_columns,
        } => {
            let counts = case_line::aggregate(
                &renamed,
                COL::DATE,
                group_columns,
                &spec.date_format,
                &mut diagnostics,
            )?;
            resolve_grouped_counts(counts, *metric, group_columns, spec, gazetteer, &mut diagnostics)
        }
    };

    diagnostics.observations = observations.len() as u64;
    debug!(
        "normalized {source}: {} rows in, {} observations, {} bad dates, {} unresolved",
        diagnostics.rows_in,
        diagnostics.observations,
        diagnostics.unparseable_dates,
        diagnostics.unresolved_locations
    );
    Ok((observations, diagnostics))
}

/// Project the table down to the mapped columns, renamed to their canonical
/// names. Everything downstream addresses columns by `COL` constants only.
fn rename_columns(table: &DataFrame, spec: &SourceSpec) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(spec.column_map.len());
    for (raw, canonical) in &spec.column_map {
        let mut series = table.column(raw)?.clone();
        series.rename(canonical);
        columns.push(series);
    }
    Ok(DataFrame::new(columns)?)
}

fn str_cell(table: &DataFrame, name: &str, idx: usize) -> Option<String> {
    let value = table.column(name).ok()?.str().ok()?.get(idx)?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Read a metric cell as a count. Sources deliver all-string tables, but a
/// programmatically built table may carry integers already; both are
/// accepted. Blank or unparseable cells are treated as missing, not zero.
fn count_cell(table: &DataFrame, name: &str, idx: usize) -> Option<i64> {
    let series = table.column(name).ok()?;
    match series.get(idx).ok()? {
        AnyValue::Null => None,
        AnyValue::Int64(n) => Some(n),
        AnyValue::Int32(n) => Some(n as i64),
        AnyValue::UInt64(n) => Some(n as i64),
        AnyValue::UInt32(n) => Some(n as i64),
        AnyValue::Float64(n) => Some(n as i64),
        AnyValue::String(s) => parse_count(s),
        AnyValue::StringOwned(s) => parse_count(&s),
        _ => None,
    }
}

fn parse_count(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    // Some aggregator feeds format counts as floats ("12.0").
    raw.parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().map(|f| f as i64))
}

fn extract_observations(
    table: &DataFrame,
    spec: &SourceSpec,
    gazetteer: &Gazetteer,
    diagnostics: &mut SourceDiagnostics,
) -> Result<Vec<Observation>> {
    let metrics = spec.metrics();
    let dates = table.column(COL::DATE)?.str()?;
    let mut observations = Vec::new();
    for idx in 0..table.height() {
        let parsed = dates
            .get(idx)
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), &spec.date_format).ok());
        let Some(date) = parsed else {
            diagnostics.unparseable_dates += 1;
            continue;
        };
        let Some(location) = resolve_row(table, spec, gazetteer, idx) else {
            diagnostics.unresolved_locations += 1;
            continue;
        };
        for metric in &metrics {
            if let Some(value) = count_cell(table, &metric.to_string(), idx) {
                observations.push(Observation {
                    date,
                    location: location.clone(),
                    metric: *metric,
                    value,
                });
            }
        }
    }
    Ok(observations)
}

/// Build the location key for one row. Sources reporting canonical codes
/// directly take precedence over free-text names; name-bearing rows go
/// through the gazetteer. A row that yields no valid key is unresolved.
fn resolve_row(
    table: &DataFrame,
    spec: &SourceSpec,
    gazetteer: &Gazetteer,
    idx: usize,
) -> Option<LocationKey> {
    let country = str_cell(table, COL::COUNTRY_CODE, idx).or_else(|| spec.country_code.clone())?;

    let has_code_columns = table.column(COL::SUBREGION1_CODE).is_ok()
        || table.column(COL::SUBREGION2_CODE).is_ok();
    if has_code_columns {
        let subregion1 = str_cell(table, COL::SUBREGION1_CODE, idx);
        let subregion2 = str_cell(table, COL::SUBREGION2_CODE, idx);
        return match (subregion1, subregion2) {
            (Some(subregion1), subregion2) => Some(LocationKey {
                country_code: country,
                subregion1_code: Some(subregion1),
                subregion2_code: subregion2,
            }),
            // A subregion2 code without its parent is not a valid key.
            (None, Some(_)) => None,
            (None, None) => Some(LocationKey::country(&country)),
        };
    }

    let mut names = Vec::new();
    for field in [COL::PARENT_NAME, COL::SUBREGION1_NAME, COL::SUBREGION2_NAME] {
        if let Some(name) = str_cell(table, field, idx) {
            names.push(name);
        }
    }
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    gazetteer.resolve(&name_refs, &country)
}

/// Resolve aggregated case-line groups to locations and sum counts that land
/// on the same `(date, location)`, e.g. when the grouping included age or
/// sex dimensions beyond the location fields.
fn resolve_grouped_counts(
    counts: Vec<GroupedCount>,
    metric: Metric,
    group_columns: &[String],
    spec: &SourceSpec,
    gazetteer: &Gazetteer,
    diagnostics: &mut SourceDiagnostics,
) -> Vec<Observation> {
    let position = |field: &str| group_columns.iter().position(|name| name == field);
    let country_idx = position(COL::COUNTRY_CODE);
    let name_indices: Vec<usize> = [COL::PARENT_NAME, COL::SUBREGION1_NAME, COL::SUBREGION2_NAME]
        .iter()
        .filter_map(|field| position(field))
        .collect();

    let mut merged: BTreeMap<(NaiveDate, LocationKey), i64> = BTreeMap::new();
    for group in counts {
        let country = country_idx
            .map(|idx| group.groups[idx].clone())
            .filter(|value| !value.is_empty())
            .or_else(|| spec.country_code.clone());
        let Some(country) = country else {
            diagnostics.unresolved_locations += group.count as u64;
            continue;
        };
        let names: Vec<&str> = name_indices
            .iter()
            .map(|&idx| group.groups[idx].as_str())
            .filter(|name| !name.is_empty())
            .collect();
        match gazetteer.resolve(&names, &country) {
            Some(location) => *merged.entry((group.date, location)).or_insert(0) += group.count,
            None => diagnostics.unresolved_locations += group.count as u64,
        }
    }

    merged
        .into_iter()
        .map(|((date, location), value)| Observation {
            date,
            location,
            metric,
            value,
        })
        .collect()
}

/// Convert cumulative counters to day-over-day deltas within each
/// (location, metric) series, ordered by date ascending. The first day's
/// delta equals its raw value; no prior baseline is assumed. Negative deltas
/// (a routine artifact of source corrections) pass through unclipped;
/// downstream consumers own that policy. Deltas are never computed across
/// locations. When a source reports the same (location, metric, date) twice,
/// the later row wins before differencing.
pub fn grouped_diff(observations: Vec<Observation>) -> Vec<Observation> {
    let mut series: BTreeMap<(LocationKey, Metric), BTreeMap<NaiveDate, i64>> = BTreeMap::new();
    for obs in observations {
        series
            .entry((obs.location, obs.metric))
            .or_default()
            .insert(obs.date, obs.value);
    }

    let mut out = Vec::new();
    for ((location, metric), values) in series {
        let mut previous = 0i64;
        for (date, value) in values {
            out.push(Observation {
                date,
                location: location.clone(),
                metric,
                value: value - previous,
            });
            previous = value;
        }
    }
    out
}

//! Output formatting for the reconciled table.

use std::io::{Cursor, Write};

use anyhow::Result;
use enum_dispatch::enum_dispatch;
use itertools::Itertools;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum::IntoEnumIterator;

use crate::merge::WideTable;
use crate::observation::Metric;
use crate::COL;

/// Convert the reconciled wide table into the canonical output frame: one
/// row per `(date, key)`, ISO-8601 dates, one nullable column per metric.
/// Row order is already canonical (ascending date, then key).
pub fn wide_table_to_frame(table: &WideTable) -> Result<DataFrame> {
    let metrics = Metric::iter().collect_vec();
    let mut dates = Vec::with_capacity(table.len());
    let mut keys = Vec::with_capacity(table.len());
    let mut values: Vec<Vec<Option<i64>>> = vec![Vec::with_capacity(table.len()); metrics.len()];

    for ((date, location), row) in table.iter() {
        dates.push(date.format("%Y-%m-%d").to_string());
        keys.push(location.to_string());
        for (column, metric) in values.iter_mut().zip(&metrics) {
            column.push(row.get(metric).copied());
        }
    }

    let mut columns = vec![Series::new(COL::DATE, dates), Series::new(COL::KEY, keys)];
    for (column, metric) in values.into_iter().zip(&metrics) {
        columns.push(Series::new(&metric.to_string(), column));
    }
    Ok(DataFrame::new(columns)?)
}

/// Utility to convert the handful of polars `AnyValue` types appearing in
/// the canonical frame to `serde_json::Value`.
fn any_value_to_json(value: &AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::String(s) => Value::String((*s).to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int64(n) => json!(*n),
        AnyValue::Int32(n) => json!(*n),
        AnyValue::UInt64(n) => json!(*n),
        AnyValue::Float64(n) => json!(*n),
        other => Value::String(format!("{other}")),
    }
}

/// Trait to define the different output generators. `save` streams the
/// serialized table into a writer; `format` renders it to a string.
#[enum_dispatch]
pub trait OutputGenerator {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()>;
    fn format(&self, df: &mut DataFrame) -> Result<String> {
        let mut data: Vec<u8> = Vec::new();
        let mut buff = Cursor::new(&mut data);
        self.save(&mut buff, df)?;
        Ok(String::from_utf8(data)?)
    }
}

/// Enum of output formatters, one per output type.
#[enum_dispatch(OutputGenerator)]
#[derive(Serialize, Deserialize, Debug)]
pub enum OutputFormatter {
    Csv(CsvFormatter),
    JsonSeq(JsonSeqFormatter),
}

/// Canonical CSV output.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct CsvFormatter;

impl OutputGenerator for CsvFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        CsvWriter::new(writer).finish(df)?;
        Ok(())
    }
}

/// One JSON object per row per line, for piping into downstream tooling.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct JsonSeqFormatter;

impl OutputGenerator for JsonSeqFormatter {
    fn save(&self, writer: &mut impl Write, df: &mut DataFrame) -> Result<()> {
        for idx in 0..df.height() {
            let mut row = serde_json::Map::new();
            for column in df.get_columns() {
                let value = any_value_to_json(&column.get(idx)?);
                if !value.is_null() {
                    row.insert(column.name().to_string(), value);
                }
            }
            writeln!(writer, "{}", Value::Object(row))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::location::LocationKey;
    use crate::observation::Observation;

    fn table() -> WideTable {
        let mut table = WideTable::default();
        table.insert(&Observation {
            date: NaiveDate::from_ymd_opt(2020, 3, 1).unwrap(),
            location: LocationKey::subregion2("PE", "LIM", "SL01"),
            metric: Metric::Confirmed,
            value: 1,
        });
        table.insert(&Observation {
            date: NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
            location: LocationKey::country("AU"),
            metric: Metric::Deceased,
            value: 2,
        });
        table
    }

    #[test]
    fn frame_has_one_row_per_date_and_key() {
        let df = wide_table_to_frame(&table()).unwrap();
        assert_eq!(df.shape(), (2, 6));
        let keys: Vec<Option<&str>> = df.column(COL::KEY).unwrap().str().unwrap().into_iter().collect();
        assert_eq!(keys, vec![Some("PE_LIM_SL01"), Some("AU")]);
        let confirmed: Vec<Option<i64>> =
            df.column("confirmed").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(
            confirmed,
            vec![Some(1), None],
            "metrics nobody reported stay missing in the output"
        );
    }

    #[test]
    fn csv_output_round_trips_header_and_rows() {
        let mut df = wide_table_to_frame(&table()).unwrap();
        let rendered = CsvFormatter.format(&mut df).unwrap();
        let mut lines = rendered.lines();
        assert_eq!(
            lines.next().unwrap(),
            "date,key,confirmed,deceased,recovered,tested"
        );
        assert_eq!(lines.next().unwrap(), "2020-03-01,PE_LIM_SL01,1,,,");
        assert_eq!(lines.next().unwrap(), "2020-03-02,AU,,2,,");
    }

    #[test]
    fn jsonseq_output_omits_missing_metrics() {
        let mut df = wide_table_to_frame(&table()).unwrap();
        let rendered = JsonSeqFormatter.format(&mut df).unwrap();
        let first: Value = serde_json::from_str(rendered.lines().next().unwrap()).unwrap();
        assert_eq!(first["date"], "2020-03-01");
        assert_eq!(first["key"], "PE_LIM_SL01");
        assert_eq!(first["confirmed"], 1);
        assert!(first.get("deceased").is_none());
    }
}

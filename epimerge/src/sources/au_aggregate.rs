use crate::source_spec::{column_map, SourceKind, SourceSpec};
use crate::COL;

use super::{DataSource, TableSpec};

/// State-level counters from the covid-19-au aggregation project. Values
/// are running totals since tracking began, so the normalizer converts them
/// to day-over-day deltas per state.
#[derive(Debug, Clone, Default)]
pub struct AuAggregate;

impl DataSource for AuAggregate {
    fn name(&self) -> &'static str {
        "au_aggregate"
    }

    fn table_specs(&self) -> Vec<TableSpec> {
        vec![TableSpec {
            table: "state_totals".to_string(),
            spec: SourceSpec {
                country_code: Some("AU".to_string()),
                column_map: column_map(&[
                    ("date", COL::DATE),
                    ("state_code", COL::SUBREGION1_CODE),
                    ("confirmed", "confirmed"),
                    ("deceased", "deceased"),
                    ("recovered", "recovered"),
                    ("tested", "tested"),
                ]),
                date_format: "%Y-%m-%d".to_string(),
                kind: SourceKind::TimeSeries { cumulative: true },
            },
        }]
    }
}

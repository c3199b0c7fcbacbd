use crate::source_spec::{column_map, SourceKind, SourceSpec};
use crate::COL;

use super::{DataSource, TableSpec};

/// Country-level daily counts from the ECDC feed. Already incremental, and
/// the lowest-precedence entry in the registry: it covers every country, so
/// any per-country authority reporting the same key overrides it.
#[derive(Debug, Clone, Default)]
pub struct EcdcAggregate;

impl DataSource for EcdcAggregate {
    fn name(&self) -> &'static str {
        "ecdc"
    }

    fn table_specs(&self) -> Vec<TableSpec> {
        vec![TableSpec {
            table: "daily".to_string(),
            spec: SourceSpec {
                country_code: None,
                column_map: column_map(&[
                    ("dateRep", COL::DATE),
                    ("geoId", COL::COUNTRY_CODE),
                    ("cases", "confirmed"),
                    ("deaths", "deceased"),
                ]),
                date_format: "%d/%m/%Y".to_string(),
                kind: SourceKind::TimeSeries { cumulative: false },
            },
        }]
    }
}

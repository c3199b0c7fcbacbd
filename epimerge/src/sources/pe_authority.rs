use crate::observation::Metric;
use crate::source_spec::{column_map, SourceKind, SourceSpec};
use crate::COL;

use super::{DataSource, TableSpec};

/// Peruvian health ministry open-data dumps: case-line microdata with one
/// row per confirmed case or death. The data is keyed by province and
/// district names while the gazetteer is keyed at the department level, so
/// district resolution leans on the disambiguation rules shipped with the
/// gazetteer for names shared across provinces.
#[derive(Debug, Clone, Default)]
pub struct PeAuthority;

impl DataSource for PeAuthority {
    fn name(&self) -> &'static str {
        "pe_authority"
    }

    fn table_specs(&self) -> Vec<TableSpec> {
        vec![
            TableSpec {
                table: "confirmed".to_string(),
                spec: SourceSpec {
                    country_code: Some("PE".to_string()),
                    column_map: column_map(&[
                        ("FECHA_RESULTADO", COL::DATE),
                        ("PROVINCIA", COL::PARENT_NAME),
                        ("DISTRITO", COL::SUBREGION2_NAME),
                        ("EDAD", COL::AGE),
                        ("SEXO", COL::SEX),
                    ]),
                    date_format: "%d/%m/%Y".to_string(),
                    kind: SourceKind::CaseLine {
                        metric: Metric::Confirmed,
                        group_columns: vec![
                            COL::PARENT_NAME.to_string(),
                            COL::SUBREGION2_NAME.to_string(),
                        ],
                    },
                },
            },
            TableSpec {
                table: "deceased".to_string(),
                spec: SourceSpec {
                    country_code: Some("PE".to_string()),
                    column_map: column_map(&[
                        ("FECHA_FALLECIMIENTO", COL::DATE),
                        ("PROVINCIA", COL::PARENT_NAME),
                        ("DISTRITO", COL::SUBREGION2_NAME),
                        ("EDAD_DECLARADA", COL::AGE),
                        ("SEXO", COL::SEX),
                    ]),
                    date_format: "%d/%m/%Y".to_string(),
                    kind: SourceKind::CaseLine {
                        metric: Metric::Deceased,
                        group_columns: vec![
                            COL::PARENT_NAME.to_string(),
                            COL::SUBREGION2_NAME.to_string(),
                        ],
                    },
                },
            },
        ]
    }
}

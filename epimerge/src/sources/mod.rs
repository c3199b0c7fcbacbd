//! Per-source adapter stubs. Each adapter declares which raw tables it
//! consumes and how their columns map onto the canonical shape, plus an
//! optional first-pass reshaping hook; everything downstream of that
//! declaration is shared pipeline code. Fetching the raw documents and
//! parsing them into first-pass tables happens outside this crate; the
//! adapters here receive in-memory tables.

use anyhow::Result;
use enum_dispatch::enum_dispatch;
use polars::prelude::DataFrame;

use crate::source_spec::SourceSpec;

mod au_aggregate;
mod ecdc_aggregate;
mod pe_authority;

pub use au_aggregate::AuAggregate;
pub use ecdc_aggregate::EcdcAggregate;
pub use pe_authority::PeAuthority;

/// One raw table consumed by a source, with its normalization spec.
#[derive(Debug, Clone)]
pub struct TableSpec {
    /// Key into the tables handed to the pipeline; also the snapshot file
    /// stem on disk.
    pub table: String,
    pub spec: SourceSpec,
}

#[enum_dispatch]
pub trait DataSource {
    /// Stable identifier, also the snapshot directory name.
    fn name(&self) -> &'static str;
    /// The raw tables this source consumes and how to normalize each.
    fn table_specs(&self) -> Vec<TableSpec>;
    /// Source-specific first-pass reshaping of a raw table before
    /// normalization, e.g. transposing a non-tabular feed. Default is
    /// identity.
    fn preprocess(&self, _table: &str, df: DataFrame) -> Result<DataFrame> {
        Ok(df)
    }
}

/// Registry of implemented sources, in default precedence order: later
/// entries win conflicts in the merge, so broad low-trust aggregators come
/// first and per-country authorities last.
#[enum_dispatch(DataSource)]
#[derive(Debug, Clone)]
pub enum KnownSource {
    EcdcAggregate(EcdcAggregate),
    AuAggregate(AuAggregate),
    PeAuthority(PeAuthority),
}

impl KnownSource {
    pub fn all() -> Vec<KnownSource> {
        vec![
            EcdcAggregate.into(),
            AuAggregate.into(),
            PeAuthority.into(),
        ]
    }

    pub fn by_name(name: &str) -> Option<KnownSource> {
        Self::all().into_iter().find(|source| source.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_names_are_unique_and_resolvable() {
        let sources = KnownSource::all();
        for source in &sources {
            assert!(
                KnownSource::by_name(source.name()).is_some(),
                "{} should be resolvable by name",
                source.name()
            );
        }
        let mut names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), sources.len());
    }

    #[test]
    fn every_table_spec_declares_a_date_column() {
        for source in KnownSource::all() {
            for table_spec in source.table_specs() {
                assert!(
                    table_spec
                        .spec
                        .column_map
                        .iter()
                        .any(|(_, canonical)| canonical == crate::COL::DATE),
                    "{}/{} must map a date column",
                    source.name(),
                    table_spec.table
                );
            }
        }
    }
}

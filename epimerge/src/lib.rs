use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use log::{debug, info, warn};
use polars::frame::DataFrame;

use crate::config::Config;
use crate::diagnostics::{RunDiagnostics, SourceDiagnostics};
use crate::error::EpimergeError;
use crate::location::Gazetteer;
use crate::merge::WideTable;
use crate::observation::ObservationStream;
use crate::sources::{DataSource, KnownSource};

// Re-exports
pub use column_names as COL;

// Modules
pub mod case_line;
pub mod column_names;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod formatters;
pub mod location;
pub mod merge;
pub mod normalize;
pub mod observation;
pub mod rollup;
pub mod source_spec;
pub mod sources;

/// Type for the epimerge pipeline and API.
pub struct Epimerge {
    pub gazetteer: Arc<Gazetteer>,
    pub config: Config,
}

/// One source scheduled for a run: the adapter plus its fetched raw tables,
/// keyed by the table names the adapter declares. The order of `SourceRun`s
/// handed to [`Epimerge::run`] is the merge precedence order.
pub struct SourceRun {
    pub source: KnownSource,
    pub tables: HashMap<String, DataFrame>,
}

/// Everything a run produces: the reconciled table plus drop accounting.
pub struct PipelineOutput {
    pub table: WideTable,
    pub diagnostics: RunDiagnostics,
}

impl Epimerge {
    /// Setup the pipeline with default configuration.
    pub fn new() -> Result<Self> {
        Self::new_with_config(Config::default())
    }

    /// Setup the pipeline with custom configuration, loading the reference
    /// gazetteer and disambiguation rules it points at.
    pub fn new_with_config(config: Config) -> Result<Self> {
        debug!("config: {config:?}");
        let gazetteer = Gazetteer::from_files(
            &config.gazetteer_path(),
            Some(&config.disambiguation_path()),
        )?;
        Ok(Self {
            gazetteer: Arc::new(gazetteer),
            config,
        })
    }

    /// Setup the pipeline with an already-built gazetteer, for embedding and
    /// tests.
    pub fn with_gazetteer(config: Config, gazetteer: Gazetteer) -> Self {
        Self {
            gazetteer: Arc::new(gazetteer),
            config,
        }
    }

    /// Run the full reconciliation over the given sources. Sources are
    /// normalized concurrently but their declared order in `runs` is the
    /// merge precedence order (later wins) regardless of which task finishes
    /// first. A source that fails (missing table, malformed column map) is
    /// logged and recorded in the diagnostics, and the run proceeds with the
    /// streams that succeeded.
    pub async fn run(&self, runs: Vec<SourceRun>) -> Result<PipelineOutput> {
        let tasks = runs.into_iter().map(|run| {
            let gazetteer = Arc::clone(&self.gazetteer);
            tokio::task::spawn_blocking(move || normalize_source(run, &gazetteer))
        });

        let mut diagnostics = RunDiagnostics::default();
        let mut streams: Vec<ObservationStream> = Vec::new();
        for joined in join_all(tasks).await {
            let (name, outcome) = joined?;
            match outcome {
                Ok((source_streams, source_diagnostics)) => {
                    streams.extend(source_streams);
                    diagnostics.sources.extend(source_diagnostics);
                }
                Err(err) => {
                    warn!("source {name} skipped: {err:#}");
                    diagnostics.failed_sources.push((name, format!("{err:#}")));
                }
            }
        }

        info!(
            "merging {} observation streams ({} observations, {} rows dropped)",
            streams.len(),
            diagnostics.total_observations(),
            diagnostics.total_dropped()
        );
        let mut table = merge::merge(&streams);
        rollup::rollup(&mut table);
        info!("reconciled table has {} rows", table.len());
        Ok(PipelineOutput { table, diagnostics })
    }
}

type SourceOutcome = Result<(Vec<ObservationStream>, Vec<SourceDiagnostics>)>;

/// Normalize every table one source contributes. Any failure fails the
/// whole source: a partially configured source is a configuration problem,
/// not a data quality one.
fn normalize_source(run: SourceRun, gazetteer: &Gazetteer) -> (String, SourceOutcome) {
    let name = run.source.name().to_string();
    let outcome: SourceOutcome = (|| {
        let mut streams = Vec::new();
        let mut diagnostics = Vec::new();
        for table_spec in run.source.table_specs() {
            let qualified = format!("{name}/{}", table_spec.table);
            let raw = run
                .tables
                .get(&table_spec.table)
                .ok_or_else(|| EpimergeError::MissingTable {
                    source_name: name.clone(),
                    table: table_spec.table.clone(),
                })?;
            let raw = run.source.preprocess(&table_spec.table, raw.clone())?;
            let (observations, table_diagnostics) =
                normalize::normalize(&qualified, &raw, &table_spec.spec, gazetteer)?;
            streams.push(ObservationStream {
                source: qualified,
                observations,
            });
            diagnostics.push(table_diagnostics);
        }
        Ok((streams, diagnostics))
    })();
    (name, outcome)
}

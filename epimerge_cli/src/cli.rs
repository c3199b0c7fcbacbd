use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use epimerge::config::Config;
use epimerge::formatters::{
    wide_table_to_frame, CsvFormatter, JsonSeqFormatter, OutputFormatter, OutputGenerator,
};
use epimerge::sources::{DataSource, KnownSource};
use epimerge::{Epimerge, SourceRun};
use log::{debug, info, warn};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;

use crate::display::{display_diagnostics, display_sources};
use crate::error::EpimergeCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";
const RECONCILING_STRING: &str = "Reconciling sources";

/// Defines the output formats we are able to produce data in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    Csv,
    JsonSeq,
    Stdout,
}

impl From<&OutputFormat> for OutputFormatter {
    fn from(value: &OutputFormat) -> Self {
        match value {
            OutputFormat::Csv | OutputFormat::Stdout => OutputFormatter::Csv(CsvFormatter),
            OutputFormat::JsonSeq => OutputFormatter::JsonSeq(JsonSeqFormatter),
        }
    }
}

impl From<OutputFormat> for OutputFormatter {
    fn from(value: OutputFormat) -> Self {
        Self::from(&value)
    }
}

fn write_output<T, U>(
    output_generator: T,
    mut data: DataFrame,
    output_file: Option<U>,
) -> EpimergeCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    if let Some(output_file) = output_file {
        let mut f = File::create(output_file).context("Failed to write output")?;
        output_generator.save(&mut f, &mut data)?;
    } else {
        let mut stdout_lock = std::io::stdout().lock();
        output_generator.save(&mut stdout_lock, &mut data)?;
    };
    Ok(())
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> EpimergeCliResult<()>;
}

/// The `run` command executes the reconciliation pipeline over local source
/// snapshots and outputs the canonical table.
#[derive(Args, Debug)]
pub struct RunPipelineCommand {
    #[arg(
        short = 'f',
        long,
        value_name = "csv|jsonseq",
        help = "Output format for the results",
        default_value = "csv"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file to place the results")]
    output_file: Option<String>,
    #[arg(
        long,
        help = "Directory holding reference data and source snapshots, overriding the configured one"
    )]
    data_dir: Option<String>,
    #[arg(
        short = 's',
        long = "source",
        help = "Only run the named sources. Precedence stays in registry order regardless of how the names are given"
    )]
    sources: Vec<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for RunPipelineCommand {
    async fn run(&self, config: Config) -> EpimergeCliResult<()> {
        info!("Running `run` subcommand");
        let mut config = config;
        if let Some(data_dir) = &self.data_dir {
            config.data_path = data_dir.clone();
        }
        let selected = selected_sources(&self.sources)?;

        let sp = (!self.quiet).then(|| {
            Spinner::with_timer(
                DEFAULT_PROGRESS_SPINNER,
                RECONCILING_STRING.to_string() + RUNNING_TAIL_STRING,
            )
        });
        let pipeline = Epimerge::new_with_config(config.clone())?;
        let mut runs = Vec::with_capacity(selected.len());
        for source in selected {
            let tables = load_source_tables(&config, &source);
            runs.push(SourceRun { source, tables });
        }
        let output = pipeline.run(runs).await?;
        if let Some(mut s) = sp {
            s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
        }

        if !self.quiet {
            display_diagnostics(&output.diagnostics)?;
        }
        let data = wide_table_to_frame(&output.table)?;
        debug!("{data:#?}");
        let formatter: OutputFormatter = (&self.output_format).into();
        write_output(formatter, data, self.output_file.as_deref())?;
        Ok(())
    }
}

/// Keep the registry's precedence order no matter how the `--source` flags
/// were ordered on the command line; an unknown name is an error rather than
/// a silent skip.
fn selected_sources(names: &[String]) -> EpimergeCliResult<Vec<KnownSource>> {
    if names.is_empty() {
        return Ok(KnownSource::all());
    }
    let selected: Vec<KnownSource> = KnownSource::all()
        .into_iter()
        .filter(|source| names.iter().any(|name| name == source.name()))
        .collect();
    for name in names {
        if !selected.iter().any(|source| source.name() == name) {
            return Err(anyhow::anyhow!("Unknown source: {name}").into());
        }
    }
    Ok(selected)
}

/// Read the snapshot tables one source declares. A missing or unreadable
/// snapshot is only logged here: the pipeline records the incomplete source
/// in the run diagnostics and proceeds with the rest.
fn load_source_tables(config: &Config, source: &KnownSource) -> HashMap<String, DataFrame> {
    let mut tables = HashMap::new();
    for table_spec in source.table_specs() {
        let path = config.source_table_path(source.name(), &table_spec.table);
        debug!("loading table {} from {}", table_spec.table, path.display());
        match read_snapshot(&path) {
            Ok(df) => {
                tables.insert(table_spec.table, df);
            }
            Err(err) => warn!("could not read {}: {err:#}", path.display()),
        }
    }
    tables
}

/// Snapshots are read with schema inference disabled so that codes and
/// counts alike stay strings until the normalizer interprets them.
fn read_snapshot(path: &Path) -> anyhow::Result<DataFrame> {
    Ok(CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Failed to read snapshot from {}", path.display()))?)
}

/// The Sources command lists the implemented sources and the raw tables
/// each one consumes.
#[derive(Args, Debug)]
pub struct SourcesCommand;

impl RunCommand for SourcesCommand {
    async fn run(&self, _config: Config) -> EpimergeCliResult<()> {
        info!("Running `sources` subcommand");
        println!("\nThe following sources are implemented:");
        display_sources(&KnownSource::all())?;
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Reconcile multi-source epidemiology feeds into one canonical time series", long_about = None, name="epimerge")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress or diagnostics to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Commands contains the list of subcommands avaliable for use in the CLI.
/// Each command should implmement the RunCommand trait and specify the list
/// of required args for that command.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Run the reconciliation pipeline over local source snapshots
    Run(RunPipelineCommand),
    /// List the implemented sources and the tables they consume
    Sources(SourcesCommand),
}

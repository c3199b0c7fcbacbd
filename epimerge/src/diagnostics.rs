//! Run-level accounting of expected, routine drops. Unresolved locations and
//! unparseable dates are everyday occurrences in noisy source data, so they
//! are counted and reported rather than raised.

use serde::Serialize;

/// Drop and volume counters for one source table.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SourceDiagnostics {
    pub source: String,
    pub rows_in: u64,
    pub observations: u64,
    pub unparseable_dates: u64,
    pub unresolved_locations: u64,
}

/// Aggregated diagnostics for one pipeline run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunDiagnostics {
    pub sources: Vec<SourceDiagnostics>,
    /// Sources skipped entirely, with the failure that removed them. The run
    /// still produces output from the remaining sources.
    pub failed_sources: Vec<(String, String)>,
}

impl RunDiagnostics {
    pub fn total_observations(&self) -> u64 {
        self.sources.iter().map(|s| s.observations).sum()
    }

    pub fn total_dropped(&self) -> u64 {
        self.sources
            .iter()
            .map(|s| s.unparseable_dates + s.unresolved_locations)
            .sum()
    }
}

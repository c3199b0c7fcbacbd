use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::location::LocationKey;

/// A metric tracked in the canonical time series. The string form of each
/// variant is both the canonical column-map target and the output column name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Confirmed,
    Deceased,
    Recovered,
    Tested,
}

/// A single `(date, location, metric, value)` fact in the canonical model.
/// Values are daily counts, never cumulative, by the time they reach the
/// merger. `i64` rather than an unsigned type because negative deltas from
/// source corrections are passed through rather than clipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub location: LocationKey,
    pub metric: Metric,
    pub value: i64,
}

/// All observations contributed by one source table, tagged for diagnostics.
/// The order in which streams are handed to the merger is the precedence
/// order: later streams win conflicts.
#[derive(Debug, Clone, Default)]
pub struct ObservationStream {
    pub source: String,
    pub observations: Vec<Observation>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn metric_round_trips_through_its_string_form() {
        assert_eq!(Metric::Confirmed.to_string(), "confirmed");
        assert_eq!(Metric::from_str("deceased").unwrap(), Metric::Deceased);
        assert_eq!(
            Metric::from_str("Recovered").unwrap(),
            Metric::Recovered,
            "parsing should be case insensitive"
        );
        assert!(Metric::from_str("vaccinated").is_err());
    }
}

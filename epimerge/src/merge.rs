//! Merging per-source observation streams into one wide table.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::debug;

use crate::location::LocationKey;
use crate::observation::{Metric, Observation, ObservationStream};

/// The reconciled wide table: one row per `(date, location)` with at most
/// one value per metric. The `BTreeMap` keys give the canonical output
/// ordering (ascending date, then location) with no separate sort, so the
/// output is diffable across runs regardless of input stream order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WideTable {
    rows: BTreeMap<(NaiveDate, LocationKey), BTreeMap<Metric, i64>>,
}

impl WideTable {
    pub fn insert(&mut self, observation: &Observation) {
        self.rows
            .entry((observation.date, observation.location.clone()))
            .or_default()
            .insert(observation.metric, observation.value);
    }

    /// Set a metric only when the row does not already carry it. Used by the
    /// rollup so computed values never override reported ones.
    pub fn set_if_missing(
        &mut self,
        date: NaiveDate,
        location: LocationKey,
        metric: Metric,
        value: i64,
    ) {
        self.rows
            .entry((date, location))
            .or_default()
            .entry(metric)
            .or_insert(value);
    }

    pub fn value(&self, date: NaiveDate, location: &LocationKey, metric: Metric) -> Option<i64> {
        self.rows
            .get(&(date, location.clone()))
            .and_then(|metrics| metrics.get(&metric).copied())
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (&(NaiveDate, LocationKey), &BTreeMap<Metric, i64>)> {
        self.rows.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &(NaiveDate, LocationKey)> {
        self.rows.keys()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Full outer join of the streams on `(date, location)`. The output row set
/// is the union of keys seen in any stream; metrics nobody reported stay
/// unset rather than zero. When two streams report the same
/// `(date, location, metric)`, the later stream in the input ordering wins.
/// Precedence is expressed purely by the caller's ordering of `streams`, so
/// the orchestrator, not this function, owns precedence policy.
pub fn merge(streams: &[ObservationStream]) -> WideTable {
    let mut table = WideTable::default();
    for stream in streams {
        debug!(
            "merging {} observations from {}",
            stream.observations.len(),
            stream.source
        );
        for observation in &stream.observations {
            table.insert(observation);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    fn stream(source: &str, observations: Vec<Observation>) -> ObservationStream {
        ObservationStream {
            source: source.to_string(),
            observations,
        }
    }

    fn obs(d: u32, location: LocationKey, metric: Metric, value: i64) -> Observation {
        Observation {
            date: date(d),
            location,
            metric,
            value,
        }
    }

    #[test]
    fn later_streams_win_conflicts() {
        let key = LocationKey::country("PE");
        let a = stream("a", vec![obs(1, key.clone(), Metric::Confirmed, 5)]);
        let b = stream("b", vec![obs(1, key.clone(), Metric::Confirmed, 7)]);

        let merged = merge(&[a.clone(), b.clone()]);
        assert_eq!(merged.value(date(1), &key, Metric::Confirmed), Some(7));

        let merged = merge(&[b, a]);
        assert_eq!(merged.value(date(1), &key, Metric::Confirmed), Some(5));
    }

    #[test]
    fn merged_key_set_is_the_union_of_stream_keys() {
        let pe = LocationKey::country("PE");
        let au = LocationKey::subregion1("AU", "NSW");
        let a = stream("a", vec![obs(1, pe.clone(), Metric::Confirmed, 5)]);
        let b = stream(
            "b",
            vec![
                obs(1, au.clone(), Metric::Deceased, 1),
                obs(2, pe.clone(), Metric::Confirmed, 6),
            ],
        );

        let merged = merge(&[a, b]);
        let keys: Vec<_> = merged.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                (date(1), au.clone()),
                (date(1), pe.clone()),
                (date(2), pe.clone()),
            ],
            "rows are ordered by date then location and nothing is dropped"
        );
    }

    #[test]
    fn metrics_from_different_streams_land_in_one_row() {
        let key = LocationKey::country("PE");
        let a = stream("a", vec![obs(1, key.clone(), Metric::Confirmed, 5)]);
        let b = stream("b", vec![obs(1, key.clone(), Metric::Deceased, 2)]);

        let merged = merge(&[a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.value(date(1), &key, Metric::Confirmed), Some(5));
        assert_eq!(merged.value(date(1), &key, Metric::Deceased), Some(2));
        assert_eq!(
            merged.value(date(1), &key, Metric::Recovered),
            None,
            "metrics nobody reported stay unset"
        );
    }
}

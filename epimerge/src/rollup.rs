//! Bottom-up aggregation of leaf observations through the administrative
//! hierarchy.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::debug;

use crate::location::{AdminLevel, LocationKey};
use crate::merge::WideTable;
use crate::observation::Metric;

/// Fill parent-level rows by summing child values, subregion2 → subregion1 →
/// country. A parent `(date, metric)` with at least one reporting child gets
/// the sum of the children that do report; with none it stays missing rather
/// than materializing as zero. Directly reported parent values are left
/// untouched: the computed rollup fills gaps, it does not override
/// authoritative parent-level reporting. Country sums therefore include
/// subregion1 values produced earlier in the same pass, and applying the
/// rollup twice yields the same table.
pub fn rollup(table: &mut WideTable) {
    roll_level(table, AdminLevel::Subregion2);
    roll_level(table, AdminLevel::Subregion1);
}

fn roll_level(table: &mut WideTable, child_level: AdminLevel) {
    let mut sums: BTreeMap<(NaiveDate, LocationKey, Metric), i64> = BTreeMap::new();
    for ((date, location), metrics) in table.iter() {
        if location.level() != child_level {
            continue;
        }
        let Some(parent) = location.parent() else {
            continue;
        };
        for (metric, value) in metrics {
            *sums.entry((*date, parent.clone(), *metric)).or_insert(0) += *value;
        }
    }
    debug!(
        "rolling {} (date, parent, metric) sums up from {child_level:?}",
        sums.len()
    );
    for ((date, parent, metric), sum) in sums {
        table.set_if_missing(date, parent, metric, sum);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    fn insert(table: &mut WideTable, d: u32, location: LocationKey, metric: Metric, value: i64) {
        table.insert(&Observation {
            date: date(d),
            location,
            metric,
            value,
        });
    }

    fn leaf_table() -> WideTable {
        let mut table = WideTable::default();
        insert(
            &mut table,
            1,
            LocationKey::subregion2("PE", "LIM", "SL01"),
            Metric::Confirmed,
            3,
        );
        insert(
            &mut table,
            1,
            LocationKey::subregion2("PE", "LIM", "SL02"),
            Metric::Confirmed,
            4,
        );
        insert(
            &mut table,
            1,
            LocationKey::subregion1("PE", "ICA"),
            Metric::Confirmed,
            10,
        );
        table
    }

    #[test]
    fn parents_are_filled_from_child_sums_bottom_up() {
        let mut table = leaf_table();
        rollup(&mut table);

        assert_eq!(
            table.value(date(1), &LocationKey::subregion1("PE", "LIM"), Metric::Confirmed),
            Some(7),
            "subregion1 is the sum of its subregion2 children"
        );
        assert_eq!(
            table.value(date(1), &LocationKey::country("PE"), Metric::Confirmed),
            Some(17),
            "the country sum includes the subregion1 value computed in the same pass"
        );
    }

    #[test]
    fn rollup_is_idempotent() {
        let mut table = leaf_table();
        rollup(&mut table);
        let once = table.clone();
        rollup(&mut table);
        assert_eq!(table, once, "re-applying the rollup must not double count");
    }

    #[test]
    fn reported_parent_values_are_never_overridden() {
        let mut table = leaf_table();
        // The source reported a subregion1 total that disagrees with the sum
        // of its children.
        insert(
            &mut table,
            1,
            LocationKey::subregion1("PE", "LIM"),
            Metric::Confirmed,
            100,
        );
        rollup(&mut table);

        assert_eq!(
            table.value(date(1), &LocationKey::subregion1("PE", "LIM"), Metric::Confirmed),
            Some(100),
            "directly reported totals win over computed sums"
        );
        assert_eq!(
            table.value(date(1), &LocationKey::country("PE"), Metric::Confirmed),
            Some(110),
            "the country rollup sums the reported subregion1 values"
        );
    }

    #[test]
    fn parents_with_no_reporting_children_stay_missing() {
        let mut table = WideTable::default();
        insert(
            &mut table,
            1,
            LocationKey::subregion2("PE", "LIM", "SL01"),
            Metric::Confirmed,
            3,
        );
        rollup(&mut table);

        assert_eq!(
            table.value(date(1), &LocationKey::subregion1("PE", "LIM"), Metric::Deceased),
            None,
            "a metric no child reported is never materialized as zero"
        );
        assert_eq!(
            table.value(date(1), &LocationKey::subregion1("PE", "LIM"), Metric::Confirmed),
            Some(3)
        );
    }

    #[test]
    fn conservation_holds_for_computed_parents() {
        let mut table = leaf_table();
        insert(
            &mut table,
            1,
            LocationKey::subregion2("PE", "LIM", "SL01"),
            Metric::Deceased,
            1,
        );
        rollup(&mut table);

        let children_sum = table
            .value(date(1), &LocationKey::subregion2("PE", "LIM", "SL01"), Metric::Confirmed)
            .unwrap()
            + table
                .value(date(1), &LocationKey::subregion2("PE", "LIM", "SL02"), Metric::Confirmed)
                .unwrap();
        assert_eq!(
            table.value(date(1), &LocationKey::subregion1("PE", "LIM"), Metric::Confirmed),
            Some(children_sum)
        );
    }
}

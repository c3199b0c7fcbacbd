//! Canonical location keys, the reference gazetteer and free-text name
//! resolution.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use log::debug;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::COL;

/// Administrative level of a location key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminLevel {
    Country,
    Subregion1,
    Subregion2,
}

/// Canonical hierarchical location identifier. A subregion2 key implies a
/// subregion1 parent which implies a country; two keys are equal iff all
/// present fields are equal and absent fields match absence. The derived
/// ordering (`None` before `Some`) sorts parents ahead of their children,
/// which is the output row order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationKey {
    pub country_code: String,
    pub subregion1_code: Option<String>,
    pub subregion2_code: Option<String>,
}

impl LocationKey {
    pub fn country(country_code: &str) -> Self {
        Self {
            country_code: country_code.to_string(),
            subregion1_code: None,
            subregion2_code: None,
        }
    }

    pub fn subregion1(country_code: &str, subregion1_code: &str) -> Self {
        Self {
            country_code: country_code.to_string(),
            subregion1_code: Some(subregion1_code.to_string()),
            subregion2_code: None,
        }
    }

    pub fn subregion2(country_code: &str, subregion1_code: &str, subregion2_code: &str) -> Self {
        Self {
            country_code: country_code.to_string(),
            subregion1_code: Some(subregion1_code.to_string()),
            subregion2_code: Some(subregion2_code.to_string()),
        }
    }

    pub fn level(&self) -> AdminLevel {
        match (&self.subregion1_code, &self.subregion2_code) {
            (_, Some(_)) => AdminLevel::Subregion2,
            (Some(_), None) => AdminLevel::Subregion1,
            (None, None) => AdminLevel::Country,
        }
    }

    /// The key one level up the hierarchy, or `None` for a country key.
    pub fn parent(&self) -> Option<LocationKey> {
        match self.level() {
            AdminLevel::Country => None,
            AdminLevel::Subregion1 => Some(LocationKey::country(&self.country_code)),
            AdminLevel::Subregion2 => Some(LocationKey {
                country_code: self.country_code.clone(),
                subregion1_code: self.subregion1_code.clone(),
                subregion2_code: None,
            }),
        }
    }
}

impl Display for LocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.country_code)?;
        if let Some(subregion1) = &self.subregion1_code {
            write!(f, "_{subregion1}")?;
        }
        if let Some(subregion2) = &self.subregion2_code {
            write!(f, "_{subregion2}")?;
        }
        Ok(())
    }
}

static NON_ALPHANUMERIC: OnceLock<Regex> = OnceLock::new();

/// Collapse a free-text place name into a fuzzy lookup key: casefold, strip
/// diacritics, drop punctuation and whitespace. "San Luis" and "SAN LUIS,"
/// both become `sanluis`; "Cañete" becomes `canete`. Lookups are exact
/// matches on these keys only, with no edit-distance fallback.
pub fn fuzzy_text(text: &str) -> String {
    let re = NON_ALPHANUMERIC.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));
    let stripped: String = text.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    re.replace_all(&stripped.to_lowercase(), "").into_owned()
}

/// A child place name shared by two parents. When a source is keyed only by
/// the child name, the fuzzy lookup key is rewritten to `"{child}, {parent}"`
/// before the gazetteer lookup, since the plain child name is ambiguous
/// between the two. All three fields are fuzzy keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisambiguationRule {
    pub parent1: String,
    pub parent2: String,
    pub child: String,
}

/// Reference mapping of fuzzy place names to canonical location keys, plus
/// the ordered disambiguation rules. Loaded once per run and shared
/// read-only across source normalization.
#[derive(Debug, Default)]
pub struct Gazetteer {
    /// (country_code, fuzzy name) -> subregion1 key.
    subregion1s: HashMap<(String, String), LocationKey>,
    /// (country_code, match key) -> subregion2 key. `None` marks a plain
    /// name that collides across entries and must stay unresolved.
    subregion2s: HashMap<(String, String), Option<LocationKey>>,
    rules: Vec<DisambiguationRule>,
}

fn str_cell(df: &DataFrame, name: &str, idx: usize) -> Option<String> {
    let value = df.column(name).ok()?.str().ok()?.get(idx)?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

impl Gazetteer {
    /// Build the lookup tables from a gazetteer frame with columns
    /// `country_code`, `subregion1_code`, `subregion1_name`,
    /// `subregion2_code`, `subregion2_name` and an optional `match_string`
    /// holding a pre-built fuzzy key (e.g. `"sanluis, lima"`) for entries
    /// whose plain name collides with another entry.
    pub fn from_frame(df: &DataFrame, rules: Vec<DisambiguationRule>) -> Result<Self> {
        df.column(COL::COUNTRY_CODE)
            .context("Gazetteer is missing the country_code column")?;

        let mut gazetteer = Gazetteer {
            rules,
            ..Default::default()
        };
        for idx in 0..df.height() {
            let Some(country) = str_cell(df, COL::COUNTRY_CODE, idx) else {
                debug!("gazetteer row {idx} has no country code, skipping");
                continue;
            };
            let subregion1_code = str_cell(df, COL::SUBREGION1_CODE, idx);
            let subregion2_code = str_cell(df, COL::SUBREGION2_CODE, idx);
            match (subregion1_code, subregion2_code) {
                (Some(subregion1), Some(subregion2)) => {
                    let match_key = str_cell(df, COL::MATCH_STRING, idx).or_else(|| {
                        str_cell(df, COL::SUBREGION2_NAME, idx).map(|name| fuzzy_text(&name))
                    });
                    let Some(match_key) = match_key else {
                        debug!("gazetteer row {idx} has no subregion2 name, skipping");
                        continue;
                    };
                    let key = LocationKey::subregion2(&country, &subregion1, &subregion2);
                    gazetteer.insert_subregion2(country, match_key, key);
                }
                (Some(subregion1), None) => {
                    let Some(name) = str_cell(df, COL::SUBREGION1_NAME, idx) else {
                        debug!("gazetteer row {idx} has no subregion1 name, skipping");
                        continue;
                    };
                    gazetteer.subregion1s.insert(
                        (country.clone(), fuzzy_text(&name)),
                        LocationKey::subregion1(&country, &subregion1),
                    );
                }
                _ => debug!("gazetteer row {idx} has no subregion codes, skipping"),
            }
        }
        debug!(
            "loaded gazetteer: {} subregion1 names, {} subregion2 match keys",
            gazetteer.subregion1s.len(),
            gazetteer.subregion2s.len()
        );
        Ok(gazetteer)
    }

    /// Load the gazetteer CSV and, when present, the disambiguation rules
    /// JSON. Schema inference is disabled so codes stay strings.
    pub fn from_files(gazetteer_path: &Path, rules_path: Option<&Path>) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(gazetteer_path.to_path_buf()))?
            .finish()
            .with_context(|| {
                format!("Failed to load gazetteer from {}", gazetteer_path.display())
            })?;
        let rules = match rules_path {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(path).with_context(|| {
                    format!("Failed to read disambiguation rules from {}", path.display())
                })?;
                serde_json::from_str(&contents)?
            }
            _ => Vec::new(),
        };
        Self::from_frame(&df, rules)
    }

    fn insert_subregion2(&mut self, country: String, match_key: String, key: LocationKey) {
        self.subregion2s
            .entry((country, match_key))
            .and_modify(|existing| {
                // Colliding plain names resolve to neither entry; collisions
                // must be given explicit match strings in the gazetteer.
                *existing = None;
            })
            .or_insert(Some(key));
    }

    /// Resolve free-text location names against the gazetteer. The last
    /// field is the lookup target and the preceding field, if any, is parent
    /// context consulted by the disambiguation rules. Empty `name_fields`
    /// resolves to the country-level key; a lookup miss yields `None`, never
    /// a best guess.
    pub fn resolve(&self, name_fields: &[&str], country_code: &str) -> Option<LocationKey> {
        let names: Vec<String> = name_fields
            .iter()
            .map(|name| fuzzy_text(name))
            .filter(|name| !name.is_empty())
            .collect();
        match names.as_slice() {
            [] => Some(LocationKey::country(country_code)),
            [name] => self
                .lookup_subregion1(country_code, name)
                .or_else(|| self.lookup_subregion2(country_code, name)),
            [.., parent, child] => {
                let match_key = self.apply_rules(parent, child);
                self.lookup_subregion2(country_code, &match_key)
                    .or_else(|| self.lookup_subregion1(country_code, child))
            }
        }
    }

    /// Rewrite a fuzzy child key to `"{child}, {parent}"` when an ordered
    /// rule marks the plain child name as ambiguous under this parent. The
    /// first matching rule wins.
    fn apply_rules(&self, parent: &str, child: &str) -> String {
        for rule in &self.rules {
            if rule.child == child && (rule.parent1 == parent || rule.parent2 == parent) {
                return format!("{child}, {parent}");
            }
        }
        child.to_string()
    }

    fn lookup_subregion1(&self, country_code: &str, name: &str) -> Option<LocationKey> {
        self.subregion1s
            .get(&(country_code.to_string(), name.to_string()))
            .cloned()
    }

    fn lookup_subregion2(&self, country_code: &str, match_key: &str) -> Option<LocationKey> {
        self.subregion2s
            .get(&(country_code.to_string(), match_key.to_string()))
            .and_then(|entry| entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_gazetteer() -> Gazetteer {
        let df = df!(
            COL::COUNTRY_CODE => ["PE", "PE", "PE", "PE", "PE", "AU"],
            COL::SUBREGION1_CODE => ["LIM", "ICA", "LIM", "LIM", "LIM", "NSW"],
            COL::SUBREGION1_NAME => ["Lima", "Ica", "Lima", "Lima", "Lima", "New South Wales"],
            COL::SUBREGION2_CODE => ["", "", "SL01", "SL02", "SB01", ""],
            COL::SUBREGION2_NAME => ["", "", "San Luis", "San Luis", "San Borja", ""],
            COL::MATCH_STRING => ["", "", "sanluis, lima", "sanluis, canete", "", ""],
        )
        .unwrap();
        let rules = vec![DisambiguationRule {
            parent1: "lima".to_string(),
            parent2: "canete".to_string(),
            child: "sanluis".to_string(),
        }];
        Gazetteer::from_frame(&df, rules).unwrap()
    }

    #[test]
    fn fuzzy_text_is_stable_under_spelling_variation() {
        assert_eq!(fuzzy_text("San Luis"), "sanluis");
        assert_eq!(fuzzy_text("SAN LUIS,"), "sanluis");
        assert_eq!(fuzzy_text("Cañete"), "canete");
        assert_eq!(fuzzy_text("  Áncash "), "ancash");
        assert_eq!(fuzzy_text("New South Wales"), "newsouthwales");
    }

    #[test]
    fn subregion1_names_resolve_within_their_country() {
        let gazetteer = test_gazetteer();
        assert_eq!(
            gazetteer.resolve(&["Lima"], "PE"),
            Some(LocationKey::subregion1("PE", "LIM"))
        );
        assert_eq!(
            gazetteer.resolve(&["new south wales"], "AU"),
            Some(LocationKey::subregion1("AU", "NSW"))
        );
        assert_eq!(
            gazetteer.resolve(&["Lima"], "AU"),
            None,
            "names never resolve across countries"
        );
    }

    #[test]
    fn colliding_child_resolves_differently_per_parent() {
        let gazetteer = test_gazetteer();
        let under_lima = gazetteer.resolve(&["Lima", "San Luis"], "PE").unwrap();
        let under_canete = gazetteer.resolve(&["Cañete", "San Luis"], "PE").unwrap();
        assert_eq!(under_lima, LocationKey::subregion2("PE", "LIM", "SL01"));
        assert_eq!(under_canete, LocationKey::subregion2("PE", "LIM", "SL02"));
        assert_ne!(under_lima, under_canete);
    }

    #[test]
    fn child_with_no_rule_resolves_by_plain_name() {
        let gazetteer = test_gazetteer();
        assert_eq!(
            gazetteer.resolve(&["Lima", "San Borja"], "PE"),
            Some(LocationKey::subregion2("PE", "LIM", "SB01"))
        );
    }

    #[test]
    fn unknown_names_stay_unresolved() {
        let gazetteer = test_gazetteer();
        assert_eq!(gazetteer.resolve(&["Narnia"], "PE"), None);
        assert_eq!(gazetteer.resolve(&["Lima", "Atlantis"], "PE"), None);
    }

    #[test]
    fn empty_name_fields_resolve_to_the_country() {
        let gazetteer = test_gazetteer();
        assert_eq!(
            gazetteer.resolve(&[], "PE"),
            Some(LocationKey::country("PE"))
        );
        assert_eq!(
            gazetteer.resolve(&[" "], "PE"),
            Some(LocationKey::country("PE")),
            "blank fields are treated as absent"
        );
    }

    #[test]
    fn colliding_plain_names_without_match_string_are_ambiguous() {
        let df = df!(
            COL::COUNTRY_CODE => ["PE", "PE"],
            COL::SUBREGION1_CODE => ["LIM", "ANC"],
            COL::SUBREGION1_NAME => ["Lima", "Ancash"],
            COL::SUBREGION2_CODE => ["HU01", "HU02"],
            COL::SUBREGION2_NAME => ["Huallanca", "Huallanca"],
            COL::MATCH_STRING => ["", ""],
        )
        .unwrap();
        let gazetteer = Gazetteer::from_frame(&df, Vec::new()).unwrap();
        assert_eq!(
            gazetteer.resolve(&["Huallanca"], "PE"),
            None,
            "a name shared by two entries resolves to neither"
        );
    }

    #[test]
    fn gazetteer_loads_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let gazetteer_path = dir.path().join("gazetteer.csv");
        std::fs::write(
            &gazetteer_path,
            "country_code,subregion1_code,subregion1_name,subregion2_code,subregion2_name,match_string\n\
             PE,LIM,Lima,,,\n\
             PE,LIM,Lima,SL01,San Luis,\"sanluis, lima\"\n",
        )
        .unwrap();
        let rules_path = dir.path().join("disambiguation.json");
        std::fs::write(
            &rules_path,
            r#"[{ "parent1": "lima", "parent2": "canete", "child": "sanluis" }]"#,
        )
        .unwrap();

        let gazetteer = Gazetteer::from_files(&gazetteer_path, Some(&rules_path)).unwrap();
        assert_eq!(
            gazetteer.resolve(&["Lima"], "PE"),
            Some(LocationKey::subregion1("PE", "LIM"))
        );
        assert_eq!(
            gazetteer.resolve(&["Lima", "San Luis"], "PE"),
            Some(LocationKey::subregion2("PE", "LIM", "SL01"))
        );

        // Rules are optional reference data.
        let without_rules = Gazetteer::from_files(&gazetteer_path, None).unwrap();
        assert_eq!(without_rules.resolve(&["Lima", "San Luis"], "PE"), None);
    }

    #[test]
    fn keys_order_parents_before_children() {
        let country = LocationKey::country("PE");
        let subregion1 = LocationKey::subregion1("PE", "LIM");
        let subregion2 = LocationKey::subregion2("PE", "LIM", "SL01");
        assert!(country < subregion1);
        assert!(subregion1 < subregion2);
        assert_eq!(subregion2.parent(), Some(subregion1.clone()));
        assert_eq!(subregion1.parent(), Some(country));
        assert_eq!(subregion2.to_string(), "PE_LIM_SL01");
    }
}

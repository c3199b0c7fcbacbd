//! This module stores the canonical column names used throughout the
//! reconciliation pipeline. Source column maps must target these names (or a
//! metric name), and the output table is keyed by them.

pub const DATE: &str = "date";
pub const KEY: &str = "key";

pub const COUNTRY_CODE: &str = "country_code";
pub const SUBREGION1_CODE: &str = "subregion1_code";
pub const SUBREGION2_CODE: &str = "subregion2_code";

pub const SUBREGION1_NAME: &str = "subregion1_name";
pub const SUBREGION2_NAME: &str = "subregion2_name";
/// Free-text parent context used only for disambiguating colliding child
/// names; not an administrative level of its own. Peruvian provinces, which
/// sit between subregion1 and subregion2, are the motivating case.
pub const PARENT_NAME: &str = "parent_name";

pub const AGE: &str = "age";
pub const SEX: &str = "sex";

/// Gazetteer-only column: a pre-built fuzzy key overriding name matching for
/// entries whose plain name collides with another entry.
pub const MATCH_STRING: &str = "match_string";

/// The non-metric fields a source column may be mapped onto.
pub const CANONICAL_FIELDS: &[&str] = &[
    DATE,
    COUNTRY_CODE,
    SUBREGION1_CODE,
    SUBREGION2_CODE,
    SUBREGION1_NAME,
    SUBREGION2_NAME,
    PARENT_NAME,
    AGE,
    SEX,
];

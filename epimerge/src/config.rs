use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding the reference data and per-source snapshot tables.
    pub data_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_path: "data".into(),
        }
    }
}

impl Config {
    pub fn gazetteer_path(&self) -> PathBuf {
        Path::new(&self.data_path).join("gazetteer.csv")
    }

    pub fn disambiguation_path(&self) -> PathBuf {
        Path::new(&self.data_path).join("disambiguation.json")
    }

    /// Location of one source's snapshot of one raw table.
    pub fn source_table_path(&self, source: &str, table: &str) -> PathBuf {
        Path::new(&self.data_path)
            .join("sources")
            .join(source)
            .join(format!("{table}.csv"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_table_paths_are_per_source_directories() {
        let config = Config::default();
        assert_eq!(
            config.source_table_path("pe_authority", "confirmed"),
            Path::new("data/sources/pe_authority/confirmed.csv")
        );
    }
}

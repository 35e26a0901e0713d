//! Ticker configuration: the market and economic identifiers to fetch.
//!
//! Stored as TOML or JSON (chosen by file extension) with two tables,
//! `market_data` and `economic_data`, each mapping identifier to a
//! human-readable description. Document order is kept because it decides
//! column order in the fetched tables.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickerConfigError {
    #[error("cannot read ticker config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in {path}: {message}")]
    Toml { path: PathBuf, message: String },

    #[error("invalid JSON in {path}: {message}")]
    Json { path: PathBuf, message: String },

    #[error("unsupported ticker config extension for {0} (expected .toml or .json)")]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerEntry {
    pub id: String,
    pub description: String,
}

/// Ordered identifier → description map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TickerGroup(Vec<TickerEntry>);

impl TickerGroup {
    pub fn ids(&self) -> Vec<String> {
        self.0.iter().map(|e| e.id.clone()).collect()
    }

    pub fn describe(&self, id: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.description.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> &[TickerEntry] {
        &self.0
    }
}

impl FromIterator<(String, String)> for TickerGroup {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut group = TickerGroup::default();
        for (id, description) in iter {
            group.insert(id, description);
        }
        group
    }
}

impl TickerGroup {
    /// Later duplicates overwrite the description but keep the first position.
    fn insert(&mut self, id: String, description: String) {
        match self.0.iter_mut().find(|e| e.id == id) {
            Some(e) => e.description = description,
            None => self.0.push(TickerEntry { id, description }),
        }
    }
}

impl<'de> Deserialize<'de> for TickerGroup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct GroupVisitor;

        impl<'de> Visitor<'de> for GroupVisitor {
            type Value = TickerGroup;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of identifier to description")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<TickerGroup, A::Error> {
                let mut group = TickerGroup::default();
                while let Some((id, description)) = map.next_entry::<String, String>()? {
                    group.insert(id, description);
                }
                Ok(group)
            }
        }

        deserializer.deserialize_map(GroupVisitor)
    }
}

impl Serialize for TickerGroup {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|e| (&e.id, &e.description)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickerConfig {
    #[serde(default)]
    pub market_data: TickerGroup,
    #[serde(default)]
    pub economic_data: TickerGroup,
}

impl TickerConfig {
    pub fn from_file(path: &Path) -> Result<Self, TickerConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| TickerConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| TickerConfigError::Toml {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Some("json") => serde_json::from_str(&content).map_err(|e| TickerConfigError::Json {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            _ => Err(TickerConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    pub fn market_tickers(&self) -> Vec<String> {
        self.market_data.ids()
    }

    pub fn economic_series(&self) -> Vec<String> {
        self.economic_data.ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_keeps_document_order() {
        let cfg: TickerConfig = toml::from_str(
            r#"
[market_data]
"^GSPC" = "S&P 500"
AAPL = "Apple"
"BRK-B" = "Berkshire"

[economic_data]
T10Y2Y = "10Y-2Y spread"
"#,
        )
        .unwrap();
        assert_eq!(cfg.market_tickers(), vec!["^GSPC", "AAPL", "BRK-B"]);
        assert_eq!(cfg.economic_data.describe("T10Y2Y"), Some("10Y-2Y spread"));
    }

    #[test]
    fn json_keeps_document_order() {
        let cfg: TickerConfig = serde_json::from_str(
            r#"{"market_data": {"ZZZ": "last alphabetically", "AAA": "first"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.market_tickers(), vec!["ZZZ", "AAA"]);
        assert!(cfg.economic_data.is_empty());
    }

    #[test]
    fn loads_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("tickers.json");
        std::fs::write(&json, r#"{"economic_data": {"DGS10": "10Y"}}"#).unwrap();
        let cfg = TickerConfig::from_file(&json).unwrap();
        assert_eq!(cfg.economic_series(), vec!["DGS10"]);

        let yaml = dir.path().join("tickers.yaml");
        std::fs::write(&yaml, "").unwrap();
        assert!(matches!(
            TickerConfig::from_file(&yaml),
            Err(TickerConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = TickerConfig::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, TickerConfigError::Io { .. }));
    }
}

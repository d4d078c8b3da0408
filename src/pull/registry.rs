use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Component, Path};

use crate::error::ConfigError;

/// Output name → provider symbol for the default backfill.
pub const DEFAULT_TICKERS: &[(&str, &str)] = &[
    ("SP500", "^GSPC"),
    ("AX200", "^AXJO"),
    ("AUDUSD", "AUDUSD=X"),
    ("AUDCNY", "AUDCNY=X"),
    ("AUDJPN", "AUDJPY=X"),
    ("AUDEUR", "AUDEUR=X"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerEntry {
    /// Logical series name; also the output directory and file prefix.
    pub name: String,
    /// Symbol as understood by the market-data provider.
    pub symbol: String,
}

/// Ordered, validated set of tickers. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerRegistry {
    entries: Vec<TickerEntry>,
}

impl TickerRegistry {
    /// Build a registry, rejecting empty, duplicate, or path-unsafe names.
    pub fn new(entries: Vec<TickerEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            validate_name(&entry.name)?;
            if entry.symbol.trim().is_empty() {
                return Err(ConfigError::InvalidTicker {
                    name: entry.name.clone(),
                    reason: "provider symbol must not be empty".into(),
                });
            }
            if !seen.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicateTicker(entry.name.clone()));
            }
        }

        Ok(Self { entries })
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self, ConfigError> {
        Self::new(
            pairs
                .iter()
                .map(|(name, symbol)| TickerEntry {
                    name: (*name).to_string(),
                    symbol: (*symbol).to_string(),
                })
                .collect(),
        )
    }

    /// The six market indices and AUD crosses pulled by default.
    pub fn default_indices() -> Result<Self, ConfigError> {
        Self::from_pairs(DEFAULT_TICKERS)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TickerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TickerEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

impl<'a> IntoIterator for &'a TickerRegistry {
    type Item = &'a TickerEntry;
    type IntoIter = std::slice::Iter<'a, TickerEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// A ticker name becomes a directory and a file prefix, so it must be a
/// single normal path segment of safe characters.
pub fn validate_name(name: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidTicker {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if Path::new(name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(invalid("name must be a plain path segment"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(invalid("only ASCII letters, digits, '.', '_' and '-' are allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_is_valid_and_ordered() {
        let reg = TickerRegistry::default_indices().unwrap();
        assert_eq!(reg.len(), 6);
        let names: Vec<&str> = reg.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["SP500", "AX200", "AUDUSD", "AUDCNY", "AUDJPN", "AUDEUR"]);
        assert_eq!(reg.get("AUDJPN").unwrap().symbol, "AUDJPY=X");
    }

    #[test]
    fn empty_registry_rejected() {
        assert!(matches!(
            TickerRegistry::new(vec![]),
            Err(ConfigError::EmptyRegistry)
        ));
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = TickerRegistry::from_pairs(&[("SP500", "^GSPC"), ("SP500", "SPY")]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateTicker(n) if n == "SP500"));
    }

    #[test]
    fn path_unsafe_names_rejected() {
        for bad in ["", "..", "a/b", "a\\b", "/abs", "SP 500"] {
            assert!(
                TickerRegistry::from_pairs(&[(bad, "^GSPC")]).is_err(),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn blank_symbol_rejected() {
        assert!(TickerRegistry::from_pairs(&[("SP500", "  ")]).is_err());
    }
}

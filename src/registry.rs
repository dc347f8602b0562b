//! Suite registry
//!
//! Suites and their benchmarks are registered explicitly at startup and the
//! registry is handed to the coordinator, instead of living in process-wide
//! state populated as a side effect.

use std::collections::BTreeMap;

use crate::{BenchError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SuiteEntry {
    name: String,
    benchmarks: Vec<String>,
}

/// Ordered set of benchmark suites
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    suites: Vec<SuiteEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a suite → benchmarks table, in key order.
    pub fn from_map(map: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut registry = Self::new();
        for (suite, benchmarks) in map {
            registry.register_suite(suite.clone(), benchmarks.clone())?;
        }
        Ok(registry)
    }

    /// Register a suite with its benchmarks in declaration order.
    pub fn register_suite<I, S>(&mut self, name: impl Into<String>, benchmarks: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BenchError::Registry("suite name must not be empty".to_string()));
        }
        if self.suites.iter().any(|s| s.name == name) {
            return Err(BenchError::Registry(format!(
                "suite {} is already registered",
                name
            )));
        }

        let mut ordered: Vec<String> = Vec::new();
        for benchmark in benchmarks {
            let benchmark = benchmark.into();
            if ordered.contains(&benchmark) {
                return Err(BenchError::Registry(format!(
                    "benchmark {} is registered twice in suite {}",
                    benchmark, name
                )));
            }
            ordered.push(benchmark);
        }

        tracing::debug!(suite = %name, benchmarks = ordered.len(), "registered suite");
        self.suites.push(SuiteEntry {
            name,
            benchmarks: ordered,
        });
        Ok(())
    }

    /// Builder-style registration
    pub fn with_suite<I, S>(mut self, name: impl Into<String>, benchmarks: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register_suite(name, benchmarks)?;
        Ok(self)
    }

    /// Names of every registered suite, in registration order
    pub fn list_suites(&self) -> Vec<String> {
        self.suites.iter().map(|s| s.name.clone()).collect()
    }

    /// Benchmarks of a suite, in declaration order
    pub fn get_suite(&self, name: &str) -> Result<&[String]> {
        self.suites
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.benchmarks.as_slice())
            .ok_or_else(|| BenchError::Registry(format!("unknown suite {}", name)))
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_order_is_preserved() {
        let registry = Registry::new()
            .with_suite("map", ["Put", "Get", "Remove"])
            .unwrap()
            .with_suite("counter", ["Increment"])
            .unwrap();

        assert_eq!(registry.list_suites(), vec!["map", "counter"]);
        assert_eq!(registry.get_suite("map").unwrap(), &["Put", "Get", "Remove"]);
    }

    #[test]
    fn test_duplicate_and_unknown_suites() {
        let mut registry = Registry::new();
        registry.register_suite("map", ["Get"]).unwrap();
        assert!(registry.register_suite("map", ["Put"]).is_err());
        assert!(registry.register_suite("set", ["Add", "Add"]).is_err());
        assert!(matches!(
            registry.get_suite("missing"),
            Err(BenchError::Registry(_))
        ));
    }

    #[test]
    fn test_from_map() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), vec!["One".to_string()]);
        map.insert("a".to_string(), vec!["Two".to_string(), "Three".to_string()]);
        let registry = Registry::from_map(&map).unwrap();
        assert_eq!(registry.list_suites(), vec!["a", "b"]);
        assert!(!registry.is_empty());
    }
}

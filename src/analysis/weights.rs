//! Capability weight table.

use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Immutable, validated mapping of capability name to weight.
///
/// Entries keep their declaration order, which is also the order key
/// factors and risks are reported in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightTable {
    entries: Vec<(String, f64)>,
}

impl WeightTable {
    /// Builds a table, rejecting duplicates, negative or non-finite weights,
    /// and sums that are not 1.0 within [`WEIGHT_EPSILON`].
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let entries: Vec<(String, f64)> = entries
            .into_iter()
            .map(|(name, weight)| (name.into(), weight))
            .collect();

        if entries.is_empty() {
            return Err(Error::InvalidWeights("table is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for (name, weight) in &entries {
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidWeights(format!("duplicate capability {}", name)));
            }
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::InvalidWeights(format!(
                    "weight for {} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }

        let total: f64 = entries.iter().map(|(_, w)| w).sum();
        if (total - 1.0).abs() > WEIGHT_EPSILON {
            return Err(Error::InvalidWeights(format!(
                "weights sum to {}, expected 1.0",
                total
            )));
        }

        Ok(Self { entries })
    }

    pub fn weight(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, w)| *w)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.weight(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, w)| (n.as_str(), *w))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, w)| w).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

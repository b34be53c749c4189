//! Cross-capability conflict detection.
//!
//! A [`ConflictRule`] names a fact and where each capability reports it.
//! When the observed values disagree the rule yields a [`ConflictEntry`].
//! The report is advisory only: it never changes the recommendation.

use crate::models::{AnalysisResult, ConflictEntry, ConflictReport, ConflictSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Resolution policy attached to every conflict.
pub const DEFAULT_RESOLUTION: &str = "prefer highest-confidence source; flag for review";

/// Where one capability reports a fact.
///
/// Paths are either a top-level key or a JSON pointer. When `entries` is set
/// it points at an array inside the result, and `field`, `source_label` and
/// `confidence` are read from each element of that array instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactSource {
    pub capability: String,
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
}

impl FactSource {
    pub fn field(capability: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            field: field.into(),
            entries: None,
            source_label: None,
            confidence: None,
        }
    }

    /// Every present observation of the fact in `results`.
    fn observe(&self, results: &BTreeMap<String, AnalysisResult>) -> Vec<ConflictSource> {
        let Some(result) = results.get(&self.capability) else {
            return Vec::new();
        };

        let Some(ref entries_path) = self.entries else {
            return normalize(result.field(&self.field))
                .map(|value| ConflictSource {
                    source_name: self.capability.clone(),
                    value,
                    confidence: result.confidence,
                })
                .into_iter()
                .collect();
        };

        let Some(entries) = result.field(entries_path).and_then(Value::as_array) else {
            return Vec::new();
        };

        entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| {
                let value = normalize(lookup(entry, &self.field))?;
                let source_name = self
                    .source_label
                    .as_deref()
                    .and_then(|path| lookup(entry, path))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}[{}]", self.capability, i));
                let confidence = self
                    .confidence
                    .as_deref()
                    .and_then(|path| lookup(entry, path))
                    .and_then(Value::as_f64)
                    .unwrap_or(result.confidence);

                Some(ConflictSource {
                    source_name,
                    value,
                    confidence,
                })
            })
            .collect()
    }
}

/// A tracked fact and the capabilities that report it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRule {
    pub fact: String,
    pub sources: Vec<FactSource>,
}

impl ConflictRule {
    pub fn new(fact: impl Into<String>, sources: Vec<FactSource>) -> Self {
        Self {
            fact: fact.into(),
            sources,
        }
    }

    /// Returns a conflict if more than one distinct value was observed.
    ///
    /// The entry lists only sources that reported a value; sources with a
    /// missing, null or blank value are left out. Numbers compare by value,
    /// so `2027` and `2027.0` agree.
    pub fn evaluate(&self, results: &BTreeMap<String, AnalysisResult>) -> Option<ConflictEntry> {
        let observations: Vec<ConflictSource> = self
            .sources
            .iter()
            .flat_map(|source| source.observe(results))
            .collect();

        let mut distinct: Vec<Value> = Vec::new();
        for observation in &observations {
            let key = comparable(&observation.value);
            if !distinct.contains(&key) {
                distinct.push(key);
            }
        }

        if distinct.len() < 2 {
            debug!(
                "{}: {} observations, no conflict",
                self.fact,
                observations.len()
            );
            return None;
        }

        warn!(
            "Conflict on {}: {} distinct values across {} sources",
            self.fact,
            distinct.len(),
            observations.len()
        );

        Some(ConflictEntry {
            field: self.fact.clone(),
            sources: observations,
            resolution: DEFAULT_RESOLUTION.to_string(),
        })
    }
}

/// Checks every rule. Missing data is never a conflict and never an error.
pub fn check(results: &BTreeMap<String, AnalysisResult>, rules: &[ConflictRule]) -> ConflictReport {
    let conflicts: Vec<ConflictEntry> = rules
        .iter()
        .filter_map(|rule| rule.evaluate(results))
        .collect();

    ConflictReport {
        conflict_detected: !conflicts.is_empty(),
        conflicts,
    }
}

/// A fixed rule set.
#[derive(Debug, Clone, Default)]
pub struct ConflictDetector {
    rules: Vec<ConflictRule>,
}

impl ConflictDetector {
    pub fn new(rules: Vec<ConflictRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ConflictRule] {
        &self.rules
    }

    pub fn check(&self, results: &BTreeMap<String, AnalysisResult>) -> ConflictReport {
        check(results, &self.rules)
    }
}

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.starts_with('/') {
        value.pointer(path)
    } else {
        value.get(path)
    }
}

/// Null and blank strings count as absent; strings compare trimmed.
fn normalize(value: Option<&Value>) -> Option<Value> {
    match value? {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(Value::String(trimmed.to_string()))
            }
        }
        other => Some(other.clone()),
    }
}

/// Integer and float encodings of the same number compare equal.
fn comparable(value: &Value) -> Value {
    match value {
        Value::Number(n) => n.as_f64().map(Value::from).unwrap_or_else(|| value.clone()),
        other => other.clone(),
    }
}

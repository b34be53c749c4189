//! Per-capability insight extraction.
//!
//! The synthesizer never reads capability-specific fields itself. Each
//! capability may register an [`Extractor`] that turns its result into a
//! few human-readable key factors and risks.

use crate::models::AnalysisResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Lines contributed by one capability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Insights {
    pub key_factors: Vec<String>,
    pub risks: Vec<String>,
}

/// Renders salient lines from one capability's result.
pub trait Extractor: Send + Sync {
    fn extract(&self, result: &AnalysisResult) -> Insights;
}

impl<F> Extractor for F
where
    F: Fn(&AnalysisResult) -> Insights + Send + Sync,
{
    fn extract(&self, result: &AnalysisResult) -> Insights {
        self(result)
    }
}

/// Capability name to extractor.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the extractor for `capability`.
    pub fn register(&mut self, capability: impl Into<String>, extractor: impl Extractor + 'static) {
        self.extractors.insert(capability.into(), Arc::new(extractor));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, capability: impl Into<String>, extractor: impl Extractor + 'static) -> Self {
        self.register(capability, extractor);
        self
    }

    pub fn contains(&self, capability: &str) -> bool {
        self.extractors.contains_key(capability)
    }

    /// Runs the registered extractor, or returns nothing if there is none.
    pub fn extract(&self, capability: &str, result: &AnalysisResult) -> Insights {
        self.extractors
            .get(capability)
            .map(|extractor| extractor.extract(result))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.extractors.keys().collect();
        names.sort();
        f.debug_struct("ExtractorRegistry")
            .field("capabilities", &names)
            .finish()
    }
}

/// `"<label>: <value of field>"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorTemplate {
    pub label: String,
    /// Top-level key or JSON pointer.
    pub field: String,
}

/// Emits `message` when `field` equals `equals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskTemplate {
    pub field: String,
    pub equals: Value,
    pub message: String,
}

/// Declarative extractor built from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldExtractor {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_factors: Vec<FactorTemplate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<RiskTemplate>,
}

impl FieldExtractor {
    pub fn is_empty(&self) -> bool {
        self.key_factors.is_empty() && self.risks.is_empty()
    }
}

impl Extractor for FieldExtractor {
    fn extract(&self, result: &AnalysisResult) -> Insights {
        let key_factors = self
            .key_factors
            .iter()
            .map(|t| format!("{}: {}", t.label, render_value(result.field(&t.field))))
            .collect();

        let risks = self
            .risks
            .iter()
            .filter(|t| result.field(&t.field) == Some(&t.equals))
            .map(|t| t.message.clone())
            .collect();

        Insights { key_factors, risks }
    }
}

/// Human-readable rendering of an opaque field value.
pub fn render_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

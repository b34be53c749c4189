//! Capability providers.
//!
//! The core only knows the [`Capability`] contract. The adapters here are
//! transports: they hand `(subject, target)` to something external and parse
//! whatever comes back as an [`AnalysisResult`].

pub mod command;
pub mod http;

pub use command::CommandCapability;
pub use http::HttpCapability;

use crate::models::AnalysisResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Uniform provider contract.
///
/// Implementations must put `confidence` in [0, 1] and may set `error`.
/// Every other field is opaque to the core.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Stable, unique capability name.
    fn name(&self) -> &str;

    /// Analyze a (subject, target) pair.
    async fn analyze(&self, subject: &str, target: &str) -> Result<AnalysisResult>;
}

/// Parses a provider reply, tolerating Markdown code fences around the JSON.
pub fn parse_result(raw: &str) -> Result<AnalysisResult> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.strip_suffix("```").unwrap_or(rest))
        .unwrap_or(trimmed)
        .trim();

    if !body.starts_with('{') {
        anyhow::bail!("Provider reply is not a JSON object: {}", preview(body));
    }

    serde_json::from_str(body)
        .with_context(|| format!("Failed to parse provider reply: {}", preview(body)))
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    }
}

/// Returns a fixed result, optionally after a delay.
#[derive(Debug, Clone)]
pub struct StaticCapability {
    name: String,
    result: AnalysisResult,
    delay: Option<Duration>,
}

impl StaticCapability {
    pub fn new(name: impl Into<String>, result: AnalysisResult) -> Self {
        Self {
            name: name.into(),
            result,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Capability for StaticCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, _subject: &str, _target: &str) -> Result<AnalysisResult> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_json() {
        let result = parse_result(r#"{"confidence": 0.8, "patent_status": "Expired"}"#).unwrap();
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.field("patent_status"), Some(&json!("Expired")));
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"confidence\": 0.55, \"active_trials\": 3}\n```\n";
        let result = parse_result(raw).unwrap();
        assert_eq!(result.confidence, 0.55);
        assert_eq!(result.field("active_trials"), Some(&json!(3)));
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_result("Sorry, I could not analyze that.").unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
        assert!(parse_result("{not json").is_err());
    }

    #[test]
    fn test_static_capability() {
        let capability = StaticCapability::new("market_analysis", AnalysisResult::new(0.4));
        assert_eq!(capability.name(), "market_analysis");
        let result =
            tokio_test::block_on(capability.analyze("metformin", "glioblastoma")).unwrap();
        assert_eq!(result.confidence, 0.4);
    }
}

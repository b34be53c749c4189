//! Providers reached over HTTP.
//!
//! POSTs `{"subject": ..., "target": ...}` and expects an `AnalysisResult`
//! JSON object back.

use crate::models::AnalysisResult;
use crate::providers::{parse_result, Capability};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    subject: &'a str,
    target: &'a str,
}

#[derive(Debug)]
pub struct HttpCapability {
    name: String,
    url: String,
    timeout: Duration,
    http_client: reqwest::Client,
}

impl HttpCapability {
    /// `timeout` bounds the HTTP request itself; the dispatcher enforces its
    /// own per-task budget on top.
    pub fn new(name: impl Into<String>, url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            name: name.into(),
            url: url.into(),
            timeout,
            http_client,
        })
    }
}

#[async_trait]
impl Capability for HttpCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, subject: &str, target: &str) -> Result<AnalysisResult> {
        debug!("{}: POST {}", self.name, self.url);

        let response = self
            .http_client
            .post(&self.url)
            .json(&AnalyzeRequest { subject, target })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Request timed out after {}s", self.timeout.as_secs())
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to provider at {}", self.url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Provider API error {}: {}", status, body));
        }

        let body = response
            .text()
            .await
            .context("Failed to read provider response")?;

        parse_result(&body)
    }
}

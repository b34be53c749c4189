//! Bundle rendering.
//!
//! The orchestrator hands the finished bundle to a [`ReportRenderer`]
//! exactly once per run. Rendering proper (PDF, HTML, ...) lives outside
//! this crate; the built-in renderer only persists the bundle as JSON.

use crate::models::{Artifact, ResultBundle};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// External report renderer contract.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render(&self, subject: &str, target: &str, bundle: &ResultBundle) -> Result<Artifact>;
}

/// Serialize a bundle as pretty JSON.
pub fn generate_json_bundle(bundle: &ResultBundle) -> Result<String> {
    serde_json::to_string_pretty(bundle).map_err(Into::into)
}

/// Writes the bundle as pretty JSON to a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFileRenderer {
    path: PathBuf,
}

impl JsonFileRenderer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ReportRenderer for JsonFileRenderer {
    async fn render(&self, subject: &str, target: &str, bundle: &ResultBundle) -> Result<Artifact> {
        let content = generate_json_bundle(bundle)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        tokio::fs::write(&self.path, content)
            .await
            .with_context(|| format!("Failed to write bundle to {}", self.path.display()))?;

        info!(
            "Wrote bundle for {} / {} to {}",
            subject,
            target,
            self.path.display()
        );
        Ok(Artifact::Path(self.path.clone()))
    }
}

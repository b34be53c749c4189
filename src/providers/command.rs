//! Providers backed by an external program.
//!
//! The program receives the subject and target through `{subject}` /
//! `{target}` placeholders in its arguments and must print one JSON object
//! on stdout.

use crate::models::AnalysisResult;
use crate::providers::{parse_result, Capability};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CommandCapability {
    name: String,
    program: String,
    args: Vec<String>,
}

impl CommandCapability {
    pub fn new(name: impl Into<String>, program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
        }
    }

    /// Arguments with placeholders substituted.
    fn render_args(&self, subject: &str, target: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{subject}", subject).replace("{target}", target))
            .collect()
    }
}

#[async_trait]
impl Capability for CommandCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(&self, subject: &str, target: &str) -> Result<AnalysisResult> {
        let args = self.render_args(subject, target);
        debug!("{}: running {} {:?}", self.name, self.program, args);

        // The child is killed if the dispatcher drops this future.
        let output = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to launch {}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            );
        }

        parse_result(&String::from_utf8_lossy(&output.stdout))
    }
}

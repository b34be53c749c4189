//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.triangulate.toml` files, and turns a validated configuration into an
//! [`OrchestratorBuilder`].

use crate::analysis::{
    ConflictRule, ExtractorRegistry, FactSource, FactorTemplate, FieldExtractor, RiskTemplate,
    WeightTable,
};
use crate::dispatch::DEFAULT_TASK_TIMEOUT_SECS;
use crate::error::Error;
use crate::orchestrator::{Orchestrator, OrchestratorBuilder};
use crate::providers::{Capability, CommandCapability, HttpCapability};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".triangulate.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// Capabilities, in weight-table order.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<CapabilityConfig>,

    /// Cross-source conflict rules.
    #[serde(default = "default_conflicts")]
    pub conflicts: Vec<ConflictRule>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            dispatch: DispatchSettings::default(),
            capabilities: default_capabilities(),
            conflicts: default_conflicts(),
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Where the JSON result bundle is written.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "triangulate_bundle.json".to_string()
}

/// Task dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Per-capability time budget.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_seconds: u64,

    /// How often the CLI refreshes its progress display.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            task_timeout_seconds: default_task_timeout(),
            progress_interval_ms: default_progress_interval(),
        }
    }
}

impl DispatchSettings {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

fn default_task_timeout() -> u64 {
    DEFAULT_TASK_TIMEOUT_SECS
}

fn default_progress_interval() -> u64 {
    200
}

/// One capability: its weight, how to reach it, and what to pull out of
/// its results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityConfig {
    pub name: String,
    pub weight: f64,
    pub provider: ProviderConfig,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_factors: Vec<FactorTemplate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub risks: Vec<RiskTemplate>,
}

impl CapabilityConfig {
    pub fn extractor(&self) -> FieldExtractor {
        FieldExtractor {
            key_factors: self.key_factors.clone(),
            risks: self.risks.clone(),
        }
    }

    /// Instantiate the provider adapter. `timeout` also bounds HTTP requests.
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn Capability>> {
        let capability: Arc<dyn Capability> = match self.provider {
            ProviderConfig::Command {
                ref program,
                ref args,
            } => Arc::new(CommandCapability::new(&self.name, program, args.clone())),
            ProviderConfig::Http { ref url } => Arc::new(
                HttpCapability::new(&self.name, url, timeout)
                    .with_context(|| format!("Failed to set up provider for {}", self.name))?,
            ),
        };
        Ok(capability)
    }
}

/// Transport used to reach a capability provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// External program printing one JSON object on stdout.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// HTTP endpoint accepting `{"subject", "target"}`.
    Http { url: String },
}

impl ProviderConfig {
    fn describe(&self) -> String {
        match self {
            ProviderConfig::Command { program, .. } => format!("command: {}", program),
            ProviderConfig::Http { url } => format!("http: {}", url),
        }
    }
}

fn command_provider(program: &str) -> ProviderConfig {
    ProviderConfig::Command {
        program: program.to_string(),
        args: vec![
            "--subject".to_string(),
            "{subject}".to_string(),
            "--target".to_string(),
            "{target}".to_string(),
        ],
    }
}

fn factor(label: &str, field: &str) -> FactorTemplate {
    FactorTemplate {
        label: label.to_string(),
        field: field.to_string(),
    }
}

/// The drug-repurposing deployment.
fn default_capabilities() -> Vec<CapabilityConfig> {
    let plain = |name: &str, weight: f64, program: &str| CapabilityConfig {
        name: name.to_string(),
        weight,
        provider: command_provider(program),
        key_factors: Vec::new(),
        risks: Vec::new(),
    };

    vec![
        CapabilityConfig {
            key_factors: vec![factor("Patent status", "patent_status")],
            risks: vec![RiskTemplate {
                field: "fto_status".to_string(),
                equals: Value::String("Risk".to_string()),
                message: "Patent infringement risk detected".to_string(),
            }],
            ..plain("patent_analysis", 0.25, "patent-agent")
        },
        CapabilityConfig {
            key_factors: vec![factor("Active clinical trials", "active_trials")],
            ..plain("clinical_analysis", 0.20, "clinical-agent")
        },
        CapabilityConfig {
            key_factors: vec![factor("Market opportunity score", "opportunity_score")],
            ..plain("market_analysis", 0.20, "market-agent")
        },
        plain("web_analysis", 0.15, "web-agent"),
        plain("exim_analysis", 0.10, "exim-agent"),
        plain("internal_analysis", 0.10, "internal-agent"),
    ]
}

fn default_conflicts() -> Vec<ConflictRule> {
    vec![ConflictRule::new(
        "patent_expiry",
        vec![FactSource {
            capability: "patent_analysis".to_string(),
            field: "expiry_date".to_string(),
            entries: Some("source_data".to_string()),
            source_label: Some("source".to_string()),
            confidence: Some("confidence".to_string()),
        }],
    )]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when explicitly given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(timeout) = args.timeout {
            self.dispatch.task_timeout_seconds = timeout;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }

    /// The weight table declared by `[[capabilities]]`.
    pub fn weight_table(&self) -> crate::error::Result<WeightTable> {
        WeightTable::new(
            self.capabilities
                .iter()
                .map(|c| (c.name.as_str(), c.weight)),
        )
    }

    /// Check the configuration for errors that would make a run meaningless.
    pub fn validate(&self) -> crate::error::Result<WeightTable> {
        if self.dispatch.task_timeout_seconds == 0 {
            return Err(Error::Config(
                "dispatch.task_timeout_seconds must be at least 1".to_string(),
            ));
        }

        if self.dispatch.progress_interval_ms == 0 {
            return Err(Error::Config(
                "dispatch.progress_interval_ms must be at least 1".to_string(),
            ));
        }

        for capability in &self.capabilities {
            if capability.name.trim().is_empty() {
                return Err(Error::Config("capability name must not be empty".to_string()));
            }
            let endpoint = match capability.provider {
                ProviderConfig::Command { ref program, .. } => program,
                ProviderConfig::Http { ref url } => url,
            };
            if endpoint.trim().is_empty() {
                return Err(Error::Config(format!(
                    "capability {} has an empty provider",
                    capability.name
                )));
            }
        }

        let weights = self.weight_table()?;

        let names: HashSet<&str> = self.capabilities.iter().map(|c| c.name.as_str()).collect();
        for rule in &self.conflicts {
            if rule.sources.is_empty() {
                return Err(Error::Config(format!(
                    "conflict rule {} has no sources",
                    rule.fact
                )));
            }
            if let Some(source) = rule
                .sources
                .iter()
                .find(|s| !names.contains(s.capability.as_str()))
            {
                return Err(Error::Config(format!(
                    "conflict rule {} reads unknown capability {}",
                    rule.fact, source.capability
                )));
            }
        }

        Ok(weights)
    }

    /// Extractors for every capability that declares templates.
    pub fn extractors(&self) -> ExtractorRegistry {
        self.capabilities
            .iter()
            .map(|c| (c, c.extractor()))
            .filter(|(_, extractor)| !extractor.is_empty())
            .fold(ExtractorRegistry::new(), |registry, (c, extractor)| {
                registry.with(c.name.clone(), extractor)
            })
    }

    /// Validated orchestrator builder with every provider attached. The
    /// caller adds a renderer.
    pub fn orchestrator(&self) -> Result<OrchestratorBuilder> {
        let weights = self.validate()?;
        let timeout = self.dispatch.task_timeout();

        let mut builder = Orchestrator::builder(weights)
            .extractors(self.extractors())
            .rules(self.conflicts.iter().cloned())
            .task_timeout(timeout);

        for capability in &self.capabilities {
            builder = builder.shared_capability(capability.build(timeout)?);
        }

        Ok(builder)
    }

    /// One line per capability: name, weight, provider.
    pub fn capability_table(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .map(|c| format!("{:<24} {:>5.2}  {}", c.name, c.weight, c.provider.describe()))
            .collect()
    }
}

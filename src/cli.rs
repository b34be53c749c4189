//! Command-line interface argument parsing.

use crate::models::Recommendation;
use clap::Parser;
use std::path::PathBuf;

/// Triangulate - weighted multi-source analysis for a subject and target
///
/// Fans a (subject, target) pair out to every configured capability,
/// waits for all of them within a per-task timeout, and reports a
/// weighted recommendation with key factors, risks and cross-source
/// conflicts.
///
/// Examples:
///   triangulate --subject metformin --target glioblastoma
///   triangulate --subject metformin --target glioblastoma --timeout 60
///   triangulate --subject metformin --target glioblastoma --fail-on reject
///   triangulate --dry-run
///   triangulate --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Subject under analysis (e.g. a molecule)
    #[arg(
        short,
        long,
        value_name = "SUBJECT",
        required_unless_present_any = ["init_config", "dry_run"]
    )]
    pub subject: Option<String>,

    /// Target the subject is evaluated against (e.g. a disease)
    #[arg(
        short,
        long,
        value_name = "TARGET",
        required_unless_present_any = ["init_config", "dry_run"]
    )]
    pub target: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .triangulate.toml in the current directory
    #[arg(short, long, value_name = "FILE", env = "TRIANGULATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output file for the JSON result bundle
    ///
    /// Overrides `general.output` from the config file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Per-capability timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Validate the configuration and print the capability table without
    /// invoking any provider
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .triangulate.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Exit with code 2 when the recommendation is at or below this level
    ///
    /// Values: caution, reject
    #[arg(long, value_name = "LEVEL")]
    pub fail_on: Option<FailOnLevel>,
}

/// Recommendation threshold for --fail-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FailOnLevel {
    Caution,
    Reject,
}

impl FailOnLevel {
    /// Whether `recommendation` is at or below this level.
    pub fn is_tripped_by(self, recommendation: Recommendation) -> bool {
        let threshold = match self {
            FailOnLevel::Caution => Recommendation::Caution,
            FailOnLevel::Reject => Recommendation::Reject,
        };
        recommendation <= threshold
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn subject(&self) -> &str {
        self.subject.as_deref().unwrap_or("")
    }

    pub fn target(&self) -> &str {
        self.target.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if !self.dry_run {
            if self.subject().trim().is_empty() {
                return Err("Subject must not be empty".to_string());
            }
            if self.target().trim().is_empty() {
                return Err("Target must not be empty".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

//! Triangulate - weighted multi-source analysis orchestration.
//!
//! A run fans a `(subject, target)` pair out to every registered
//! [`Capability`], joins their results under a per-task timeout, and
//! synthesizes a weighted [`Recommendation`] alongside a conflict report.
//! Failed, timed-out and cancelled capabilities degrade to zero-confidence
//! results instead of failing the run.

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod report;

pub use analysis::{ConflictRule, Extractor, ExtractorRegistry, FactSource, Insights, WeightTable};
pub use config::Config;
pub use dispatch::{DispatchConfig, ProgressTracker};
pub use error::{Error, Result};
pub use models::{
    AnalysisResult, Artifact, ConflictReport, Recommendation, ResultBundle, SynthesisReport,
    TaskRecord, TaskStatus,
};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunHandle};
pub use providers::{Capability, CommandCapability, HttpCapability, StaticCapability};
pub use report::{JsonFileRenderer, ReportRenderer};

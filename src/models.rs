//! Data models for an orchestration run.
//!
//! Everything here is created fresh for one run and handed from stage to
//! stage by value; nothing is shared across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Lower bound (inclusive) of the PROCEED band.
pub const PROCEED_THRESHOLD: f64 = 0.75;

/// Lower bound (inclusive) of the CAUTION band.
pub const CAUTION_THRESHOLD: f64 = 0.50;

/// Lifecycle stage of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Complete,
    Failed,
}

impl TaskStatus {
    /// Whether the task has settled. Terminal states never revert.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }

    /// Allowed moves: Pending -> Running -> {Complete, Failed}.
    ///
    /// Pending -> Failed is also allowed so a task cancelled before it was
    /// ever launched can still settle.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Complete)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "Pending"),
            TaskStatus::Running => write!(f, "Running"),
            TaskStatus::Complete => write!(f, "Complete"),
            TaskStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// A task's progress entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Stable capability name.
    pub name: String,
    /// Current lifecycle stage.
    pub status: TaskStatus,
    /// When the task was launched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task settled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Output of one capability.
///
/// `confidence` and `error` are the only attributes the core interprets.
/// Everything else lives in `fields` and is read only by that capability's
/// registered extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Confidence in [0, 1].
    #[serde(default)]
    pub confidence: f64,
    /// Failure description, if the capability degraded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Capability-specific attributes.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl AnalysisResult {
    /// Creates a successful result with no fields.
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            error: None,
            fields: Map::new(),
        }
    }

    /// Zero-confidence placeholder substituted for a failed task.
    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            confidence: 0.0,
            error: Some(error.into()),
            fields: Map::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns true if the capability reported an error.
    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    /// Looks up a field by JSON pointer (`/a/b/0`) or plain top-level key.
    pub fn field(&self, path: &str) -> Option<&Value> {
        if path.starts_with('/') {
            let (head, rest) = match path[1..].split_once('/') {
                Some((head, rest)) => (head, Some(rest)),
                None => (&path[1..], None),
            };
            let head = head.replace("~1", "/").replace("~0", "~");
            let root = self.fields.get(&head)?;
            match rest {
                Some(rest) => root.pointer(&format!("/{}", rest)),
                None => Some(root),
            }
        } else {
            self.fields.get(path)
        }
    }

    /// Clamps confidence into [0, 1]. Returns true if it had to change.
    pub fn clamp_confidence(&mut self) -> bool {
        let clamped = if self.confidence.is_nan() {
            0.0
        } else {
            self.confidence.clamp(0.0, 1.0)
        };
        // NaN compares unequal to everything, so it always counts as changed.
        let changed = clamped != self.confidence;
        self.confidence = clamped;
        changed
    }
}

/// Recommendation band derived from overall confidence.
///
/// Ordered from worst to best so thresholds can be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Reject,
    Caution,
    Proceed,
}

impl Recommendation {
    /// Maps a confidence onto its band. Lower bounds are inclusive.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= PROCEED_THRESHOLD {
            Recommendation::Proceed
        } else if confidence >= CAUTION_THRESHOLD {
            Recommendation::Caution
        } else {
            Recommendation::Reject
        }
    }

    /// Returns an emoji representation of the recommendation.
    pub fn emoji(&self) -> &'static str {
        match self {
            Recommendation::Proceed => "🟢",
            Recommendation::Caution => "🟡",
            Recommendation::Reject => "🔴",
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Proceed => write!(f, "PROCEED"),
            Recommendation::Caution => write!(f, "CAUTION"),
            Recommendation::Reject => write!(f, "REJECT"),
        }
    }
}

/// Weighted synthesis of all capability results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisReport {
    /// Weighted confidence in [0, 1].
    pub overall_confidence: f64,
    /// Band for `overall_confidence`.
    pub recommendation: Recommendation,
    /// Salient facts, in weight-table order.
    pub key_factors: Vec<String>,
    /// Risks, never empty.
    pub risks: Vec<String>,
    /// Fixed follow-up for the recommendation.
    pub next_steps: String,
}

/// One source's observation of a tracked fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSource {
    pub source_name: String,
    pub value: Value,
    pub confidence: f64,
}

/// A fact on which sources disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictEntry {
    pub field: String,
    pub sources: Vec<ConflictSource>,
    pub resolution: String,
}

/// Advisory cross-source disagreement report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflict_detected: bool,
    pub conflicts: Vec<ConflictEntry>,
}

/// Reference to whatever the report renderer produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Artifact {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Path(path) => write!(f, "{}", path.display()),
            Artifact::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Final aggregate of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultBundle {
    pub subject: String,
    pub target: String,
    /// Settled result per capability, including degraded placeholders.
    pub results: BTreeMap<String, AnalysisResult>,
    pub synthesis: SynthesisReport,
    pub conflicts: ConflictReport,
    /// Set once the renderer succeeds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Set when the renderer failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub render_error: Option<String>,
    /// True if the caller cancelled the run before every task settled.
    #[serde(default)]
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl ResultBundle {
    /// Names of capabilities that produced a degraded result.
    pub fn degraded_capabilities(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|(_, r)| r.is_degraded())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

use async_trait::async_trait;
use serde_json::json;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use triangulate::{
    AnalysisResult, Artifact, Capability, Config, JsonFileRenderer, Orchestrator,
    OrchestratorBuilder, Recommendation, ReportRenderer, ResultBundle, StaticCapability,
    TaskStatus,
};

const NAMES: [&str; 6] = [
    "patent_analysis",
    "clinical_analysis",
    "market_analysis",
    "web_analysis",
    "exim_analysis",
    "internal_analysis",
];

struct FailingCapability(&'static str);

#[async_trait]
impl Capability for FailingCapability {
    fn name(&self) -> &str {
        self.0
    }

    async fn analyze(&self, _: &str, _: &str) -> anyhow::Result<AnalysisResult> {
        anyhow::bail!("upstream returned 500")
    }
}

/// Keeps every bundle it is asked to render.
#[derive(Clone, Default)]
struct RecordingRenderer {
    seen: Arc<Mutex<Vec<ResultBundle>>>,
}

#[async_trait]
impl ReportRenderer for RecordingRenderer {
    async fn render(
        &self,
        subject: &str,
        _: &str,
        bundle: &ResultBundle,
    ) -> anyhow::Result<Artifact> {
        self.seen.lock().push(bundle.clone());
        Ok(Artifact::Bytes(subject.as_bytes().to_vec()))
    }
}

/// The default deployment's weights, extractors and conflict rules, with
/// no providers attached.
fn deployment() -> OrchestratorBuilder {
    let config = Config::default();
    Orchestrator::builder(config.validate().unwrap())
        .extractors(config.extractors())
        .rules(config.conflicts.clone())
}

fn patent_result(confidence: f64, expiries: &[(&str, &str)]) -> AnalysisResult {
    let entries: Vec<_> = expiries
        .iter()
        .map(|(source, date)| json!({"source": source, "expiry_date": date, "confidence": 0.8}))
        .collect();
    AnalysisResult::new(confidence)
        .with_field("patent_status", "Expired")
        .with_field("fto_status", "Clear")
        .with_field("source_data", entries)
}

fn with_confidences(confidences: [f64; 6]) -> OrchestratorBuilder {
    NAMES
        .iter()
        .zip(confidences)
        .fold(deployment(), |builder, (name, confidence)| {
            let result = if *name == "patent_analysis" {
                patent_result(confidence, &[("USPTO", "2031-05-01")])
            } else {
                AnalysisResult::new(confidence)
            };
            builder.capability(StaticCapability::new(*name, result))
        })
}

#[tokio::test]
async fn test_weighted_scenario_is_caution() {
    let orchestrator = with_confidences([0.9, 0.8, 0.7, 0.6, 0.5, 0.4])
        .build()
        .unwrap();

    let bundle = orchestrator.run("metformin", "glioblastoma").await.unwrap();

    assert_eq!(bundle.synthesis.overall_confidence, 0.705);
    assert_eq!(bundle.synthesis.recommendation, Recommendation::Caution);
    assert_eq!(bundle.synthesis.next_steps, "Further analysis required");
    assert_eq!(
        bundle.synthesis.key_factors,
        vec![
            "Patent status: Expired",
            "Active clinical trials: N/A",
            "Market opportunity score: N/A",
        ]
    );
    assert_eq!(bundle.synthesis.risks, vec!["No major risks identified"]);
    assert_eq!(bundle.results.len(), 6);
    assert!(!bundle.conflicts.conflict_detected);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_zero_and_does_not_delay_siblings() {
    let mut builder = deployment().task_timeout(Duration::from_secs(30));
    for (name, confidence) in NAMES.iter().zip([0.9, 0.8, 0.7, 0.6, 0.5, 0.4]) {
        let capability = StaticCapability::new(*name, AnalysisResult::new(confidence));
        builder = if *name == "patent_analysis" {
            builder.capability(capability.with_delay(Duration::from_secs(600)))
        } else {
            builder.capability(capability)
        };
    }
    let orchestrator = builder.build().unwrap();

    let started = tokio::time::Instant::now();
    let bundle = orchestrator.run("metformin", "glioblastoma").await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_secs(30));
    assert!(elapsed < Duration::from_secs(31));

    let patent = &bundle.results["patent_analysis"];
    assert_eq!(patent.confidence, 0.0);
    assert_eq!(patent.error.as_deref(), Some("Timeout"));

    assert_eq!(bundle.synthesis.overall_confidence, 0.48);
    assert_eq!(bundle.synthesis.recommendation, Recommendation::Reject);
    assert!(bundle
        .synthesis
        .risks
        .contains(&"patent_analysis unavailable: Timeout".to_string()));
    assert!(bundle
        .synthesis
        .key_factors
        .contains(&"Patent status: N/A".to_string()));

    let progress = orchestrator.progress();
    assert_eq!(progress["patent_analysis"], TaskStatus::Failed);
    assert_eq!(progress["clinical_analysis"], TaskStatus::Complete);
}

#[tokio::test]
async fn test_all_perfect_proceeds_without_conflicts() {
    let mut builder = deployment();
    for name in NAMES {
        let result = if name == "patent_analysis" {
            patent_result(1.0, &[("USPTO", "2031-05-01"), ("EPO", " 2031-05-01 ")])
        } else {
            AnalysisResult::new(1.0)
        };
        builder = builder.capability(StaticCapability::new(name, result));
    }

    let bundle = builder.build().unwrap().run("a", "b").await.unwrap();

    assert_eq!(bundle.synthesis.overall_confidence, 1.0);
    assert_eq!(bundle.synthesis.recommendation, Recommendation::Proceed);
    assert_eq!(bundle.synthesis.next_steps, "Proceed to feasibility study");
    assert!(!bundle.conflicts.conflict_detected);
    assert!(bundle.conflicts.conflicts.is_empty());
    assert!(bundle.degraded_capabilities().is_empty());
}

#[tokio::test]
async fn test_all_failed_rejects() {
    let orchestrator = NAMES
        .iter()
        .fold(deployment(), |builder, &name| {
            builder.capability(FailingCapability(name))
        })
        .build()
        .unwrap();

    let bundle = orchestrator.run("a", "b").await.unwrap();

    assert_eq!(bundle.synthesis.overall_confidence, 0.0);
    assert_eq!(bundle.synthesis.recommendation, Recommendation::Reject);
    assert_eq!(bundle.degraded_capabilities().len(), 6);
    for result in bundle.results.values() {
        assert_eq!(result.error.as_deref(), Some("upstream returned 500"));
    }
    assert!(orchestrator
        .progress()
        .values()
        .all(|s| *s == TaskStatus::Failed));
}

#[tokio::test]
async fn test_disagreeing_sources_are_flagged() {
    let mut builder = deployment();
    for name in NAMES {
        let result = if name == "patent_analysis" {
            patent_result(0.9, &[("USPTO", "2031-05-01"), ("EPO", "2029-11-30")])
        } else {
            AnalysisResult::new(0.9)
        };
        builder = builder.capability(StaticCapability::new(name, result));
    }

    let bundle = builder.build().unwrap().run("a", "b").await.unwrap();

    assert!(bundle.conflicts.conflict_detected);
    let conflict = &bundle.conflicts.conflicts[0];
    assert_eq!(conflict.field, "patent_expiry");
    let sources: Vec<&str> = conflict
        .sources
        .iter()
        .map(|s| s.source_name.as_str())
        .collect();
    assert_eq!(sources, vec!["USPTO", "EPO"]);
    assert_eq!(
        conflict.resolution,
        "prefer highest-confidence source; flag for review"
    );
}

#[tokio::test]
async fn test_tracker_settled_after_run() {
    let orchestrator = with_confidences([0.5; 6])
        .capability(FailingCapability("unweighted_extra"))
        .build()
        .unwrap();

    orchestrator.run("a", "b").await.unwrap();

    let progress = orchestrator.progress();
    assert_eq!(progress.len(), 7);
    assert!(progress
        .values()
        .all(|s| !matches!(s, TaskStatus::Pending | TaskStatus::Running)));
}

#[tokio::test]
async fn test_bundle_written_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.json");

    let orchestrator = with_confidences([0.8; 6])
        .renderer(JsonFileRenderer::new(&path))
        .build()
        .unwrap();

    let bundle = orchestrator.run("metformin", "glioblastoma").await.unwrap();
    assert_eq!(bundle.artifact, Some(Artifact::Path(path.clone())));
    assert!(bundle.render_error.is_none());

    let written: ResultBundle =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written.target, "glioblastoma");
    assert_eq!(written.synthesis, bundle.synthesis);
    assert_eq!(
        written.results["patent_analysis"].field("patent_status"),
        Some(&json!("Expired"))
    );
}

#[tokio::test]
async fn test_renderer_called_once_with_synthesized_bundle() {
    let renderer = RecordingRenderer::default();
    let orchestrator = with_confidences([0.9, 0.8, 0.7, 0.6, 0.5, 0.4])
        .renderer(renderer.clone())
        .build()
        .unwrap();

    let bundle = orchestrator.run("metformin", "glioblastoma").await.unwrap();

    let seen = renderer.seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].synthesis, bundle.synthesis);
    assert_eq!(seen[0].synthesis.overall_confidence, 0.705);
    assert_eq!(seen[0].results.len(), 6);
    assert!(seen[0].artifact.is_none());
    assert_eq!(bundle.artifact, Some(Artifact::Bytes(b"metformin".to_vec())));
}

#[tokio::test]
async fn test_unwritable_output_keeps_bundle() {
    let dir = tempfile::tempdir().unwrap();
    // A directory cannot be overwritten as a file.
    let orchestrator = with_confidences([0.8; 6])
        .renderer(JsonFileRenderer::new(dir.path()))
        .build()
        .unwrap();

    let bundle = orchestrator.run("a", "b").await.unwrap();

    assert!(bundle.artifact.is_none());
    assert!(bundle
        .render_error
        .as_deref()
        .unwrap()
        .starts_with("Report rendering failed"));
    assert_eq!(bundle.synthesis.recommendation, Recommendation::Proceed);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_returns_partial_bundle() {
    let mut builder = deployment();
    for (i, name) in NAMES.iter().enumerate() {
        let capability = StaticCapability::new(*name, AnalysisResult::new(1.0));
        // The first three settle at once, the rest take a minute.
        builder = if i < 3 {
            builder.capability(capability)
        } else {
            builder.capability(capability.with_delay(Duration::from_secs(60)))
        };
    }
    let orchestrator = Arc::new(builder.build().unwrap());

    let run = orchestrator.start("a", "b");
    tokio::time::sleep(Duration::from_secs(5)).await;
    run.cancel();
    let bundle = run.join().await.unwrap();

    assert!(bundle.cancelled);
    assert_eq!(bundle.synthesis.overall_confidence, 0.65);
    assert_eq!(bundle.synthesis.recommendation, Recommendation::Caution);
    for name in &NAMES[3..] {
        assert_eq!(bundle.results[*name].error.as_deref(), Some("Cancelled"));
    }
    assert!(orchestrator.progress().values().all(|s| s.is_terminal()));
}

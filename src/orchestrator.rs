//! Public entry point.
//!
//! A run dispatches every registered capability, joins, synthesizes,
//! checks for conflicts, then hands the bundle to the renderer:
//!
//! ```text
//! run() -> Dispatcher (writes ProgressTracker) -> join
//!       -> Synthesizer -> ConflictDetector -> ReportRenderer
//! ```
//!
//! Each run gets its own `ProgressTracker`. Nothing is cached between runs.

use crate::analysis::{ConflictDetector, ConflictRule, Extractor, ExtractorRegistry, Synthesizer, WeightTable};
use crate::dispatch::{DispatchConfig, Dispatcher, ProgressTracker, Task};
use crate::error::{Error, Result};
use crate::models::{ResultBundle, TaskRecord, TaskStatus};
use crate::providers::Capability;
use crate::report::ReportRenderer;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Fans capabilities out for a (subject, target) pair and synthesizes the
/// outcome.
pub struct Orchestrator {
    capabilities: Vec<Arc<dyn Capability>>,
    synthesizer: Synthesizer,
    detector: ConflictDetector,
    renderer: Option<Arc<dyn ReportRenderer>>,
    dispatch: DispatchConfig,
    /// Tracker of the most recently started run.
    latest: Mutex<Option<ProgressTracker>>,
}

impl Orchestrator {
    pub fn builder(weights: WeightTable) -> OrchestratorBuilder {
        OrchestratorBuilder::new(weights)
    }

    pub fn capability_names(&self) -> Vec<&str> {
        self.capabilities.iter().map(|c| c.name()).collect()
    }

    pub fn weights(&self) -> &WeightTable {
        self.synthesizer.weights()
    }

    pub fn task_timeout(&self) -> Duration {
        self.dispatch.task_timeout
    }

    /// Runs a full analysis and waits for it.
    pub async fn run(&self, subject: &str, target: &str) -> Result<ResultBundle> {
        let tracker = self.new_tracker();
        self.execute(subject, target, tracker, CancellationToken::new())
            .await
    }

    /// Starts a run in the background. The handle exposes live progress and
    /// cancellation.
    pub fn start(self: &Arc<Self>, subject: &str, target: &str) -> RunHandle {
        let tracker = self.new_tracker();
        let cancel = CancellationToken::new();

        let this = Arc::clone(self);
        let (subject, target) = (subject.to_string(), target.to_string());
        let (run_tracker, run_cancel) = (tracker.clone(), cancel.clone());
        let handle = tokio::spawn(async move {
            this.execute(&subject, &target, run_tracker, run_cancel)
                .await
        });

        RunHandle {
            tracker,
            cancel,
            handle,
        }
    }

    /// Status snapshot of the most recent run. Empty before the first run.
    pub fn progress(&self) -> BTreeMap<String, TaskStatus> {
        self.latest
            .lock()
            .as_ref()
            .map(ProgressTracker::snapshot)
            .unwrap_or_default()
    }

    fn new_tracker(&self) -> ProgressTracker {
        let tracker = ProgressTracker::with_tasks(self.capabilities.iter().map(|c| c.name()));
        *self.latest.lock() = Some(tracker.clone());
        tracker
    }

    async fn execute(
        &self,
        subject: &str,
        target: &str,
        tracker: ProgressTracker,
        cancel: CancellationToken,
    ) -> Result<ResultBundle> {
        let started = Instant::now();
        info!(
            "Starting analysis for '{}' / '{}' across {} capabilities",
            subject,
            target,
            self.capabilities.len()
        );

        let tasks = self
            .capabilities
            .iter()
            .map(|capability| {
                let capability = Arc::clone(capability);
                let (subject, target) = (subject.to_string(), target.to_string());
                Task::new(capability.name().to_string(), async move {
                    capability.analyze(&subject, &target).await
                })
            })
            .collect();

        let dispatcher = Dispatcher::new(tracker.clone(), self.dispatch.clone());
        let results = dispatcher.run_until_cancelled(tasks, &cancel).await;
        debug_assert!(tracker.is_settled());

        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!("Run was cancelled; synthesizing from settled results");
        }

        let synthesis = self.synthesizer.aggregate(&results).map_err(|e| {
            error!("{}", e);
            e
        })?;
        let conflicts = self.detector.check(&results);

        let mut bundle = ResultBundle {
            subject: subject.to_string(),
            target: target.to_string(),
            results,
            synthesis,
            conflicts,
            artifact: None,
            render_error: None,
            cancelled,
            timestamp: Utc::now(),
            duration_seconds: started.elapsed().as_secs_f64(),
        };

        if let Some(ref renderer) = self.renderer {
            match renderer.render(subject, target, &bundle).await {
                Ok(artifact) => bundle.artifact = Some(artifact),
                Err(e) => {
                    let failure = Error::RendererFailure(format!("{:#}", e));
                    error!("{}", failure);
                    bundle.render_error = Some(failure.to_string());
                }
            }
        }

        info!(
            "Analysis complete: {} ({:.2}) in {:.1}s",
            bundle.synthesis.recommendation,
            bundle.synthesis.overall_confidence,
            bundle.duration_seconds
        );

        Ok(bundle)
    }
}

/// Handle to a run started with [`Orchestrator::start`].
pub struct RunHandle {
    tracker: ProgressTracker,
    cancel: CancellationToken,
    handle: JoinHandle<Result<ResultBundle>>,
}

impl RunHandle {
    /// Point-in-time status of every task in this run.
    pub fn progress(&self) -> BTreeMap<String, TaskStatus> {
        self.tracker.snapshot()
    }

    pub fn records(&self) -> Vec<TaskRecord> {
        self.tracker.records()
    }

    /// Aborts every unsettled task. The run still produces a bundle.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the run's bundle.
    pub async fn join(self) -> Result<ResultBundle> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::RunAborted(e.to_string())),
        }
    }
}

/// Assembles an [`Orchestrator`].
pub struct OrchestratorBuilder {
    weights: WeightTable,
    capabilities: Vec<Arc<dyn Capability>>,
    extractors: ExtractorRegistry,
    rules: Vec<ConflictRule>,
    renderer: Option<Arc<dyn ReportRenderer>>,
    dispatch: DispatchConfig,
}

impl OrchestratorBuilder {
    pub fn new(weights: WeightTable) -> Self {
        Self {
            weights,
            capabilities: Vec::new(),
            extractors: ExtractorRegistry::new(),
            rules: Vec::new(),
            renderer: None,
            dispatch: DispatchConfig::default(),
        }
    }

    pub fn capability(mut self, capability: impl Capability + 'static) -> Self {
        self.capabilities.push(Arc::new(capability));
        self
    }

    pub fn shared_capability(mut self, capability: Arc<dyn Capability>) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn extractor(mut self, capability: impl Into<String>, extractor: impl Extractor + 'static) -> Self {
        self.extractors.register(capability, extractor);
        self
    }

    pub fn extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn rule(mut self, rule: ConflictRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(mut self, rules: impl IntoIterator<Item = ConflictRule>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn renderer(mut self, renderer: impl ReportRenderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch.task_timeout = timeout;
        self
    }

    /// Fails on duplicate capability names or a zero timeout.
    pub fn build(self) -> Result<Orchestrator> {
        let mut names: Vec<&str> = self.capabilities.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::Config(format!(
                "capability {} is registered twice",
                pair[0]
            )));
        }

        if self.dispatch.task_timeout.is_zero() {
            return Err(Error::Config("task timeout must be non-zero".to_string()));
        }

        for (name, weight) in self.weights.iter() {
            if !names.contains(&name) {
                warn!(
                    "{} has weight {} but no provider; it will always score zero",
                    name, weight
                );
            }
        }
        for name in &names {
            if !self.weights.contains(name) {
                warn!("{} has no weight; it is reported but not scored", name);
            }
        }

        Ok(Orchestrator {
            capabilities: self.capabilities,
            synthesizer: Synthesizer::new(self.weights, self.extractors),
            detector: ConflictDetector::new(self.rules),
            renderer: self.renderer,
            dispatch: self.dispatch,
            latest: Mutex::new(None),
        })
    }
}

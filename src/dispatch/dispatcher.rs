//! Concurrent task fan-out with per-task timeouts.
//!
//! Every task runs on its own tokio task. A supervisor future per task
//! enforces the timeout, converts every failure into a degraded
//! `AnalysisResult`, and records each transition in the run's
//! `ProgressTracker`. `Dispatcher::run` joins on all supervisors, so the
//! returned map only ever contains settled tasks.

use crate::dispatch::progress::ProgressTracker;
use crate::error::Error;
use crate::models::{AnalysisResult, TaskStatus};
use futures::future::{join_all, BoxFuture};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default per-task time budget.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 30;

/// The deferred invocation of one capability.
pub type TaskFuture = BoxFuture<'static, anyhow::Result<AnalysisResult>>;

/// A named unit of work. Nothing runs until the dispatcher spawns it.
pub struct Task {
    pub name: String,
    invoke: TaskFuture,
}

impl Task {
    pub fn new<F>(name: impl Into<String>, invoke: F) -> Self
    where
        F: Future<Output = anyhow::Result<AnalysisResult>> + Send + 'static,
    {
        Self {
            name: name.into(),
            invoke: Box::pin(invoke),
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Time budget for each individual task.
    pub task_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            task_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
        }
    }
}

/// How a supervised task ended.
enum Settled {
    Joined(Result<anyhow::Result<AnalysisResult>, JoinError>),
    TimedOut,
    Cancelled,
}

/// Fans tasks out concurrently and joins on all of them.
pub struct Dispatcher {
    config: DispatchConfig,
    tracker: ProgressTracker,
}

impl Dispatcher {
    pub fn new(tracker: ProgressTracker, config: DispatchConfig) -> Self {
        Self { config, tracker }
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// Runs every task to a terminal state.
    pub async fn run(&self, tasks: Vec<Task>) -> BTreeMap<String, AnalysisResult> {
        self.run_until_cancelled(tasks, &CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), but `cancel` aborts every task that has not
    /// settled yet. Already-settled results are kept; aborted tasks settle
    /// as `Failed` with error `Cancelled`.
    pub async fn run_until_cancelled(
        &self,
        tasks: Vec<Task>,
        cancel: &CancellationToken,
    ) -> BTreeMap<String, AnalysisResult> {
        let mut seen = HashSet::new();
        let tasks: Vec<Task> = tasks
            .into_iter()
            .filter(|task| {
                let fresh = seen.insert(task.name.clone());
                if !fresh {
                    warn!("Duplicate task name {}, ignoring", task.name);
                }
                fresh
            })
            .collect();

        for task in &tasks {
            self.tracker.register(task.name.clone());
        }

        info!(
            "Dispatching {} tasks (timeout {}s each)",
            tasks.len(),
            self.config.task_timeout.as_secs_f64()
        );

        let supervisors = tasks.into_iter().map(|task| {
            supervise(
                task,
                self.tracker.clone(),
                self.config.task_timeout,
                cancel.clone(),
            )
        });

        let settled: BTreeMap<String, AnalysisResult> =
            join_all(supervisors).await.into_iter().collect();

        debug!(
            "All {} tasks settled ({} degraded)",
            settled.len(),
            settled.values().filter(|r| r.is_degraded()).count()
        );

        settled
    }
}

/// Drives one task to a terminal state. Never fails.
async fn supervise(
    task: Task,
    tracker: ProgressTracker,
    timeout: Duration,
    cancel: CancellationToken,
) -> (String, AnalysisResult) {
    let Task { name, invoke } = task;

    if cancel.is_cancelled() {
        mark(&tracker, &name, TaskStatus::Failed);
        return (name, AnalysisResult::degraded(Error::TaskCancelled.to_string()));
    }

    mark(&tracker, &name, TaskStatus::Running);
    let started = Instant::now();
    let mut handle = tokio::spawn(invoke);

    let settled = tokio::select! {
        biased;
        _ = cancel.cancelled() => Settled::Cancelled,
        joined = tokio::time::timeout(timeout, &mut handle) => match joined {
            Ok(joined) => Settled::Joined(joined),
            Err(_) => Settled::TimedOut,
        },
    };

    let outcome = match settled {
        Settled::Joined(Ok(Ok(result))) => Ok(result),
        Settled::Joined(Ok(Err(e))) => Err(Error::TaskException(format!("{:#}", e))),
        Settled::Joined(Err(join_error)) => {
            Err(Error::TaskException(describe_join_error(join_error)))
        }
        Settled::TimedOut => {
            // Best effort: the dispatcher stops waiting even if the
            // provider call does not stop immediately.
            handle.abort();
            Err(Error::TaskTimeout { after: timeout })
        }
        Settled::Cancelled => {
            handle.abort();
            Err(Error::TaskCancelled)
        }
    };

    let elapsed = started.elapsed().as_secs_f64();
    let result = match outcome {
        Ok(mut result) => {
            if result.clamp_confidence() {
                warn!(
                    "{} reported confidence outside [0, 1], clamped to {}",
                    name, result.confidence
                );
            }
            mark(&tracker, &name, TaskStatus::Complete);
            info!("{} completed in {:.1}s", name, elapsed);
            result
        }
        Err(e) => {
            mark(&tracker, &name, TaskStatus::Failed);
            warn!("{} failed after {:.1}s: {}", name, elapsed, e);
            AnalysisResult::degraded(e.to_string())
        }
    };

    (name, result)
}

fn mark(tracker: &ProgressTracker, name: &str, status: TaskStatus) {
    if let Err(e) = tracker.set_status(name, status) {
        warn!("Progress update rejected: {}", e);
    }
}

fn describe_join_error(error: JoinError) -> String {
    if error.is_cancelled() {
        return "task was aborted".to_string();
    }

    let payload = error.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    format!("task panicked: {}", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn dispatcher(timeout_secs: u64) -> Dispatcher {
        Dispatcher::new(
            ProgressTracker::new(),
            DispatchConfig {
                task_timeout: Duration::from_secs(timeout_secs),
            },
        )
    }

    fn sleeper(name: &str, secs: u64, confidence: f64) -> Task {
        Task::new(name, async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            Ok(AnalysisResult::new(confidence))
        })
    }

    #[tokio::test]
    async fn test_all_tasks_complete() {
        let dispatcher = dispatcher(30);
        let results = dispatcher
            .run(vec![
                Task::new("a", async { Ok(AnalysisResult::new(0.9)) }),
                Task::new("b", async { Ok(AnalysisResult::new(0.4)) }),
            ])
            .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["a"].confidence, 0.9);
        assert_eq!(results["b"].confidence, 0.4);
        assert!(dispatcher.tracker().is_settled());
        assert_eq!(
            dispatcher.tracker().status("a"),
            Some(TaskStatus::Complete)
        );
    }

    #[tokio::test]
    async fn test_error_becomes_degraded_result() {
        let dispatcher = dispatcher(30);
        let results = dispatcher
            .run(vec![
                Task::new("broken", async { Err(anyhow!("upstream returned 500")) }),
                Task::new("fine", async { Ok(AnalysisResult::new(0.7)) }),
            ])
            .await;

        let broken = &results["broken"];
        assert_eq!(broken.confidence, 0.0);
        assert_eq!(broken.error.as_deref(), Some("upstream returned 500"));
        assert_eq!(results["fine"].confidence, 0.7);
        assert_eq!(
            dispatcher.tracker().status("broken"),
            Some(TaskStatus::Failed)
        );
        assert_eq!(
            dispatcher.tracker().status("fine"),
            Some(TaskStatus::Complete)
        );
    }

    fn explode() -> anyhow::Result<AnalysisResult> {
        panic!("provider exploded")
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let dispatcher = dispatcher(30);
        let results = dispatcher
            .run(vec![
                Task::new("panicky", async { explode() }),
                Task::new("fine", async { Ok(AnalysisResult::new(0.5)) }),
            ])
            .await;

        let error = results["panicky"].error.clone().unwrap();
        assert!(error.contains("provider exploded"));
        assert_eq!(results["fine"].confidence, 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_delay_siblings() {
        let dispatcher = dispatcher(30);
        let start = tokio::time::Instant::now();

        let results = dispatcher
            .run(vec![
                sleeper("slow", 3600, 1.0),
                sleeper("quick", 1, 0.8),
                sleeper("medium", 10, 0.6),
            ])
            .await;

        assert_eq!(results["slow"].confidence, 0.0);
        assert_eq!(results["slow"].error.as_deref(), Some("Timeout"));
        assert_eq!(results["quick"].confidence, 0.8);
        assert_eq!(results["medium"].confidence, 0.6);

        // Bounded by the timeout, not the sum of task durations.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(30));
        assert!(elapsed < Duration::from_secs(31));
        assert!(dispatcher.tracker().is_settled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tasks_run_concurrently() {
        let dispatcher = dispatcher(30);
        let start = tokio::time::Instant::now();

        let tasks = (0..6)
            .map(|i| sleeper(&format!("task-{}", i), 5, 0.5))
            .collect();
        let results = dispatcher.run(tasks).await;

        assert_eq!(results.len(), 6);
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_keeps_settled_results() {
        let dispatcher = dispatcher(30);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let results = dispatcher
            .run_until_cancelled(
                vec![sleeper("quick", 1, 0.9), sleeper("slow", 20, 0.9)],
                &cancel,
            )
            .await;

        assert_eq!(results["quick"].confidence, 0.9);
        assert!(results["quick"].error.is_none());
        assert_eq!(results["slow"].error.as_deref(), Some("Cancelled"));
        assert_eq!(
            dispatcher.tracker().status("slow"),
            Some(TaskStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_already_cancelled_run_never_launches() {
        let dispatcher = dispatcher(30);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = dispatcher
            .run_until_cancelled(vec![sleeper("a", 1, 1.0)], &cancel)
            .await;

        assert_eq!(results["a"].error.as_deref(), Some("Cancelled"));
        let record = &dispatcher.tracker().records()[0];
        assert!(record.started_at.is_none());
        assert_eq!(record.status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_is_clamped() {
        let dispatcher = dispatcher(30);
        let results = dispatcher
            .run(vec![Task::new("eager", async { Ok(AnalysisResult::new(7.5)) })])
            .await;

        assert_eq!(results["eager"].confidence, 1.0);
    }

    #[tokio::test]
    async fn test_duplicate_names_keep_first() {
        let dispatcher = dispatcher(30);
        let results = dispatcher
            .run(vec![
                Task::new("dup", async { Ok(AnalysisResult::new(0.2)) }),
                Task::new("dup", async { Ok(AnalysisResult::new(0.9)) }),
            ])
            .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results["dup"].confidence, 0.2);
    }
}

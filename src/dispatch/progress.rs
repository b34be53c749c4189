//! Per-run progress tracking.
//!
//! The tracker is written by the dispatcher (one writer per in-flight task)
//! and read by any number of pollers. Every update and every snapshot holds
//! the lock only for the map operation itself, so readers never see a
//! half-written entry and never wait on a task.

use crate::error::{Error, Result};
use crate::models::{TaskRecord, TaskStatus};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Shared, cloneable handle to one run's task states.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    records: Arc<RwLock<BTreeMap<String, TaskRecord>>>,
}

impl ProgressTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker with every named task in `Pending`.
    pub fn with_tasks<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tracker = Self::new();
        for name in names {
            tracker.register(name);
        }
        tracker
    }

    /// Adds a task in `Pending`. Existing entries are left untouched.
    pub fn register(&self, name: impl Into<String>) {
        let name = name.into();
        self.records
            .write()
            .entry(name.clone())
            .or_insert_with(|| TaskRecord::pending(name));
    }

    /// Moves a task to `status`, stamping start/finish times.
    ///
    /// Rejects anything other than Pending -> Running -> {Complete, Failed}
    /// (plus Pending -> Failed for tasks cancelled before launch).
    pub fn set_status(&self, name: &str, status: TaskStatus) -> Result<()> {
        let mut records = self.records.write();
        let record = records
            .get_mut(name)
            .ok_or_else(|| Error::UnknownTask(name.to_string()))?;

        if !record.status.can_transition_to(status) {
            return Err(Error::InvalidTransition {
                task: name.to_string(),
                from: record.status,
                to: status,
            });
        }

        let now = Utc::now();
        match status {
            TaskStatus::Running => record.started_at = Some(now),
            TaskStatus::Complete | TaskStatus::Failed => record.finished_at = Some(now),
            TaskStatus::Pending => {}
        }
        record.status = status;
        debug!("{} -> {}", name, status);

        Ok(())
    }

    /// Current status of one task.
    pub fn status(&self, name: &str) -> Option<TaskStatus> {
        self.records.read().get(name).map(|r| r.status)
    }

    /// Point-in-time copy of every task's status.
    pub fn snapshot(&self) -> BTreeMap<String, TaskStatus> {
        self.records
            .read()
            .iter()
            .map(|(name, record)| (name.clone(), record.status))
            .collect()
    }

    /// Point-in-time copy of every task's full record.
    pub fn records(&self) -> Vec<TaskRecord> {
        self.records.read().values().cloned().collect()
    }

    /// True once every registered task is Complete or Failed.
    pub fn is_settled(&self) -> bool {
        self.records
            .read()
            .values()
            .all(|record| record.status.is_terminal())
    }

    /// Number of tasks in a terminal state.
    pub fn settled_count(&self) -> usize {
        self.records
            .read()
            .values()
            .filter(|record| record.status.is_terminal())
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

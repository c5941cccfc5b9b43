//! In-memory tracking of forecasting runs.
//!
//! Each run gets a UUID, a status, timestamped log entries and, once it
//! finishes, a JSON summary of its result. Only the most recent runs are
//! kept; finished runs beyond the cap are dropped oldest first.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use uuid::Uuid;

/// A single log entry with timestamp and message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Manual,
    Schedule,
    Ingestion,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: Uuid,
    pub trigger: RunTrigger,
    pub status: RunStatus,
    pub logs: Vec<LogEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Summary of the run's result, set on completion.
    pub result: Option<serde_json::Value>,
}

/// Runs retained by [`RunTracker::new`].
pub const DEFAULT_MAX_RUNS: usize = 100;

#[derive(Default)]
struct Registry {
    runs: HashMap<Uuid, Run>,
    /// Run ids in start order.
    order: VecDeque<Uuid>,
}

impl Registry {
    /// Drop the oldest finished runs until at most `max_runs` remain.
    /// Running runs are never dropped.
    fn evict(&mut self, max_runs: usize) {
        while self.runs.len() > max_runs {
            let runs = &self.runs;
            let Some(pos) = self
                .order
                .iter()
                .position(|id| runs.get(id).map_or(true, |r| r.status != RunStatus::Running))
            else {
                break;
            };
            if let Some(id) = self.order.remove(pos) {
                self.runs.remove(&id);
            }
        }
    }
}

/// Shared, cloneable run registry.
#[derive(Clone)]
pub struct RunTracker {
    registry: Arc<RwLock<Registry>>,
    max_runs: usize,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::with_max_runs(DEFAULT_MAX_RUNS)
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `max_runs` runs (at least one).
    pub fn with_max_runs(max_runs: usize) -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
            max_runs: max_runs.max(1),
        }
    }

    /// Register a new running run and return its id.
    pub fn start_run(&self, trigger: RunTrigger) -> Uuid {
        let run_id = Uuid::new_v4();
        let run = Run {
            run_id,
            trigger,
            status: RunStatus::Running,
            logs: vec![],
            started_at: Utc::now(),
            finished_at: None,
            result: None,
        };
        let mut registry = self.registry.write();
        registry.runs.insert(run_id, run);
        registry.order.push_back(run_id);
        registry.evict(self.max_runs);
        run_id
    }

    pub fn log(&self, run_id: Uuid, level: LogLevel, message: impl Into<String>) {
        if let Some(run) = self.registry.write().runs.get_mut(&run_id) {
            run.logs.push(LogEntry {
                timestamp: Utc::now(),
                level,
                message: message.into(),
            });
        }
    }

    pub fn complete_run(&self, run_id: Uuid, result: Option<serde_json::Value>) {
        self.finish(run_id, RunStatus::Completed, |run| run.result = result);
    }

    /// Mark a run as failed, recording the error as its last log entry.
    pub fn fail_run(&self, run_id: Uuid, error_message: impl Into<String>) {
        let message = error_message.into();
        self.finish(run_id, RunStatus::Failed, |run| {
            run.logs.push(LogEntry {
                timestamp: Utc::now(),
                level: LogLevel::Error,
                message,
            })
        });
    }

    fn finish(&self, run_id: Uuid, status: RunStatus, update: impl FnOnce(&mut Run)) {
        if let Some(run) = self.registry.write().runs.get_mut(&run_id) {
            run.status = status;
            run.finished_at = Some(Utc::now());
            update(run);
        }
    }

    pub fn get_run(&self, run_id: Uuid) -> Option<Run> {
        self.registry.read().runs.get(&run_id).cloned()
    }

    pub fn get_logs(&self, run_id: Uuid) -> Vec<LogEntry> {
        self.registry
            .read()
            .runs
            .get(&run_id)
            .map(|run| run.logs.clone())
            .unwrap_or_default()
    }

    /// All runs, most recent first.
    pub fn list_runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.registry.read().runs.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    /// Most recently started run, if any.
    pub fn last_run(&self) -> Option<Run> {
        self.registry
            .read()
            .runs
            .values()
            .max_by_key(|run| run.started_at)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle() {
        let tracker = RunTracker::new();
        let id = tracker.start_run(RunTrigger::Manual);
        assert_eq!(tracker.get_run(id).unwrap().status, RunStatus::Running);

        tracker.log(id, LogLevel::Info, "horizon 1: 3 forecasts");
        tracker.complete_run(id, Some(serde_json::json!({ "stored": 3 })));

        let run = tracker.get_run(id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert!(run.finished_at.is_some());
        assert_eq!(run.result.unwrap()["stored"], 3);
        assert_eq!(tracker.get_logs(id).len(), 1);
    }

    #[test]
    fn test_failed_run_keeps_error_message() {
        let tracker = RunTracker::new();
        let id = tracker.start_run(RunTrigger::Schedule);
        tracker.fail_run(id, "connection refused");

        let logs = tracker.get_logs(id);
        assert_eq!(tracker.get_run(id).unwrap().status, RunStatus::Failed);
        assert_eq!(logs.last().unwrap().level, LogLevel::Error);
        assert_eq!(logs.last().unwrap().message, "connection refused");
    }

    #[test]
    fn test_unknown_run_is_ignored() {
        let tracker = RunTracker::new();
        let id = Uuid::new_v4();
        tracker.log(id, LogLevel::Info, "orphan");
        tracker.complete_run(id, None);
        assert!(tracker.get_run(id).is_none());
        assert!(tracker.get_logs(id).is_empty());
        assert!(tracker.last_run().is_none());
    }

    #[test]
    fn test_only_the_latest_finished_runs_are_kept() {
        let tracker = RunTracker::with_max_runs(3);
        let ids: Vec<Uuid> = (0..5)
            .map(|_| {
                let id = tracker.start_run(RunTrigger::Schedule);
                tracker.complete_run(id, None);
                id
            })
            .collect();

        assert_eq!(tracker.list_runs().len(), 3);
        assert!(tracker.get_run(ids[0]).is_none());
        assert!(tracker.get_run(ids[1]).is_none());
        assert!(ids[2..].iter().all(|id| tracker.get_run(*id).is_some()));
    }

    #[test]
    fn test_running_runs_survive_the_cap() {
        let tracker = RunTracker::with_max_runs(1);
        let first = tracker.start_run(RunTrigger::Manual);
        let second = tracker.start_run(RunTrigger::Schedule);
        assert!(tracker.get_run(first).is_some());

        tracker.complete_run(first, None);
        let third = tracker.start_run(RunTrigger::Schedule);
        assert!(tracker.get_run(first).is_none());
        assert!(tracker.get_run(second).is_some());
        assert!(tracker.get_run(third).is_some());
    }
}

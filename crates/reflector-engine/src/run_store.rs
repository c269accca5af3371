//! Workflow run records: durable enough to survive an engine crash and
//! resume without re-running completed tasks (spec §4.4 "replay safety").
//! Adapts the teacher's `RunStore` — bounded in-memory ring plus JSONL
//! append-log plus an O(1) id index — to workflow runs instead of agent
//! turns.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::TaskRecord;

const MAX_RUNS_IN_MEMORY: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub transcript_id: String,
    pub status: WorkflowStatus,
    /// Keyed by task key (task name, or `"{name}#{index}"` for fan-out
    /// children) so resume can look up whether a given step already ran.
    pub tasks: HashMap<String, TaskRecord>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    pub fn new(transcript_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            transcript_id: transcript_id.into(),
            status: WorkflowStatus::Queued,
            tasks: HashMap::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn finish(&mut self, status: WorkflowStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

struct StoreInner {
    runs: VecDeque<WorkflowRun>,
    index: HashMap<Uuid, usize>,
    base_seq: usize,
}

impl StoreInner {
    fn new(runs: VecDeque<WorkflowRun>) -> Self {
        let mut index = HashMap::with_capacity(runs.len());
        for (i, run) in runs.iter().enumerate() {
            index.insert(run.run_id, i);
        }
        Self {
            runs,
            index,
            base_seq: 0,
        }
    }

    fn deque_idx(&self, seq: usize) -> usize {
        seq - self.base_seq
    }

    fn get(&self, run_id: &Uuid) -> Option<&WorkflowRun> {
        let seq = *self.index.get(run_id)?;
        self.runs.get(self.deque_idx(seq))
    }

    fn get_mut(&mut self, run_id: &Uuid) -> Option<&mut WorkflowRun> {
        let seq = *self.index.get(run_id)?;
        let idx = self.deque_idx(seq);
        self.runs.get_mut(idx)
    }

    fn push_back(&mut self, run: WorkflowRun) {
        let seq = self.base_seq + self.runs.len();
        self.index.insert(run.run_id, seq);
        self.runs.push_back(run);
    }

    fn pop_front(&mut self) -> Option<WorkflowRun> {
        let run = self.runs.pop_front()?;
        self.index.remove(&run.run_id);
        self.base_seq += 1;
        Some(run)
    }
}

pub struct WorkflowRunStore {
    inner: RwLock<StoreInner>,
    log_path: PathBuf,
}

impl WorkflowRunStore {
    pub fn new(state_dir: &Path) -> Self {
        let dir = state_dir.join("runs");
        std::fs::create_dir_all(&dir).ok();
        let log_path = dir.join("workflow_runs.jsonl");
        let runs = Self::load_recent(&log_path);
        Self {
            inner: RwLock::new(StoreInner::new(runs)),
            log_path,
        }
    }

    fn load_recent(path: &Path) -> VecDeque<WorkflowRun> {
        let mut runs = VecDeque::new();
        if let Ok(content) = std::fs::read_to_string(path) {
            for line in content.lines().rev().take(MAX_RUNS_IN_MEMORY) {
                if let Ok(run) = serde_json::from_str::<WorkflowRun>(line) {
                    runs.push_front(run);
                }
            }
        }
        runs
    }

    pub fn insert(&self, run: WorkflowRun) -> Uuid {
        let run_id = run.run_id;
        self.persist(&run);
        let mut inner = self.inner.write();
        inner.push_back(run);
        if inner.runs.len() > MAX_RUNS_IN_MEMORY {
            inner.pop_front();
        }
        run_id
    }

    pub fn get(&self, run_id: &Uuid) -> Option<WorkflowRun> {
        self.inner.read().get(run_id).cloned()
    }

    /// Record (or overwrite) a task's outcome within a run and persist the
    /// whole run snapshot. Appending the full run rather than a delta keeps
    /// resume logic trivial — the last line for a run_id is its full state.
    pub fn record_task(&self, run_id: &Uuid, task_key: &str, record: TaskRecord) {
        let snapshot = {
            let mut inner = self.inner.write();
            let Some(run) = inner.get_mut(run_id) else {
                return;
            };
            run.tasks.insert(task_key.to_string(), record);
            run.clone()
        };
        self.persist(&snapshot);
    }

    pub fn finish(&self, run_id: &Uuid, status: WorkflowStatus) {
        let snapshot = {
            let mut inner = self.inner.write();
            let Some(run) = inner.get_mut(run_id) else {
                return;
            };
            run.finish(status);
            run.clone()
        };
        self.persist(&snapshot);
    }

    /// Replay-safety lookup: if `task_key` already succeeded in this run,
    /// return its recorded output instead of re-executing the task.
    pub fn completed_output(&self, run_id: &Uuid, task_key: &str) -> Option<serde_json::Value> {
        let inner = self.inner.read();
        let run = inner.get(run_id)?;
        let record = run.tasks.get(task_key)?;
        if record.status == crate::task::TaskStatus::Succeeded {
            record.output.clone()
        } else {
            None
        }
    }

    fn persist(&self, run: &WorkflowRun) {
        if let Ok(json) = serde_json::to_string(run) {
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
            {
                let _ = writeln!(file, "{json}");
            }
        }
    }
}

//! Workflow execution: retry/backoff/cancellation/rate-limit/pool wiring
//! around a single task body, plus the fan-out/join combinators every
//! workflow composes from (spec §4.4).

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::cancel::{CancelMap, CancelToken};
use crate::pool::WorkerPools;
use crate::progress::{PipelineProgress, ProgressSink};
use crate::rate_limit::RateLimiters;
use crate::run_store::{WorkflowRun, WorkflowRunStore, WorkflowStatus};
use crate::task::{ErrorClass, TaskRecord, TaskSpec, TaskStatus};

/// Error returned by a task body: a message plus the classification that
/// decides whether the engine retries it.
#[derive(Debug, Clone)]
pub struct TaskError {
    pub class: ErrorClass,
    pub message: String,
    /// Server-provided backoff hint (e.g. a 429's `Retry-After`) the engine
    /// should honor instead of its own schedule for this attempt.
    pub retry_after: Option<std::time::Duration>,
}

impl TaskError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            class: ErrorClass::Permanent,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<std::time::Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.class, self.message)
    }
}

impl std::error::Error for TaskError {}

pub struct Engine {
    pub pools: WorkerPools,
    pub rate_limiters: RateLimiters,
    pub cancel: Arc<CancelMap>,
    pub runs: Arc<WorkflowRunStore>,
    pub progress: Arc<dyn ProgressSink>,
}

impl Engine {
    pub fn new(
        pools: WorkerPools,
        rate_limiters: RateLimiters,
        cancel: Arc<CancelMap>,
        runs: Arc<WorkflowRunStore>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            pools,
            rate_limiters,
            cancel,
            runs,
            progress,
        }
    }

    pub fn start_run(&self, transcript_id: &str) -> (Uuid, CancelToken) {
        let run = WorkflowRun::new(transcript_id);
        let run_id = self.runs.insert(run);
        self.runs.record_task(
            &run_id,
            "__run__",
            TaskRecord {
                name: "__run__".into(),
                status: TaskStatus::Running,
                attempt: 0,
                output: None,
                error: None,
            },
        );
        let token = self.cancel.register(&run_id.to_string());
        (run_id, token)
    }

    pub fn finish_run(&self, run_id: Uuid, status: WorkflowStatus) {
        self.runs.finish(&run_id, status);
        self.cancel.remove(&run_id.to_string());
    }

    /// Run one task under the engine's retry/backoff/pool/rate-limit/
    /// cancellation/replay/progress contract. `task_key` is the name, or
    /// `"{name}#{index}"` for a fan-out child — it's the replay dedup key.
    pub async fn run_task<F, Fut>(
        &self,
        run_id: Uuid,
        transcript_id: &str,
        task_key: &str,
        spec: &TaskSpec,
        token: &CancelToken,
        step: (u32, u32, &str),
        body: F,
    ) -> Result<Value, TaskError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value, TaskError>>,
    {
        if let Some(output) = self.runs.completed_output(&run_id, task_key) {
            return Ok(output);
        }

        let (step_index, total_steps, step_name) = step;
        let mut attempt = 0u32;

        loop {
            if token.is_cancelled() {
                self.record(run_id, task_key, TaskStatus::Cancelled, attempt, None, None);
                return Err(TaskError {
                    class: ErrorClass::Cancelled,
                    message: format!("run {run_id} cancelled before '{task_key}' ran"),
                    retry_after: None,
                });
            }

            self.progress.emit(
                transcript_id,
                PipelineProgress {
                    current_step: step_name.to_string(),
                    step_index,
                    total_steps,
                    step_status: TaskStatus::Running,
                },
            );

            let _permit = self.pools.acquire(&spec.pool).await;
            if let Some(bucket) = &spec.rate_limit_bucket {
                self.rate_limiters.acquire(bucket).await;
            }

            let result = body().await;

            match result {
                Ok(value) => {
                    self.record(
                        run_id,
                        task_key,
                        TaskStatus::Succeeded,
                        attempt,
                        Some(value.clone()),
                        None,
                    );
                    self.progress.emit(
                        transcript_id,
                        PipelineProgress {
                            current_step: step_name.to_string(),
                            step_index,
                            total_steps,
                            step_status: TaskStatus::Succeeded,
                        },
                    );
                    return Ok(value);
                }
                Err(err) => match err.class {
                    ErrorClass::Cancelled => {
                        self.record(run_id, task_key, TaskStatus::Cancelled, attempt, None, Some(err.message.clone()));
                        return Err(err);
                    }
                    ErrorClass::Permanent => {
                        self.record(
                            run_id,
                            task_key,
                            TaskStatus::FailedTerminal,
                            attempt,
                            None,
                            Some(err.message.clone()),
                        );
                        self.progress.emit(
                            transcript_id,
                            PipelineProgress {
                                current_step: step_name.to_string(),
                                step_index,
                                total_steps,
                                step_status: TaskStatus::FailedTerminal,
                            },
                        );
                        return Err(err);
                    }
                    ErrorClass::Transient => {
                        if attempt >= spec.retry.max_retries {
                            self.record(
                                run_id,
                                task_key,
                                TaskStatus::FailedTerminal,
                                attempt,
                                None,
                                Some(err.message.clone()),
                            );
                            self.progress.emit(
                                transcript_id,
                                PipelineProgress {
                                    current_step: step_name.to_string(),
                                    step_index,
                                    total_steps,
                                    step_status: TaskStatus::FailedTerminal,
                                },
                            );
                            return Err(err);
                        }
                        self.record(
                            run_id,
                            task_key,
                            TaskStatus::FailedRetryable,
                            attempt,
                            None,
                            Some(err.message.clone()),
                        );
                        let delay = err
                            .retry_after
                            .unwrap_or_else(|| spec.retry.backoff_for_attempt(attempt));
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }
    }

    fn record(
        &self,
        run_id: Uuid,
        task_key: &str,
        status: TaskStatus,
        attempt: u32,
        output: Option<Value>,
        error: Option<String>,
    ) {
        self.runs.record_task(
            &run_id,
            task_key,
            TaskRecord {
                name: task_key.to_string(),
                status,
                attempt,
                output,
                error,
            },
        );
    }
}

/// Fan-out over `items`, running `f` on each in parallel, then re-order
/// results by input index before returning (spec §4.4/§5 — completion
/// order must not leak into the joined output).
pub async fn fan_out<T, Fut, R>(items: Vec<T>, f: impl Fn(usize, T) -> Fut) -> Vec<R>
where
    Fut: Future<Output = R>,
{
    let futures: Vec<_> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| f(i, item))
        .collect();
    futures_util::future::join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::WorkerPools;
    use crate::progress::NullProgressSink;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    fn engine(dir: &std::path::Path) -> Engine {
        let mut pools_cfg = HashMap::new();
        pools_cfg.insert("llm-io".to_string(), 4);
        Engine::new(
            WorkerPools::from_config(&pools_cfg),
            RateLimiters::from_config(&HashMap::new()),
            Arc::new(CancelMap::new()),
            Arc::new(WorkflowRunStore::new(dir)),
            Arc::new(NullProgressSink),
        )
    }

    #[tokio::test]
    async fn successful_task_records_and_returns_output() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        let (run_id, token) = eng.start_run("t1");
        let spec = TaskSpec::new("get_recording", "llm-io");

        let out = eng
            .run_task(run_id, "t1", "get_recording", &spec, &token, (1, 13, "get_recording"), || async {
                Ok(serde_json::json!({"duration": 42.0}))
            })
            .await
            .unwrap();
        assert_eq!(out["duration"], 42.0);
    }

    #[tokio::test]
    async fn transient_failure_retries_then_succeeds() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        let (run_id, token) = eng.start_run("t1");
        let spec = TaskSpec::new("transcribe_track", "llm-io");
        let attempts = Arc::new(AtomicU32::new(0));

        let out = eng
            .run_task(run_id, "t1", "transcribe_track#0", &spec, &token, (6, 13, "transcribe_track"), || {
                let attempts = attempts.clone();
                async move {
                    let n = attempts.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(TaskError::transient("temporary ASR failure"))
                    } else {
                        Ok(serde_json::json!({"words": []}))
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(out["words"], serde_json::json!([]));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_failure_does_not_retry() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        let (run_id, token) = eng.start_run("t1");
        let spec = TaskSpec::new("pad_track", "llm-io");
        let attempts = Arc::new(AtomicU32::new(0));

        let err = eng
            .run_task(run_id, "t1", "pad_track#0", &spec, &token, (3, 13, "pad_track"), || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(TaskError::permanent("bad track key"))
                }
            })
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Permanent);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_terminal() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        let (run_id, token) = eng.start_run("t1");
        let spec = TaskSpec::new("flaky", "llm-io");

        let err = eng
            .run_task(run_id, "t1", "flaky", &spec, &token, (1, 13, "flaky"), || async {
                Err(TaskError::transient("still down"))
            })
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Transient);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_before_running() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        let (run_id, token) = eng.start_run("t1");
        token.cancel();
        let spec = TaskSpec::new("anything", "llm-io");

        let err = eng
            .run_task(run_id, "t1", "anything", &spec, &token, (1, 13, "anything"), || async {
                Ok(serde_json::json!(null))
            })
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::Cancelled);
    }

    #[tokio::test]
    async fn replayed_task_skips_the_body() {
        let dir = tempdir().unwrap();
        let eng = engine(dir.path());
        let (run_id, token) = eng.start_run("t1");
        let spec = TaskSpec::new("get_recording", "llm-io");
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            eng.run_task(run_id, "t1", "get_recording", &spec, &token, (1, 13, "get_recording"), move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::json!({"duration": 1.0}))
                }
            })
            .await
            .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fan_out_preserves_input_order_despite_completion_order() {
        let items = vec![30u64, 10, 20];
        let results = fan_out(items, |i, delay_ms| async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            i
        })
        .await;
        assert_eq!(results, vec![0, 1, 2]);
    }
}

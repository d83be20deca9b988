//! Background execution of analysis tasks.
//!
//! Each accepted task runs on its own tokio task. A semaphore bounds how many
//! provider calls run at once, every task carries a child of the runner's
//! cancellation token, and a per-task deadline applies to the provider call.
//! Whatever happens, the outcome is written back to the [`TaskStore`].

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::store::{SharedTaskStore, TaskOutput};
use crate::analysis::{parse_result, AnalysisPlan};
use crate::config::TaskLimits;
use crate::llm::LlmClient;

/// How often finished tasks are checked against their retention window.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Too many analysis tasks in flight ({0}); try again later")]
    QueueFull(usize),

    #[error("Server is shutting down")]
    ShuttingDown,
}

enum Outcome {
    Finished(Result<TaskOutput, String>),
    TimedOut,
    Cancelled,
}

/// Accepts analysis plans and drives them to a terminal state.
#[derive(Clone)]
pub struct TaskRunner {
    store: SharedTaskStore,
    llm: Option<Arc<dyn LlmClient>>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    limits: TaskLimits,
}

impl TaskRunner {
    /// `llm` is `None` when no provider is configured; tasks then fail with
    /// an explanatory error instead of calling out.
    pub fn new(store: SharedTaskStore, llm: Option<Arc<dyn LlmClient>>, limits: TaskLimits) -> Self {
        Self {
            store,
            llm,
            permits: Arc::new(Semaphore::new(limits.max_concurrent)),
            shutdown: CancellationToken::new(),
            limits,
        }
    }

    pub fn store(&self) -> &SharedTaskStore {
        &self.store
    }

    pub fn provider_configured(&self) -> bool {
        self.llm.is_some()
    }

    /// Record a new task and schedule it. Returns the task id.
    pub async fn submit(&self, plan: AnalysisPlan) -> Result<String, SubmitError> {
        if self.shutdown.is_cancelled() {
            return Err(SubmitError::ShuttingDown);
        }

        let kind = plan.kind();
        let cancel = self.shutdown.child_token();
        let task_id = self
            .store
            .try_create(kind, plan.input_summary(), cancel.clone(), self.limits.max_queued)
            .await
            .map_err(SubmitError::QueueFull)?;

        tracing::info!(task_id = %task_id, kind = ?kind, "Accepted analysis task");

        let worker = Worker {
            store: Arc::clone(&self.store),
            llm: self.llm.clone(),
            permits: Arc::clone(&self.permits),
            cancel,
            timeout: self.limits.timeout,
            task_id: task_id.clone(),
        };

        let store = Arc::clone(&self.store);
        let id = task_id.clone();
        tokio::spawn(async move {
            let handle = tokio::spawn(worker.run(plan));
            if let Err(e) = handle.await {
                tracing::error!(task_id = %id, error = %e, "Analysis task aborted");
                store.fail(&id, "Task failed unexpectedly").await;
            }
        });

        Ok(task_id)
    }

    /// Cancel every in-flight task and refuse new submissions.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Periodically drop finished tasks older than the configured TTL.
    pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let ttl = self.limits.ttl;
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let removed = store.prune_finished(ttl).await;
                        if removed > 0 {
                            tracing::debug!("Pruned {} finished tasks", removed);
                        }
                    }
                }
            }
        })
    }
}

struct Worker {
    store: SharedTaskStore,
    llm: Option<Arc<dyn LlmClient>>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
    timeout: Duration,
    task_id: String,
}

impl Worker {
    async fn run(self, plan: AnalysisPlan) {
        let id = self.task_id.as_str();

        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.store.mark_cancelled(id).await;
                tracing::info!(task_id = %id, "Task cancelled before start");
                return;
            }
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => {
                    self.store.fail(id, "Task runner is closed").await;
                    return;
                }
            },
        };

        if !self.store.mark_running(id).await {
            return;
        }
        tracing::info!(task_id = %id, "Starting {} task", plan.kind().id_prefix());

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Outcome::Cancelled,
            res = tokio::time::timeout(self.timeout, execute(self.llm.as_deref(), &plan)) => match res {
                Ok(result) => Outcome::Finished(result),
                Err(_) => Outcome::TimedOut,
            },
        };

        match outcome {
            Outcome::Finished(Ok(output)) => {
                self.store.complete(id, output).await;
                tracing::info!(task_id = %id, "Task completed");
            }
            Outcome::Finished(Err(error)) => {
                tracing::warn!(task_id = %id, error = %error, "Task failed");
                self.store.fail(id, error).await;
            }
            Outcome::TimedOut => {
                tracing::warn!(task_id = %id, timeout = ?self.timeout, "Task timed out");
                self.store
                    .fail(id, format!("Task timed out after {}s", self.timeout.as_secs()))
                    .await;
            }
            Outcome::Cancelled => {
                self.store.mark_cancelled(id).await;
                tracing::info!(task_id = %id, "Task cancelled");
            }
        }
    }
}

/// Build the prompt, call the provider and parse its reply.
///
/// Errors are already safe to show to API clients.
async fn execute(llm: Option<&dyn LlmClient>, plan: &AnalysisPlan) -> Result<TaskOutput, String> {
    let prompt = plan.prompt()?;
    let llm = llm.ok_or_else(|| "AI provider is not configured".to_string())?;

    tracing::debug!(prompt = %prompt, "Submitting analysis prompt");

    let response = llm.submit(&prompt).await.map_err(|e| {
        tracing::warn!(error = %e, "AI provider request failed");
        e.public_message()
    })?;

    let content = response.content.unwrap_or_default();
    let result =
        parse_result(&content).ok_or_else(|| "AI provider returned an empty response".to_string())?;

    Ok(TaskOutput {
        result,
        model: response.model,
        usage: response.usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DiscoveryInput, OptimizationInput};
    use crate::llm::{ChatMessage, ChatOptions, ChatResponse, LlmError, TokenUsage};
    use crate::task::{TaskRecord, TaskStatus, TaskStore};
    use async_trait::async_trait;
    use serde_json::{json, Map};

    /// Replies with a fixed body after an optional delay.
    struct ScriptedLlm {
        reply: Result<String, LlmError>,
        delay: Duration,
    }

    impl ScriptedLlm {
        fn replying(reply: &str) -> Arc<dyn LlmClient> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
            })
        }

        fn slow() -> Arc<dyn LlmClient> {
            Arc::new(Self {
                reply: Ok("{}".to_string()),
                delay: Duration::from_secs(30),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn chat_completion(
            &self,
            _messages: &[ChatMessage],
            _options: ChatOptions,
        ) -> Result<ChatResponse, LlmError> {
            tokio::time::sleep(self.delay).await;
            let content = self.reply.clone()?;
            Ok(ChatResponse {
                content: Some(content),
                finish_reason: Some("stop".into()),
                usage: Some(TokenUsage::new(10, 20)),
                model: Some("test-model".into()),
            })
        }
    }

    fn runner(llm: Option<Arc<dyn LlmClient>>, limits: TaskLimits) -> TaskRunner {
        TaskRunner::new(Arc::new(TaskStore::new()), llm, limits)
    }

    fn optimization() -> AnalysisPlan {
        let mut metrics = Map::new();
        metrics.insert("cycle_time".into(), json!(10));
        AnalysisPlan::Optimization(OptimizationInput {
            process_id: "p1".into(),
            current_metrics: metrics,
            goals: vec!["reduce cost".into()],
            constraints: vec![],
        })
    }

    fn discovery(text: Option<&str>) -> AnalysisPlan {
        AnalysisPlan::Discovery(DiscoveryInput {
            document_text: text.map(String::from),
            document_url: None,
            context: None,
        })
    }

    async fn wait_terminal(runner: &TaskRunner, id: &str) -> TaskRecord {
        for _ in 0..200 {
            let record = runner.store().get(id).await.unwrap();
            if record.status.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} did not finish", id);
    }

    async fn wait_status(runner: &TaskRunner, id: &str, status: TaskStatus) {
        for _ in 0..200 {
            if runner.store().get(id).await.unwrap().status == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} never reached {}", id, status);
    }

    #[tokio::test]
    async fn test_completed_task_records_result() {
        let runner = runner(
            Some(ScriptedLlm::replying(r#"{"insights": ["2 steps can be automated"]}"#)),
            TaskLimits::default(),
        );
        let id = runner.submit(optimization()).await.unwrap();
        assert!(id.starts_with("optimize_"));

        let record = wait_terminal(&runner, &id).await;
        assert_eq!(record.status, TaskStatus::Completed);
        assert_eq!(
            record.result.unwrap()["insights"],
            json!(["2 steps can be automated"])
        );
        assert_eq!(record.model.as_deref(), Some("test-model"));
        assert_eq!(record.usage.unwrap().total_tokens, 30);
    }

    #[tokio::test]
    async fn test_missing_provider_fails_task() {
        let runner = runner(None, TaskLimits::default());
        let id = runner.submit(optimization()).await.unwrap();

        let record = wait_terminal(&runner, &id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert_eq!(record.error.as_deref(), Some("AI provider is not configured"));
    }

    #[tokio::test]
    async fn test_discovery_without_text_fails() {
        let runner = runner(Some(ScriptedLlm::replying("{}")), TaskLimits::default());
        let id = runner.submit(discovery(None)).await.unwrap();
        assert!(id.starts_with("discover_"));

        let record = wait_terminal(&runner, &id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.unwrap().contains("document_text is required"));
    }

    #[tokio::test]
    async fn test_provider_error_is_sanitized() {
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlm {
            reply: Err(LlmError::client_error(401, "Incorrect API key sk-123".into())),
            delay: Duration::ZERO,
        });
        let runner = runner(Some(llm), TaskLimits::default());
        let id = runner.submit(discovery(Some("Orders ship daily."))).await.unwrap();

        let record = wait_terminal(&runner, &id).await;
        let error = record.error.unwrap();
        assert_eq!(error, "AI provider rejected the request (HTTP 401)");
    }

    #[tokio::test]
    async fn test_cancel_running_task() {
        let runner = runner(Some(ScriptedLlm::slow()), TaskLimits::default());
        let id = runner.submit(optimization()).await.unwrap();
        wait_status(&runner, &id, TaskStatus::Running).await;

        let record = runner.store().cancel(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Cancelled);
        let record = wait_terminal(&runner, &id).await;
        assert_eq!(record.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_timeout_fails_task() {
        let limits = TaskLimits {
            timeout: Duration::from_millis(50),
            ..TaskLimits::default()
        };
        let runner = runner(Some(ScriptedLlm::slow()), limits);
        let id = runner.submit(optimization()).await.unwrap();

        let record = wait_terminal(&runner, &id).await;
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.unwrap().starts_with("Task timed out"));
    }

    #[tokio::test]
    async fn test_concurrency_limit_keeps_extra_tasks_pending() {
        let limits = TaskLimits {
            max_concurrent: 1,
            ..TaskLimits::default()
        };
        let runner = runner(Some(ScriptedLlm::slow()), limits);
        let first = runner.submit(optimization()).await.unwrap();
        let second = runner.submit(optimization()).await.unwrap();
        wait_status(&runner, &first, TaskStatus::Running).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let waiting = runner.store().get(&second).await.unwrap();
        assert_eq!(waiting.status, TaskStatus::Pending);

        runner.store().cancel(&second).await;
        assert_eq!(wait_terminal(&runner, &second).await.status, TaskStatus::Cancelled);
        runner.shutdown();
    }

    #[tokio::test]
    async fn test_queue_full_rejects_submission() {
        let limits = TaskLimits {
            max_queued: 1,
            ..TaskLimits::default()
        };
        let runner = runner(Some(ScriptedLlm::slow()), limits);
        runner.submit(optimization()).await.unwrap();

        assert_eq!(
            runner.submit(optimization()).await.unwrap_err(),
            SubmitError::QueueFull(1)
        );
        runner.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_tasks() {
        let runner = runner(Some(ScriptedLlm::slow()), TaskLimits::default());
        let id = runner.submit(optimization()).await.unwrap();
        wait_status(&runner, &id, TaskStatus::Running).await;

        runner.shutdown();
        assert_eq!(wait_terminal(&runner, &id).await.status, TaskStatus::Cancelled);
        assert_eq!(
            runner.submit(optimization()).await.unwrap_err(),
            SubmitError::ShuttingDown
        );
    }
}

//! Task queue: worker pool, polling, retry, and submission.
//!
//! Shutdown: [`TaskQueue::shutdown`] signals the pool to stop; it does not
//! wait for in-flight tasks. For graceful shutdown, give running tasks a
//! bounded time to finish before process exit.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use fetcharr_core::models::{DispatchTask, TaskPayload};
use fetcharr_core::TaskError;
use fetcharr_store::TaskStore;

use crate::context::TaskHandler;

/// Maximum delay in seconds before retrying a failed task. Caps exponential
/// backoff so that high retry counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for a given retry count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(retry_count: i32) -> u64 {
    (2_u64.pow(retry_count as u32)).min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone)]
pub struct TaskQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub task_timeout_seconds: u64,
    pub max_retries: i32,
}

impl Default for TaskQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            task_timeout_seconds: 600,
            max_retries: 3,
        }
    }
}

pub struct TaskQueue {
    store: Arc<dyn TaskStore>,
    config: TaskQueueConfig,
    shutdown_tx: mpsc::Sender<()>,
}

impl TaskQueue {
    /// Create a new TaskQueue with a weak reference to the task handler.
    ///
    /// The handler is held weakly so the queue never keeps the services
    /// layer alive on its own; when the handler is dropped, claimed tasks
    /// fail and retry until shutdown.
    pub fn new(
        store: Arc<dyn TaskStore>,
        config: TaskQueueConfig,
        handler: Weak<dyn TaskHandler>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let store_clone = store.clone();
        let config_clone = config.clone();

        tokio::spawn(async move {
            Self::worker_pool(store_clone, config_clone, handler, shutdown_rx).await;
        });

        Self {
            store,
            config,
            shutdown_tx,
        }
    }

    /// Creates a TaskQueue that does not spawn a worker. Tasks submitted here
    /// land in the store and are picked up by the real worker.
    pub fn new_no_worker(store: Arc<dyn TaskStore>, config: TaskQueueConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        drop(shutdown_rx);
        Self {
            store,
            config,
            shutdown_tx,
        }
    }

    /// Submit a task for immediate execution.
    pub async fn submit<P: TaskPayload>(&self, payload: &P) -> Result<Uuid> {
        self.submit_at(payload, Utc::now()).await
    }

    /// Submit a task to run no earlier than `scheduled_at`.
    #[tracing::instrument(skip(self, payload))]
    pub async fn submit_at<P: TaskPayload>(
        &self,
        payload: &P,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Uuid> {
        let task = DispatchTask::new(payload, scheduled_at, self.config.max_retries);
        let task_id = task.id;
        let kind = task.kind;
        self.store
            .create(task)
            .await
            .context("Failed to create task in store")?;

        tracing::info!(task_id = %task_id, task_kind = %kind, "Task submitted to queue");
        Ok(task_id)
    }

    async fn worker_pool(
        store: Arc<dyn TaskStore>,
        config: TaskQueueConfig,
        handler: Weak<dyn TaskHandler>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            "Task queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Task queue worker pool shutting down");
                    break;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(&store, &config, &semaphore, &handler).await;
                }
            }
        }

        tracing::info!("Task queue worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        store: &Arc<dyn TaskStore>,
        config: &TaskQueueConfig,
        semaphore: &Arc<Semaphore>,
        handler: &Weak<dyn TaskHandler>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match store.claim_next().await {
            Ok(Some(task)) => {
                let store = store.clone();
                let handler = handler.clone();
                let timeout = Duration::from_secs(config.task_timeout_seconds);

                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) =
                        Self::process_task_with_retry(task, store, handler, timeout).await
                    {
                        tracing::error!(error = %e, "Task processing failed after retries");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No tasks available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim task from queue");
            }
        }
    }

    #[tracing::instrument(skip(store, handler, timeout), fields(task.id = %task.id, task.kind = %task.kind))]
    async fn process_task_with_retry(
        task: DispatchTask,
        store: Arc<dyn TaskStore>,
        handler: Weak<dyn TaskHandler>,
        timeout: Duration,
    ) -> Result<()> {
        let handler = handler
            .upgrade()
            .ok_or_else(|| anyhow::anyhow!("TaskHandler was dropped, cannot process task"))?;

        let result = tokio::time::timeout(timeout, handler.handle_task(&task)).await;

        match result {
            Ok(Ok(())) => {
                store
                    .mark_completed(task.id)
                    .await
                    .context("Failed to mark task as completed")?;
                tracing::info!(task_id = %task.id, task_kind = %task.kind, "Task completed");
                Ok(())
            }
            Ok(Err(e)) => {
                let is_unrecoverable = e
                    .downcast_ref::<TaskError>()
                    .map(|te| !te.is_recoverable())
                    .unwrap_or(false);

                tracing::error!(
                    task_id = %task.id,
                    error = %e,
                    retry_count = task.retry_count,
                    max_retries = task.max_retries,
                    unrecoverable = is_unrecoverable,
                    "Task execution failed"
                );

                if !is_unrecoverable && task.can_retry() {
                    let backoff_seconds = compute_retry_backoff_seconds(task.retry_count);
                    let next_run = Utc::now() + ChronoDuration::seconds(backoff_seconds as i64);
                    tracing::info!(
                        task_id = %task.id,
                        retry_count = task.retry_count + 1,
                        backoff_seconds,
                        "Scheduling task retry"
                    );
                    store
                        .schedule_retry(task.id, next_run, e.to_string())
                        .await
                        .context("Failed to schedule task retry")?;
                    Ok(())
                } else {
                    store
                        .mark_failed(task.id, e.to_string())
                        .await
                        .context("Failed to mark task as failed")?;
                    Err(e)
                }
            }
            Err(_) => {
                tracing::error!(
                    task_id = %task.id,
                    timeout_seconds = timeout.as_secs(),
                    "Task execution timed out"
                );
                if task.can_retry() {
                    let backoff_seconds = compute_retry_backoff_seconds(task.retry_count);
                    let next_run = Utc::now() + ChronoDuration::seconds(backoff_seconds as i64);
                    store
                        .schedule_retry(task.id, next_run, "task execution timed out".into())
                        .await?;
                    Ok(())
                } else {
                    store
                        .mark_failed(task.id, "task execution timed out".into())
                        .await?;
                    Err(anyhow::anyhow!("Task execution timed out"))
                }
            }
        }
    }

    /// Signals the worker pool to stop claiming new tasks and exit the main
    /// loop. Returns immediately; in-flight tasks run to completion or
    /// timeout.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating task queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for TaskQueue {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fetcharr_core::models::{DispatchPayload, TaskStatus};
    use fetcharr_store::MemoryTaskStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(10), MAX_RETRY_BACKOFF_SECS);
    }

    struct CountingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl TaskHandler for CountingHandler {
        async fn handle_task(self: Arc<Self>, _task: &DispatchTask) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(anyhow::anyhow!("transient failure"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn successful_task_is_marked_completed() {
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::default());
        let handler = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail: false,
        });

        let task = DispatchTask::new(
            &DispatchPayload {
                request_id: Uuid::new_v4(),
            },
            Utc::now(),
            3,
        );
        store.create(task.clone()).await.unwrap();
        let claimed = store.claim_next().await.unwrap().unwrap();

        let weak: Weak<dyn TaskHandler> = {
            let strong: Arc<dyn TaskHandler> = handler.clone();
            Arc::downgrade(&strong)
        };
        TaskQueue::process_task_with_retry(
            claimed,
            store.clone(),
            weak,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn recoverable_failure_schedules_retry() {
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::default());
        let handler: Arc<dyn TaskHandler> = Arc::new(CountingHandler {
            calls: AtomicUsize::new(0),
            fail: true,
        });

        let task = DispatchTask::new(
            &DispatchPayload {
                request_id: Uuid::new_v4(),
            },
            Utc::now(),
            3,
        );
        store.create(task.clone()).await.unwrap();
        let claimed = store.claim_next().await.unwrap().unwrap();

        TaskQueue::process_task_with_retry(
            claimed,
            store.clone(),
            Arc::downgrade(&handler),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Scheduled);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.last_error.as_deref(), Some("transient failure"));
    }

    struct UnrecoverableHandler;

    #[async_trait]
    impl TaskHandler for UnrecoverableHandler {
        async fn handle_task(self: Arc<Self>, _task: &DispatchTask) -> Result<()> {
            Err(TaskError::unrecoverable(anyhow::anyhow!("no backend configured")).into())
        }
    }

    #[tokio::test]
    async fn unrecoverable_failure_is_terminal() {
        let store: Arc<dyn TaskStore> = Arc::new(MemoryTaskStore::default());
        let handler: Arc<dyn TaskHandler> = Arc::new(UnrecoverableHandler);

        let task = DispatchTask::new(
            &DispatchPayload {
                request_id: Uuid::new_v4(),
            },
            Utc::now(),
            3,
        );
        store.create(task.clone()).await.unwrap();
        let claimed = store.claim_next().await.unwrap().unwrap();

        let result = TaskQueue::process_task_with_retry(
            claimed,
            store.clone(),
            Arc::downgrade(&handler),
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_err());

        let stored = store.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(stored.retry_count, 0);
    }
}

//! Task handler trait
//!
//! The services layer implements this for its dispatcher state. The worker
//! holds a weak reference and calls `handle_task` when processing a claimed
//! task; the implementation matches on task kind and runs the appropriate
//! step.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};

use fetcharr_core::models::DispatchTask;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run a claimed task to completion or error.
    async fn handle_task(self: Arc<Self>, task: &DispatchTask) -> Result<()>;
}

/// Placeholder handler used before the real dispatcher exists. Always errors.
struct NoopHandler;

#[async_trait]
impl TaskHandler for NoopHandler {
    async fn handle_task(self: Arc<Self>, _task: &DispatchTask) -> Result<()> {
        Err(anyhow!("NoopHandler: no task handler available"))
    }
}

/// Weak reference to a no-op handler, for wiring a queue before the real
/// handler is built.
pub fn empty_handler_weak() -> Weak<dyn TaskHandler> {
    let handler: Arc<dyn TaskHandler> = Arc::new(NoopHandler);
    Arc::downgrade(&handler)
}

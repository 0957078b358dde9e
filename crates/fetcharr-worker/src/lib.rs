//! Fetcharr worker
//!
//! Polling task queue over the [`fetcharr_store::TaskStore`] outbox. State
//! transitions enqueue tasks; a bounded worker pool claims and runs them with
//! timeout, capped-exponential retry, and cooperative shutdown.

pub mod context;
pub mod queue;

pub use context::{empty_handler_weak, TaskHandler};
pub use queue::{TaskQueue, TaskQueueConfig, MAX_RETRY_BACKOFF_SECS};

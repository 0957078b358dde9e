//! Fetcharr services
//!
//! The business layer: the permission/quota gate, override-rule resolution,
//! the request state machine, fulfillment dispatch into the acquisition
//! backends, and the availability sweep that reconciles recorded state with
//! what the media server and backends actually hold.

pub mod dispatch;
pub mod gate;
pub mod notify;
pub mod request;
pub mod rules;
pub mod sweep;
pub mod test_support;

pub use dispatch::{BackendSet, DispatchConfig, FulfillmentDispatcher};
pub use gate::{GateOutcome, RequestGate};
pub use notify::{LogNotifier, NotificationEvent, Notifier};
pub use request::RequestService;
pub use rules::{ResolvedOverrides, RuleResolver, TargetMetadata};
pub use sweep::{AvailabilityReconciler, SweepConfig, SweepError, SweepSummary};

//! Fetcharr store
//!
//! Persistence is an abstract collaborator of the request core: the traits
//! here define the whole surface the services need, and [`MemoryStore`] is
//! the reference implementation the wiring and tests run against.

pub mod memory;
pub mod traits;

pub use fetcharr_core::error::StoreError;
pub use memory::{
    MemoryMediaRepository, MemoryRequestRepository, MemoryRuleRepository, MemoryStore,
    MemoryTaskStore,
};
pub use traits::{MediaRepository, RequestRepository, RuleRepository, TaskStore};

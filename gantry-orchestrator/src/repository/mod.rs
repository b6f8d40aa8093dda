//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Job instances live behind the [`JobStore`] seam (Postgres or memory);
//! pipeline configuration lives in the config repository.

pub mod job;
pub mod memory;
pub mod pipeline;
pub mod store;

// Re-export for convenience
pub use job::PgJobStore;
pub use memory::InMemoryJobStore;
pub use pipeline::PipelineConfigRepository;
pub use store::{JobStore, JobTransaction, StoreError};

//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services coordinate the repositories and hold the scheduling rules.

pub mod agent;
pub mod job_status_cache;
pub mod schedule;

pub use agent::AgentRegistry;
pub use job_status_cache::JobStatusCache;
pub use schedule::ScheduleService;

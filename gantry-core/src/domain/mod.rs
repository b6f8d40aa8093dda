//! Core domain types
//!
//! Materials and their fingerprints, pipeline configuration and the
//! dependency graph built from it, job instances with their plans, and agent
//! runtime snapshots. Shared by the orchestrator and its clients.

pub mod agent;
pub mod filter;
pub mod graph;
pub mod job;
pub mod material;
pub mod modification;
pub mod pipeline;
pub mod url;

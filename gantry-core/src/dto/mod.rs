//! Data Transfer Objects for the orchestrator API
//!
//! Lightweight request and response bodies exchanged between the
//! orchestrator and its clients. Domain values that are already plain data
//! (pipeline configs, agent snapshots) travel as they are.

pub mod agent;
pub mod job;
pub mod material;
pub mod pipeline;

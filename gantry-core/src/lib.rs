//! Gantry Core
//!
//! Core types and algorithms for the Gantry CI/CD scheduler.
//!
//! This crate contains:
//! - Domain types: materials, pipelines, the dependency graph, jobs, agents
//! - Counter: strictly increasing ordering keys for scheduled jobs
//! - DTOs: request and response bodies of the orchestrator API

pub mod counter;
pub mod domain;
pub mod dto;

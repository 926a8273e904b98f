//! Core domain types and trait boundaries for the pipeline orchestration
//! kernel.
//!
//! This crate contains:
//! - The pipeline/job/step spec model (no behavior)
//! - The job DAG and its schedulability query
//! - The plugin registry and agent/task service trait boundaries
//! - Persistence trait boundaries (no implementation)
//! - Shared error kinds and resource identifiers

pub mod dag;
pub mod error;
pub mod id;
pub mod plugin;
pub mod spec;
pub mod store;
pub mod taskservice;

pub use error::{Error, Result};
pub use id::ResourceId;

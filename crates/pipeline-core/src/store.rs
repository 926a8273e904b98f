//! Persistence boundary (§1, §6): named but not implemented here.
//!
//! The core treats history and configuration persistence as an
//! abstraction over a key/value-plus-relational store. Concrete backends
//! (Postgres, object storage, etc.) are an edge concern, mirroring how
//! `buildit_core::artifact::ArtifactStore` and
//! `buildit_core::secret::SecretStore` are pure traits with no
//! implementation inside the domain crate itself.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::spec::Pipeline;

#[async_trait]
pub trait PipelineStore: Send + Sync {
    async fn get_pipeline_dsl(&self, id: &str) -> Result<Pipeline>;
}

#[async_trait]
pub trait TaskStateStore: Send + Sync {
    async fn put_task_state(&self, task_id: &str, state: Value) -> Result<()>;
    async fn get_task_state(&self, task_id: &str) -> Result<Option<Value>>;
}

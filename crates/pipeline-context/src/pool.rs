//! Context pool (C12): an LRU cache of reusable execution contexts,
//! with optional spill-to-storage and background idle eviction.

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use pipeline_core::{Error, Result};

use crate::context::ExecutionContext;

/// Hands off an evicted context for external storage when the pool is
/// at capacity. The kernel does not implement one; callers that need
/// spill provide their own.
pub trait SpillStrategy: Send + Sync {
    fn spill(&self, pipeline_id: &str, ctx: Arc<ExecutionContext>);
}

struct Entry {
    ctx: Arc<ExecutionContext>,
    last_used: Instant,
}

struct Inner {
    active: IndexMap<String, Entry>,
    total_count: usize,
}

/// LRU cache of execution contexts keyed by pipeline id.
pub struct ContextPool {
    max_active: usize,
    max_total: usize,
    idle_timeout: Duration,
    spill: Option<Arc<dyn SpillStrategy>>,
    inner: Mutex<Inner>,
}

impl ContextPool {
    pub fn new(max_active: usize, max_total: usize, idle_timeout: Duration) -> Self {
        Self {
            max_active,
            max_total,
            idle_timeout,
            spill: None,
            inner: Mutex::new(Inner {
                active: IndexMap::new(),
                total_count: 0,
            }),
        }
    }

    pub fn with_spill(mut self, spill: Arc<dyn SpillStrategy>) -> Self {
        self.spill = Some(spill);
        self
    }

    /// Return the cached context for `pipeline_id`, or allocate one via
    /// `make` if absent. Evicts the LRU entry (spilling it if a spill
    /// strategy is configured) when at `max_active`.
    pub fn get_or_insert_with(
        &self,
        pipeline_id: &str,
        make: impl FnOnce() -> Arc<ExecutionContext>,
    ) -> Result<Arc<ExecutionContext>> {
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.active.shift_remove(pipeline_id) {
            let ctx = entry.ctx.clone();
            inner.active.insert(
                pipeline_id.to_string(),
                Entry {
                    ctx: ctx.clone(),
                    last_used: Instant::now(),
                },
            );
            return Ok(ctx);
        }

        if inner.active.len() >= self.max_active {
            if let Some((evicted_id, evicted)) = inner.active.shift_remove_index(0) {
                if let Some(spill) = &self.spill {
                    spill.spill(&evicted_id, evicted.ctx);
                } else {
                    inner.total_count = inner.total_count.saturating_sub(1);
                }
            }
        }

        if inner.total_count >= self.max_total {
            return Err(Error::Internal(format!(
                "context pool at capacity ({} total)",
                self.max_total
            )));
        }

        let ctx = make();
        inner.total_count += 1;
        inner.active.insert(
            pipeline_id.to_string(),
            Entry {
                ctx: ctx.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(ctx)
    }

    /// Mark a context idle and move it to most-recently-used.
    pub fn put(&self, pipeline_id: &str) {
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.active.get_mut(pipeline_id) {
            entry.last_used = Instant::now();
        }
        let from = inner.active.get_index_of(pipeline_id).unwrap_or(0);
        let to = inner.active.len().saturating_sub(1);
        inner.active.move_index(from, to);
    }

    /// Evict entries idle longer than `idle_timeout`. Intended to be
    /// driven by a background ticker at `cleanup_interval`.
    pub fn sweep_idle(&self) {
        let mut inner = self.inner.lock();
        let timeout = self.idle_timeout;
        let now = Instant::now();
        let expired: Vec<String> = inner
            .active
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_used) >= timeout)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            if let Some(entry) = inner.active.shift_remove(&key) {
                if let Some(spill) = &self.spill {
                    spill.spill(&key, entry.ctx);
                } else {
                    inner.total_count = inner.total_count.saturating_sub(1);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drains everything, discarding (or spilling) all entries.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        let drained: Vec<(String, Entry)> = inner.active.drain(..).collect();
        for (key, entry) in drained {
            if let Some(spill) = &self.spill {
                spill.spill(&key, entry.ctx);
            }
        }
        inner.total_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Collaborators;
    use pipeline_core::Result as CoreResult;
    use pipeline_core::plugin::{InvokeOpts, InvokeResult, Plugin, PluginRegistry};
    use pipeline_core::spec::Pipeline;
    use pipeline_core::taskservice::{
        AgentService, CreateTaskRequest, CreateTaskResponse, GetTaskResponse, TaskService,
    };
    use std::path::PathBuf;

    struct NoopPlugin;
    #[async_trait::async_trait]
    impl Plugin for NoopPlugin {
        fn name(&self) -> &str {
            "noop"
        }
        async fn invoke(
            &self,
            _a: &str,
            _p: serde_json::Value,
            _o: InvokeOpts,
        ) -> CoreResult<InvokeResult> {
            Ok(InvokeResult::default())
        }
    }
    struct NoopRegistry;
    #[async_trait::async_trait]
    impl PluginRegistry for NoopRegistry {
        async fn get(&self, _n: &str) -> CoreResult<Arc<dyn Plugin>> {
            Ok(Arc::new(NoopPlugin))
        }
    }
    struct NoopTaskService;
    #[async_trait::async_trait]
    impl TaskService for NoopTaskService {
        async fn create_task(&self, _r: CreateTaskRequest) -> CoreResult<CreateTaskResponse> {
            unimplemented!()
        }
        async fn get_task(&self, _i: &str) -> CoreResult<GetTaskResponse> {
            unimplemented!()
        }
        async fn cancel_task(&self, _i: &str, _r: &str) -> CoreResult<()> {
            unimplemented!()
        }
    }
    struct NoopAgentService;
    #[async_trait::async_trait]
    impl AgentService for NoopAgentService {
        async fn cancel_task(&self, _a: &str, _j: &str, _r: &str) -> CoreResult<()> {
            unimplemented!()
        }
    }

    fn make_ctx(name: &str) -> Arc<ExecutionContext> {
        let pipeline = Arc::new(Pipeline {
            namespace: name.to_string(),
            version: None,
            variables: Default::default(),
            jobs: vec![],
        });
        let collaborators = Collaborators {
            plugin_registry: Arc::new(NoopRegistry),
            task_service: Arc::new(NoopTaskService),
            agent_service: Arc::new(NoopAgentService),
        };
        Arc::new(ExecutionContext::new(
            pipeline,
            PathBuf::from("/tmp"),
            collaborators,
        ))
    }

    #[test]
    fn reuses_existing_context() {
        let pool = ContextPool::new(2, 10, Duration::from_secs(60));
        let a1 = pool
            .get_or_insert_with("a", || make_ctx("a"))
            .unwrap();
        let a2 = pool
            .get_or_insert_with("a", || make_ctx("a"))
            .unwrap();
        assert_eq!(a1.id, a2.id);
    }

    #[test]
    fn evicts_lru_when_active_full() {
        let pool = ContextPool::new(1, 10, Duration::from_secs(60));
        pool.get_or_insert_with("a", || make_ctx("a")).unwrap();
        pool.get_or_insert_with("b", || make_ctx("b")).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn errors_at_total_capacity() {
        let pool = ContextPool::new(5, 1, Duration::from_secs(60));
        pool.get_or_insert_with("a", || make_ctx("a")).unwrap();
        let err = pool.get_or_insert_with("b", || make_ctx("b"));
        assert!(err.is_err());
    }
}

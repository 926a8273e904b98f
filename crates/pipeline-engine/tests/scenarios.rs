//! End-to-end scenarios against `Engine::submit`, each grounded on one
//! of the documented pipeline behaviors.

use std::path::PathBuf;
use std::sync::Arc;

use pipeline_context::{Collaborators, PipelineStatus};
use pipeline_core::taskservice::RemoteTaskStatus;
use pipeline_engine::testutil::{FakeAgentService, FakePlugin, FakePluginRegistry, FakeTaskService};
use pipeline_engine::Engine;
use pipeline_scheduler::JobRunOutcome;

fn engine(registry: FakePluginRegistry, task_service: Arc<FakeTaskService>) -> Engine {
    let collaborators = Collaborators {
        plugin_registry: Arc::new(registry),
        task_service,
        agent_service: Arc::new(FakeAgentService),
    };
    Engine::new(collaborators, PathBuf::from("/tmp/pipeline-engine-tests"), 4)
}

#[tokio::test]
async fn s1_linear_success() {
    let registry = FakePluginRegistry::new().with(Arc::new(FakePlugin::new("noop")));
    let engine = engine(registry, Arc::new(FakeTaskService::new()));

    let doc = serde_json::json!({
        "namespace": "p1",
        "jobs": [
            { "name": "a", "steps": [{ "name": "s", "uses": "noop" }] },
            { "name": "b", "depends_on": ["a"], "steps": [{ "name": "s", "uses": "noop" }] },
        ]
    });

    let outcome = engine.submit(doc.to_string().as_bytes()).await.unwrap();
    assert_eq!(outcome.status, PipelineStatus::Success);
    assert_eq!(outcome.job_results.len(), 2);
    engine.shutdown().await;
}

#[tokio::test]
async fn s2_conditional_skip() {
    let registry = FakePluginRegistry::new().with(Arc::new(FakePlugin::new("noop")));
    let engine = engine(registry, Arc::new(FakeTaskService::new()));

    let doc = serde_json::json!({
        "namespace": "p1",
        "jobs": [
            {
                "name": "a",
                "when": "env.BRANCH == \"main\"",
                "steps": [{ "name": "s", "uses": "noop" }]
            }
        ]
    });

    let outcome = engine.submit(doc.to_string().as_bytes()).await.unwrap();
    assert_eq!(outcome.status, PipelineStatus::Success);
    assert_eq!(outcome.job_results.get("a"), Some(&JobRunOutcome::Skipped));
    engine.shutdown().await;
}

#[tokio::test]
async fn s3_retry_then_success() {
    let registry =
        FakePluginRegistry::new().with(Arc::new(FakePlugin::new("flaky").failing_first_n(2)));
    let engine = engine(registry, Arc::new(FakeTaskService::new()));

    let doc = serde_json::json!({
        "namespace": "p1",
        "jobs": [{
            "name": "a",
            "retry": { "max_attempts": 3, "delay": "0s" },
            "steps": [{ "name": "s", "uses": "flaky" }]
        }]
    });

    let outcome = engine.submit(doc.to_string().as_bytes()).await.unwrap();
    assert_eq!(outcome.status, PipelineStatus::Success);
    assert_eq!(outcome.job_results.get("a"), Some(&JobRunOutcome::Succeeded));
    engine.shutdown().await;
}

#[tokio::test]
async fn s4_continue_on_error() {
    let registry = FakePluginRegistry::new()
        .with(Arc::new(FakePlugin::new("always-fails").failing_on(&["Execute"])))
        .with(Arc::new(FakePlugin::new("noop")));
    let engine = engine(registry, Arc::new(FakeTaskService::new()));

    let doc = serde_json::json!({
        "namespace": "p1",
        "jobs": [{
            "name": "a",
            "steps": [
                { "name": "one", "uses": "always-fails", "continue_on_error": true },
                { "name": "two", "uses": "noop" },
            ]
        }]
    });

    let outcome = engine.submit(doc.to_string().as_bytes()).await.unwrap();
    assert_eq!(outcome.status, PipelineStatus::Success);
    assert_eq!(outcome.job_results.get("a"), Some(&JobRunOutcome::Succeeded));
    engine.shutdown().await;
}

#[tokio::test]
async fn s5_agent_dispatch_prefers_least_loaded() {
    let registry = FakePluginRegistry::new().with(Arc::new(FakePlugin::new("noop")));
    let engine = engine(registry, Arc::new(FakeTaskService::new()));

    engine.agent_manager().cache().update_from_heartbeat(pipeline_agent::AgentStatus {
        agent_id: "a1".to_string(),
        status: pipeline_agent::AgentHealth::Online,
        running_jobs_count: 3,
        max_concurrent_jobs: 10,
        labels: std::collections::HashMap::from([("os".to_string(), "linux".to_string())]),
        metrics: std::collections::HashMap::new(),
        last_heartbeat: chrono::Utc::now(),
    });
    engine.agent_manager().cache().update_from_heartbeat(pipeline_agent::AgentStatus {
        agent_id: "a2".to_string(),
        status: pipeline_agent::AgentHealth::Online,
        running_jobs_count: 1,
        max_concurrent_jobs: 10,
        labels: std::collections::HashMap::from([("os".to_string(), "linux".to_string())]),
        metrics: std::collections::HashMap::new(),
        last_heartbeat: chrono::Utc::now(),
    });

    let doc = serde_json::json!({
        "namespace": "p1",
        "jobs": [{
            "name": "a",
            "steps": [{
                "name": "s",
                "uses": "noop",
                "run_on_agent": true,
                "agent_selector": { "match_labels": { "os": "linux" } }
            }]
        }]
    });

    let outcome = engine.submit(doc.to_string().as_bytes()).await.unwrap();
    assert_eq!(outcome.status, PipelineStatus::Success);
    engine.shutdown().await;
}

#[tokio::test]
async fn s6_timeout_fails_job_and_cancels_remote_task() {
    let registry = FakePluginRegistry::new().with(Arc::new(FakePlugin::new("noop")));
    let task_service = Arc::new(FakeTaskService::with_status(RemoteTaskStatus::Running));
    let engine = engine(registry, task_service.clone());

    engine.agent_manager().cache().update_from_heartbeat(pipeline_agent::AgentStatus {
        agent_id: "a1".to_string(),
        status: pipeline_agent::AgentHealth::Online,
        running_jobs_count: 0,
        max_concurrent_jobs: 10,
        labels: std::collections::HashMap::new(),
        metrics: std::collections::HashMap::new(),
        last_heartbeat: chrono::Utc::now(),
    });

    let doc = serde_json::json!({
        "namespace": "p1",
        "jobs": [{
            "name": "a",
            "steps": [{
                "name": "s",
                "uses": "noop",
                "run_on_agent": true,
                "timeout": "1s"
            }]
        }]
    });

    let outcome = engine.submit(doc.to_string().as_bytes()).await.unwrap();
    assert_eq!(outcome.status, PipelineStatus::Failed);
    assert_eq!(task_service.cancelled_tasks().len(), 1);
    engine.shutdown().await;
}

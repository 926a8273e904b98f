//! Directed acyclic graph over a pipeline's jobs.

use crate::id::ResourceId;
use crate::spec::Pipeline;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Lifecycle state of a DAG node (= one job's run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Prepared,
    Created,
    Started,
    Queued,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped
        )
    }
}

/// A DAG node: one job's run within a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub state: TaskState,
    pub dependencies: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retry_count: u32,
    #[serde(skip)]
    pub id: ResourceId,
}

impl Task {
    fn new(name: String, dependencies: Vec<String>) -> Self {
        Self {
            name,
            state: TaskState::Pending,
            dependencies,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            retry_count: 0,
            id: ResourceId::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DagError {
    #[error("job '{job}' depends on unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },
    #[error("cycle detected involving job '{0}'")]
    Cycle(String),
}

/// Topological structure over a pipeline's jobs, with schedulability
/// queries used by the reconciler.
#[derive(Debug, Clone)]
pub struct Dag {
    tasks: HashMap<String, Task>,
    /// Insertion order, used only to make iteration deterministic.
    order: Vec<String>,
}

impl Dag {
    /// Build a DAG from a pipeline's jobs. Fails on unknown dependency
    /// names or cycles.
    pub fn build(pipeline: &Pipeline) -> Result<Self, DagError> {
        let names: HashSet<&str> = pipeline.jobs.iter().map(|j| j.name.as_str()).collect();

        for job in &pipeline.jobs {
            for dep in &job.depends_on {
                if !names.contains(dep.as_str()) {
                    return Err(DagError::UnknownDependency {
                        job: job.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let mut tasks = HashMap::new();
        let mut order = Vec::new();
        for job in &pipeline.jobs {
            tasks.insert(
                job.name.clone(),
                Task::new(job.name.clone(), job.depends_on.clone()),
            );
            order.push(job.name.clone());
        }

        let dag = Self { tasks, order };
        dag.check_acyclic()?;
        Ok(dag)
    }

    fn check_acyclic(&self) -> Result<(), DagError> {
        #[derive(PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            name: &'a str,
            tasks: &'a HashMap<String, Task>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), DagError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => return Err(DagError::Cycle(name.to_string())),
                None => {}
            }
            marks.insert(name, Mark::Visiting);
            if let Some(task) = tasks.get(name) {
                for dep in &task.dependencies {
                    visit(dep, tasks, marks)?;
                }
            }
            marks.insert(name, Mark::Done);
            Ok(())
        }

        for name in self.tasks.keys() {
            visit(name, &self.tasks, &mut marks)?;
        }
        Ok(())
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn task_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.tasks.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    /// Nodes whose dependencies are all in `completed` and which are not
    /// themselves in `completed`. Deterministic iteration order.
    pub fn schedulable(&self, completed: &HashSet<String>) -> BTreeSet<String> {
        self.tasks
            .values()
            .filter(|t| !completed.contains(&t.name))
            .filter(|t| t.dependencies.iter().all(|d| completed.contains(d)))
            .map(|t| t.name.clone())
            .collect()
    }

    /// All terminal states observed so far.
    pub fn all_terminal(&self) -> bool {
        self.tasks.values().all(|t| t.state.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{Job, Step};

    fn job(name: &str, deps: &[&str]) -> Job {
        Job {
            name: name.to_string(),
            description: None,
            env: Default::default(),
            timeout: None,
            retry: None,
            when: None,
            concurrency: None,
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            source: None,
            approval: None,
            target: None,
            notify: None,
            triggers: vec![],
            steps: vec![Step {
                name: "s".into(),
                uses: "noop".into(),
                action: None,
                args: Default::default(),
                env: Default::default(),
                continue_on_error: false,
                timeout: None,
                when: None,
                agent_selector: None,
                run_on_agent: false,
            }],
        }
    }

    fn pipeline(jobs: Vec<Job>) -> Pipeline {
        Pipeline {
            namespace: "p".into(),
            version: None,
            variables: Default::default(),
            jobs,
        }
    }

    #[test]
    fn detects_unknown_dependency() {
        let p = pipeline(vec![job("a", &["ghost"])]);
        let err = Dag::build(&p).unwrap_err();
        assert!(matches!(err, DagError::UnknownDependency { .. }));
    }

    #[test]
    fn detects_cycle() {
        let p = pipeline(vec![job("a", &["b"]), job("b", &["a"])]);
        assert!(matches!(Dag::build(&p).unwrap_err(), DagError::Cycle(_)));
    }

    #[test]
    fn schedulable_respects_dependencies() {
        let p = pipeline(vec![job("a", &[]), job("b", &["a"])]);
        let dag = Dag::build(&p).unwrap();

        let none_done = HashSet::new();
        assert_eq!(
            dag.schedulable(&none_done),
            BTreeSet::from(["a".to_string()])
        );

        let mut a_done = HashSet::new();
        a_done.insert("a".to_string());
        assert_eq!(
            dag.schedulable(&a_done),
            BTreeSet::from(["b".to_string()])
        );
    }

    #[test]
    fn schedulable_never_returns_completed_nodes() {
        let p = pipeline(vec![job("a", &[]), job("b", &["a"])]);
        let dag = Dag::build(&p).unwrap();
        let mut completed = HashSet::new();
        completed.insert("a".to_string());
        completed.insert("b".to_string());
        assert!(dag.schedulable(&completed).is_empty());
    }
}

// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Named tasks run in dependency order.

use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

type TaskFn<C> = Arc<dyn Fn(C) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task '{0}' is not defined")]
    Unknown(String),

    #[error("dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("task '{name}' failed")]
    Failed {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

struct Task<C> {
    deps: Vec<String>,
    description: Option<String>,
    body: Option<TaskFn<C>>,
}

/// A registry of tasks over a shared context `C`.
pub struct TaskRunner<C> {
    tasks: BTreeMap<String, Task<C>>,
}

impl<C> Default for TaskRunner<C> {
    fn default() -> Self {
        Self {
            tasks: BTreeMap::new(),
        }
    }
}

impl<C: Clone + Send + 'static> TaskRunner<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name`, replacing any previous definition.
    pub fn task<F, Fut>(&mut self, name: impl Into<String>, deps: &[&str], body: F)
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body: TaskFn<C> = Arc::new(move |ctx| -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(body(ctx))
        });
        self.insert(
            name.into(),
            deps.iter().map(|d| d.to_string()).collect(),
            Some(body),
        );
    }

    /// Register a task that only runs its dependencies.
    pub fn group(&mut self, name: impl Into<String>, deps: &[&str]) {
        self.insert(name.into(), deps.iter().map(|d| d.to_string()).collect(), None);
    }

    pub(crate) fn insert(&mut self, name: String, deps: Vec<String>, body: Option<TaskFn<C>>) {
        if self.tasks.contains_key(&name) {
            tracing::debug!("Redefining task '{}'", name);
        }
        self.tasks.insert(
            name,
            Task {
                deps,
                description: None,
                body,
            },
        );
    }

    pub fn describe(&mut self, name: &str, description: impl Into<String>) {
        if let Some(task) = self.tasks.get_mut(name) {
            task.description = Some(description.into());
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Task names with their dependencies and description, sorted by name.
    pub fn list(&self) -> Vec<(&str, &[String], Option<&str>)> {
        self.tasks
            .iter()
            .map(|(name, task)| (name.as_str(), task.deps.as_slice(), task.description.as_deref()))
            .collect()
    }

    /// Every task needed for `names`, dependencies first, each once.
    pub fn plan(&self, names: &[String]) -> Result<Vec<String>, TaskError> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut stack = Vec::new();
        for name in names {
            self.visit(name, &mut stack, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), TaskError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(TaskError::Cycle(cycle));
        }
        let task = self
            .tasks
            .get(name)
            .ok_or_else(|| TaskError::Unknown(name.to_string()))?;

        stack.push(name.to_string());
        for dep in &task.deps {
            self.visit(dep, stack, done, order)?;
        }
        stack.pop();

        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// Resolve `names` into a runnable schedule.
    pub fn schedule(&self, names: &[String]) -> Result<Schedule<C>, TaskError> {
        let steps = self
            .plan(names)?
            .into_iter()
            .map(|name| {
                let body = self.tasks.get(&name).and_then(|task| task.body.clone());
                (name, body)
            })
            .collect();
        Ok(Schedule { steps })
    }

    pub async fn run(&self, ctx: C, names: &[String]) -> Result<(), TaskError> {
        self.schedule(names)?.run(ctx).await
    }
}

/// Tasks in the order they will run.
pub struct Schedule<C> {
    steps: Vec<(String, Option<TaskFn<C>>)>,
}

impl<C: Clone + Send + 'static> Schedule<C> {
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Run each task in turn, stopping at the first failure.
    pub async fn run(self, ctx: C) -> Result<(), TaskError> {
        for (name, body) in self.steps {
            let Some(body) = body else {
                continue;
            };
            tracing::info!("Starting task '{}'", name);
            body(ctx.clone()).await.map_err(|source| {
                tracing::error!("Task '{}' failed: {:#}", name, source);
                TaskError::Failed {
                    name: name.clone(),
                    source: source.into(),
                }
            })?;
            tracing::info!("Finished task '{}'", name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(runner: &mut TaskRunner<Log>, name: &'static str, deps: &[&str]) {
        runner.task(name, deps, move |log: Log| async move {
            log.lock().unwrap().push(name.to_string());
            Ok(())
        });
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_dependencies_run_first_and_once() {
        let mut runner = TaskRunner::new();
        recording(&mut runner, "base", &[]);
        recording(&mut runner, "web", &["base"]);
        recording(&mut runner, "db", &["base"]);
        runner.group("default", &["web", "db"]);

        let log: Log = Arc::default();
        runner.run(log.clone(), &names(&["default"])).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["base", "web", "db"]);
    }

    #[test]
    fn test_unknown_task() {
        let runner: TaskRunner<Log> = TaskRunner::new();
        let err = runner.plan(&names(&["deploy"])).unwrap_err();
        assert!(matches!(err, TaskError::Unknown(ref n) if n == "deploy"));
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let mut runner: TaskRunner<Log> = TaskRunner::new();
        runner.group("a", &["b"]);
        runner.group("b", &["c"]);
        runner.group("c", &["a"]);
        let err = runner.plan(&names(&["a"])).unwrap_err();
        assert_eq!(err.to_string(), "dependency cycle: a -> b -> c -> a");
    }

    #[tokio::test]
    async fn test_failure_stops_the_run() {
        let mut runner = TaskRunner::new();
        runner.task("broken", &[], |_: Log| async { anyhow::bail!("no route to host") });
        recording(&mut runner, "after", &["broken"]);

        let log: Log = Arc::default();
        let err = runner.run(log.clone(), &names(&["after"])).await.unwrap_err();
        match err {
            TaskError::Failed { name, source } => {
                assert_eq!(name, "broken");
                assert!(source.to_string().contains("no route"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(log.lock().unwrap().is_empty());
    }
}

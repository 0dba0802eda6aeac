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

//! The top-level fleet: registry, settings, pipeline operators and tasks.
//!
//! ```no_run
//! use fleetsh::{Fleet, FleetConfig, PipelineExt};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let fleet = Fleet::new(FleetConfig::from_env());
//! fleet.task("default", &[], |fleet| async move {
//!     fleet
//!         .nodes(vec!["web-1", "web-2"])
//!         .pipe(fleet.connect())
//!         .pipe(fleet.package("nginx"))
//!         .pipe(fleet.exec("systemctl restart nginx"))
//!         .pipe(fleet.save())
//!         .pipe(fleet.disconnect())
//!         .drain()
//!         .await;
//!     Ok(())
//! });
//! fleet.start(&[]).await?;
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{FleetConfig, Fleetfile, Step, TaskDef};
use crate::connection::Connector;
use crate::exec::{PackageSpec, ShellCommand};
use crate::node::{Node, NodeContext, NodeSpec};
use crate::pipeline::{self, ExecStage, NodeStream, PipelineExt, SimpleStage, Stage, StageEvent};
use crate::registry::NodeRegistry;
use crate::ssh::SshConnector;
use crate::tasks::{TaskError, TaskRunner};
use crate::ui;

/// Task run when `start` is given no names.
pub const DEFAULT_TASK: &str = "default";

pub struct Fleet {
    registry: Arc<NodeRegistry>,
    tasks: RwLock<TaskRunner<Arc<Fleet>>>,
}

impl Fleet {
    /// A fleet reaching nodes over SSH.
    pub fn new(settings: FleetConfig) -> Arc<Self> {
        Self::with_connector(settings, Arc::new(SshConnector::new()))
    }

    pub fn with_connector(settings: FleetConfig, connector: Arc<dyn Connector>) -> Arc<Self> {
        let ctx = NodeContext::new(settings, connector);
        Arc::new(Self {
            registry: Arc::new(NodeRegistry::new(ctx)),
            tasks: RwLock::new(TaskRunner::new()),
        })
    }

    pub fn settings(&self) -> &FleetConfig {
        &self.registry.context().settings
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn node(&self, name: &str) -> Option<Arc<Node>> {
        self.registry.get(name)
    }

    /// Start a pipeline from a name, a list of names or a list of records.
    pub fn nodes(&self, spec: impl Into<NodeSpec>) -> NodeStream {
        pipeline::nodes(self.registry.clone(), spec.into())
    }

    /// Start a pipeline from an untyped specification. Unrecognized shapes
    /// are reported and yield an empty pipeline.
    pub fn nodes_from_value(&self, value: &Value) -> NodeStream {
        match NodeSpec::from_value(value) {
            Ok(spec) => self.nodes(spec),
            Err(e) => {
                tracing::error!("{}", e);
                self.nodes(NodeSpec::default())
            }
        }
    }

    /// A stage running `op` on every node.
    pub fn simple<F, Fut>(&self, label: impl Into<String>, op: F) -> SimpleStage
    where
        F: Fn(Arc<Node>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        SimpleStage::new(label, self.registry.clone(), op)
    }

    pub fn connect(&self) -> SimpleStage {
        self.simple("connect", |node| async move {
            if let Err(e) = node.connect().await {
                tracing::error!("[{}] connect: {}", node.name(), e);
            }
        })
    }

    pub fn disconnect(&self) -> SimpleStage {
        self.simple("disconnect", |node| async move {
            if let Err(e) = node.disconnect().await {
                tracing::error!("[{}] disconnect: {}", node.name(), e);
            }
        })
    }

    pub fn end(&self) -> SimpleStage {
        self.disconnect()
    }

    pub fn save(&self) -> SimpleStage {
        self.simple("save", |node| async move {
            if let Err(e) = node.save().await {
                tracing::error!("[{}] save: {}", node.name(), e);
            }
        })
    }

    /// Run `command` on every node. Subscribe to the returned stage for
    /// per-node and aggregate completion.
    pub fn exec(&self, command: impl Into<String>) -> ExecStage {
        let command = ShellCommand::new(command);
        let label = match &command {
            Ok(command) => format!("exec `{command}`"),
            Err(_) => "exec".to_string(),
        };
        ExecStage::new(label, self.registry.clone(), command)
    }

    pub fn execute(&self, command: impl Into<String>) -> ExecStage {
        self.exec(command)
    }

    /// Install packages on every node.
    pub fn package(&self, packages: impl Into<PackageSpec>) -> ExecStage {
        let packages = packages.into();
        let label = format!("package {}", packages.names().join(" "));
        ExecStage::new(label.trim_end(), self.registry.clone(), packages.to_command())
    }

    /// Register a task.
    pub fn task<F, Fut>(&self, name: impl Into<String>, deps: &[&str], body: F)
    where
        F: Fn(Arc<Fleet>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .task(name, deps, body);
    }

    /// Task names, their dependencies and descriptions.
    pub fn task_list(&self) -> Vec<(String, Vec<String>, Option<String>)> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .list()
            .into_iter()
            .map(|(name, deps, description)| {
                (name.to_string(), deps.to_vec(), description.map(str::to_string))
            })
            .collect()
    }

    /// Register every task of a fleetfile.
    pub fn add_fleetfile(&self, fleetfile: &Fleetfile) {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        for (name, def) in &fleetfile.tasks {
            let deps: Vec<&str> = def.deps.iter().map(String::as_str).collect();
            if def.steps.is_empty() {
                tasks.group(name.clone(), &deps);
            } else {
                let def = Arc::new(def.clone());
                tasks.task(name.clone(), &deps, move |fleet: Arc<Fleet>| {
                    let def = def.clone();
                    async move { fleet.run_task_def(&def).await }
                });
            }
            if let Some(description) = &def.description {
                tasks.describe(name, description.clone());
            }
        }
    }

    /// Run the named tasks and their dependencies, or the default task
    /// when `names` is empty.
    pub async fn start(self: &Arc<Self>, names: &[String]) -> Result<(), TaskError> {
        let names = if names.is_empty() {
            vec![DEFAULT_TASK.to_string()]
        } else {
            names.to_vec()
        };
        let schedule = self
            .tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .schedule(&names)?;
        tracing::debug!("Running tasks {:?}", schedule.names());
        schedule.run(self.clone()).await
    }

    /// Run a declarative task: its nodes through its steps.
    async fn run_task_def(&self, def: &TaskDef) -> Result<()> {
        let Some(spec) = &def.nodes else {
            tracing::warn!("Task has steps but no nodes; nothing to do");
            return Ok(());
        };

        let mut stream = self.nodes_from_value(spec);
        let mut reporters = Vec::new();
        for step in &def.steps {
            stream = match step {
                Step::Connect => stream.pipe(self.connect()),
                Step::Disconnect => stream.pipe(self.disconnect()),
                Step::Save => stream.pipe(self.save()),
                Step::Exec(command) => self.report(stream, self.exec(command.clone()), &mut reporters),
                Step::Package(packages) => {
                    self.report(stream, self.package(packages.clone()), &mut reporters)
                }
            };
        }
        stream.drain().await;

        let mut failed = 0;
        for reporter in reporters {
            failed += reporter.await?;
        }
        if failed > 0 {
            anyhow::bail!("{failed} node operation(s) failed");
        }
        Ok(())
    }

    fn report(
        &self,
        stream: NodeStream,
        stage: ExecStage,
        reporters: &mut Vec<tokio::task::JoinHandle<usize>>,
    ) -> NodeStream {
        let mut events = stage.subscribe();
        reporters.push(tokio::spawn(async move {
            let mut failed = 0;
            while let Some(event) = events.recv().await {
                match event {
                    StageEvent::NodeComplete { node, result } => {
                        ui::print_node_result(&node, &result)
                    }
                    StageEvent::BatchComplete(summary) => {
                        ui::print_batch_summary(&summary);
                        failed += summary.failed;
                    }
                }
            }
            failed
        }));
        stage.apply(stream)
    }
}

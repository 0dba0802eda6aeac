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

//! Per-node pipeline stages.

use futures::future::{self, BoxFuture};
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::dispatch::{BatchSummary, DispatchCounter, DispatchGuard};
use super::{NodeStream, Stage};
use crate::error::{InputError, NodeError};
use crate::events::Observers;
use crate::exec::{ExecOutput, ShellCommand};
use crate::node::Node;
use crate::registry::NodeRegistry;

type NodeFn = Arc<dyn Fn(Arc<Node>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Runs one async operation per node and re-emits each name when its
/// operation has finished.
pub struct SimpleStage {
    label: String,
    registry: Arc<NodeRegistry>,
    op: NodeFn,
}

impl SimpleStage {
    pub fn new<F, Fut>(label: impl Into<String>, registry: Arc<NodeRegistry>, op: F) -> Self
    where
        F: Fn(Arc<Node>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            label: label.into(),
            registry,
            op: Arc::new(move |node| -> BoxFuture<'static, ()> { Box::pin(op(node)) }),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Stage for SimpleStage {
    fn apply(self, input: NodeStream) -> NodeStream {
        let limit = self.registry.context().settings.stage_limit();
        let Self {
            label,
            registry,
            op,
        } = self;

        input
            .map(move |name| {
                let node = registry.get(&name);
                let op = op.clone();
                let label = label.clone();
                async move {
                    match node {
                        Some(node) => op(node).await,
                        None => tracing::warn!("{}: no node named '{}' is registered", label, name),
                    }
                    name
                }
            })
            .buffer_unordered(limit)
            .boxed()
    }
}

/// Notifications of an [`ExecStage`].
#[derive(Debug, Clone)]
pub enum StageEvent {
    /// One node finished; carries that node's own result
    NodeComplete {
        node: String,
        result: Result<ExecOutput, NodeError>,
    },
    /// Every node dispatched by this stage has finished
    BatchComplete(BatchSummary),
}

/// Runs a command on every node and reports both per-node and aggregate
/// completion.
///
/// Each stage invocation counts its dispatches; once its input is
/// exhausted and the last node has finished, exactly one
/// [`StageEvent::BatchComplete`] is emitted. Per-node events precede it.
pub struct ExecStage {
    label: String,
    registry: Arc<NodeRegistry>,
    command: Result<ShellCommand, InputError>,
    events: Arc<Observers<StageEvent>>,
}

impl ExecStage {
    /// A stage for `command`. An input error is reported here once; the
    /// stage then passes names through, failing each with that error.
    pub fn new(
        label: impl Into<String>,
        registry: Arc<NodeRegistry>,
        command: Result<ShellCommand, InputError>,
    ) -> Self {
        let label = label.into();
        if let Err(e) = &command {
            tracing::error!("{}: {}; nodes will pass through untouched", label, e);
        }
        Self {
            label,
            registry,
            command,
            events: Arc::new(Observers::new()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn command(&self) -> Option<&ShellCommand> {
        self.command.as_ref().ok()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<StageEvent> {
        self.events.subscribe()
    }
}

impl Stage for ExecStage {
    fn apply(self, input: NodeStream) -> NodeStream {
        let limit = self.registry.context().settings.stage_limit();
        let Self {
            label,
            registry,
            command,
            events,
        } = self;

        let batch_events = events.clone();
        let counter = DispatchCounter::new(label.clone(), move |summary| {
            batch_events.emit(StageEvent::BatchComplete(summary));
        });
        let command = Arc::new(command);
        let label = Arc::new(label);

        // `None` marks the end of the input so the batch can be sealed in
        // order with the dispatches.
        input
            .map(Some)
            .chain(stream::once(future::ready(None)))
            .filter_map(move |item| {
                let work = match item {
                    Some(name) => Some(run_on_node(
                        name,
                        registry.clone(),
                        command.clone(),
                        events.clone(),
                        label.clone(),
                        counter.dispatch(),
                    )),
                    None => {
                        counter.seal();
                        None
                    }
                };
                future::ready(work)
            })
            .buffer_unordered(limit)
            .boxed()
    }
}

async fn run_on_node(
    name: String,
    registry: Arc<NodeRegistry>,
    command: Arc<Result<ShellCommand, InputError>>,
    events: Arc<Observers<StageEvent>>,
    label: Arc<String>,
    guard: DispatchGuard,
) -> String {
    let result = match (command.as_ref(), registry.get(&name)) {
        (Err(e), _) => Err(NodeError::Input(e.clone())),
        (Ok(_), None) => Err(NodeError::UnknownNode(name.clone())),
        (Ok(command), Some(node)) => node.exec(command).await,
    };

    let failed = match &result {
        Ok(output) if output.success() => {
            tracing::info!("[{}] {}: done", name, label);
            false
        }
        Ok(output) => {
            tracing::warn!(
                "[{}] {}: exited with {:?} (signal {:?})",
                name,
                label,
                output.exit_code,
                output.signal
            );
            true
        }
        Err(NodeError::Input(_)) => true,
        Err(e) => {
            tracing::error!("[{}] {}: {}", name, label, e);
            true
        }
    };

    events.emit(StageEvent::NodeComplete {
        node: name.clone(),
        result,
    });
    guard.complete(failed);
    name
}

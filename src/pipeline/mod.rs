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

//! Streaming pipelines over node names.
//!
//! A pipeline starts with [`nodes`], which yields each name once that
//! node's persisted state has loaded, and is extended with [`Stage`]s via
//! [`PipelineExt::pipe`]. Stages process names as they arrive; none waits
//! for its whole input before starting.

mod dispatch;
mod stages;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;

pub use dispatch::{BatchSummary, DispatchCounter, DispatchGuard};
pub use stages::{ExecStage, SimpleStage, StageEvent};

use crate::node::NodeSpec;
use crate::registry::NodeRegistry;

/// Names flowing between stages.
pub type NodeStream = BoxStream<'static, String>;

/// A unit of per-node work in a pipeline.
pub trait Stage {
    fn apply(self, input: NodeStream) -> NodeStream;
}

pub trait PipelineExt {
    /// Feed this stream into `stage`.
    fn pipe<S: Stage>(self, stage: S) -> NodeStream;

    /// Run the pipeline to completion, returning the names that came out.
    fn drain(self) -> BoxFuture<'static, Vec<String>>;
}

impl PipelineExt for NodeStream {
    fn pipe<S: Stage>(self, stage: S) -> NodeStream {
        stage.apply(self)
    }

    fn drain(self) -> BoxFuture<'static, Vec<String>> {
        Box::pin(self.collect())
    }
}

/// Resolve every entry of `spec` and yield each name once its load has
/// completed.
///
/// Invalid entries are reported and left out. Load failures are reported
/// but the name is still yielded. The stream ends only after every load
/// has finished.
pub fn nodes(registry: Arc<NodeRegistry>, spec: NodeSpec) -> NodeStream {
    let limit = registry.context().settings.stage_limit();
    let resolved: Vec<_> = spec
        .into_entries()
        .into_iter()
        .map(|entry| registry.resolve(entry))
        .filter(|node| match node.error() {
            Some(error) => {
                tracing::error!("Skipping node: {}", error);
                false
            }
            None => true,
        })
        .collect();

    stream::iter(resolved)
        .map(|node| async move {
            if let Err(e) = node.load().await {
                tracing::warn!("[{}] load: {}", node.name(), e);
            }
            node.name().to_string()
        })
        .buffer_unordered(limit)
        .boxed()
}

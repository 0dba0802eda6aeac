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

//! The set of known nodes, keyed by name.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::node::record::{validate_name, NodeEntry, NodeRecord};
use crate::node::{Node, NodeContext};

/// Owns every [`Node`] of a fleet.
///
/// Entries are only ever added. The first registration of a name wins;
/// configuration passed for an already known name is ignored.
pub struct NodeRegistry {
    ctx: NodeContext,
    nodes: RwLock<HashMap<String, Arc<Node>>>,
}

impl NodeRegistry {
    pub fn new(ctx: NodeContext) -> Self {
        Self {
            ctx,
            nodes: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    /// Return the node for `entry`, registering it if the name is new.
    ///
    /// Entries with an unusable name produce a permanently errored node
    /// that is not registered.
    pub fn resolve(&self, entry: impl Into<NodeEntry>) -> Arc<Node> {
        let record = match entry.into() {
            NodeEntry::Name(name) => NodeRecord::new(name)
                .with_via(self.ctx.settings.default_via.clone())
                .with_loader(self.ctx.settings.default_loader.clone()),
            NodeEntry::Config(record) => *record,
            NodeEntry::Invalid(error) => {
                tracing::error!("Invalid node entry: {}", error);
                return Arc::new(Node::invalid(error, self.ctx.clone()));
            }
        };

        if let Err(error) = validate_name(record.name()) {
            tracing::error!("Invalid node entry: {}", error);
            return Arc::new(Node::invalid(error, self.ctx.clone()));
        }

        if let Some(node) = self.get(record.name()) {
            return node;
        }

        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        nodes
            .entry(record.name().to_string())
            .or_insert_with(|| {
                tracing::debug!("Registered node {}", record.name());
                Arc::new(Node::new(record, self.ctx.clone()))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Node>> {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.nodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

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

//! Live node handles.
//!
//! A [`Node`] couples a [`NodeRecord`] with its connection manager, its
//! event subscribers and the fleet-wide context it needs for I/O. Nodes are
//! created and owned by the [`crate::registry::NodeRegistry`].

pub mod record;

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::config::FleetConfig;
use crate::connection::{ConnectOutcome, ConnectionManager, ConnectionState, Connector};
use crate::error::{InvalidNodeName, NodeError};
use crate::events::{NodeEvent, Observers};
use crate::exec::{self, ExecOutput, ShellCommand};
use crate::store::{LoadOutcome, StateStore};

pub use record::{LoaderKind, NodeEntry, NodeRecord, NodeSpec, SshCredentials, Via};

/// Collaborators shared by every node of a fleet.
#[derive(Clone)]
pub struct NodeContext {
    pub settings: Arc<FleetConfig>,
    pub store: Arc<StateStore>,
    pub connector: Arc<dyn Connector>,
}

impl NodeContext {
    pub fn new(settings: FleetConfig, connector: Arc<dyn Connector>) -> Self {
        let store = StateStore::new(settings.state_dir.clone());
        Self {
            settings: Arc::new(settings),
            store: Arc::new(store),
            connector,
        }
    }
}

/// One remote target and its session.
pub struct Node {
    name: String,
    record: Mutex<NodeRecord>,
    error: Option<InvalidNodeName>,
    connection: ConnectionManager,
    exec_lock: tokio::sync::Mutex<()>,
    events: Observers<NodeEvent>,
    ctx: NodeContext,
}

impl Node {
    pub(crate) fn new(record: NodeRecord, ctx: NodeContext) -> Self {
        Self {
            name: record.name().to_string(),
            record: Mutex::new(record),
            error: None,
            connection: ConnectionManager::new(),
            exec_lock: tokio::sync::Mutex::new(()),
            events: Observers::new(),
            ctx,
        }
    }

    /// A permanently errored node. Every operation returns `error`.
    pub(crate) fn invalid(error: InvalidNodeName, ctx: NodeContext) -> Self {
        let mut node = Self::new(NodeRecord::new(error.value.clone()), ctx);
        node.error = Some(error);
        node
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The construction error of an invalid node.
    pub fn error(&self) -> Option<&InvalidNodeName> {
        self.error.as_ref()
    }

    /// A snapshot of the current record.
    pub fn record(&self) -> NodeRecord {
        self.lock_record().clone()
    }

    /// Modify the record in place. The name cannot be changed.
    pub fn update<F: FnOnce(&mut NodeRecord)>(&self, f: F) {
        let mut record = self.lock_record();
        f(&mut record);
        record.set_name(self.name.clone());
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<NodeEvent> {
        self.events.subscribe()
    }

    /// Whether sessions stay open after an exec.
    pub fn is_persistent(&self) -> bool {
        self.lock_record()
            .persistent
            .unwrap_or(self.ctx.settings.persistent)
    }

    fn lock_record(&self) -> std::sync::MutexGuard<'_, NodeRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), NodeError> {
        match &self.error {
            Some(error) => Err(error.clone().into()),
            None => Ok(()),
        }
    }

    /// Open a session unless one is already live.
    pub async fn connect(&self) -> Result<(), NodeError> {
        self.check()?;

        let mut record = self.record();
        let outcome = self
            .connection
            .connect(&mut record, &self.ctx.settings, self.ctx.connector.as_ref())
            .await;

        // Keep the resolved credential defaults for later saves and reconnects.
        self.update(|current| current.ssh = record.ssh);

        match outcome? {
            ConnectOutcome::Opened => {
                tracing::info!("[{}] Connected", self.name);
                self.events.emit(NodeEvent::Connected);
            }
            ConnectOutcome::AlreadyConnected => {
                tracing::debug!("[{}] Already connected", self.name);
            }
        }
        Ok(())
    }

    /// Close the session. Safe to call when not connected.
    pub async fn disconnect(&self) -> Result<(), NodeError> {
        self.check()?;

        if self.connection.disconnect().await {
            tracing::info!("[{}] Disconnected", self.name);
            self.events.emit(NodeEvent::Disconnected);
        }
        Ok(())
    }

    /// Replace the record with its persisted state.
    pub async fn load(&self) -> Result<LoadOutcome, NodeError> {
        self.check()?;

        let mut record = self.record();
        let result = self.ctx.store.load(&mut record).await;
        record.set_name(self.name.clone());
        *self.lock_record() = record;

        let outcome = result?;
        tracing::debug!("[{}] Loaded ({:?})", self.name, outcome);
        self.events.emit(NodeEvent::Loaded);
        Ok(outcome)
    }

    /// Persist the full record.
    pub async fn save(&self) -> Result<(), NodeError> {
        self.check()?;

        let record = self.record();
        self.ctx.store.save(&record).await?;
        tracing::debug!("[{}] Saved", self.name);
        self.events.emit(NodeEvent::Saved);
        Ok(())
    }

    /// Run `command` in a shell on this node.
    ///
    /// A disconnected node is connected first, once; if that fails the
    /// connect error is returned. Execs on one node run one at a time. A
    /// non-persistent node is disconnected after the result is produced.
    pub async fn exec(&self, command: &ShellCommand) -> Result<ExecOutput, NodeError> {
        self.check()?;
        let _guard = self.exec_lock.lock().await;

        let transport = match self.connection.transport().await {
            Some(transport) => transport,
            None => {
                tracing::debug!("[{}] Not connected; connecting before exec", self.name);
                self.connect().await?;
                self.connection
                    .transport()
                    .await
                    .ok_or(NodeError::NotConnected)?
            }
        };

        tracing::debug!("[{}] exec: {}", self.name, command);
        let result = exec::run(transport.as_ref(), command, &self.events)
            .await
            .map_err(NodeError::shell);

        if !self.is_persistent() {
            self.disconnect().await?;
        }

        result
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("error", &self.error)
            .field("state", &self.state())
            .finish()
    }
}

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

//! Per-node session lifecycle.
//!
//! [`ConnectionManager`] owns one node's session and its
//! [`ConnectionState`]. Sessions are opened through a [`Connector`], which
//! is the seam between the engine and the SSH implementation.

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use zeroize::Zeroizing;

use crate::config::FleetConfig;
use crate::error::NodeError;
use crate::node::record::{parse_target, NodeRecord, Via};
use crate::ssh::{self, AuthMethod, ServerCheckMethod};

/// Output of a remote shell channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
    ExitSignal(String),
}

/// A bidirectional interactive shell.
#[async_trait]
pub trait ShellChannel: Send {
    async fn send(&mut self, data: &[u8]) -> Result<(), ssh::Error>;

    /// Next event, or `None` once the channel has closed.
    async fn recv(&mut self) -> Option<ShellEvent>;
}

/// An established, authenticated session.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open_shell(&self) -> Result<Box<dyn ShellChannel>, ssh::Error>;

    async fn close(&self) -> Result<(), ssh::Error>;

    fn is_closed(&self) -> bool;
}

/// Everything needed to open a session to one node.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    /// Host name used for host key lookup
    pub host: String,
    pub port: u16,
    pub addrs: Vec<SocketAddr>,
    pub username: String,
    pub auth: AuthMethod,
    pub server_check: ServerCheckMethod,
    pub timeout: Duration,
}

/// Address resolution and session establishment.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>>;

    async fn open(&self, request: ConnectRequest) -> Result<Arc<dyn Transport>, ssh::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Result of a successful [`ConnectionManager::connect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Opened,
    AlreadyConnected,
}

/// Session lifecycle of a single node.
pub struct ConnectionManager {
    state: watch::Sender<ConnectionState>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state,
            transport: Mutex::new(None),
        }
    }

    /// Current state. A session closed by the remote side reads as
    /// `Disconnected`.
    pub fn state(&self) -> ConnectionState {
        if let Ok(slot) = self.transport.try_lock() {
            self.observe(&slot);
        }
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The live session, if any.
    pub async fn transport(&self) -> Option<Arc<dyn Transport>> {
        let slot = self.transport.lock().await;
        self.observe(&slot);
        slot.as_ref().filter(|t| !t.is_closed()).cloned()
    }

    fn observe(&self, slot: &Option<Arc<dyn Transport>>) {
        if slot.as_ref().is_some_and(|t| t.is_closed()) {
            self.state.send_if_modified(|state| {
                let changed = *state != ConnectionState::Disconnected;
                *state = ConnectionState::Disconnected;
                changed
            });
        }
    }

    /// Open a session for `record` unless one is already live.
    ///
    /// Credential defaults are filled into `record.ssh` (username, host,
    /// port, identity file and key material) so callers can keep them.
    pub async fn connect(
        &self,
        record: &mut NodeRecord,
        settings: &FleetConfig,
        connector: &dyn Connector,
    ) -> Result<ConnectOutcome, NodeError> {
        let mut slot = self.transport.lock().await;

        if let Some(transport) = slot.as_ref() {
            if !transport.is_closed() {
                return Ok(ConnectOutcome::AlreadyConnected);
            }
            tracing::debug!("Session to {} was closed by the remote side", record.name());
            *slot = None;
        }

        if let Via::Unsupported(tag) = &record.via {
            self.state.send_replace(ConnectionState::Disconnected);
            return Err(NodeError::UnsupportedVia(tag.clone()));
        }

        self.state.send_replace(ConnectionState::Connecting);
        match open_session(record, settings, connector).await {
            Ok(transport) => {
                *slot = Some(transport);
                self.state.send_replace(ConnectionState::Connected);
                Ok(ConnectOutcome::Opened)
            }
            Err(e) => {
                self.state.send_replace(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Close the session. Returns `false` if there was none.
    pub async fn disconnect(&self) -> bool {
        let mut slot = self.transport.lock().await;
        let Some(transport) = slot.take() else {
            self.state.send_replace(ConnectionState::Disconnected);
            return false;
        };

        if !transport.is_closed() {
            if let Err(e) = transport.close().await {
                tracing::warn!("Error while closing session: {}", e);
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
        true
    }
}

async fn open_session(
    record: &mut NodeRecord,
    settings: &FleetConfig,
    connector: &dyn Connector,
) -> Result<Arc<dyn Transport>, NodeError> {
    let target = record.target().to_string();
    let (target_user, target_host, target_port) = parse_target(&target);

    let host = record
        .ssh
        .host
        .clone()
        .unwrap_or_else(|| target_host.to_string());
    let port = record
        .ssh
        .port
        .or(target_port)
        .unwrap_or(settings.default_port);

    let addrs = connector
        .resolve(&host, port)
        .await
        .map_err(|e| NodeError::Resolve {
            target: format!("{host}:{port}"),
            source: Arc::new(e),
        })?;
    tracing::debug!("Resolved {} to {:?}", host, addrs);

    let username = record
        .ssh
        .username
        .clone()
        .or_else(|| target_user.map(str::to_string))
        .or_else(|| settings.default_username.clone())
        .ok_or_else(|| NodeError::MissingUsername(record.name().to_string()))?;

    let credentials = &mut record.ssh;
    credentials.username = Some(username.clone());
    credentials.host = Some(host.clone());
    if credentials.identity_file.is_none() {
        credentials.identity_file = settings.default_identity_path.clone();
    }

    if credentials.private_key.is_none() {
        if let Some(path) = &credentials.identity_file {
            match tokio::fs::read(path).await {
                Ok(bytes) => {
                    tracing::debug!("Loaded identity file {:?}", path);
                    credentials.private_key = Some(Zeroizing::new(bytes));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!("No identity file at {:?}", path);
                }
                Err(e) => {
                    return Err(NodeError::Identity {
                        path: path.clone(),
                        source: Arc::new(e),
                    })
                }
            }
        }
    }

    let connect_error = |e: ssh::Error| NodeError::Connect {
        target: format!("{username}@{host}:{port}"),
        source: Arc::new(e),
    };

    let auth = ssh::auth::determine_method(credentials, settings.use_agent).map_err(connect_error)?;
    let server_check = ssh::known_hosts::get_check_method(
        settings.strict_host_key_checking,
        settings.known_hosts_path.as_deref(),
    );

    let request = ConnectRequest {
        host: host.clone(),
        port,
        addrs,
        username: username.clone(),
        auth,
        server_check,
        timeout: settings.connect_timeout(),
    };

    connector.open(request).await.map_err(connect_error)
}

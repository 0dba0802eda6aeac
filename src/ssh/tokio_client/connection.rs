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

//! Session establishment and host key verification.

use russh::client::{Config, Handle, Handler};
use russh::keys::PublicKey;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use super::authentication::{self, AuthMethod, ServerCheckMethod};
use super::Error;

/// An authenticated SSH session to one host.
#[derive(Clone)]
pub struct Client {
    pub(super) handle: Arc<Handle<ClientHandler>>,
    username: String,
    address: SocketAddr,
}

impl Client {
    /// Dial `addrs` in order and authenticate on the first that answers.
    ///
    /// `hostname` is the name the addresses were resolved from; host keys
    /// are looked up by it.
    pub async fn connect(
        addrs: &[SocketAddr],
        hostname: &str,
        username: &str,
        auth: AuthMethod,
        server_check: ServerCheckMethod,
    ) -> Result<Self, Error> {
        let config = Arc::new(Config::default());
        let (address, mut handle) = dial(config, addrs, hostname, &server_check).await?;

        tracing::debug!("Authenticating as {} on {} using {}", username, address, auth.kind());
        authentication::authenticate(&mut handle, username, auth).await?;

        Ok(Self {
            handle: Arc::new(handle),
            username: username.to_string(),
            address,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub async fn disconnect(&self) -> Result<(), Error> {
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(Error::SshError)
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

async fn dial(
    config: Arc<Config>,
    addrs: &[SocketAddr],
    hostname: &str,
    server_check: &ServerCheckMethod,
) -> Result<(SocketAddr, Handle<ClientHandler>), Error> {
    let mut last_error = None;
    for &addr in addrs {
        let handler = ClientHandler::new(hostname, addr.port(), server_check.clone());
        match russh::client::connect(config.clone(), addr, handler).await {
            Ok(handle) => return Ok((addr, handle)),
            Err(e) => {
                tracing::debug!("Connection to {} failed: {}", addr, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| {
        Error::AddressInvalid(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no addresses to connect to for {hostname}"),
        ))
    }))
}

/// Verifies the server host key according to a [`ServerCheckMethod`].
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    port: u16,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    pub fn new(hostname: &str, port: u16, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname: hostname.to_string(),
            port,
            server_check,
        }
    }

    fn is_known(&self, key: &PublicKey, known_hosts: &Path) -> Result<bool, Error> {
        russh::keys::check_known_hosts_path(&self.hostname, self.port, key, known_hosts).map_err(
            |e| match e {
                russh::keys::Error::KeyChanged { line } => {
                    tracing::error!(
                        "Host key for {} changed (known_hosts line {})",
                        self.hostname,
                        line
                    );
                    Error::HostKeyChanged(line)
                }
                _ => Error::ServerCheckFailed,
            },
        )
    }
}

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        match &self.server_check {
            ServerCheckMethod::NoCheck => Ok(true),
            ServerCheckMethod::KnownHostsFile(path) => {
                let known = self.is_known(key, path)?;
                if !known {
                    tracing::warn!("Host {} is not in {:?}", self.hostname, path);
                }
                Ok(known)
            }
            ServerCheckMethod::AcceptNew(path) => {
                if self.is_known(key, path)? {
                    return Ok(true);
                }
                tracing::info!("Adding host key for {} to {:?}", self.hostname, path);
                russh::keys::known_hosts::learn_known_hosts_path(&self.hostname, self.port, key, path)
                    .map_err(|_| Error::ServerCheckFailed)?;
                Ok(true)
            }
        }
    }
}

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

//! SSH transport for node connections.

pub mod auth;
pub mod known_hosts;
pub mod tokio_client;

use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::connection::{ConnectRequest, Connector, ShellChannel, Transport};
pub use tokio_client::{AuthMethod, Client, Error, ServerCheckMethod};

/// Opens real SSH sessions through `russh`.
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {host}"),
            ));
        }
        Ok(addrs)
    }

    async fn open(&self, request: ConnectRequest) -> Result<Arc<dyn Transport>, Error> {
        let ConnectRequest {
            host,
            addrs,
            username,
            auth,
            server_check,
            timeout,
            ..
        } = request;

        let connect = Client::connect(&addrs, &host, &username, auth, server_check);
        let client = tokio::time::timeout(timeout, connect)
            .await
            .map_err(|_| Error::Timeout(timeout))??;

        tracing::debug!(
            "Connected to {} as {}",
            client.address(),
            client.username()
        );
        Ok(Arc::new(client))
    }
}

#[async_trait]
impl Transport for Client {
    async fn open_shell(&self) -> Result<Box<dyn ShellChannel>, Error> {
        Ok(Box::new(Client::open_shell(self).await?))
    }

    async fn close(&self) -> Result<(), Error> {
        self.disconnect().await
    }

    fn is_closed(&self) -> bool {
        Client::is_closed(self)
    }
}

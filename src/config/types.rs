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

//! Fleet settings.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::utils::{default_identity_path, expand_tilde, get_current_username};
use crate::node::record::{LoaderKind, Via};
use crate::ssh::known_hosts::{get_default_known_hosts_path, StrictHostKeyChecking};

/// Directory holding persisted node state, relative to the working directory.
pub const DEFAULT_STATE_DIR: &str = ".ops";

/// Settings shared by every node of a fleet.
///
/// `Default` is independent of the process environment; use
/// [`FleetConfig::from_env`] to pick up the current user, home directory
/// and SSH agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub state_dir: PathBuf,
    /// Access method for nodes registered by name alone
    pub default_via: Via,
    /// Loader for nodes registered by name alone
    pub default_loader: LoaderKind,
    pub default_username: Option<String>,
    pub default_identity_path: Option<PathBuf>,
    pub known_hosts_path: Option<PathBuf>,
    pub default_port: u16,
    /// Keep sessions open between steps unless a node says otherwise
    pub persistent: bool,
    /// Upper bound on concurrent per-node operations in one stage
    pub parallel: Option<usize>,
    pub connect_timeout_secs: u64,
    pub strict_host_key_checking: StrictHostKeyChecking,
    pub use_agent: bool,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            default_via: Via::default(),
            default_loader: LoaderKind::default(),
            default_username: None,
            default_identity_path: None,
            known_hosts_path: None,
            default_port: 22,
            persistent: true,
            parallel: None,
            connect_timeout_secs: 30,
            strict_host_key_checking: StrictHostKeyChecking::default(),
            use_agent: false,
        }
    }
}

impl FleetConfig {
    /// Defaults completed from the process environment.
    pub fn from_env() -> Self {
        let config = Self {
            default_username: get_current_username(),
            default_identity_path: default_identity_path(),
            known_hosts_path: get_default_known_hosts_path(),
            use_agent: std::env::var_os("SSH_AUTH_SOCK").is_some(),
            ..Self::default()
        };
        tracing::debug!(
            "Fleet defaults: user={:?} identity={:?} agent={}",
            config.default_username,
            config.default_identity_path,
            config.use_agent
        );
        config
    }

    pub fn with_state_dir(mut self, state_dir: impl Into<PathBuf>) -> Self {
        self.state_dir = state_dir.into();
        self
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.default_username = Some(username.into());
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Fan-out limit for `buffer_unordered`; unbounded when unset.
    pub fn stage_limit(&self) -> usize {
        self.parallel.unwrap_or(usize::MAX).max(1)
    }
}

/// Partial settings read from a fleetfile, applied over a [`FleetConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetSettings {
    pub state_dir: Option<PathBuf>,
    pub username: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub known_hosts: Option<PathBuf>,
    pub port: Option<u16>,
    pub persistent: Option<bool>,
    pub parallel: Option<usize>,
    pub connect_timeout: Option<u64>,
    pub strict_host_key_checking: Option<StrictHostKeyChecking>,
    pub use_agent: Option<bool>,
}

impl FleetSettings {
    pub fn apply(&self, config: &mut FleetConfig) {
        if let Some(state_dir) = &self.state_dir {
            config.state_dir = expand_tilde(state_dir);
        }
        if let Some(username) = &self.username {
            config.default_username = Some(username.clone());
        }
        if let Some(identity) = &self.identity_file {
            config.default_identity_path = Some(expand_tilde(identity));
        }
        if let Some(known_hosts) = &self.known_hosts {
            config.known_hosts_path = Some(expand_tilde(known_hosts));
        }
        if let Some(port) = self.port {
            config.default_port = port;
        }
        if let Some(persistent) = self.persistent {
            config.persistent = persistent;
        }
        if let Some(parallel) = self.parallel {
            config.parallel = Some(parallel);
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout_secs = timeout;
        }
        if let Some(mode) = self.strict_host_key_checking {
            config.strict_host_key_checking = mode;
        }
        if let Some(use_agent) = self.use_agent {
            config.use_agent = use_agent;
        }
    }
}

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

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::tokio_client::ServerCheckMethod;
use directories::BaseDirs;

/// Get the default known_hosts file path
pub fn get_default_known_hosts_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".ssh").join("known_hosts"))
}

/// Create a ServerCheckMethod based on strict host key checking mode
pub fn get_check_method(
    strict_mode: StrictHostKeyChecking,
    known_hosts_path: Option<&Path>,
) -> ServerCheckMethod {
    match (strict_mode, known_hosts_path) {
        (StrictHostKeyChecking::No, _) => {
            tracing::debug!("Host key checking disabled (strict mode = no)");
            ServerCheckMethod::NoCheck
        }
        (StrictHostKeyChecking::Yes, Some(path)) => {
            if !path.exists() {
                tracing::warn!(
                    "Known hosts file not found at {:?}; every host will be rejected",
                    path
                );
            }
            tracing::debug!("Using known_hosts file: {:?} (strict mode)", path);
            ServerCheckMethod::KnownHostsFile(path.to_path_buf())
        }
        (StrictHostKeyChecking::AcceptNew, Some(path)) => {
            if let Some(ssh_dir) = path.parent() {
                if let Err(e) = std::fs::create_dir_all(ssh_dir) {
                    tracing::warn!("Could not create {:?}: {}", ssh_dir, e);
                }
            }
            tracing::debug!("Using known_hosts file: {:?} (accept-new mode)", path);
            ServerCheckMethod::AcceptNew(path.to_path_buf())
        }
        (mode, None) => {
            tracing::warn!(
                "Could not determine known_hosts path, using NoCheck (strict mode = {})",
                mode
            );
            ServerCheckMethod::NoCheck
        }
    }
}

/// Mode for host key checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrictHostKeyChecking {
    /// Always verify host keys (fail on unknown/changed)
    Yes,
    /// Never verify host keys (accept all)
    No,
    /// Verify known hosts, add new ones automatically (TOFU)
    #[default]
    AcceptNew,
}

impl std::fmt::Display for StrictHostKeyChecking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::AcceptNew => "accept-new",
        })
    }
}

impl FromStr for StrictHostKeyChecking {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" | "true" => Ok(Self::Yes),
            "no" | "false" => Ok(Self::No),
            "accept-new" | "tofu" => Ok(Self::AcceptNew),
            other => Err(format!("unknown host key checking mode '{other}'")),
        }
    }
}

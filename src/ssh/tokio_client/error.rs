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

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while establishing or using an SSH session.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid address was provided: {0}")]
    AddressInvalid(#[source] io::Error),

    #[error("The server host key could not be verified")]
    ServerCheckFailed,

    #[error("The server host key does not match the known_hosts entry at line {0}")]
    HostKeyChanged(usize),

    #[error("Unable to load key, bad format or passphrase: {0}")]
    KeyInvalid(#[source] russh::keys::Error),

    #[error("Key material is not valid UTF-8 text")]
    KeyEncoding,

    #[error("Key authentication failed")]
    KeyAuthFailed,

    #[error("Password authentication failed")]
    PasswordWrong,

    #[error("Failed to connect to SSH agent")]
    AgentConnectionFailed,

    #[error("Failed to request identities from SSH agent")]
    AgentRequestIdentitiesFailed,

    #[error("SSH agent has no identities")]
    AgentNoIdentities,

    #[error("SSH agent authentication failed")]
    AgentAuthenticationFailed,

    #[error("No authentication method available: no key material, password or agent")]
    NoAuthMethod,

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("SSH error: {0}")]
    SshError(#[from] russh::Error),
}

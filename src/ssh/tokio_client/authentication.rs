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

//! Credentials presented to a server and how its host key is verified.

use russh::client::{Handle, Handler};
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg};
use std::path::PathBuf;
use std::sync::Arc;
use zeroize::Zeroizing;

use super::Error;

/// How a node session proves its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    /// PEM or OpenSSH encoded key, as read from an identity file
    PrivateKey {
        key_data: Zeroizing<String>,
        key_pass: Option<Zeroizing<String>>,
    },
    #[cfg(not(target_os = "windows"))]
    Agent,
}

impl AuthMethod {
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn with_key(key: &str, passphrase: Option<&str>) -> Self {
        Self::PrivateKey {
            key_data: Zeroizing::new(key.to_string()),
            key_pass: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    /// Short name for log messages; never includes secret material.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Password(_) => "password",
            Self::PrivateKey { .. } => "private key",
            #[cfg(not(target_os = "windows"))]
            Self::Agent => "agent",
        }
    }
}

/// Host key verification policy for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ServerCheckMethod {
    NoCheck,
    /// Unknown hosts are rejected
    KnownHostsFile(PathBuf),
    /// Unknown hosts are appended to the file; changed keys are rejected
    AcceptNew(PathBuf),
}

pub(super) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    auth: AuthMethod,
) -> Result<(), Error> {
    match auth {
        AuthMethod::Password(password) => {
            let result = handle.authenticate_password(username, password.as_str()).await?;
            if result.success() {
                Ok(())
            } else {
                Err(Error::PasswordWrong)
            }
        }
        AuthMethod::PrivateKey { key_data, key_pass } => {
            let key = russh::keys::decode_secret_key(&key_data, key_pass.as_deref().map(String::as_str))
                .map_err(Error::KeyInvalid)?;
            with_key(handle, username, key).await
        }
        #[cfg(not(target_os = "windows"))]
        AuthMethod::Agent => with_agent(handle, username).await,
    }
}

async fn with_key<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    key: PrivateKey,
) -> Result<(), Error> {
    let hash = handle.best_supported_rsa_hash().await?.flatten();
    let result = handle
        .authenticate_publickey(username, PrivateKeyWithHashAlg::new(Arc::new(key), hash))
        .await?;
    if result.success() {
        Ok(())
    } else {
        Err(Error::KeyAuthFailed)
    }
}

/// Offer each agent identity in turn until one is accepted.
#[cfg(not(target_os = "windows"))]
async fn with_agent<H: Handler>(handle: &mut Handle<H>, username: &str) -> Result<(), Error> {
    let mut agent = russh::keys::agent::client::AgentClient::connect_env()
        .await
        .map_err(|_| Error::AgentConnectionFailed)?;
    let identities = agent
        .request_identities()
        .await
        .map_err(|_| Error::AgentRequestIdentitiesFailed)?;
    if identities.is_empty() {
        return Err(Error::AgentNoIdentities);
    }

    let hash = handle.best_supported_rsa_hash().await?.flatten();
    for identity in identities {
        let accepted = handle
            .authenticate_publickey_with(username, identity, hash, &mut agent)
            .await
            .is_ok_and(|result| result.success());
        if accepted {
            return Ok(());
        }
    }
    Err(Error::AgentAuthenticationFailed)
}

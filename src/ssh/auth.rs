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

//! Authentication method selection for node connections.

use zeroize::Zeroizing;

use super::tokio_client::{AuthMethod, Error};
use crate::node::record::SshCredentials;

/// Pick the authentication method for a node.
///
/// Priority:
/// 1. In-memory key material (identity file contents or a configured key)
/// 2. Password from the node's credentials
/// 3. SSH agent, when enabled
pub fn determine_method(credentials: &SshCredentials, use_agent: bool) -> Result<AuthMethod, Error> {
    if let Some(key) = &credentials.private_key {
        let key_data = std::str::from_utf8(key).map_err(|_| Error::KeyEncoding)?;
        tracing::debug!("Using key material for authentication");
        return Ok(AuthMethod::PrivateKey {
            key_data: Zeroizing::new(key_data.to_string()),
            key_pass: credentials
                .passphrase
                .as_deref()
                .map(|p| Zeroizing::new(p.to_string())),
        });
    }

    if let Some(password) = &credentials.password {
        tracing::debug!("Using password authentication");
        return Ok(AuthMethod::with_password(password));
    }

    #[cfg(not(target_os = "windows"))]
    if use_agent {
        tracing::debug!("Using SSH agent for authentication");
        return Ok(AuthMethod::Agent);
    }
    #[cfg(target_os = "windows")]
    let _ = use_agent;

    Err(Error::NoAuthMethod)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_material_wins_over_password() {
        let credentials = SshCredentials {
            password: Some("secret".to_string()),
            private_key: Some(Zeroizing::new(b"KEY".to_vec())),
            ..Default::default()
        };
        let method = determine_method(&credentials, true).unwrap();
        assert!(matches!(method, AuthMethod::PrivateKey { .. }));
    }

    #[test]
    fn test_password_used_without_key() {
        let credentials = SshCredentials {
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let method = determine_method(&credentials, false).unwrap();
        assert_eq!(method, AuthMethod::with_password("secret"));
    }

    #[test]
    fn test_no_credentials_is_an_error() {
        let result = determine_method(&SshCredentials::default(), false);
        assert!(matches!(result, Err(Error::NoAuthMethod)));
    }

    #[test]
    fn test_binary_key_material_is_rejected() {
        let credentials = SshCredentials {
            private_key: Some(Zeroizing::new(vec![0xff, 0xfe])),
            ..Default::default()
        };
        assert!(matches!(
            determine_method(&credentials, false),
            Err(Error::KeyEncoding)
        ));
    }
}

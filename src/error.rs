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

//! Error types shared by the node, registry and pipeline layers.
//!
//! # Error Categories
//!
//! - [`InvalidNodeName`]: a node record that can never be used
//! - [`InputError`]: malformed node specifications or package lists
//! - [`NodeError`]: failures of a single node's operations
//!
//! `NodeError` is `Clone` so one failure can be delivered to every
//! subscriber of a stage and stored as the permanent error of a record.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::ssh::tokio_client;
use crate::store::StoreError;

/// A node name that cannot identify a record.
///
/// Records constructed from such a name are permanently errored: every
/// operation on them returns this error without touching the network or
/// the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid node name {value}: {reason}")]
pub struct InvalidNodeName {
    /// The offending value, rendered for diagnostics
    pub value: String,
    /// Why the value was rejected
    pub reason: String,
}

impl InvalidNodeName {
    pub fn new(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Input that could not be turned into pipeline work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error(
        "unrecognized node specification: expected a name, a list of names or a list of node configurations, found {found}"
    )]
    NodeSpec { found: &'static str },

    #[error("no packages given")]
    EmptyPackages,

    #[error("invalid package name {0:?}")]
    PackageName(String),

    #[error("empty command")]
    EmptyCommand,
}

/// Failure of a single node operation.
#[derive(Debug, Clone, Error)]
pub enum NodeError {
    #[error(transparent)]
    InvalidName(#[from] InvalidNodeName),

    #[error("access method '{0}' is not supported")]
    UnsupportedVia(String),

    #[error("loader '{0}' is not supported")]
    UnsupportedLoader(String),

    #[error("unable to resolve an address for '{target}'")]
    Resolve {
        target: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("no username configured for '{0}' and no default available")]
    MissingUsername(String),

    #[error("failed to read identity file {path:?}")]
    Identity {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("unable to open a session to '{target}'")]
    Connect {
        target: String,
        #[source]
        source: Arc<tokio_client::Error>,
    },

    #[error("remote shell failed")]
    Shell(#[source] Arc<tokio_client::Error>),

    #[error("node is not connected")]
    NotConnected,

    #[error("no node named '{0}' is registered")]
    UnknownNode(String),

    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl NodeError {
    pub(crate) fn shell(error: tokio_client::Error) -> Self {
        Self::Shell(Arc::new(error))
    }
}

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

//! Node identity and configuration records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

use crate::error::{InputError, InvalidNodeName};

/// Longest accepted node name. Names double as state file names.
const MAX_NAME_LENGTH: usize = 255;

/// Access method used to reach a node.
///
/// Unknown tags are kept verbatim so they can be reported by name and
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Via {
    #[default]
    Ssh,
    Unsupported(String),
}

impl From<String> for Via {
    fn from(tag: String) -> Self {
        if tag.eq_ignore_ascii_case("ssh") {
            Self::Ssh
        } else {
            Self::Unsupported(tag)
        }
    }
}

impl From<Via> for String {
    fn from(via: Via) -> Self {
        via.to_string()
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ssh => f.write_str("SSH"),
            Self::Unsupported(tag) => f.write_str(tag),
        }
    }
}

/// Persistence strategy used to read and write a node's record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LoaderKind {
    #[default]
    Json,
    Unsupported(String),
}

impl From<String> for LoaderKind {
    fn from(tag: String) -> Self {
        if tag.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Unsupported(tag)
        }
    }
}

impl From<LoaderKind> for String {
    fn from(loader: LoaderKind) -> Self {
        loader.to_string()
    }
}

impl fmt::Display for LoaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("JSON"),
            Self::Unsupported(tag) => f.write_str(tag),
        }
    }
}

/// SSH credentials for a node.
///
/// `password` may be read from persisted state but is never written back.
/// `private_key` holds identity material loaded at connect time and is
/// never persisted.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<PathBuf>,

    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    #[serde(default, skip_serializing)]
    pub passphrase: Option<String>,

    #[serde(skip)]
    pub private_key: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for SshCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshCredentials")
            .field("username", &self.username)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("identity_file", &self.identity_file)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field(
                "private_key",
                &self.private_key.as_ref().map(|k| format!("<{} bytes>", k.len())),
            )
            .finish()
    }
}

/// Identity and configuration for one remote target.
///
/// The name is fixed at construction; everything else may be changed by
/// loaders or by the caller through [`crate::node::Node::update`]. Keys
/// the record does not know about are kept in `extra` and round-trip
/// through persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    name: String,

    /// Host or address to reach; the name is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    #[serde(default)]
    pub via: Via,

    #[serde(default)]
    pub loader: LoaderKind,

    /// Keep the session open after each exec. Falls back to the fleet setting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent: Option<bool>,

    #[serde(default)]
    pub ssh: SshCredentials,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeRecord {
    /// A record holding only a name, every other field at its default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            via: Via::default(),
            loader: LoaderKind::default(),
            persistent: None,
            ssh: SshCredentials::default(),
            extra: Map::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_via(mut self, via: Via) -> Self {
        self.via = via;
        self
    }

    pub fn with_loader(mut self, loader: LoaderKind) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.ssh.username = Some(username.into());
        self
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = Some(persistent);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry keys are authoritative; only the state store may rename.
    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// The address to connect to, defaulting to the node name.
    pub fn target(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.name)
    }
}

/// Check that `name` can identify a record and name its state file.
pub fn validate_name(name: &str) -> Result<(), InvalidNodeName> {
    let quoted = format!("{name:?}");
    if name.trim().is_empty() {
        return Err(InvalidNodeName::new(quoted, "name cannot be empty"));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(InvalidNodeName::new(
            quoted,
            format!("name exceeds maximum length of {MAX_NAME_LENGTH}"),
        ));
    }
    if name == "." || name == ".." {
        return Err(InvalidNodeName::new(quoted, "name cannot be a relative path"));
    }
    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
    {
        return Err(InvalidNodeName::new(quoted, "name contains invalid characters"));
    }
    Ok(())
}

/// Split a target of the form `[user@]host[:port]`.
///
/// Bracketed IPv6 literals (`[::1]:2222`) are accepted; a bare IPv6
/// address is taken as a host without a port.
pub fn parse_target(target: &str) -> (Option<&str>, &str, Option<u16>) {
    let (user, host_part) = match target.rfind('@') {
        Some(at) => (Some(&target[..at]), &target[at + 1..]),
        None => (None, target),
    };

    if let Some(rest) = host_part.strip_prefix('[') {
        if let Some(close) = rest.find(']') {
            let host = &rest[..close];
            let port = rest[close + 1..]
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok());
            return (user, host, port);
        }
    }

    if host_part.matches(':').count() == 1 {
        if let Some((host, port)) = host_part.split_once(':') {
            if let Ok(port) = port.parse::<u16>() {
                return (user, host, Some(port));
            }
        }
    }

    (user, host_part, None)
}

/// One entry of a node specification.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEntry {
    Name(String),
    Config(Box<NodeRecord>),
    /// An entry whose name is missing or unusable
    Invalid(InvalidNodeName),
}

impl NodeEntry {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::String(name) => Self::Name(name.clone()),
            Value::Object(map) => match map.get("name") {
                Some(Value::String(name)) => {
                    match serde_json::from_value::<NodeRecord>(value.clone()) {
                        Ok(record) => Self::Config(Box::new(record)),
                        Err(e) => Self::Invalid(InvalidNodeName::new(
                            format!("{name:?}"),
                            format!("malformed node configuration: {e}"),
                        )),
                    }
                }
                Some(other) => Self::Invalid(InvalidNodeName::new(
                    other.to_string(),
                    "name must be a string",
                )),
                None => Self::Invalid(InvalidNodeName::new(
                    value.to_string(),
                    "configuration has no name",
                )),
            },
            other => Self::Invalid(InvalidNodeName::new(
                other.to_string(),
                "name must be a string",
            )),
        }
    }
}

impl From<&str> for NodeEntry {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for NodeEntry {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<NodeRecord> for NodeEntry {
    fn from(record: NodeRecord) -> Self {
        Self::Config(Box::new(record))
    }
}

/// The input of a `nodes()` pipeline: one name, a list of names, or a list
/// of node configurations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSpec {
    entries: Vec<NodeEntry>,
}

impl NodeSpec {
    pub fn new(entries: Vec<NodeEntry>) -> Self {
        Self { entries }
    }

    /// Interpret an untyped value, as found in a fleetfile.
    pub fn from_value(value: &Value) -> Result<Self, InputError> {
        match value {
            Value::String(name) => Ok(Self::new(vec![NodeEntry::Name(name.clone())])),
            Value::Array(items) => Ok(Self::new(items.iter().map(NodeEntry::from_value).collect())),
            Value::Null => Err(InputError::NodeSpec { found: "null" }),
            Value::Bool(_) => Err(InputError::NodeSpec { found: "a boolean" }),
            Value::Number(_) => Err(InputError::NodeSpec { found: "a number" }),
            Value::Object(_) => Err(InputError::NodeSpec {
                found: "a single object",
            }),
        }
    }

    pub fn entries(&self) -> &[NodeEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<NodeEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&str> for NodeSpec {
    fn from(name: &str) -> Self {
        Self::new(vec![name.into()])
    }
}

impl From<String> for NodeSpec {
    fn from(name: String) -> Self {
        Self::new(vec![name.into()])
    }
}

impl From<Vec<&str>> for NodeSpec {
    fn from(names: Vec<&str>) -> Self {
        Self::new(names.into_iter().map(NodeEntry::from).collect())
    }
}

impl From<Vec<String>> for NodeSpec {
    fn from(names: Vec<String>) -> Self {
        Self::new(names.into_iter().map(NodeEntry::from).collect())
    }
}

impl From<Vec<NodeRecord>> for NodeSpec {
    fn from(records: Vec<NodeRecord>) -> Self {
        Self::new(records.into_iter().map(NodeEntry::from).collect())
    }
}

impl From<Vec<NodeEntry>> for NodeSpec {
    fn from(entries: Vec<NodeEntry>) -> Self {
        Self::new(entries)
    }
}

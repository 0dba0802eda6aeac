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

//! Persistence of node records.
//!
//! Records are read and written through the loader named on the record.
//! [`StateStore`] dispatches on [`LoaderKind`]; only the JSON loader is
//! implemented, one document per node at `<state_dir>/<name>.json`.

use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;

use crate::error::NodeError;
use crate::node::record::{LoaderKind, NodeRecord};

/// Failure to read or write persisted node state.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("failed to read node state from {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("malformed node state in {path:?}; record reset to its name")]
    Malformed {
        path: PathBuf,
        #[source]
        source: Arc<serde_json::Error>,
    },

    #[error("failed to write node state to {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("failed to serialize node state")]
    Serialize(#[source] Arc<serde_json::Error>),
}

/// What a successful load found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing persisted yet; the record is unchanged
    Missing,
    Loaded,
    /// The document carried a different name, which was replaced by the
    /// registry key
    NameCorrected { found: String },
}

/// JSON documents in a state directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Replace `record` with its persisted document, if one exists.
    ///
    /// Malformed content resets the record to its name alone and is
    /// returned as an error; the next save overwrites it.
    pub async fn load(&self, record: &mut NodeRecord) -> Result<LoadOutcome, StoreError> {
        let name = record.name().to_string();
        let path = self.path_for(&name);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No persisted state for {} at {:?}", name, path);
                return Ok(LoadOutcome::Missing);
            }
            Err(e) => {
                return Err(StoreError::Read {
                    path,
                    source: Arc::new(e),
                })
            }
        };

        let parsed = serde_json::from_str::<Value>(&content).and_then(|mut doc| {
            let found = match doc.get("name") {
                Some(Value::String(found)) => Some(found.clone()),
                _ => None,
            };
            if let Value::Object(map) = &mut doc {
                map.insert("name".to_string(), Value::String(name.clone()));
            }
            serde_json::from_value::<NodeRecord>(doc).map(|loaded| (loaded, found))
        });

        let (mut loaded, found) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                *record = NodeRecord::new(name);
                return Err(StoreError::Malformed {
                    path,
                    source: Arc::new(e),
                });
            }
        };

        // Secrets are never persisted; keep the ones already in memory.
        let secrets = &mut record.ssh;
        loaded.ssh.private_key = secrets.private_key.take();
        if loaded.ssh.password.is_none() {
            loaded.ssh.password = secrets.password.take();
        }
        if loaded.ssh.passphrase.is_none() {
            loaded.ssh.passphrase = secrets.passphrase.take();
        }
        *record = loaded;

        match found {
            Some(found) if found != name => {
                tracing::warn!(
                    "Persisted state at {:?} is named '{}'; using registry name '{}'",
                    path,
                    found,
                    name
                );
                Ok(LoadOutcome::NameCorrected { found })
            }
            _ => Ok(LoadOutcome::Loaded),
        }
    }

    /// Write the full record, replacing any previous document.
    pub async fn save(&self, record: &NodeRecord) -> Result<(), StoreError> {
        let path = self.path_for(record.name());
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Serialize(Arc::new(e)))?;

        let write_error = |e: io::Error| StoreError::Write {
            path: path.clone(),
            source: Arc::new(e),
        };

        fs::create_dir_all(&self.dir).await.map_err(write_error)?;

        let tmp = self.dir.join(format!(".{}.json.tmp", record.name()));
        fs::write(&tmp, json).await.map_err(write_error)?;
        fs::rename(&tmp, &path).await.map_err(write_error)?;

        tracing::debug!("Saved state for {} to {:?}", record.name(), path);
        Ok(())
    }
}

/// Loader dispatch for every record in a fleet.
#[derive(Debug, Clone)]
pub struct StateStore {
    json: JsonStore,
}

impl StateStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            json: JsonStore::new(state_dir),
        }
    }

    pub fn json(&self) -> &JsonStore {
        &self.json
    }

    pub async fn load(&self, record: &mut NodeRecord) -> Result<LoadOutcome, NodeError> {
        match &record.loader {
            LoaderKind::Json => Ok(self.json.load(record).await?),
            LoaderKind::Unsupported(tag) => Err(NodeError::UnsupportedLoader(tag.clone())),
        }
    }

    pub async fn save(&self, record: &NodeRecord) -> Result<(), NodeError> {
        match &record.loader {
            LoaderKind::Json => Ok(self.json.save(record).await?),
            LoaderKind::Unsupported(tag) => Err(NodeError::UnsupportedLoader(tag.clone())),
        }
    }
}

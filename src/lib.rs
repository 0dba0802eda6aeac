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

//! Declarative pipelines over fleets of SSH hosts.
//!
//! Nodes are registered by name in a [`NodeRegistry`], their records are
//! persisted through a [`StateStore`], and work is expressed as streams of
//! node names piped through stages built by a [`Fleet`]:
//!
//! - [`pipeline`]: `nodes(spec)`, simple stages and exec stages with
//!   per-node and batch completion events
//! - [`node`]: live node handles with connect, exec, load and save
//! - [`exec`]: the shell exec protocol and its noise filtering
//! - [`connection`]: session lifecycle and the transport seam
//! - [`ssh`]: the `russh` transport

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod exec;
pub mod fleet;
pub mod node;
pub mod pipeline;
pub mod registry;
pub mod ssh;
pub mod store;
pub mod tasks;
pub mod ui;
pub mod utils;

pub use config::{FleetConfig, Fleetfile};
pub use connection::{ConnectRequest, ConnectionState, Connector, ShellChannel, ShellEvent, Transport};
pub use error::{InputError, InvalidNodeName, NodeError};
pub use events::{NodeEvent, Observers};
pub use exec::{ExecOutput, PackageSpec, ShellCommand};
pub use fleet::Fleet;
pub use node::{Node, NodeEntry, NodeRecord, NodeSpec};
pub use pipeline::{BatchSummary, ExecStage, NodeStream, PipelineExt, SimpleStage, Stage, StageEvent};
pub use registry::NodeRegistry;
pub use store::{LoadOutcome, StateStore, StoreError};
pub use tasks::{TaskError, TaskRunner};

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

//! Subscription lists for node and stage notifications.

use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::exec::ExecOutput;

/// Notifications raised by a single node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Persisted state finished loading
    Loaded,
    /// State was written through the loader
    Saved,
    /// A new session was established
    Connected,
    /// The session was torn down
    Disconnected,
    /// Raw stdout bytes as received from the shell channel
    Data(Vec<u8>),
    /// One logical stdout line that survived noise filtering
    Line(String),
    /// Raw bytes received on the error channel
    Stderr(Vec<u8>),
    /// Terminal result of an exec
    ExecComplete(ExecOutput),
}

/// A list of subscribers receiving clones of every emitted event.
///
/// Subscribers whose receiver was dropped are pruned on the next emit.
#[derive(Debug)]
pub struct Observers<E> {
    senders: Mutex<Vec<mpsc::UnboundedSender<E>>>,
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<E: Clone> Observers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber.
    pub fn emit(&self, event: E) {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers.
    pub fn len(&self) -> usize {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

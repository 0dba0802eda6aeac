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

//! Fan-in of concurrent per-node operations.

use std::sync::{Arc, Mutex, PoisonError};

/// Totals of one finished batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    /// Stage that ran the batch
    pub label: String,
    pub nodes: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.nodes - self.failed
    }
}

type Completion = Box<dyn FnOnce(BatchSummary) + Send>;

#[derive(Default)]
struct CounterState {
    in_flight: usize,
    dispatched: usize,
    failed: usize,
    sealed: bool,
    on_complete: Option<Completion>,
}

/// Counts in-flight operations of one batch and fires a completion once.
///
/// The completion runs when the batch has been sealed (no further
/// dispatches) and nothing is in flight, whichever of the two happens
/// last. A batch sealed with nothing dispatched completes immediately.
pub struct DispatchCounter {
    label: String,
    state: Mutex<CounterState>,
}

impl DispatchCounter {
    pub fn new(label: impl Into<String>, on_complete: impl FnOnce(BatchSummary) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            label: label.into(),
            state: Mutex::new(CounterState {
                on_complete: Some(Box::new(on_complete)),
                ..CounterState::default()
            }),
        })
    }

    /// Register one operation. The returned guard must be completed (or
    /// dropped, which counts as a failure) when the operation ends.
    pub fn dispatch(self: &Arc<Self>) -> DispatchGuard {
        let mut state = self.lock();
        debug_assert!(!state.sealed, "dispatch after seal");
        state.in_flight += 1;
        state.dispatched += 1;
        DispatchGuard {
            counter: Some(Arc::clone(self)),
        }
    }

    /// No more operations will be dispatched.
    pub fn seal(&self) {
        let fire = {
            let mut state = self.lock();
            state.sealed = true;
            self.take_completion(&mut state)
        };
        self.fire(fire);
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    fn finish(&self, failed: bool) {
        let fire = {
            let mut state = self.lock();
            state.in_flight -= 1;
            if failed {
                state.failed += 1;
            }
            self.take_completion(&mut state)
        };
        self.fire(fire);
    }

    fn take_completion(&self, state: &mut CounterState) -> Option<(Completion, BatchSummary)> {
        if !state.sealed || state.in_flight > 0 {
            return None;
        }
        let callback = state.on_complete.take()?;
        Some((
            callback,
            BatchSummary {
                label: self.label.clone(),
                nodes: state.dispatched,
                failed: state.failed,
            },
        ))
    }

    // Runs outside the lock.
    fn fire(&self, fire: Option<(Completion, BatchSummary)>) {
        if let Some((callback, summary)) = fire {
            tracing::debug!(
                "{}: batch complete ({} nodes, {} failed)",
                summary.label,
                summary.nodes,
                summary.failed
            );
            callback(summary);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CounterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One in-flight operation of a [`DispatchCounter`] batch.
pub struct DispatchGuard {
    counter: Option<Arc<DispatchCounter>>,
}

impl DispatchGuard {
    pub fn complete(mut self, failed: bool) {
        if let Some(counter) = self.counter.take() {
            counter.finish(failed);
        }
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        if let Some(counter) = self.counter.take() {
            counter.finish(true);
        }
    }
}

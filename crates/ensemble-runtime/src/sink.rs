//! State fan-out - realtime mutation delivery to live observers.
//!
//! The executor owns its state for the duration of a run; sinks let
//! UIs and recorders mirror that state by replaying the same mutation
//! stream, in apply order.

use std::sync::Mutex;

use tokio::sync::broadcast;

use ensemble_core::executor::StateSink;
use ensemble_core::types::StateMutation;

/// In-process mutation fan-out based on tokio broadcast channels.
pub struct BroadcastStateSink {
    tx: broadcast::Sender<StateMutation>,
    capacity: usize,
}

impl BroadcastStateSink {
    /// Create a new broadcast sink with channel capacity.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Return the configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe to the live mutation stream.
    pub fn subscribe(&self) -> broadcast::Receiver<StateMutation> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastStateSink {
    fn default() -> Self {
        // Default capacity for local realtime consumers.
        Self::new(1024)
    }
}

impl StateSink for BroadcastStateSink {
    fn publish(&self, mutation: &StateMutation) {
        // No live subscriber is a non-error; the run's owned state
        // remains the source of truth.
        let _ = self.tx.send(mutation.clone());
    }
}

/// Sink that keeps every mutation in memory, for tests and replays.
#[derive(Default)]
pub struct CollectStateSink {
    mutations: Mutex<Vec<StateMutation>>,
}

impl CollectStateSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn mutations(&self) -> Vec<StateMutation> {
        match self.mutations.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl StateSink for CollectStateSink {
    fn publish(&self, mutation: &StateMutation) {
        if let Ok(mut guard) = self.mutations.lock() {
            guard.push(mutation.clone());
        }
    }
}

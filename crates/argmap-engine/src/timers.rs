//! Deferred steps (pair-height sync, closing-to-removal), cancellable by
//! the entity they belong to.
//!
//! Each timer is a tokio task racing a sleep against a
//! [`CancellationToken`]. Scheduling a key that already has a timer
//! replaces it; deleting the entity cancels every timer keyed on it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// What a timer is for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Measure a new pair and write back `pairHeight`.
    PairHeight,
    /// Finish removing a closing pair group.
    Closing,
}

impl TimerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerKind::PairHeight => "pair-height",
            TimerKind::Closing => "closing",
        }
    }
}

/// Timer identity: one timer per kind per entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub kind: TimerKind,
    pub entity: String,
}

impl TimerKey {
    pub fn new(kind: TimerKind, entity: impl Into<String>) -> Self {
        Self { kind, entity: entity.into() }
    }

    pub fn pair_height(group_id: &str) -> Self {
        Self::new(TimerKind::PairHeight, group_id)
    }

    pub fn closing(group_id: &str) -> Self {
        Self::new(TimerKind::Closing, group_id)
    }
}

impl std::fmt::Display for TimerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.entity)
    }
}

#[derive(Default)]
struct TimerTable {
    generation: u64,
    timers: HashMap<TimerKey, (u64, CancellationToken)>,
}

/// Registry of pending deferred steps. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct TimerRegistry {
    table: Arc<Mutex<TimerTable>>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless cancelled first.
    ///
    /// Returns false (and drops `task`) when called outside a tokio runtime.
    pub fn schedule<F>(&self, key: TimerKey, delay: Duration, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(timer = %key, "no runtime, deferred step dropped");
            return false;
        };

        let token = CancellationToken::new();
        let generation = {
            let mut table = self.table.lock();
            table.generation += 1;
            let generation = table.generation;
            if let Some((_, previous)) = table.timers.insert(key.clone(), (generation, token.clone())) {
                previous.cancel();
            }
            generation
        };

        let registry = self.clone();
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::trace!(timer = %key, "timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    if registry.take(&key, generation) {
                        tracing::trace!(timer = %key, "timer fired");
                        task();
                    }
                }
            }
        });
        true
    }

    /// Remove the entry if it is still the one this task was scheduled as.
    fn take(&self, key: &TimerKey, generation: u64) -> bool {
        let mut table = self.table.lock();
        match table.timers.get(key) {
            Some((current, _)) if *current == generation => {
                table.timers.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self, key: &TimerKey) -> bool {
        match self.table.lock().timers.remove(key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every timer keyed on `entity`. Returns how many were pending.
    pub fn cancel_entity(&self, entity: &str) -> usize {
        let mut table = self.table.lock();
        let keys: Vec<TimerKey> = table.timers.keys().filter(|k| k.entity == entity).cloned().collect();
        for key in &keys {
            if let Some((_, token)) = table.timers.remove(key) {
                token.cancel();
            }
        }
        keys.len()
    }

    pub fn cancel_all(&self) {
        let mut table = self.table.lock();
        for (_, (_, token)) in table.timers.drain() {
            token.cancel();
        }
    }

    pub fn is_pending(&self, key: &TimerKey) -> bool {
        self.table.lock().timers.contains_key(key)
    }

    pub fn pending(&self) -> usize {
        self.table.lock().timers.len()
    }
}

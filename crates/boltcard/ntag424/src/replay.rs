//! Replay protection for SUN taps
//!
//! A tap is accepted only when its read counter is strictly greater than the last
//! accepted counter for the same UID.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::ReplayError;
use crate::types::Uid;

/// Largest SDM read counter
pub const MAX_COUNTER: u32 = 0x00FF_FFFF;

/// Per-card record of the last accepted counter
///
/// `check_and_advance` must compare and update atomically for a given UID.
pub trait CounterStore {
    /// Last accepted counter for `uid`
    fn last_counter(&self, uid: &Uid) -> Option<u32>;

    /// Accept `counter` if it moves forward and record it
    fn check_and_advance(&self, uid: &Uid, counter: u32) -> Result<(), ReplayError>;
}

impl<S: CounterStore + ?Sized> CounterStore for &S {
    fn last_counter(&self, uid: &Uid) -> Option<u32> {
        (**self).last_counter(uid)
    }

    fn check_and_advance(&self, uid: &Uid, counter: u32) -> Result<(), ReplayError> {
        (**self).check_and_advance(uid, counter)
    }
}

/// In-memory [`CounterStore`]
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<Uid, u32>>,
}

impl MemoryCounterStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with known counters
    pub fn with_counters(counters: impl IntoIterator<Item = (Uid, u32)>) -> Self {
        Self {
            counters: Mutex::new(counters.into_iter().collect()),
        }
    }

    /// Overwrite the counter recorded for `uid`
    pub fn insert(&self, uid: Uid, counter: u32) {
        self.counters.lock().insert(uid, counter);
    }
}

impl CounterStore for MemoryCounterStore {
    fn last_counter(&self, uid: &Uid) -> Option<u32> {
        self.counters.lock().get(uid).copied()
    }

    fn check_and_advance(&self, uid: &Uid, counter: u32) -> Result<(), ReplayError> {
        if counter > MAX_COUNTER {
            return Err(ReplayError::CounterOutOfRange(counter));
        }

        let mut counters = self.counters.lock();
        if let Some(&last) = counters.get(uid) {
            if counter <= last {
                debug!(%uid, last, counter, "Rejected replayed tap");
                return Err(ReplayError::CounterNotIncreasing {
                    last,
                    received: counter,
                });
            }
        }
        counters.insert(*uid, counter);
        Ok(())
    }
}

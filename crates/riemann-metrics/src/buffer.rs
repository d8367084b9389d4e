// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::InsertError;
use crate::metric::MetricKind;
use hashbrown::hash_map::EntryRef;
use hashbrown::HashMap;
use std::mem;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Accumulated values for one metric key between two flushes.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Raw samples, kept in arrival order.
    Samples { kind: MetricKind, values: Vec<f64> },
    /// Number of observations.
    Counter { kind: MetricKind, count: u64 },
}

impl Entry {
    fn new(kind: MetricKind, value: f64) -> Self {
        if kind.is_counter() {
            Entry::Counter { kind, count: 1 }
        } else {
            Entry::Samples {
                kind,
                values: vec![value],
            }
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Entry::Samples { kind, .. } | Entry::Counter { kind, .. } => *kind,
        }
    }

    fn push(&mut self, key: &str, kind: MetricKind, value: f64) -> Result<(), InsertError> {
        let existing = self.kind();
        if existing != kind {
            return Err(InsertError::KindMismatch {
                key: key.to_string(),
                existing,
                attempted: kind,
            });
        }
        match self {
            Entry::Samples { values, .. } => values.push(value),
            Entry::Counter { count, .. } => *count = count.saturating_add(1),
        }
        Ok(())
    }
}

/// Buffer contents handed over by [`MetricBuffer::swap_and_clear`].
pub type Drained = HashMap<String, Entry>;

/// Registry of samples recorded since the last flush.
///
/// The buffer is shared between the writer (the aggregator) and the flusher.
/// Both sides go through the same lock, so a swap either sees a sample or
/// leaves it for the fresh buffer; it can never fall between the two.
#[derive(Debug, Default)]
pub struct MetricBuffer {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MetricBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `value` under `key`, or bumps the counter for counter kinds.
    /// The slot is created on first use and keeps that kind until drained.
    pub fn record(&self, kind: MetricKind, key: &str, value: f64) -> Result<(), InsertError> {
        let mut entries = self.lock();
        match entries.entry_ref(key) {
            EntryRef::Occupied(mut slot) => slot.get_mut().push(key, kind, value),
            EntryRef::Vacant(slot) => {
                slot.insert(Entry::new(kind, value));
                Ok(())
            }
        }
    }

    /// Takes everything recorded so far and leaves an empty buffer behind.
    pub fn swap_and_clear(&self) -> Drained {
        let mut entries = self.lock();
        mem::take(&mut *entries)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    #[cfg(test)]
    pub fn peek(&self, key: &str) -> Option<Entry> {
        self.lock().get(key).cloned()
    }

    // A writer that panicked mid-push leaves at worst one missing sample;
    // the map itself is still usable.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

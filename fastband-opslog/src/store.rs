//! Log storage abstraction

use crate::OpsLogEntry;
use fastband_core::{FastbandError, FastbandResult};
use std::sync::RwLock;

// ============================================================================
// LOG STORE TRAIT
// ============================================================================

/// Durable storage for ops-log entries.
///
/// `commit` returning `Ok` is the acknowledgement: a store must never ack an
/// entry it has not durably committed, and the log never acks an append its
/// store refused.
pub trait LogStore: Send + Sync {
    /// Durably commit one entry. Refusal surfaces `unavailable`.
    fn commit(&self, entry: OpsLogEntry) -> FastbandResult<()>;

    /// Entries with `sequence > since_sequence`, in sequence order, at most
    /// `limit` of them.
    fn read(&self, since_sequence: u64, limit: usize) -> FastbandResult<Vec<OpsLogEntry>>;

    /// The highest committed sequence, or zero for an empty log.
    fn last_sequence(&self) -> FastbandResult<u64>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

/// In-memory log store.
#[derive(Debug, Default)]
pub struct MemoryLogStore {
    entries: RwLock<Vec<OpsLogEntry>>,
}

impl MemoryLogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemoryLogStore {
    fn commit(&self, entry: OpsLogEntry) -> FastbandResult<()> {
        self.entries
            .write()
            .map_err(|_| FastbandError::unavailable("log store lock poisoned"))?
            .push(entry);
        Ok(())
    }

    fn read(&self, since_sequence: u64, limit: usize) -> FastbandResult<Vec<OpsLogEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| FastbandError::unavailable("log store lock poisoned"))?;
        Ok(entries
            .iter()
            .filter(|e| e.sequence > since_sequence)
            .take(limit)
            .cloned()
            .collect())
    }

    fn last_sequence(&self) -> FastbandResult<u64> {
        let entries = self
            .entries
            .read()
            .map_err(|_| FastbandError::unavailable("log store lock poisoned"))?;
        Ok(entries.last().map(|e| e.sequence).unwrap_or(0))
    }
}

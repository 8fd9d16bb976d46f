//! Memory entry types

use fastband_core::{
    compute_content_hash, ContentHash, EntryKey, EntryOrigin, MemoryTier, Payload, SessionId, Tick,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// MEMORY ENTRY
// ============================================================================

/// The atomic unit held in the tier store.
///
/// An entry exists in exactly one tier at any instant. `token_cost` is
/// assigned at insert and never mutated; moving tiers preserves `key`,
/// `payload`, and `token_cost`. Entries leave the store only by eviction or
/// explicit delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Stable identifier, unique across tiers.
    pub key: EntryKey,
    /// Opaque payload; the store never inspects it.
    pub payload: Payload,
    /// Token cost assigned at insert. Immutable.
    pub token_cost: u32,
    /// Current tier.
    pub tier: MemoryTier,
    /// Store-assigned logical tick at insert.
    pub created_at: Tick,
    /// Store-assigned logical tick of the most recent access.
    pub last_access_at: Tick,
    /// Number of accesses, counting the insert itself.
    pub access_count: u32,
    /// Where the entry came from.
    pub origin: EntryOrigin,
    /// Owning session, set for entries inserted through a session.
    /// WARM drains by owner on session close.
    pub owner: Option<SessionId>,
    /// SHA-256 over the payload's canonical bytes, for conservation checks.
    pub content_hash: ContentHash,
}

impl MemoryEntry {
    /// Build a fresh entry at the given tier and tick.
    pub fn new(
        key: EntryKey,
        payload: Payload,
        tier: MemoryTier,
        token_cost: u32,
        origin: EntryOrigin,
        owner: Option<SessionId>,
        tick: Tick,
    ) -> Self {
        let content_hash = compute_content_hash(&payload.canonical_bytes());
        Self {
            key,
            payload,
            token_cost,
            tier,
            created_at: tick,
            last_access_at: tick,
            access_count: 1,
            origin,
            owner,
            content_hash,
        }
    }

    /// Whether the payload still matches the hash taken at insert.
    pub fn verify_conservation(&self) -> bool {
        compute_content_hash(&self.payload.canonical_bytes()) == self.content_hash
    }
}

// ============================================================================
// EVICTION REPORTING
// ============================================================================

/// One entry displaced by an eviction or demotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evicted {
    pub key: EntryKey,
    pub from: MemoryTier,
    /// Where the entry landed, or `None` if it was discarded.
    pub to: Option<MemoryTier>,
    pub owner: Option<SessionId>,
    pub token_cost: u32,
}

/// Receipt for a `put`, reporting anything displaced to make room.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutReceipt {
    pub displaced: Vec<Evicted>,
}

// ============================================================================
// TESTS
// ============================================================================

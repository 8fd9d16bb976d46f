//! The tier store
//!
//! Workspace-owned, shared across sessions. Mutations take a single critical
//! section per call; readers of the snapshot APIs proceed concurrently.

use crate::{Evicted, MemoryEntry, PutReceipt};
use fastband_core::{
    EntryKey, EntryOrigin, FastbandConfig, FastbandError, FastbandResult, MemoryTier, Payload,
    SessionId, Tick,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use tracing::debug;

/// Accesses required for a WARM entry to survive into COOL, and for
/// WARM->HOT promotion on read.
pub const WARM_SURVIVAL_ACCESSES: u32 = 3;

// ============================================================================
// TIER BOUNDS
// ============================================================================

/// Per-tier size bounds, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBounds {
    /// HOT token cap at the store level (the MAXIMUM working-memory cap;
    /// per-session caps are the budget manager's job).
    pub hot_max_tokens: u32,
    pub cool_max_items: usize,
    pub cool_max_tokens: u32,
    pub cold_max_items: usize,
    pub cold_max_tokens: u32,
}

impl TierBounds {
    /// Derive bounds from the workspace configuration.
    pub fn from_config(config: &FastbandConfig) -> Self {
        Self {
            hot_max_tokens: config.working_memory_max,
            cool_max_items: config.cool_max_items,
            cool_max_tokens: config.cool_max_tokens,
            cold_max_items: config.cold_max_items,
            cold_max_tokens: config.cold_max_tokens,
        }
    }

    /// Token cap for a tier, if it has one.
    fn token_cap(&self, tier: MemoryTier) -> Option<u64> {
        match tier {
            MemoryTier::Hot => Some(self.hot_max_tokens as u64),
            MemoryTier::Warm => None,
            MemoryTier::Cool => Some(self.cool_max_tokens as u64),
            MemoryTier::Cold => Some(self.cold_max_tokens as u64),
            MemoryTier::Frozen => None,
        }
    }

    /// Item cap for a tier, if it has one.
    fn item_cap(&self, tier: MemoryTier) -> Option<usize> {
        match tier {
            MemoryTier::Cool => Some(self.cool_max_items),
            MemoryTier::Cold => Some(self.cold_max_items),
            _ => None,
        }
    }
}

// ============================================================================
// USAGE AND STATS
// ============================================================================

/// Count and token totals for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierUsage {
    pub count: usize,
    pub tokens: u64,
}

/// Per-tier usage snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub hot: TierUsage,
    pub warm: TierUsage,
    pub cool: TierUsage,
    pub cold: TierUsage,
    pub frozen: TierUsage,
}

impl TierStats {
    /// Usage for one tier.
    pub fn usage(&self, tier: MemoryTier) -> TierUsage {
        match tier {
            MemoryTier::Hot => self.hot,
            MemoryTier::Warm => self.warm,
            MemoryTier::Cool => self.cool,
            MemoryTier::Cold => self.cold,
            MemoryTier::Frozen => self.frozen,
        }
    }
}

fn tier_idx(tier: MemoryTier) -> usize {
    match tier {
        MemoryTier::Hot => 0,
        MemoryTier::Warm => 1,
        MemoryTier::Cool => 2,
        MemoryTier::Cold => 3,
        MemoryTier::Frozen => 4,
    }
}

// ============================================================================
// STORE INTERNALS
// ============================================================================

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<EntryKey, MemoryEntry>,
    usage: [TierUsage; 5],
}

impl StoreInner {
    fn credit(&mut self, tier: MemoryTier, cost: u32) {
        let usage = &mut self.usage[tier_idx(tier)];
        usage.count += 1;
        usage.tokens += cost as u64;
    }

    fn debit(&mut self, tier: MemoryTier, cost: u32) {
        let usage = &mut self.usage[tier_idx(tier)];
        usage.count = usage.count.saturating_sub(1);
        usage.tokens = usage.tokens.saturating_sub(cost as u64);
    }

    /// The LRU victim in a tier: least recent access, ties by older
    /// creation, final tie by lexicographic key.
    fn lru_victim(&self, tier: MemoryTier) -> Option<EntryKey> {
        self.entries
            .values()
            .filter(|e| e.tier == tier)
            .min_by(|a, b| {
                a.last_access_at
                    .cmp(&b.last_access_at)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.key.cmp(&b.key))
            })
            .map(|e| e.key.clone())
    }

    fn over_bounds(&self, tier: MemoryTier, bounds: &TierBounds, incoming: u32) -> bool {
        let usage = self.usage[tier_idx(tier)];
        if let Some(cap) = bounds.token_cap(tier) {
            if usage.tokens + incoming as u64 > cap {
                return true;
            }
        }
        if let Some(cap) = bounds.item_cap(tier) {
            if usage.count + 1 > cap {
                return true;
            }
        }
        false
    }
}

// ============================================================================
// TIER STORE
// ============================================================================

/// Five-tier memory store with token-cost accounting.
///
/// One store per workspace. All mutating calls serialize on the inner lock;
/// the logical clock assigns strictly monotonic ticks so eviction order is
/// deterministic.
pub struct TierStore {
    inner: RwLock<StoreInner>,
    clock: AtomicU64,
    bounds: TierBounds,
}

impl TierStore {
    /// Create a store with the given bounds.
    pub fn new(bounds: TierBounds) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            clock: AtomicU64::new(0),
            bounds,
        }
    }

    /// Create a store from the workspace configuration.
    pub fn from_config(config: &FastbandConfig) -> Self {
        Self::new(TierBounds::from_config(config))
    }

    /// The configured bounds.
    pub fn bounds(&self) -> &TierBounds {
        &self.bounds
    }

    fn tick(&self) -> Tick {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Insert a payload at a tier.
    ///
    /// If the key already exists in any tier the entry is replaced in place
    /// at the new tier. Bounds are enforced by evicting before insert; the
    /// receipt reports everything displaced. A payload whose cost exceeds
    /// the tier cap outright fails with `too_large`.
    pub fn put(
        &self,
        key: EntryKey,
        payload: Payload,
        tier: MemoryTier,
        token_cost: u32,
        origin: EntryOrigin,
        owner: Option<SessionId>,
    ) -> FastbandResult<PutReceipt> {
        if let Some(cap) = self.bounds.token_cap(tier) {
            if token_cost as u64 > cap {
                return Err(FastbandError::TooLarge {
                    tokens: token_cost,
                    cap: cap as u32,
                });
            }
        }

        let tick = self.tick();
        let mut inner = self.write_inner()?;
        let mut displaced = Vec::new();

        if let Some(old) = inner.entries.remove(&key) {
            inner.debit(old.tier, old.token_cost);
        }

        self.make_room(&mut inner, tier, token_cost, &mut displaced);

        let entry = MemoryEntry::new(key.clone(), payload, tier, token_cost, origin, owner, tick);
        inner.credit(tier, token_cost);
        inner.entries.insert(key, entry);

        Ok(PutReceipt { displaced })
    }

    /// Fetch an entry by key, bumping its access metadata.
    ///
    /// A WARM entry reaching its third access is promoted to HOT if room can
    /// be made; otherwise it stays in WARM. A missing key is `Ok(None)`,
    /// not an error.
    pub fn get(&self, key: &EntryKey) -> FastbandResult<Option<MemoryEntry>> {
        let tick = self.tick();
        let mut inner = self.write_inner()?;

        let Some(entry) = inner.entries.get_mut(key) else {
            return Ok(None);
        };
        entry.last_access_at = tick;
        entry.access_count += 1;

        let promote = entry.tier == MemoryTier::Warm
            && entry.access_count >= WARM_SURVIVAL_ACCESSES
            && entry.token_cost as u64 <= self.bounds.hot_max_tokens as u64;

        if promote {
            let mut entry = inner
                .entries
                .remove(key)
                .expect("entry present under write lock");
            inner.debit(MemoryTier::Warm, entry.token_cost);

            let mut displaced = Vec::new();
            self.make_room(&mut inner, MemoryTier::Hot, entry.token_cost, &mut displaced);
            if !displaced.is_empty() {
                debug!(key = %entry.key, displaced = displaced.len(), "promotion displaced hot entries");
            }

            entry.tier = MemoryTier::Hot;
            inner.credit(MemoryTier::Hot, entry.token_cost);
            let snapshot = entry.clone();
            inner.entries.insert(snapshot.key.clone(), entry);
            return Ok(Some(snapshot));
        }

        Ok(inner.entries.get(key).cloned())
    }

    /// Read an entry without bumping access metadata or promoting.
    pub fn peek(&self, key: &EntryKey) -> FastbandResult<Option<MemoryEntry>> {
        Ok(self.read_inner()?.entries.get(key).cloned())
    }

    /// Remove LRU entries from a tier until at least `n_tokens` are freed or
    /// the tier is empty. Demoted entries re-insert into their demotion
    /// target, which may cascade. FROZEN never evicts.
    pub fn evict(&self, tier: MemoryTier, n_tokens: u64) -> FastbandResult<Vec<Evicted>> {
        if !tier.is_evictable() {
            return Ok(Vec::new());
        }

        let mut inner = self.write_inner()?;
        let mut displaced = Vec::new();
        let mut freed: u64 = 0;
        while freed < n_tokens {
            match self.evict_one(&mut inner, tier, &mut displaced) {
                Some(cost) => freed += cost as u64,
                None => break,
            }
        }
        Ok(displaced)
    }

    /// Drain a session's working memory on close.
    ///
    /// The session's HOT entries demote to WARM, then every WARM entry it
    /// owns either survives into COOL (third access or later) or is
    /// discarded.
    pub fn close_session(&self, session: SessionId) -> FastbandResult<Vec<Evicted>> {
        let mut inner = self.write_inner()?;
        let mut displaced = Vec::new();

        let hot_keys: Vec<EntryKey> = inner
            .entries
            .values()
            .filter(|e| e.tier == MemoryTier::Hot && e.owner == Some(session))
            .map(|e| e.key.clone())
            .collect();
        for key in hot_keys {
            let mut entry = inner
                .entries
                .remove(&key)
                .expect("entry present under write lock");
            inner.debit(MemoryTier::Hot, entry.token_cost);
            entry.tier = MemoryTier::Warm;
            inner.credit(MemoryTier::Warm, entry.token_cost);
            displaced.push(Evicted {
                key: entry.key.clone(),
                from: MemoryTier::Hot,
                to: Some(MemoryTier::Warm),
                owner: entry.owner,
                token_cost: entry.token_cost,
            });
            inner.entries.insert(key, entry);
        }

        let warm_keys: Vec<EntryKey> = inner
            .entries
            .values()
            .filter(|e| e.tier == MemoryTier::Warm && e.owner == Some(session))
            .map(|e| e.key.clone())
            .collect();
        for key in warm_keys {
            let entry = inner
                .entries
                .remove(&key)
                .expect("entry present under write lock");
            inner.debit(MemoryTier::Warm, entry.token_cost);
            if entry.access_count >= WARM_SURVIVAL_ACCESSES {
                self.demote_into(&mut inner, entry, MemoryTier::Cool, &mut displaced);
            } else {
                displaced.push(Evicted {
                    key: entry.key,
                    from: MemoryTier::Warm,
                    to: None,
                    owner: entry.owner,
                    token_cost: entry.token_cost,
                });
            }
        }

        debug!(session = %session, moved = displaced.len(), "session memory drained");
        Ok(displaced)
    }

    /// Explicitly remove an entry. Returns whether it existed.
    pub fn delete(&self, key: &EntryKey) -> FastbandResult<bool> {
        let mut inner = self.write_inner()?;
        match inner.entries.remove(key) {
            Some(entry) => {
                inner.debit(entry.tier, entry.token_cost);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Per-tier usage snapshot.
    pub fn stats(&self) -> FastbandResult<TierStats> {
        let inner = self.read_inner()?;
        Ok(TierStats {
            hot: inner.usage[tier_idx(MemoryTier::Hot)],
            warm: inner.usage[tier_idx(MemoryTier::Warm)],
            cool: inner.usage[tier_idx(MemoryTier::Cool)],
            cold: inner.usage[tier_idx(MemoryTier::Cold)],
            frozen: inner.usage[tier_idx(MemoryTier::Frozen)],
        })
    }

    /// Whether a key exists in any tier.
    pub fn contains(&self, key: &EntryKey) -> FastbandResult<bool> {
        Ok(self.read_inner()?.entries.contains_key(key))
    }

    // ------------------------------------------------------------------
    // internals (caller holds the write lock)
    // ------------------------------------------------------------------

    fn write_inner(&self) -> FastbandResult<std::sync::RwLockWriteGuard<'_, StoreInner>> {
        self.inner
            .write()
            .map_err(|_| FastbandError::unavailable("tier store lock poisoned"))
    }

    fn read_inner(&self) -> FastbandResult<std::sync::RwLockReadGuard<'_, StoreInner>> {
        self.inner
            .read()
            .map_err(|_| FastbandError::unavailable("tier store lock poisoned"))
    }

    /// Evict until `incoming` more tokens fit in `tier`.
    fn make_room(
        &self,
        inner: &mut StoreInner,
        tier: MemoryTier,
        incoming: u32,
        displaced: &mut Vec<Evicted>,
    ) {
        while inner.over_bounds(tier, &self.bounds, incoming) {
            if self.evict_one(inner, tier, displaced).is_none() {
                break;
            }
        }
    }

    /// Evict the LRU entry of a tier, demoting per policy.
    /// Returns the freed token cost, or `None` if the tier was empty.
    fn evict_one(
        &self,
        inner: &mut StoreInner,
        tier: MemoryTier,
        displaced: &mut Vec<Evicted>,
    ) -> Option<u32> {
        let key = inner.lru_victim(tier)?;
        let entry = inner
            .entries
            .remove(&key)
            .expect("victim present under write lock");
        inner.debit(tier, entry.token_cost);
        let cost = entry.token_cost;

        match tier {
            MemoryTier::Hot => {
                // WARM is unbounded until session close; no cascade here.
                let mut entry = entry;
                entry.tier = MemoryTier::Warm;
                inner.credit(MemoryTier::Warm, cost);
                displaced.push(Evicted {
                    key: entry.key.clone(),
                    from: MemoryTier::Hot,
                    to: Some(MemoryTier::Warm),
                    owner: entry.owner,
                    token_cost: cost,
                });
                inner.entries.insert(entry.key.clone(), entry);
            }
            MemoryTier::Warm => {
                if entry.access_count >= WARM_SURVIVAL_ACCESSES {
                    self.demote_into(inner, entry, MemoryTier::Cool, displaced);
                } else {
                    displaced.push(Evicted {
                        key: entry.key,
                        from: MemoryTier::Warm,
                        to: None,
                        owner: entry.owner,
                        token_cost: cost,
                    });
                }
            }
            MemoryTier::Cool => {
                self.demote_into(inner, entry, MemoryTier::Cold, displaced);
            }
            MemoryTier::Cold => {
                displaced.push(Evicted {
                    key: entry.key,
                    from: MemoryTier::Cold,
                    to: None,
                    owner: entry.owner,
                    token_cost: cost,
                });
            }
            MemoryTier::Frozen => unreachable!("frozen tier never evicts"),
        }

        Some(cost)
    }

    /// Re-insert a demoted entry into `target`, evicting there as needed.
    /// An entry too large for the target outright is discarded, which bounds
    /// every cascade at four hops.
    fn demote_into(
        &self,
        inner: &mut StoreInner,
        mut entry: MemoryEntry,
        target: MemoryTier,
        displaced: &mut Vec<Evicted>,
    ) {
        let from = entry.tier;
        let cost = entry.token_cost;

        let fits = self
            .bounds
            .token_cap(target)
            .is_none_or(|cap| cost as u64 <= cap);
        if !fits {
            displaced.push(Evicted {
                key: entry.key,
                from,
                to: None,
                owner: entry.owner,
                token_cost: cost,
            });
            return;
        }

        self.make_room(inner, target, cost, displaced);
        entry.tier = target;
        inner.credit(target, cost);
        displaced.push(Evicted {
            key: entry.key.clone(),
            from,
            to: Some(target),
            owner: entry.owner,
            token_cost: cost,
        });
        inner.entries.insert(entry.key.clone(), entry);
    }
}

// ============================================================================
// TESTS
// ============================================================================

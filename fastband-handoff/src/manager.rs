//! The handoff manager
//!
//! Orchestrates the packet lifecycle: prepare, sanitize, sign, store, list,
//! accept, sweep. All authorization failures on accept surface the same
//! `unauthorized` code so attackers gain no oracle; the audit record keeps
//! the precise reason.

use crate::{
    derive_mac_key, sanitize, sign_packet, verify_packet, HandoffPacket, PacketDraft, PacketMeta,
    PacketReceipt, PacketStore, SessionSnapshot,
};
use chrono::Utc;
use fastband_core::{
    AgentName, AuditKind, AuditRecord, AuditSink, EntityIdType, FastbandError, FastbandResult,
    OpContext, PacketId, TicketId, Timestamp,
};
use rand::rngs::OsRng;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

// ============================================================================
// HANDOFF MANAGER
// ============================================================================

/// Builds, stores, and hands out signed context-transfer packets.
pub struct HandoffManager {
    /// Derived MAC key. Rotation swaps it and strands outstanding packets.
    mac_key: RwLock<[u8; 32]>,
    retention: Duration,
    store: Box<dyn PacketStore>,
    /// Accepted-id tombstones, kept until sweep so a double accept can be
    /// audited as `conflict` while surfacing `not_found` externally.
    accepted: Mutex<HashMap<PacketId, Timestamp>>,
    audit: std::sync::Arc<dyn AuditSink>,
}

impl HandoffManager {
    /// Create a manager over a packet store.
    pub fn new(
        signing_key: &[u8],
        retention: Duration,
        store: Box<dyn PacketStore>,
        audit: std::sync::Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            mac_key: RwLock::new(derive_mac_key(signing_key)),
            retention,
            store,
            accepted: Mutex::new(HashMap::new()),
            audit,
        }
    }

    /// Collect current session context into a draft. Stores nothing.
    pub fn prepare(&self, snapshot: SessionSnapshot) -> PacketDraft {
        PacketDraft::from(snapshot)
    }

    /// Sanitize a draft. See [`sanitize`].
    pub fn sanitize(&self, draft: PacketDraft) -> FastbandResult<PacketDraft> {
        sanitize(draft)
    }

    /// Sign and persist a sanitized draft.
    ///
    /// Assigns an unguessable packet id, generates the 256-bit access token,
    /// computes the signature over the canonical serialization, and stores
    /// atomically. The receipt carries the token exactly once.
    pub fn store(&self, draft: PacketDraft, ctx: &OpContext) -> FastbandResult<PacketReceipt> {
        ctx.check()?;

        let mut access_token = [0u8; 32];
        OsRng.fill_bytes(&mut access_token);

        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(self.retention)
                .unwrap_or_else(|_| chrono::Duration::hours(48));

        let mut packet = HandoffPacket {
            packet_id: PacketId::new_v4(),
            source_agent: draft.source_agent.clone(),
            source_session: draft.source_session,
            target_agent: draft.target_agent.clone(),
            access_token,
            ticket_id: draft.ticket_id.clone(),
            ticket_summary: draft.ticket_summary,
            completed_tasks: draft.completed_tasks,
            pending_tasks: draft.pending_tasks,
            current_task: draft.current_task,
            files_modified: draft.files_modified,
            key_decisions: draft.key_decisions,
            hot_context: draft.hot_context,
            warm_references: draft.warm_references,
            budget_used: draft.budget_used,
            budget_peak: draft.budget_peak,
            expansion_count: draft.expansion_count,
            created_at: now,
            expires_at,
            signature: [0u8; 32],
        };
        packet.signature = sign_packet(&self.read_key()?, &packet);

        let packet_id = packet.packet_id;
        let source = packet.source_agent.clone();
        self.store.insert(packet)?;

        // The sink must ack before we report success.
        self.audit.record(AuditRecord::success(
            source.as_str(),
            AuditKind::PacketStore,
            packet_id.to_string(),
            format!("expires {expires_at}"),
        ))?;

        info!(packet = %packet_id, "handoff packet stored");
        Ok(PacketReceipt {
            packet_id,
            access_token: hex::encode(access_token),
        })
    }

    /// Listing metadata, optionally filtered by ticket. Never discloses
    /// access tokens.
    pub fn list(&self, ticket: Option<&TicketId>) -> FastbandResult<Vec<PacketMeta>> {
        self.store.list(ticket)
    }

    /// Accept a packet: verify, authorize, and atomically take ownership.
    ///
    /// Exactly one accept of a given id can ever succeed. Signature, token,
    /// and target failures all surface `unauthorized`; an already-accepted
    /// id surfaces `not_found`, indistinguishable from never-existed.
    pub fn accept(
        &self,
        packet_id: PacketId,
        target_agent: &AgentName,
        presented_token: &str,
        ctx: &OpContext,
    ) -> FastbandResult<HandoffPacket> {
        ctx.check()?;
        let result = self.try_accept(packet_id, target_agent, presented_token);

        match &result {
            Ok(_) => {
                self.audit.record(AuditRecord::success(
                    target_agent.as_str(),
                    AuditKind::PacketAccept,
                    packet_id.to_string(),
                    "ownership transferred",
                ))?;
            }
            Err(err) => {
                // Audit keeps the precise kind even where the public code
                // is coalesced.
                self.audit.record(AuditRecord::failure(
                    target_agent.as_str(),
                    AuditKind::PacketAccept,
                    packet_id.to_string(),
                    err,
                ))?;
            }
        }

        result.map_err(Self::coalesce_accept_error)
    }

    /// Remove expired packets and stale tombstones. Idempotent.
    pub fn sweep(&self) -> FastbandResult<usize> {
        let now = Utc::now();
        let mut removed = 0;

        for id in self.store.ids()? {
            let expired = match self.store.load(id)? {
                Some(packet) => packet.is_expired(now),
                None => false,
            };
            if expired && self.store.remove(id)?.is_some() {
                removed += 1;
                debug!(packet = %id, "expired packet swept");
            }
        }

        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::hours(48));
        self.lock_accepted()?
            .retain(|_, accepted_at| now - *accepted_at < retention);

        if removed > 0 {
            self.audit.record(AuditRecord::success(
                "handoff-manager",
                AuditKind::PacketSweep,
                "workspace",
                format!("{removed} packets removed"),
            ))?;
        }
        Ok(removed)
    }

    /// Tenant-wide purge: remove every stored packet.
    pub fn purge_all(&self) -> FastbandResult<usize> {
        let mut removed = 0;
        for id in self.store.ids()? {
            if self.store.remove(id)?.is_some() {
                removed += 1;
            }
        }
        self.lock_accepted()?.clear();
        Ok(removed)
    }

    /// Rotate the workspace signing key.
    ///
    /// Outstanding packets fail verification from now on and leave the
    /// store through the sweep.
    pub fn rotate_key(&self, signing_key: &[u8]) -> FastbandResult<()> {
        *self
            .mac_key
            .write()
            .map_err(|_| FastbandError::unavailable("mac key lock poisoned"))? =
            derive_mac_key(signing_key);
        warn!("workspace signing key rotated; outstanding packets invalidated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn read_key(&self) -> FastbandResult<[u8; 32]> {
        Ok(*self
            .mac_key
            .read()
            .map_err(|_| FastbandError::unavailable("mac key lock poisoned"))?)
    }

    fn lock_accepted(
        &self,
    ) -> FastbandResult<std::sync::MutexGuard<'_, HashMap<PacketId, Timestamp>>> {
        self.accepted
            .lock()
            .map_err(|_| FastbandError::unavailable("tombstone lock poisoned"))
    }

    fn try_accept(
        &self,
        packet_id: PacketId,
        target_agent: &AgentName,
        presented_token: &str,
    ) -> FastbandResult<HandoffPacket> {
        let Some(packet) = self.store.load(packet_id)? else {
            if self.lock_accepted()?.contains_key(&packet_id) {
                return Err(FastbandError::Conflict {
                    resource: format!("packet {packet_id}"),
                });
            }
            return Err(FastbandError::NotFound {
                resource: format!("packet {packet_id}"),
            });
        };

        if !verify_packet(&self.read_key()?, &packet) {
            return Err(FastbandError::Unauthorized);
        }

        if let Some(expected) = &packet.target_agent {
            if expected != target_agent {
                return Err(FastbandError::Unauthorized);
            }
        }

        if !token_matches(&packet.access_token, presented_token) {
            return Err(FastbandError::Unauthorized);
        }

        let now = Utc::now();
        if packet.is_expired(now) {
            // Expired packets leave the store on touch as well as on sweep.
            self.store.remove(packet_id)?;
            return Err(FastbandError::Expired {
                expired_at: packet.expires_at,
            });
        }

        // The atomic remove is the single ownership transfer: under a race,
        // exactly one caller gets the packet.
        let Some(packet) = self.store.remove(packet_id)? else {
            return Err(FastbandError::Conflict {
                resource: format!("packet {packet_id}"),
            });
        };
        self.lock_accepted()?.insert(packet_id, now);
        Ok(packet)
    }

    /// Public coalescing: an already-accepted packet is indistinguishable
    /// from one that never existed.
    fn coalesce_accept_error(err: FastbandError) -> FastbandError {
        match err {
            FastbandError::Conflict { resource } => FastbandError::NotFound { resource },
            other => other,
        }
    }
}

/// Constant-time comparison of a presented hex token against the stored
/// secret. Length mismatches fail without timing leakage on the content.
fn token_matches(stored: &[u8; 32], presented: &str) -> bool {
    let Ok(decoded) = hex::decode(presented) else {
        return false;
    };
    if decoded.len() != stored.len() {
        return false;
    }
    stored[..].ct_eq(&decoded[..]).into()
}

// ============================================================================
// TESTS
// ============================================================================

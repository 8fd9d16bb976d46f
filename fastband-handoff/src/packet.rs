//! Handoff packet types

use fastband_core::{AgentName, EntryKey, PacketId, SessionId, TicketId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// KEY DECISION
// ============================================================================

/// One recorded decision carried across the handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDecision {
    pub when: Timestamp,
    pub what: String,
    pub why: String,
}

// ============================================================================
// SESSION SNAPSHOT
// ============================================================================

/// Everything the coordinator knows about a session at prepare time.
///
/// `prepare` maps this into a draft without storing anything.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub source_agent: AgentName,
    pub source_session: SessionId,
    pub target_agent: Option<AgentName>,
    pub ticket_id: TicketId,
    pub ticket_summary: String,
    pub completed_tasks: Vec<String>,
    pub pending_tasks: Vec<String>,
    pub current_task: Option<String>,
    pub files_modified: BTreeSet<String>,
    pub key_decisions: Vec<KeyDecision>,
    pub hot_context: String,
    pub warm_references: Vec<EntryKey>,
    pub budget_used: u32,
    pub budget_peak: u32,
    pub expansion_count: u32,
}

// ============================================================================
// PACKET DRAFT
// ============================================================================

/// A packet before it is stored: collected context, not yet signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketDraft {
    pub source_agent: AgentName,
    pub source_session: SessionId,
    pub target_agent: Option<AgentName>,
    pub ticket_id: TicketId,
    pub ticket_summary: String,
    /// Ordered: the recipient replays these in sequence.
    pub completed_tasks: Vec<String>,
    pub pending_tasks: Vec<String>,
    pub current_task: Option<String>,
    /// Relative paths only; the sanitizer rejects anything else.
    pub files_modified: BTreeSet<String>,
    pub key_decisions: Vec<KeyDecision>,
    /// Condensed working context, bounded by the sanitizer.
    pub hot_context: String,
    /// Keys the recipient may fetch lazily after resume.
    pub warm_references: Vec<EntryKey>,
    pub budget_used: u32,
    pub budget_peak: u32,
    pub expansion_count: u32,
}

impl From<SessionSnapshot> for PacketDraft {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            source_agent: snapshot.source_agent,
            source_session: snapshot.source_session,
            target_agent: snapshot.target_agent,
            ticket_id: snapshot.ticket_id,
            ticket_summary: snapshot.ticket_summary,
            completed_tasks: snapshot.completed_tasks,
            pending_tasks: snapshot.pending_tasks,
            current_task: snapshot.current_task,
            files_modified: snapshot.files_modified,
            key_decisions: snapshot.key_decisions,
            hot_context: snapshot.hot_context,
            warm_references: snapshot.warm_references,
            budget_used: snapshot.budget_used,
            budget_peak: snapshot.budget_peak,
            expansion_count: snapshot.expansion_count,
        }
    }
}

// ============================================================================
// HANDOFF PACKET
// ============================================================================

/// A stored handoff packet. Immutable once stored; the signature is
/// re-verified on every retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffPacket {
    /// Cryptographically random, unguessable.
    pub packet_id: PacketId,
    pub source_agent: AgentName,
    pub source_session: SessionId,
    pub target_agent: Option<AgentName>,
    /// 256-bit secret, compared in constant time. Never listed.
    pub access_token: [u8; 32],
    pub ticket_id: TicketId,
    pub ticket_summary: String,
    pub completed_tasks: Vec<String>,
    pub pending_tasks: Vec<String>,
    pub current_task: Option<String>,
    pub files_modified: BTreeSet<String>,
    pub key_decisions: Vec<KeyDecision>,
    pub hot_context: String,
    pub warm_references: Vec<EntryKey>,
    pub budget_used: u32,
    pub budget_peak: u32,
    pub expansion_count: u32,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    /// Keyed MAC over the canonical serialization of every field above.
    pub signature: [u8; 32],
}

impl HandoffPacket {
    /// The draft portion of this packet, for round-trip comparison.
    pub fn to_draft(&self) -> PacketDraft {
        PacketDraft {
            source_agent: self.source_agent.clone(),
            source_session: self.source_session,
            target_agent: self.target_agent.clone(),
            ticket_id: self.ticket_id.clone(),
            ticket_summary: self.ticket_summary.clone(),
            completed_tasks: self.completed_tasks.clone(),
            pending_tasks: self.pending_tasks.clone(),
            current_task: self.current_task.clone(),
            files_modified: self.files_modified.clone(),
            key_decisions: self.key_decisions.clone(),
            hot_context: self.hot_context.clone(),
            warm_references: self.warm_references.clone(),
            budget_used: self.budget_used,
            budget_peak: self.budget_peak,
            expansion_count: self.expansion_count,
        }
    }

    /// Whether the packet is past its expiry at `now`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}

// ============================================================================
// PACKET METADATA
// ============================================================================

/// Listing metadata. Never carries the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketMeta {
    pub packet_id: PacketId,
    pub source_agent: AgentName,
    pub target_agent: Option<AgentName>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
}

impl From<&HandoffPacket> for PacketMeta {
    fn from(packet: &HandoffPacket) -> Self {
        Self {
            packet_id: packet.packet_id,
            source_agent: packet.source_agent.clone(),
            target_agent: packet.target_agent.clone(),
            created_at: packet.created_at,
            expires_at: packet.expires_at,
        }
    }
}

/// Receipt handed to the packet creator at store time.
///
/// The access token appears here exactly once so the creator can pass it to
/// the recipient out of band; no listing ever discloses it again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketReceipt {
    pub packet_id: PacketId,
    /// Hex-encoded 256-bit access token.
    pub access_token: String,
}

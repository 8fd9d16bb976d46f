//! Canonical serialization and packet signing
//!
//! Fields in a fixed total order; strings and sequences length-prefixed
//! (u32 little-endian); timestamps as i64 unix milliseconds; no floats.
//! The signature is `blake3::keyed_hash` over exactly these bytes — a keyed
//! MAC, never an unkeyed digest.

use crate::{HandoffPacket, KeyDecision, PacketDraft};
use fastband_core::{EntityIdType, Timestamp};

/// Key-derivation context for the packet MAC key.
const MAC_KEY_CONTEXT: &str = "fastband 2026-07-01 handoff-packet-mac";

// ============================================================================
// CANONICAL WRITER
// ============================================================================

/// Minimal length-prefixed canonical encoder.
#[derive(Debug, Default)]
pub struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }

    pub fn put_opt_str(&mut self, value: Option<&str>) {
        match value {
            Some(s) => {
                self.buf.push(1);
                self.put_str(s);
            }
            None => self.buf.push(0),
        }
    }

    pub fn put_timestamp(&mut self, ts: Timestamp) {
        self.put_i64(ts.timestamp_millis());
    }

    pub fn put_str_seq<'a, I>(&mut self, items: I)
    where
        I: ExactSizeIterator<Item = &'a str>,
    {
        self.put_u32(items.len() as u32);
        for item in items {
            self.put_str(item);
        }
    }
}

fn put_decisions(writer: &mut CanonicalWriter, decisions: &[KeyDecision]) {
    writer.put_u32(decisions.len() as u32);
    for decision in decisions {
        writer.put_timestamp(decision.when);
        writer.put_str(&decision.what);
        writer.put_str(&decision.why);
    }
}

fn put_draft_fields(writer: &mut CanonicalWriter, draft: &PacketDraft) {
    writer.put_str(draft.source_agent.as_str());
    writer.put_bytes(draft.source_session.as_uuid().as_bytes());
    writer.put_opt_str(draft.target_agent.as_ref().map(|a| a.as_str()));
    writer.put_str(draft.ticket_id.as_str());
    writer.put_str(&draft.ticket_summary);
    writer.put_str_seq(draft.completed_tasks.iter().map(String::as_str));
    writer.put_str_seq(draft.pending_tasks.iter().map(String::as_str));
    writer.put_opt_str(draft.current_task.as_deref());
    writer.put_str_seq(draft.files_modified.iter().map(String::as_str));
    put_decisions(writer, &draft.key_decisions);
    writer.put_str(&draft.hot_context);
    writer.put_str_seq(draft.warm_references.iter().map(|k| k.as_str()));
    writer.put_u32(draft.budget_used);
    writer.put_u32(draft.budget_peak);
    writer.put_u32(draft.expansion_count);
}

// ============================================================================
// CANONICAL FORMS
// ============================================================================

/// Canonical bytes of a draft (used for the sanitizer's size cap and the
/// round-trip property).
pub fn canonical_draft_bytes(draft: &PacketDraft) -> Vec<u8> {
    let mut writer = CanonicalWriter::new();
    put_draft_fields(&mut writer, draft);
    writer.into_bytes()
}

/// The byte sequence the packet signature covers: every field of the stored
/// packet except the signature itself, in declaration order.
pub fn signable_bytes(packet: &HandoffPacket) -> Vec<u8> {
    let mut writer = CanonicalWriter::new();
    writer.put_bytes(packet.packet_id.as_uuid().as_bytes());
    writer.put_bytes(&packet.access_token);
    put_draft_fields(&mut writer, &packet.to_draft());
    writer.put_timestamp(packet.created_at);
    writer.put_timestamp(packet.expires_at);
    writer.into_bytes()
}

// ============================================================================
// SIGNING
// ============================================================================

/// Derive the 256-bit MAC key from the workspace signing key material.
pub fn derive_mac_key(signing_key: &[u8]) -> [u8; 32] {
    blake3::derive_key(MAC_KEY_CONTEXT, signing_key)
}

/// Compute the keyed MAC for a packet.
pub fn sign_packet(key: &[u8; 32], packet: &HandoffPacket) -> [u8; 32] {
    *blake3::keyed_hash(key, &signable_bytes(packet)).as_bytes()
}

/// Verify a packet's signature in constant time.
pub fn verify_packet(key: &[u8; 32], packet: &HandoffPacket) -> bool {
    // blake3::Hash equality is constant-time.
    blake3::keyed_hash(key, &signable_bytes(packet)) == blake3::Hash::from(packet.signature)
}

// ============================================================================
// TESTS
// ============================================================================

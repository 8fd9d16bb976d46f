//! Packet storage abstraction
//!
//! Storage serializes per packet id and supports concurrent reads. The
//! in-memory implementation backs tests and embedded deployments; durable
//! backends implement the same trait.

use crate::{HandoffPacket, PacketMeta};
use fastband_core::{FastbandError, FastbandResult, PacketId, TicketId};
use std::collections::HashMap;
use std::sync::RwLock;

// ============================================================================
// PACKET STORE TRAIT
// ============================================================================

/// Storage for handoff packets.
///
/// `remove` is the single point of ownership transfer: under concurrent
/// accepts of the same id, exactly one caller receives the packet.
pub trait PacketStore: Send + Sync {
    /// Persist a packet atomically. Overwrites an existing record with the
    /// same id.
    fn insert(&self, packet: HandoffPacket) -> FastbandResult<()>;

    /// Load a copy of a packet.
    fn load(&self, id: PacketId) -> FastbandResult<Option<HandoffPacket>>;

    /// Atomically remove and return a packet.
    fn remove(&self, id: PacketId) -> FastbandResult<Option<HandoffPacket>>;

    /// Listing metadata for every stored packet, optionally filtered by
    /// ticket. Never discloses access tokens.
    fn list(&self, ticket: Option<&TicketId>) -> FastbandResult<Vec<PacketMeta>>;

    /// Ids of every stored packet.
    fn ids(&self) -> FastbandResult<Vec<PacketId>>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

/// In-memory packet store.
#[derive(Debug, Default)]
pub struct MemoryPacketStore {
    packets: RwLock<HashMap<PacketId, HandoffPacket>>,
}

impl MemoryPacketStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored packets.
    pub fn len(&self) -> usize {
        self.packets.read().map(|p| p.len()).unwrap_or(0)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PacketStore for MemoryPacketStore {
    fn insert(&self, packet: HandoffPacket) -> FastbandResult<()> {
        self.packets
            .write()
            .map_err(|_| FastbandError::unavailable("packet store lock poisoned"))?
            .insert(packet.packet_id, packet);
        Ok(())
    }

    fn load(&self, id: PacketId) -> FastbandResult<Option<HandoffPacket>> {
        Ok(self
            .packets
            .read()
            .map_err(|_| FastbandError::unavailable("packet store lock poisoned"))?
            .get(&id)
            .cloned())
    }

    fn remove(&self, id: PacketId) -> FastbandResult<Option<HandoffPacket>> {
        Ok(self
            .packets
            .write()
            .map_err(|_| FastbandError::unavailable("packet store lock poisoned"))?
            .remove(&id))
    }

    fn list(&self, ticket: Option<&TicketId>) -> FastbandResult<Vec<PacketMeta>> {
        let packets = self
            .packets
            .read()
            .map_err(|_| FastbandError::unavailable("packet store lock poisoned"))?;
        let mut metas: Vec<PacketMeta> = packets
            .values()
            .filter(|p| ticket.is_none_or(|t| &p.ticket_id == t))
            .map(PacketMeta::from)
            .collect();
        metas.sort_by_key(|m| m.created_at);
        Ok(metas)
    }

    fn ids(&self) -> FastbandResult<Vec<PacketId>> {
        Ok(self
            .packets
            .read()
            .map_err(|_| FastbandError::unavailable("packet store lock poisoned"))?
            .keys()
            .copied()
            .collect())
    }
}

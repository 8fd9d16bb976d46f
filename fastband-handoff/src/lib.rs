//! Fastband Handoff - Context Transfer Packets
//!
//! Builds, sanitizes, signs, stores, lists, and accepts handoff packets.
//! A packet is an immutable, signed, short-lived capsule carrying enough
//! state for a second agent to continue a task. Accept is single-use: the
//! delete-on-accept is the only ownership transfer.

mod canonical;
mod manager;
mod packet;
mod sanitize;
mod store;

pub use canonical::*;
pub use manager::*;
pub use packet::*;
pub use sanitize::*;
pub use store::*;

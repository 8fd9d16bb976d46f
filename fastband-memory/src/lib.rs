//! Fastband Memory - Tiered Store
//!
//! Five-level memory store (HOT, WARM, COOL, COLD, FROZEN) with token-cost
//! accounting, LRU eviction, cascaded demotion, and the lazy bible section
//! loader that feeds FROZEN.

mod bible;
mod entry;
mod store;

pub use bible::*;
pub use entry::*;
pub use store::*;

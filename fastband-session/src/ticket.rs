//! Ticket types handed in by the ticket manager
//!
//! The core consumes only what it needs from a ticket: identity, a summary
//! for handoff packets, tags for budget placement, and explicit flags.

use fastband_core::TicketId;
use serde::{Deserialize, Serialize};

/// Explicit ticket flags the core honors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketFlags {
    /// Start the session at the MAXIMUM budget tier.
    pub budget_override: bool,
}

/// The slice of a ticket the core consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub summary: String,
    pub tags: Vec<String>,
    pub flags: TicketFlags,
}

impl Ticket {
    /// A plain ticket with no tags or flags.
    pub fn new(id: TicketId, summary: impl Into<String>) -> Self {
        Self {
            id,
            summary: summary.into(),
            tags: Vec::new(),
            flags: TicketFlags::default(),
        }
    }

    /// Attach tags.
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the budget override flag.
    pub fn with_budget_override(mut self) -> Self {
        self.flags.budget_override = true;
        self
    }
}

//! Ops log entry types

use fastband_core::{AgentName, DirectiveStatus, OpsEntryKind, TicketId, Timestamp};
use serde::{Deserialize, Serialize};

// ============================================================================
// OPS LOG ENTRY
// ============================================================================

/// One committed, immutable log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpsLogEntry {
    /// Strictly increasing, gapless within a workspace. Assigned at commit.
    pub sequence: u64,
    pub actor: AgentName,
    pub ticket_id: Option<TicketId>,
    /// Free-form description of what the actor did.
    pub action: String,
    pub timestamp: Timestamp,
    pub kind: OpsEntryKind,
    /// Target state for `ClearanceChange` entries; `None` otherwise.
    /// Only CLEARED and HOLD are legal targets (REBUILD is entered through
    /// its own entry kinds).
    pub clearance: Option<DirectiveStatus>,
}

/// An entry as submitted, before the log assigns its sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOpsEntry {
    pub actor: AgentName,
    pub ticket_id: Option<TicketId>,
    pub action: String,
    pub kind: OpsEntryKind,
    pub clearance: Option<DirectiveStatus>,
}

impl NewOpsEntry {
    /// An ordinary activity entry.
    pub fn activity(
        actor: AgentName,
        ticket_id: Option<TicketId>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            ticket_id,
            action: action.into(),
            kind: OpsEntryKind::Activity,
            clearance: None,
        }
    }

    /// A clearance flip to HOLD or CLEARED.
    pub fn clearance_change(
        actor: AgentName,
        target: DirectiveStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            ticket_id: None,
            action: reason.into(),
            kind: OpsEntryKind::ClearanceChange,
            clearance: Some(target),
        }
    }

    /// Start of a workspace rebuild.
    pub fn rebuild_start(actor: AgentName, reason: impl Into<String>) -> Self {
        Self {
            actor,
            ticket_id: None,
            action: reason.into(),
            kind: OpsEntryKind::RebuildStart,
            clearance: None,
        }
    }

    /// End of a workspace rebuild.
    pub fn rebuild_end(actor: AgentName, reason: impl Into<String>) -> Self {
        Self {
            actor,
            ticket_id: None,
            action: reason.into(),
            kind: OpsEntryKind::RebuildEnd,
            clearance: None,
        }
    }
}

// ============================================================================
// DERIVED STATE
// ============================================================================

/// The current admission state of a workspace.
///
/// Always recomputed from the log; never stored as the primary record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub status: DirectiveStatus,
    pub reason: String,
    /// Sequence at which the current status began. Zero for the initial
    /// CLEARED state of an empty log.
    pub since_sequence: u64,
}

impl Directive {
    /// The directive of an empty log.
    pub fn initial() -> Self {
        Self {
            status: DirectiveStatus::Cleared,
            reason: String::new(),
            since_sequence: 0,
        }
    }
}

/// One recently active agent, derived from the log tail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveAgent {
    pub agent_id: AgentName,
    pub last_seen: Timestamp,
    pub current_action: String,
}

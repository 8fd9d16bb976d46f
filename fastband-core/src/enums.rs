//! Enum types shared across the Fastband control plane

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// MEMORY TIER
// ============================================================================

/// Storage tier of a memory entry. Ordered hottest to coldest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MemoryTier {
    /// Live working memory, budget-accounted per session
    Hot,
    /// Session-scoped staging, drained on session close
    Warm,
    /// Recently useful cross-session memory
    Cool,
    /// Long-tail memory, last stop before discard
    Cold,
    /// Lazy-loaded reference sections, never evicted
    Frozen,
}

impl MemoryTier {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            MemoryTier::Hot => "Hot",
            MemoryTier::Warm => "Warm",
            MemoryTier::Cool => "Cool",
            MemoryTier::Cold => "Cold",
            MemoryTier::Frozen => "Frozen",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, MemoryTierParseError> {
        match s.to_lowercase().as_str() {
            "hot" => Ok(MemoryTier::Hot),
            "warm" => Ok(MemoryTier::Warm),
            "cool" => Ok(MemoryTier::Cool),
            "cold" => Ok(MemoryTier::Cold),
            "frozen" => Ok(MemoryTier::Frozen),
            _ => Err(MemoryTierParseError(s.to_string())),
        }
    }

    /// Where evicted entries of this tier are re-inserted.
    ///
    /// `None` means evicted entries are discarded outright. WARM is special:
    /// its survivors demote to COOL only when accessed at least three times,
    /// which the store decides per entry.
    pub fn demotion_target(&self) -> Option<MemoryTier> {
        match self {
            MemoryTier::Hot => Some(MemoryTier::Warm),
            MemoryTier::Warm => Some(MemoryTier::Cool),
            MemoryTier::Cool => Some(MemoryTier::Cold),
            MemoryTier::Cold => None,
            MemoryTier::Frozen => None,
        }
    }

    /// Whether this tier ever evicts.
    pub fn is_evictable(&self) -> bool {
        !matches!(self, MemoryTier::Frozen)
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for MemoryTier {
    type Err = MemoryTierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid memory tier string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTierParseError(pub String);

impl fmt::Display for MemoryTierParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid memory tier: {}", self.0)
    }
}

impl std::error::Error for MemoryTierParseError {}

// ============================================================================
// ENTRY ORIGIN
// ============================================================================

/// Where a memory entry came from. Opaque to the store; recorded for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryOrigin {
    /// Supplied by the ticket manager
    Ticket,
    /// Produced by the agent while working
    Discovery,
    /// Loaded from the bible section root
    BibleSection,
    /// Rehydrated from an accepted handoff packet
    HandoffRehydrate,
    /// Anything else the embedder injects
    External,
}

impl EntryOrigin {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            EntryOrigin::Ticket => "Ticket",
            EntryOrigin::Discovery => "Discovery",
            EntryOrigin::BibleSection => "BibleSection",
            EntryOrigin::HandoffRehydrate => "HandoffRehydrate",
            EntryOrigin::External => "External",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, EntryOriginParseError> {
        match s {
            "Ticket" => Ok(EntryOrigin::Ticket),
            "Discovery" => Ok(EntryOrigin::Discovery),
            "BibleSection" => Ok(EntryOrigin::BibleSection),
            "HandoffRehydrate" => Ok(EntryOrigin::HandoffRehydrate),
            "External" => Ok(EntryOrigin::External),
            _ => Err(EntryOriginParseError(s.to_string())),
        }
    }
}

impl fmt::Display for EntryOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Error when parsing an invalid entry origin string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOriginParseError(pub String);

impl fmt::Display for EntryOriginParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid entry origin: {}", self.0)
    }
}

impl std::error::Error for EntryOriginParseError {}

// ============================================================================
// BUDGET TIER
// ============================================================================

/// Working-memory budget tier for a session. Escalation is monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BudgetTier {
    Minimal,
    Standard,
    Expanded,
    Maximum,
}

impl BudgetTier {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            BudgetTier::Minimal => "Minimal",
            BudgetTier::Standard => "Standard",
            BudgetTier::Expanded => "Expanded",
            BudgetTier::Maximum => "Maximum",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, BudgetTierParseError> {
        match s.to_lowercase().as_str() {
            "minimal" => Ok(BudgetTier::Minimal),
            "standard" => Ok(BudgetTier::Standard),
            "expanded" => Ok(BudgetTier::Expanded),
            "maximum" => Ok(BudgetTier::Maximum),
            _ => Err(BudgetTierParseError(s.to_string())),
        }
    }

    /// The next tier up, if any.
    pub fn next(&self) -> Option<BudgetTier> {
        match self {
            BudgetTier::Minimal => Some(BudgetTier::Standard),
            BudgetTier::Standard => Some(BudgetTier::Expanded),
            BudgetTier::Expanded => Some(BudgetTier::Maximum),
            BudgetTier::Maximum => None,
        }
    }

    /// Token cap for this tier, interpolated between the configured
    /// default (MINIMAL) and maximum (MAXIMUM) caps.
    ///
    /// With the defaults of 20,000 and 80,000 this yields the canonical
    /// 20k / 40k / 60k / 80k ladder.
    pub fn cap(&self, default_cap: u32, max_cap: u32) -> u32 {
        let span = max_cap.saturating_sub(default_cap);
        match self {
            BudgetTier::Minimal => default_cap,
            BudgetTier::Standard => default_cap + span / 3,
            BudgetTier::Expanded => default_cap + span * 2 / 3,
            BudgetTier::Maximum => max_cap,
        }
    }
}

impl fmt::Display for BudgetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for BudgetTier {
    type Err = BudgetTierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid budget tier string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetTierParseError(pub String);

impl fmt::Display for BudgetTierParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid budget tier: {}", self.0)
    }
}

impl std::error::Error for BudgetTierParseError {}

// ============================================================================
// BUDGET TRANSITION
// ============================================================================

/// Edge transition reported by a budget update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BudgetTransition {
    /// No threshold crossed
    None,
    /// Usage crossed the warn threshold (fires once per tier level)
    Warn,
    /// Usage crossed the critical threshold (fires once per tier level)
    Critical,
    /// The budget tier was escalated
    Escalated,
}

impl BudgetTransition {
    /// Whether this transition requires the coordinator to react.
    pub fn is_edge(&self) -> bool {
        !matches!(self, BudgetTransition::None)
    }
}

impl fmt::Display for BudgetTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BudgetTransition::None => "none",
            BudgetTransition::Warn => "warn",
            BudgetTransition::Critical => "critical",
            BudgetTransition::Escalated => "escalated",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// DIRECTIVE STATUS
// ============================================================================

/// Current admission state of a workspace, derived from the ops log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DirectiveStatus {
    /// Agents may act
    Cleared,
    /// Agents must wait
    Hold,
    /// A rebuild is in progress; agents must wait
    Rebuild,
}

impl DirectiveStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DirectiveStatus::Cleared => "Cleared",
            DirectiveStatus::Hold => "Hold",
            DirectiveStatus::Rebuild => "Rebuild",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, DirectiveStatusParseError> {
        match s.to_lowercase().as_str() {
            "cleared" => Ok(DirectiveStatus::Cleared),
            "hold" => Ok(DirectiveStatus::Hold),
            "rebuild" => Ok(DirectiveStatus::Rebuild),
            _ => Err(DirectiveStatusParseError(s.to_string())),
        }
    }

    /// Whether agents are admitted under this directive.
    pub fn admits(&self) -> bool {
        matches!(self, DirectiveStatus::Cleared)
    }
}

impl fmt::Display for DirectiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for DirectiveStatus {
    type Err = DirectiveStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid directive status string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveStatusParseError(pub String);

impl fmt::Display for DirectiveStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid directive status: {}", self.0)
    }
}

impl std::error::Error for DirectiveStatusParseError {}

// ============================================================================
// OPS LOG ENTRY KIND
// ============================================================================

/// Kind of an ops-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpsEntryKind {
    /// Ordinary agent activity
    Activity,
    /// Clearance flip between CLEARED and HOLD
    ClearanceChange,
    /// Start of a workspace rebuild
    RebuildStart,
    /// End of a workspace rebuild
    RebuildEnd,
}

impl OpsEntryKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            OpsEntryKind::Activity => "Activity",
            OpsEntryKind::ClearanceChange => "ClearanceChange",
            OpsEntryKind::RebuildStart => "RebuildStart",
            OpsEntryKind::RebuildEnd => "RebuildEnd",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, OpsEntryKindParseError> {
        match s {
            "Activity" => Ok(OpsEntryKind::Activity),
            "ClearanceChange" => Ok(OpsEntryKind::ClearanceChange),
            "RebuildStart" => Ok(OpsEntryKind::RebuildStart),
            "RebuildEnd" => Ok(OpsEntryKind::RebuildEnd),
            _ => Err(OpsEntryKindParseError(s.to_string())),
        }
    }
}

impl fmt::Display for OpsEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

/// Error when parsing an invalid ops entry kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpsEntryKindParseError(pub String);

impl fmt::Display for OpsEntryKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid ops entry kind: {}", self.0)
    }
}

impl std::error::Error for OpsEntryKindParseError {}

// ============================================================================
// TESTS
// ============================================================================

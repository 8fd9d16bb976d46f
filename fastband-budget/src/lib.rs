//! Fastband Budget - Working-Memory Accounting
//!
//! Tracks per-session HOT usage against a budget tier, fires warn/critical
//! edges exactly once per tier level, and escalates the tier on the
//! configured triggers. Escalation is monotonic: a session's cap never
//! shrinks.

use fastband_core::{BudgetTier, BudgetTransition, FastbandConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Ticket tags that mark a session as complex enough to start at EXPANDED.
const COMPLEXITY_TAGS: &[&str] = &["complex", "refactor", "architecture", "migration"];

/// Files-modified count that escalates MINIMAL to STANDARD.
const FILES_MODIFIED_TRIGGER: u32 = 5;

/// Retry count that escalates one tier at STANDARD or above.
const RETRY_TRIGGER: u32 = 3;

// ============================================================================
// LIMITS
// ============================================================================

/// Budget thresholds fixed at session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetLimits {
    /// Cap of the MINIMAL tier.
    pub default_cap: u32,
    /// Cap of the MAXIMUM tier.
    pub max_cap: u32,
    /// Warn threshold in percent of the current tier cap.
    pub warn_pct: u8,
    /// Critical threshold in percent of the current tier cap.
    pub critical_pct: u8,
    /// Whether escalation triggers fire at all.
    pub auto_expand: bool,
}

impl BudgetLimits {
    /// Derive limits from the workspace configuration.
    pub fn from_config(config: &FastbandConfig) -> Self {
        Self {
            default_cap: config.working_memory_default,
            max_cap: config.working_memory_max,
            warn_pct: config.handoff_warn_pct,
            critical_pct: config.handoff_critical_pct,
            auto_expand: config.auto_expand_enabled,
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

/// Observable budget state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetState {
    pub tier: BudgetTier,
    /// Tokens currently live in HOT for this session.
    pub used: u32,
    /// Maximum `used` observed.
    pub peak: u32,
    /// Number of tier escalations.
    pub expansion_count: u32,
    /// Warn edge already fired at this tier level.
    pub warn_fired: bool,
    /// Critical edge already fired at this tier level.
    pub critical_fired: bool,
}

// ============================================================================
// BUDGET MANAGER
// ============================================================================

/// Per-session budget state machine over HOT usage.
#[derive(Debug, Clone)]
pub struct BudgetManager {
    limits: BudgetLimits,
    state: BudgetState,
    files_modified: u32,
    retry_count: u32,
}

impl BudgetManager {
    /// Start a session at MINIMAL.
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            state: BudgetState {
                tier: BudgetTier::Minimal,
                used: 0,
                peak: 0,
                expansion_count: 0,
                warn_fired: false,
                critical_fired: false,
            },
            files_modified: 0,
            retry_count: 0,
        }
    }

    /// Start a session from ticket metadata.
    ///
    /// A complexity tag starts the session at EXPANDED; an explicit override
    /// starts it at MAXIMUM. Both are start positions, not escalations, so
    /// `expansion_count` stays zero.
    pub fn for_ticket(limits: BudgetLimits, tags: &[String], override_max: bool) -> Self {
        let mut manager = Self::new(limits);
        if override_max {
            manager.state.tier = BudgetTier::Maximum;
        } else if tags
            .iter()
            .any(|t| COMPLEXITY_TAGS.iter().any(|c| t.eq_ignore_ascii_case(c)))
        {
            manager.state.tier = BudgetTier::Expanded;
        }
        manager
    }

    /// Current observable state.
    pub fn state(&self) -> BudgetState {
        self.state
    }

    /// Token cap of the current tier.
    pub fn cap(&self) -> u32 {
        self.state
            .tier
            .cap(self.limits.default_cap, self.limits.max_cap)
    }

    /// Whether inserting `tokens` would push `used` past the current cap.
    pub fn would_overflow(&self, tokens: u32) -> bool {
        self.state.used as u64 + tokens as u64 > self.cap() as u64
    }

    /// Account an insert into HOT. Returns the edge transition, if any.
    ///
    /// When a single insert jumps past both thresholds the more severe
    /// edge is reported and both flags are set.
    pub fn on_insert(&mut self, tokens: u32) -> BudgetTransition {
        self.state.used = self.state.used.saturating_add(tokens);
        self.state.peak = self.state.peak.max(self.state.used);
        self.threshold_edge()
    }

    /// Account a removal from HOT. Removals never fire edges.
    pub fn on_remove(&mut self, tokens: u32) -> BudgetTransition {
        self.state.used = self.state.used.saturating_sub(tokens);
        BudgetTransition::None
    }

    /// Report the session's files-modified count.
    ///
    /// Reaching five files while at MINIMAL escalates to STANDARD.
    pub fn record_files_modified(&mut self, count: u32) -> BudgetTransition {
        self.files_modified = self.files_modified.max(count);
        if self.limits.auto_expand
            && self.state.tier == BudgetTier::Minimal
            && self.files_modified >= FILES_MODIFIED_TRIGGER
        {
            return self.escalate("files_modified");
        }
        BudgetTransition::None
    }

    /// Report one retry. Three retries at STANDARD or above escalate one
    /// tier.
    pub fn record_retry(&mut self) -> BudgetTransition {
        self.retry_count += 1;
        if self.limits.auto_expand
            && self.state.tier >= BudgetTier::Standard
            && self.retry_count >= RETRY_TRIGGER
        {
            self.retry_count = 0;
            return self.escalate("retries");
        }
        BudgetTransition::None
    }

    fn escalate(&mut self, trigger: &str) -> BudgetTransition {
        let Some(next) = self.state.tier.next() else {
            return BudgetTransition::None;
        };
        self.state.tier = next;
        self.state.expansion_count += 1;
        // New headroom is fully usable: both edges re-arm.
        self.state.warn_fired = false;
        self.state.critical_fired = false;
        info!(
            tier = %next,
            cap = self.cap(),
            used = self.state.used,
            trigger,
            "budget tier escalated"
        );
        BudgetTransition::Escalated
    }

    fn threshold_edge(&mut self) -> BudgetTransition {
        let cap = self.cap() as u64;
        let used = self.state.used as u64;
        let critical_at = cap * self.limits.critical_pct as u64 / 100;
        let warn_at = cap * self.limits.warn_pct as u64 / 100;

        if used >= critical_at && !self.state.critical_fired {
            self.state.critical_fired = true;
            self.state.warn_fired = true;
            return BudgetTransition::Critical;
        }
        if used >= warn_at && !self.state.warn_fired {
            self.state.warn_fired = true;
            return BudgetTransition::Warn;
        }
        BudgetTransition::None
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> BudgetLimits {
        BudgetLimits {
            default_cap: 20_000,
            max_cap: 80_000,
            warn_pct: 60,
            critical_pct: 80,
            auto_expand: true,
        }
    }

    #[test]
    fn test_warn_fires_once_at_sixty_percent() {
        let mut budget = BudgetManager::new(limits());
        assert_eq!(budget.on_insert(5_000), BudgetTransition::None);
        assert_eq!(budget.on_insert(5_000), BudgetTransition::None);
        // 13,000 >= 12,000
        assert_eq!(budget.on_insert(3_000), BudgetTransition::Warn);
        // Still above warn; the edge does not refire.
        assert_eq!(budget.on_insert(100), BudgetTransition::None);
    }

    #[test]
    fn test_critical_fires_once_at_eighty_percent() {
        let mut budget = BudgetManager::new(limits());
        budget.on_insert(13_000);
        // 18,000 >= 16,000
        assert_eq!(budget.on_insert(5_000), BudgetTransition::Critical);
        assert_eq!(budget.on_insert(100), BudgetTransition::None);
        assert!(budget.state().critical_fired);
    }

    #[test]
    fn test_single_insert_jumping_both_edges_reports_critical() {
        let mut budget = BudgetManager::new(limits());
        assert_eq!(budget.on_insert(19_000), BudgetTransition::Critical);
        assert!(budget.state().warn_fired);
        assert!(budget.state().critical_fired);
    }

    #[test]
    fn test_remove_never_fires_edges() {
        let mut budget = BudgetManager::new(limits());
        budget.on_insert(13_000);
        assert_eq!(budget.on_remove(13_000), BudgetTransition::None);
        assert_eq!(budget.state().used, 0);
        assert_eq!(budget.state().peak, 13_000);
    }

    #[test]
    fn test_files_modified_escalates_minimal_to_standard() {
        let mut budget = BudgetManager::new(limits());
        budget.on_insert(18_000); // critical at MINIMAL
        assert_eq!(
            budget.record_files_modified(5),
            BudgetTransition::Escalated
        );
        let state = budget.state();
        assert_eq!(state.tier, BudgetTier::Standard);
        assert_eq!(state.used, 18_000);
        assert_eq!(state.expansion_count, 1);
        assert!(!state.warn_fired);
        assert!(!state.critical_fired);

        // 18,100 < 24,000 (60% of 40,000): neither edge refires.
        assert_eq!(budget.on_insert(100), BudgetTransition::None);
    }

    #[test]
    fn test_files_modified_below_trigger_does_nothing() {
        let mut budget = BudgetManager::new(limits());
        assert_eq!(budget.record_files_modified(4), BudgetTransition::None);
        assert_eq!(budget.state().tier, BudgetTier::Minimal);
    }

    #[test]
    fn test_files_modified_does_not_escalate_above_minimal() {
        let mut budget =
            BudgetManager::for_ticket(limits(), &["refactor".to_string()], false);
        assert_eq!(budget.record_files_modified(50), BudgetTransition::None);
        assert_eq!(budget.state().tier, BudgetTier::Expanded);
    }

    #[test]
    fn test_retries_escalate_standard_and_above() {
        let mut budget = BudgetManager::new(limits());
        budget.record_files_modified(5); // -> Standard
        assert_eq!(budget.record_retry(), BudgetTransition::None);
        assert_eq!(budget.record_retry(), BudgetTransition::None);
        assert_eq!(budget.record_retry(), BudgetTransition::Escalated);
        assert_eq!(budget.state().tier, BudgetTier::Expanded);
    }

    #[test]
    fn test_retries_do_not_escalate_minimal() {
        let mut budget = BudgetManager::new(limits());
        for _ in 0..10 {
            assert_eq!(budget.record_retry(), BudgetTransition::None);
        }
        assert_eq!(budget.state().tier, BudgetTier::Minimal);
    }

    #[test]
    fn test_complexity_tag_starts_expanded() {
        for tag in ["complex", "Refactor", "ARCHITECTURE", "migration"] {
            let budget = BudgetManager::for_ticket(limits(), &[tag.to_string()], false);
            assert_eq!(budget.state().tier, BudgetTier::Expanded, "tag {tag}");
            assert_eq!(budget.state().expansion_count, 0);
        }
    }

    #[test]
    fn test_override_starts_maximum() {
        let budget = BudgetManager::for_ticket(limits(), &["complex".to_string()], true);
        assert_eq!(budget.state().tier, BudgetTier::Maximum);
        assert_eq!(budget.cap(), 80_000);
    }

    #[test]
    fn test_plain_tags_start_minimal() {
        let budget =
            BudgetManager::for_ticket(limits(), &["bugfix".to_string(), "ui".to_string()], false);
        assert_eq!(budget.state().tier, BudgetTier::Minimal);
    }

    #[test]
    fn test_auto_expand_disabled_gates_all_triggers() {
        let mut budget = BudgetManager::new(BudgetLimits {
            auto_expand: false,
            ..limits()
        });
        assert_eq!(budget.record_files_modified(9), BudgetTransition::None);
        for _ in 0..5 {
            budget.record_retry();
        }
        assert_eq!(budget.state().tier, BudgetTier::Minimal);
    }

    #[test]
    fn test_maximum_cannot_escalate_further() {
        let mut budget = BudgetManager::for_ticket(limits(), &[], true);
        budget.record_files_modified(100);
        for _ in 0..10 {
            budget.record_retry();
        }
        assert_eq!(budget.state().tier, BudgetTier::Maximum);
        assert_eq!(budget.state().expansion_count, 0);
    }

    #[test]
    fn test_would_overflow() {
        let mut budget = BudgetManager::new(limits());
        budget.on_insert(19_000);
        assert!(budget.would_overflow(1_001));
        assert!(!budget.would_overflow(1_000));
    }
}

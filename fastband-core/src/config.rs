//! Configuration types
//!
//! All values are fixed at construction. There is no runtime resizing, no
//! environment lookup, and no CLI surface in the core contract.

use crate::{FastbandError, FastbandResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Master configuration struct for a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastbandConfig {
    /// Initial HOT cap in tokens (the MINIMAL budget tier).
    pub working_memory_default: u32,
    /// Absolute HOT cap in tokens (the MAXIMUM budget tier).
    pub working_memory_max: u32,

    /// Warn threshold as a percentage of the current tier cap.
    pub handoff_warn_pct: u8,
    /// Critical threshold as a percentage of the current tier cap.
    pub handoff_critical_pct: u8,
    /// Whether budget escalation triggers fire at all.
    pub auto_expand_enabled: bool,

    /// COOL tier bounds.
    pub cool_max_items: usize,
    pub cool_max_tokens: u32,
    /// COLD tier bounds.
    pub cold_max_items: usize,
    pub cold_max_tokens: u32,

    /// How long stored handoff packets live before the sweep removes them.
    pub handoff_retention: Duration,

    /// Root directory for FROZEN bible sections.
    pub bible_root: PathBuf,
    /// Token cap for the bootstrap summary.
    pub bible_summary_tokens: u32,

    /// Workspace-scoped key material for packet signatures. Required.
    /// Rotating it invalidates every outstanding packet by design.
    pub signing_key: Vec<u8>,
}

impl FastbandConfig {
    /// Build a configuration with the documented defaults.
    ///
    /// This centralizes the "sane defaults" so embedders only supply what is
    /// genuinely workspace-specific: the bible root and the signing key.
    pub fn for_workspace(bible_root: impl Into<PathBuf>, signing_key: Vec<u8>) -> Self {
        Self {
            working_memory_default: 20_000,
            working_memory_max: 80_000,
            handoff_warn_pct: 60,
            handoff_critical_pct: 80,
            auto_expand_enabled: true,
            cool_max_items: 100,
            cool_max_tokens: 50_000,
            cold_max_items: 500,
            cold_max_tokens: 200_000,
            handoff_retention: Duration::from_secs(48 * 3600),
            bible_root: bible_root.into(),
            bible_summary_tokens: 1_000,
            signing_key,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> FastbandResult<()> {
        if self.working_memory_default == 0 {
            return Err(FastbandError::malformed(
                "working_memory_default",
                "must be greater than 0",
            ));
        }

        if self.working_memory_max < self.working_memory_default {
            return Err(FastbandError::malformed(
                "working_memory_max",
                "must be at least working_memory_default",
            ));
        }

        if self.handoff_warn_pct == 0 || self.handoff_warn_pct >= 100 {
            return Err(FastbandError::malformed(
                "handoff_warn_pct",
                "must be in 1..=99",
            ));
        }

        if self.handoff_critical_pct <= self.handoff_warn_pct || self.handoff_critical_pct > 100 {
            return Err(FastbandError::malformed(
                "handoff_critical_pct",
                "must exceed handoff_warn_pct and be at most 100",
            ));
        }

        if self.cool_max_items == 0 || self.cool_max_tokens == 0 {
            return Err(FastbandError::malformed(
                "cool_max_items",
                "COOL bounds must be positive",
            ));
        }

        if self.cold_max_items == 0 || self.cold_max_tokens == 0 {
            return Err(FastbandError::malformed(
                "cold_max_items",
                "COLD bounds must be positive",
            ));
        }

        if self.handoff_retention.is_zero() {
            return Err(FastbandError::malformed(
                "handoff_retention",
                "must be positive",
            ));
        }

        if self.bible_summary_tokens == 0 {
            return Err(FastbandError::malformed(
                "bible_summary_tokens",
                "must be greater than 0",
            ));
        }

        if self.signing_key.is_empty() {
            return Err(FastbandError::malformed("signing_key", "is required"));
        }

        Ok(())
    }
}

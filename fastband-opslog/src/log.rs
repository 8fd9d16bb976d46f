//! The ops log
//!
//! Single-writer discipline: appends serialize on the writer mutex, and the
//! serial commit order defines the sequence. Readers derive the directive
//! and the active-agent view from committed entries.

use crate::{ActiveAgent, Directive, LogStore, NewOpsEntry, OpsLogEntry};
use chrono::Utc;
use fastband_core::{
    AgentName, AuditKind, AuditRecord, AuditSink, DirectiveStatus, FastbandError, FastbandResult,
    OpContext, OpsEntryKind, TicketId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Default log-tail window for the active-agents view.
pub const DEFAULT_ACTIVE_WINDOW: usize = 64;

// ============================================================================
// OPS LOG
// ============================================================================

/// Append-only activity log plus the derived clearance directive.
pub struct OpsLog {
    store: Box<dyn LogStore>,
    /// Guards sequence assignment. Serial commit order defines `sequence`.
    writer: Mutex<()>,
    audit: Arc<dyn AuditSink>,
}

impl OpsLog {
    /// Create a log over a store.
    pub fn new(store: Box<dyn LogStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
            audit,
        }
    }

    /// Append an entry, assigning the next sequence.
    ///
    /// Appends never silently drop: a refused commit surfaces `unavailable`
    /// and the sequence is not consumed.
    pub fn append(&self, entry: NewOpsEntry, ctx: &OpContext) -> FastbandResult<u64> {
        ctx.check()?;
        Self::validate(&entry)?;

        let _writer = self
            .writer
            .lock()
            .map_err(|_| FastbandError::unavailable("ops log writer poisoned"))?;

        let sequence = self.store.last_sequence()? + 1;
        let kind = entry.kind;
        let actor = entry.actor.clone();
        let committed = OpsLogEntry {
            sequence,
            actor: entry.actor,
            ticket_id: entry.ticket_id,
            action: entry.action,
            timestamp: Utc::now(),
            kind,
            clearance: entry.clearance,
        };
        self.store.commit(committed)?;

        // The audit sink must ack before the append reports success.
        let audit_kind = match kind {
            OpsEntryKind::Activity => AuditKind::OpsAppend,
            _ => AuditKind::DirectiveChange,
        };
        self.audit.record(AuditRecord::success(
            actor.as_str(),
            audit_kind,
            format!("sequence {sequence}"),
            kind.as_db_str(),
        ))?;

        debug!(sequence, kind = %kind, actor = %actor, "ops entry committed");
        Ok(sequence)
    }

    /// Entries with `sequence > since_sequence`, gapless, in order.
    pub fn read(&self, since_sequence: u64, limit: usize) -> FastbandResult<Vec<OpsLogEntry>> {
        self.store.read(since_sequence, limit)
    }

    /// The current derived directive. Recomputed from the log on demand.
    pub fn current_directive(&self) -> FastbandResult<Directive> {
        let entries = self.store.read(0, usize::MAX)?;
        let mut directive = Directive::initial();

        for entry in &entries {
            match (entry.kind, directive.status) {
                (OpsEntryKind::RebuildStart, DirectiveStatus::Cleared) => {
                    directive = Directive {
                        status: DirectiveStatus::Rebuild,
                        reason: entry.action.clone(),
                        since_sequence: entry.sequence,
                    };
                }
                (OpsEntryKind::RebuildEnd, DirectiveStatus::Rebuild) => {
                    directive = Directive {
                        status: DirectiveStatus::Cleared,
                        reason: entry.action.clone(),
                        since_sequence: entry.sequence,
                    };
                }
                (OpsEntryKind::ClearanceChange, DirectiveStatus::Cleared)
                    if entry.clearance == Some(DirectiveStatus::Hold) =>
                {
                    directive = Directive {
                        status: DirectiveStatus::Hold,
                        reason: entry.action.clone(),
                        since_sequence: entry.sequence,
                    };
                }
                (OpsEntryKind::ClearanceChange, DirectiveStatus::Hold)
                    if entry.clearance == Some(DirectiveStatus::Cleared) =>
                {
                    directive = Directive {
                        status: DirectiveStatus::Cleared,
                        reason: entry.action.clone(),
                        since_sequence: entry.sequence,
                    };
                }
                // Entries invalid in the current state do not transition.
                _ => {}
            }
        }

        Ok(directive)
    }

    /// Admission check before any mutating work.
    ///
    /// Permits iff the current directive is CLEARED; otherwise denies with
    /// the sequence at which the hold began, so callers can wait and retry.
    pub fn admit(&self, agent_id: &AgentName, ticket_id: &TicketId) -> FastbandResult<()> {
        let directive = self.current_directive()?;
        if directive.status.admits() {
            debug!(agent = %agent_id, ticket = %ticket_id, "admission granted");
            Ok(())
        } else {
            info!(
                agent = %agent_id,
                ticket = %ticket_id,
                status = %directive.status,
                since = directive.since_sequence,
                "admission denied"
            );
            Err(FastbandError::Denied {
                reason: format!("workspace is {}: {}", directive.status, directive.reason),
                since_sequence: directive.since_sequence,
            })
        }
    }

    /// Recently active agents, derived from the log tail.
    pub fn check_active_agents(&self, window: usize) -> FastbandResult<Vec<ActiveAgent>> {
        let last = self.store.last_sequence()?;
        let since = last.saturating_sub(window as u64);
        let entries = self.store.read(since, window)?;

        let mut latest: HashMap<AgentName, (chrono::DateTime<Utc>, String)> = HashMap::new();
        for entry in entries {
            latest.insert(entry.actor, (entry.timestamp, entry.action));
        }

        let mut agents: Vec<ActiveAgent> = latest
            .into_iter()
            .map(|(agent_id, (last_seen, current_action))| ActiveAgent {
                agent_id,
                last_seen,
                current_action,
            })
            .collect();
        agents.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(a.agent_id.cmp(&b.agent_id)));
        Ok(agents)
    }

    // ------------------------------------------------------------------
    // named transitions
    // ------------------------------------------------------------------

    /// Flip the workspace to HOLD.
    pub fn hold(
        &self,
        actor: AgentName,
        reason: impl Into<String>,
        ctx: &OpContext,
    ) -> FastbandResult<u64> {
        self.append(
            NewOpsEntry::clearance_change(actor, DirectiveStatus::Hold, reason),
            ctx,
        )
    }

    /// Flip the workspace back to CLEARED.
    pub fn clear(
        &self,
        actor: AgentName,
        reason: impl Into<String>,
        ctx: &OpContext,
    ) -> FastbandResult<u64> {
        self.append(
            NewOpsEntry::clearance_change(actor, DirectiveStatus::Cleared, reason),
            ctx,
        )
    }

    /// Start a workspace rebuild.
    pub fn begin_rebuild(
        &self,
        actor: AgentName,
        reason: impl Into<String>,
        ctx: &OpContext,
    ) -> FastbandResult<u64> {
        self.append(NewOpsEntry::rebuild_start(actor, reason), ctx)
    }

    /// End a workspace rebuild.
    pub fn end_rebuild(
        &self,
        actor: AgentName,
        reason: impl Into<String>,
        ctx: &OpContext,
    ) -> FastbandResult<u64> {
        self.append(NewOpsEntry::rebuild_end(actor, reason), ctx)
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn validate(entry: &NewOpsEntry) -> FastbandResult<()> {
        match (entry.kind, entry.clearance) {
            (OpsEntryKind::ClearanceChange, Some(DirectiveStatus::Cleared))
            | (OpsEntryKind::ClearanceChange, Some(DirectiveStatus::Hold)) => Ok(()),
            (OpsEntryKind::ClearanceChange, _) => Err(FastbandError::malformed(
                "clearance",
                "clearance_change entries must target CLEARED or HOLD",
            )),
            (_, Some(_)) => Err(FastbandError::malformed(
                "clearance",
                "only clearance_change entries carry a clearance target",
            )),
            (_, None) => Ok(()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

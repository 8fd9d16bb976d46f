//! Audit records and the downward sink contract
//!
//! Every state-changing operation emits a record. For durable operations the
//! sink must acknowledge (return `Ok`) before the core reports success.

use crate::{FastbandError, FastbandResult, Timestamp};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

// ============================================================================
// AUDIT RECORD
// ============================================================================

/// Kind of audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditKind {
    SessionBegin,
    SessionEnd,
    Ingest,
    BudgetEscalation,
    PacketStore,
    PacketAccept,
    PacketSweep,
    OpsAppend,
    DirectiveChange,
    BibleLoad,
}

impl AuditKind {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            AuditKind::SessionBegin => "SessionBegin",
            AuditKind::SessionEnd => "SessionEnd",
            AuditKind::Ingest => "Ingest",
            AuditKind::BudgetEscalation => "BudgetEscalation",
            AuditKind::PacketStore => "PacketStore",
            AuditKind::PacketAccept => "PacketAccept",
            AuditKind::PacketSweep => "PacketSweep",
            AuditKind::OpsAppend => "OpsAppend",
            AuditKind::DirectiveChange => "DirectiveChange",
            AuditKind::BibleLoad => "BibleLoad",
        }
    }
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    /// Failure with the precise internal error kind. The facade may show a
    /// coalesced code publicly; the audit record keeps the real one.
    Failure { kind: String },
}

/// A single audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: Timestamp,
    /// Acting agent, or a component name for internal operations.
    pub actor: String,
    pub kind: AuditKind,
    /// The resource acted on (session id, packet id, sequence number).
    pub resource: String,
    pub outcome: AuditOutcome,
    pub details: String,
}

impl AuditRecord {
    /// Build a success record stamped now.
    pub fn success(
        actor: impl Into<String>,
        kind: AuditKind,
        resource: impl Into<String>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            actor: actor.into(),
            kind,
            resource: resource.into(),
            outcome: AuditOutcome::Success,
            details: details.into(),
        }
    }

    /// Build a failure record stamped now, keeping the precise error kind.
    pub fn failure(
        actor: impl Into<String>,
        kind: AuditKind,
        resource: impl Into<String>,
        error: &FastbandError,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            actor: actor.into(),
            kind,
            resource: resource.into(),
            outcome: AuditOutcome::Failure {
                kind: error.kind_str().to_string(),
            },
            details: error.to_string(),
        }
    }
}

// ============================================================================
// AUDIT SINK
// ============================================================================

/// Downward append-only audit sink.
///
/// Implementations must be thread-safe. `record` returning `Ok` is the
/// acknowledgement; a sink must never ack a record it has not durably
/// committed. Records are never deleted by the core.
pub trait AuditSink: Send + Sync {
    /// Append one record. Returns `unavailable` if the sink refused it.
    fn record(&self, record: AuditRecord) -> FastbandResult<()>;
}

/// In-memory audit sink for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, in append order.
    pub fn records(&self) -> FastbandResult<Vec<AuditRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|_| FastbandError::unavailable("audit sink lock poisoned"))?
            .clone())
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the sink is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) -> FastbandResult<()> {
        self.records
            .write()
            .map_err(|_| FastbandError::unavailable("audit sink lock poisoned"))?
            .push(record);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

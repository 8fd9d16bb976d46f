//! Error taxonomy for Fastband operations
//!
//! One closed, tagged enum. Components report precise kinds to their caller;
//! the session facade may coalesce kinds in public messages while the audit
//! record keeps the precise one.

use crate::{SessionId, Timestamp};
use thiserror::Error;

/// Master error type for all Fastband operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FastbandError {
    /// The ops log refused admission. Recoverable by waiting for CLEARED.
    #[error("admission denied: {reason} (held since sequence {since_sequence})")]
    Denied { reason: String, since_sequence: u64 },

    /// Budget went critical; the caller must prepare to transfer.
    #[error("working memory critical for session {session}; handoff required")]
    HandoffRequired { session: SessionId },

    /// Payload exceeds even the maximum tier cap. Fatal for this ingest.
    #[error("payload of {tokens} tokens exceeds the {cap}-token cap")]
    TooLarge { tokens: u32, cap: u32 },

    /// Signature, token, or target mismatch on packet accept.
    /// Deliberately carries no detail: one code, no oracle.
    #[error("unauthorized")]
    Unauthorized,

    /// Packet or bible section absent.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Packet past its expiry.
    #[error("expired at {expired_at}")]
    Expired { expired_at: Timestamp },

    /// The sanitizer rejected input; names the offending field.
    #[error("malformed field '{field}': {reason}")]
    Malformed { field: String, reason: String },

    /// Operation exceeded its deadline. No state change is observable.
    #[error("cancelled: deadline exceeded")]
    Cancelled,

    /// Underlying store refused a write; the caller must retry or abort.
    #[error("unavailable: {reason}")]
    Unavailable { reason: String },

    /// Bible section request resolved outside the configured root.
    #[error("section '{id}' escapes the configured root")]
    PathEscape { id: String },

    /// Packet already accepted.
    #[error("conflict: {resource} already accepted")]
    Conflict { resource: String },
}

impl FastbandError {
    /// Whether the caller can retry after the condition clears.
    ///
    /// `too_large`, `malformed`, `unauthorized`, `path_escape`, and
    /// `conflict` are fatal for the attempted operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FastbandError::Denied { .. }
                | FastbandError::HandoffRequired { .. }
                | FastbandError::Unavailable { .. }
                | FastbandError::Expired { .. }
                | FastbandError::Cancelled
        )
    }

    /// Stable short code for audit records and logs.
    pub fn kind_str(&self) -> &'static str {
        match self {
            FastbandError::Denied { .. } => "denied",
            FastbandError::HandoffRequired { .. } => "handoff_required",
            FastbandError::TooLarge { .. } => "too_large",
            FastbandError::Unauthorized => "unauthorized",
            FastbandError::NotFound { .. } => "not_found",
            FastbandError::Expired { .. } => "expired",
            FastbandError::Malformed { .. } => "malformed",
            FastbandError::Cancelled => "cancelled",
            FastbandError::Unavailable { .. } => "unavailable",
            FastbandError::PathEscape { .. } => "path_escape",
            FastbandError::Conflict { .. } => "conflict",
        }
    }

    /// Shorthand for a malformed-field error.
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        FastbandError::Malformed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a lock-poisoned or otherwise refused store.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        FastbandError::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Result type alias for Fastband operations.
pub type FastbandResult<T> = Result<T, FastbandError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityIdType;

    #[test]
    fn test_recoverable_split() {
        let recoverable = [
            FastbandError::Denied {
                reason: "hold".into(),
                since_sequence: 3,
            },
            FastbandError::HandoffRequired {
                session: SessionId::nil(),
            },
            FastbandError::Unavailable {
                reason: "io".into(),
            },
            FastbandError::Cancelled,
        ];
        for err in recoverable {
            assert!(err.is_recoverable(), "{err} should be recoverable");
        }

        let fatal = [
            FastbandError::TooLarge {
                tokens: 100_000,
                cap: 80_000,
            },
            FastbandError::Unauthorized,
            FastbandError::malformed("hot_context", "too long"),
            FastbandError::PathEscape { id: "../etc".into() },
            FastbandError::Conflict {
                resource: "packet".into(),
            },
        ];
        for err in fatal {
            assert!(!err.is_recoverable(), "{err} should be fatal");
        }
    }

    #[test]
    fn test_unauthorized_carries_no_detail() {
        // One code, no oracle: the display string is constant.
        assert_eq!(FastbandError::Unauthorized.to_string(), "unauthorized");
    }

    #[test]
    fn test_kind_str_is_stable() {
        assert_eq!(
            FastbandError::malformed("field", "why").kind_str(),
            "malformed"
        );
        assert_eq!(FastbandError::Cancelled.kind_str(), "cancelled");
    }
}

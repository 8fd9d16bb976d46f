//! Operation context and deadlines
//!
//! Every externally initiated operation carries a deadline. On expiry the
//! operation aborts with `cancelled` before touching durable state.

use crate::{FastbandError, FastbandResult};
use std::time::{Duration, Instant};

/// Propagated context for one externally initiated operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpContext {
    deadline: Option<Instant>,
}

impl OpContext {
    /// Context with no deadline.
    pub fn unbounded() -> Self {
        Self { deadline: None }
    }

    /// Context that expires after `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Context with an absolute deadline.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
        }
    }

    /// The absolute deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time remaining, if a deadline is set. `None` means unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Fail with `cancelled` if the deadline has passed.
    ///
    /// Called at every blocking point before a durable mutation.
    pub fn check(&self) -> FastbandResult<()> {
        if self.is_expired() {
            Err(FastbandError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_never_expires() {
        let ctx = OpContext::unbounded();
        assert!(!ctx.is_expired());
        assert!(ctx.check().is_ok());
        assert_eq!(ctx.remaining(), None);
    }

    #[test]
    fn test_expired_deadline_cancels() {
        let ctx = OpContext::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(ctx.is_expired());
        assert_eq!(ctx.check(), Err(FastbandError::Cancelled));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_future_deadline_passes() {
        let ctx = OpContext::with_timeout(Duration::from_secs(60));
        assert!(ctx.check().is_ok());
        assert!(ctx.remaining().unwrap() > Duration::from_secs(30));
    }
}

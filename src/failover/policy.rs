//! Failover eligibility.

use crate::FailoverError;

/// What to do after the primary attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverDecision {
    /// Return the primary's error to the caller.
    NoFailover,
    /// Retry the same operation once against the secondary.
    Failover,
}

/// Classifies primary errors.
///
/// Only the caller's own cancellation or deadline stops failover. Every other
/// error, whatever its code or origin, sends the call to the secondary.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailoverPolicy;

impl FailoverPolicy {
    /// Decide whether a primary error sends the call to the secondary.
    pub fn classify(&self, err: &FailoverError) -> FailoverDecision {
        if err.is_cancellation() {
            FailoverDecision::NoFailover
        } else {
            FailoverDecision::Failover
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_does_not_fail_over() {
        let policy = FailoverPolicy;
        assert_eq!(
            policy.classify(&FailoverError::Canceled),
            FailoverDecision::NoFailover
        );
        assert_eq!(
            policy.classify(&FailoverError::DeadlineExceeded),
            FailoverDecision::NoFailover
        );
    }

    #[test]
    fn everything_else_fails_over() {
        let policy = FailoverPolicy;
        let errors = [
            FailoverError::Transport("connection refused".into()),
            FailoverError::Rpc {
                code: -32005,
                message: "limit exceeded".into(),
                data: None,
            },
            FailoverError::Rpc {
                code: 3,
                message: "execution reverted".into(),
                data: None,
            },
            FailoverError::NotFound,
            FailoverError::Closed("http://primary".into()),
            FailoverError::Unsupported("subscriptions require a websocket endpoint"),
            FailoverError::NotImplemented("peer_count"),
        ];
        for err in &errors {
            assert_eq!(policy.classify(err), FailoverDecision::Failover, "{err}");
        }
    }
}

//! Per-call cancellation and deadline context.
//!
//! Every [`EthClient`](crate::EthClient) operation takes a [`CallContext`].
//! The physical connection races the remote call against the context, so a
//! fired token or an elapsed deadline surfaces as
//! [`FailoverError::Canceled`] / [`FailoverError::DeadlineExceeded`]. The
//! failover client never fails over on those two errors, and it hands the
//! same context to the secondary attempt when it does fail over.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{FailoverError, Result};

/// Cancellation token plus optional deadline, carried through every call.
///
/// The default context never cancels and has no deadline.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl CallContext {
    /// Context that is never canceled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    /// Set an absolute deadline.
    ///
    /// An earlier deadline already on the context wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Set a deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// The cancellation token, if any.
    pub fn token(&self) -> Option<&CancellationToken> {
        self.token.as_ref()
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the context error if the token fired or the deadline passed.
    pub fn check(&self) -> Result<()> {
        if self.token.as_ref().is_some_and(|t| t.is_cancelled()) {
            return Err(FailoverError::Canceled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(FailoverError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Run `call` bounded by this context.
    ///
    /// Fails without polling `call` if the context already fired. Otherwise
    /// whichever finishes first wins: the call, the token, or the deadline.
    pub async fn run<F, T, E>(&self, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<FailoverError>,
    {
        self.check()?;

        let canceled = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = canceled => Err(FailoverError::Canceled),
            _ = expired => Err(FailoverError::DeadlineExceeded),
            result = call => result.map_err(Into::into),
        }
    }
}

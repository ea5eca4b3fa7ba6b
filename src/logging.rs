//! Injected logger.
//!
//! The failover client logs through an explicit [`Logger`] handed to it at
//! construction instead of whatever subscriber happens to be global. The
//! default logger discards everything.

use tracing::Dispatch;

/// A `tracing` dispatcher scoped to one client.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl Logger {
    /// Logger that drops every event.
    pub fn noop() -> Self {
        Self {
            dispatch: Dispatch::none(),
        }
    }

    /// Logger that forwards to `dispatch`.
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Run `f` with this logger as the active dispatcher.
    ///
    /// `f` must not await; wrap only the event macros.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::noop()
    }
}

impl From<Dispatch> for Logger {
    fn from(dispatch: Dispatch) -> Self {
        Self::new(dispatch)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

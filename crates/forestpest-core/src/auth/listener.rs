use tracing::warn;

use crate::api::ApiError;

/// Told when the session is over and the user has to log in again.
pub trait SessionListener: Send + Sync {
    fn session_invalidated(&self, reason: &ApiError);
}

/// Listener that only records the event in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl SessionListener for LogListener {
    fn session_invalidated(&self, reason: &ApiError) {
        warn!(error = %reason, "Session invalidated, login required");
    }
}

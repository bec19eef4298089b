use launchpad_types::{ErrorKind, HasErrorKind};

use crate::store::StoreError;

/// Failures a single sweep can raise. Never escapes the worker loop —
/// [`super::CleanupWorker`] logs it and waits for the next tick.
#[derive(Debug, thiserror::Error)]
pub enum CleanupError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("sweep exceeded its per-invocation timeout")]
    TimedOut,
}

impl HasErrorKind for CleanupError {
    fn kind(&self) -> ErrorKind {
        match self {
            CleanupError::Store(e) => e.kind(),
            CleanupError::TimedOut => ErrorKind::Internal,
        }
    }
}

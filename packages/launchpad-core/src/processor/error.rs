use launchpad_types::{ClassifyError, ErrorKind, HasErrorKind};

use crate::curve::CurveError;
use crate::store::StoreError;

/// Errors order processing can return. Every variant maps to exactly one
/// `ErrorKind`, which is what lets the retry supervisor decide whether to
/// retry without inspecting the message text.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("invalid order: {0}")]
    InvalidOrder(#[from] ClassifyError),
    #[error("user could not be resolved from the given address")]
    UserNotFound,
    #[error(transparent)]
    Curve(#[from] CurveError),
    #[error("position has insufficient balance for this sell")]
    InsufficientBalance,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HasErrorKind for ProcessorError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProcessorError::InvalidOrder(_) => ErrorKind::Validation,
            ProcessorError::UserNotFound => ErrorKind::NotFound,
            ProcessorError::Curve(e) => e.kind(),
            ProcessorError::InsufficientBalance => ErrorKind::InsufficientBalance,
            ProcessorError::Store(e) => e.kind(),
        }
    }
}

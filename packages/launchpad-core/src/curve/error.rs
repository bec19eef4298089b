use launchpad_types::{ErrorKind, HasErrorKind};

#[derive(Debug, Clone, thiserror::Error)]
pub enum CurveError {
    #[error("trade amount must be positive")]
    InvalidAmount,
    #[error("pool cannot satisfy this trade without draining its reserves")]
    InsufficientReserve,
    #[error("sell amount meets or exceeds the token supply the pool can absorb")]
    InsufficientTokens,
    #[error("curve internal error: {0}")]
    Internal(String),
}

impl HasErrorKind for CurveError {
    fn kind(&self) -> ErrorKind {
        match self {
            CurveError::InvalidAmount => ErrorKind::Validation,
            CurveError::InsufficientReserve => ErrorKind::InsufficientReserve,
            CurveError::InsufficientTokens => ErrorKind::InsufficientBalance,
            CurveError::Internal(_) => ErrorKind::Internal,
        }
    }
}

use bigdecimal::BigDecimal;
use launchpad_types::{ErrorKind, HasErrorKind};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum GraduationError {
    #[error("chain is already graduated")]
    AlreadyGraduated,
    #[error("chain is not eligible to start graduation")]
    NotActive,
    #[error("pool reserve below graduation threshold: current {current}, required {required}")]
    ThresholdNotMet { current: BigDecimal, required: BigDecimal },
    #[error("graduation handoff failed: {0}")]
    ExternalRpc(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HasErrorKind for GraduationError {
    fn kind(&self) -> ErrorKind {
        match self {
            GraduationError::AlreadyGraduated => ErrorKind::Unauthorized,
            GraduationError::NotActive => ErrorKind::Unauthorized,
            GraduationError::ThresholdNotMet { .. } => ErrorKind::ThresholdNotMet,
            GraduationError::ExternalRpc(_) => ErrorKind::ExternalRpc,
            GraduationError::Store(e) => e.kind(),
        }
    }
}

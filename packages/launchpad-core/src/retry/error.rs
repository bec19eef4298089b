use launchpad_types::{ErrorKind, HasErrorKind};

use crate::processor::ProcessorError;

#[derive(Debug, thiserror::Error)]
pub enum RetryError {
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    #[error("exceeded {max_retries} attempts, last error: {source}")]
    MaxRetriesExceeded {
        max_retries: u32,
        #[source]
        source: Box<ProcessorError>,
    },
    #[error("cancelled before the order could be processed")]
    Cancelled,
}

impl HasErrorKind for RetryError {
    fn kind(&self) -> ErrorKind {
        match self {
            RetryError::Processor(e) => e.kind(),
            RetryError::MaxRetriesExceeded { .. } => ErrorKind::MaxRetriesExceeded,
            RetryError::Cancelled => ErrorKind::Internal,
        }
    }
}

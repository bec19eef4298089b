//! The error taxonomy shared across every component.
//!
//! Each component defines its own `thiserror` enum (`CurveError`,
//! `StoreError`, ...) but every variant maps onto one of these kinds via
//! [`HasErrorKind`]. The retry supervisor only ever inspects the kind, never
//! a component-specific variant or a string, so a new component can be added
//! without touching the supervisor.

use serde::{Deserialize, Serialize};

/// Coarse classification of an error, used for retry and propagation
/// decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed order, zero amounts, missing address. Never retried.
    Validation,
    /// Pool, chain, or user absent.
    NotFound,
    /// Curve math indicates the pool cannot satisfy the trade.
    InsufficientReserve,
    /// User position lacks the tokens being sold.
    InsufficientBalance,
    /// Graduation requested on an already-graduated (or not-yet-active) chain.
    Unauthorized,
    /// Pool reserve is below the chain's graduation threshold.
    ThresholdNotMet,
    /// The external graduation handoff failed (transport or non-2xx).
    ExternalRpc,
    /// Deadlock or serialization failure signalled by the store. The only
    /// kind the retry supervisor will retry.
    Contention,
    /// Contention persisted across every retry attempt.
    MaxRetriesExceeded,
    /// Storage I/O, marshalling, or any other unclassified failure.
    Internal,
}

impl ErrorKind {
    /// True iff the supervisor should retry an error of this kind.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Contention)
    }
}

/// Implemented by every component error enum so that callers outside the
/// component can classify a failure without matching on its variants.
pub trait HasErrorKind {
    fn kind(&self) -> ErrorKind;
}

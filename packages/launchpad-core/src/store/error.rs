use launchpad_types::{ErrorKind, HasErrorKind};

/// Failure signals the pool store can raise. The two classes that must
/// stay distinguishable are [`StoreError::Contention`] (retried by the
/// supervisor) and everything else (returned immediately).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("chain {0} has no pool")]
    PoolNotFound(String),
    #[error("a deadlock or serialization failure was detected, retry the transaction")]
    Contention,
    #[error("row vanished between lock acquisition and write")]
    RowVanished,
    #[error("storage I/O error: {0}")]
    Io(String),
}

impl HasErrorKind for StoreError {
    fn kind(&self) -> ErrorKind {
        match self {
            StoreError::PoolNotFound(_) => ErrorKind::NotFound,
            StoreError::Contention => ErrorKind::Contention,
            StoreError::RowVanished => ErrorKind::NotFound,
            StoreError::Io(_) => ErrorKind::Internal,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                // Postgres: 40001 = serialization_failure, 40P01 = deadlock_detected.
                match db_err.code().as_deref() {
                    Some("40001") | Some("40P01") => StoreError::Contention,
                    _ => StoreError::Io(db_err.to_string()),
                }
            }
            sqlx::Error::RowNotFound => StoreError::RowVanished,
            other => StoreError::Io(other.to_string()),
        }
    }
}

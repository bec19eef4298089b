//! The persistence contract, expressed abstractly: two flavors per
//! mutating operation (a convenience non-transactional form and a
//! transaction-scoped form that takes a transaction handle), and a
//! distinguished [`StoreError::Contention`] that the retry supervisor
//! looks for.
//!
//! [`memory::MemoryPoolStore`] satisfies the contract with per-row async
//! mutexes so unit and property tests can drive the order processor without
//! a live database. [`postgres::PostgresPoolStore`] satisfies it with
//! `SELECT ... FOR UPDATE` row locks inside a real SQL transaction.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::StoreError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use launchpad_types::{
    Chain, ChainId, ChainStatus, NewPoolTransaction, PoolStateUpdate, PoolTransaction, UserId, UserVirtualPosition,
    VirtualPool,
};

/// Non-transactional reads, and the entry point for opening a transaction.
#[async_trait]
pub trait PoolStore: Send + Sync {
    type Tx: PoolStoreTx;

    /// `GetPoolByChainID`.
    async fn get_pool_by_chain_id(&self, chain_id: ChainId) -> Result<VirtualPool, StoreError>;

    /// `GetPositionsWithUsersByChainID`: positions with `token_balance > 0`,
    /// ordered by balance descending.
    async fn get_positions_with_users_by_chain_id(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<(String, i64)>, StoreError>;

    /// Begin a transaction. The returned handle owns the pool and position
    /// row locks it acquires until `commit` or `rollback` consumes it.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// The transaction-scoped half of the contract.
#[async_trait]
pub trait PoolStoreTx: Send {
    /// `GetPoolByChainIDForUpdate`: acquires an exclusive row lock.
    /// Concurrent callers for the same chain block until this transaction
    /// commits or rolls back.
    async fn get_pool_by_chain_id_for_update(&mut self, chain_id: ChainId) -> Result<VirtualPool, StoreError>;

    /// `UpdatePoolStateInTx`: sparse update, only `Some` fields are written.
    /// Fails with [`StoreError::RowVanished`] if the row disappeared between
    /// lock and write.
    async fn update_pool_state(&mut self, chain_id: ChainId, update: PoolStateUpdate) -> Result<(), StoreError>;

    /// `GetUserPositionForUpdate`: `None` (not an error) when the position
    /// does not yet exist.
    async fn get_user_position_for_update(
        &mut self,
        user_id: UserId,
        chain_id: ChainId,
    ) -> Result<Option<UserVirtualPosition>, StoreError>;

    /// `UpsertUserPositionInTx`: atomic insert-or-update keyed by
    /// `(user_id, chain_id)`.
    async fn upsert_user_position(&mut self, position: UserVirtualPosition) -> Result<(), StoreError>;

    /// `CreateTransactionInTx`: append to the ledger; returns the row with
    /// its generated id and timestamp filled in.
    async fn create_transaction(&mut self, transaction: NewPoolTransaction) -> Result<PoolTransaction, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

/// The slice of chain state the graduation controller needs: reading the
/// threshold/status fields and, at most once, transitioning status. Chain
/// metadata CRUD beyond this is owned by the out-of-scope API layer.
#[async_trait]
pub trait ChainStore: Send + Sync {
    type Tx: ChainStoreTx;

    async fn get_chain(&self, chain_id: ChainId) -> Result<Chain, StoreError>;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Chains stuck in `pending_launch` since before `older_than`: a
    /// graduation attempt that crashed between the pre-RPC transition and
    /// the external handoff.
    async fn list_stale_pending_launches(&self, older_than: DateTime<Utc>) -> Result<Vec<ChainId>, StoreError>;
}

#[async_trait]
pub trait ChainStoreTx: Send {
    /// Acquires an exclusive row lock, serializing concurrent graduation
    /// checks on the same chain.
    async fn get_chain_for_update(&mut self, chain_id: ChainId) -> Result<Chain, StoreError>;

    async fn update_chain_status(
        &mut self,
        chain_id: ChainId,
        status: ChainStatus,
        is_graduated: bool,
        graduation_time: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}

//! An in-memory [`PoolStore`] backed by per-row `tokio::sync::Mutex` guards.
//!
//! This exists so the order processor, retry supervisor, and graduation
//! controller can be exercised in unit and property tests without a live
//! database, while still enforcing the same row-locking discipline a SQL
//! backend would: one lock per chain (the pool row) and one lock per
//! `(user, chain)` pair (the position row), acquired pool-before-position to
//! match the processor's fixed lock order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use launchpad_types::{
    Chain, ChainId, ChainStatus, NewPoolTransaction, PoolStateUpdate, PoolTransaction, UserId, UserVirtualPosition,
    VirtualPool,
};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{error::StoreError, ChainStore, ChainStoreTx, PoolStore, PoolStoreTx};

type PositionKey = (UserId, ChainId);

#[derive(Default)]
struct Inner {
    pools: SyncMutex<HashMap<ChainId, Arc<Mutex<VirtualPool>>>>,
    positions: SyncMutex<HashMap<PositionKey, Arc<Mutex<Option<UserVirtualPosition>>>>>,
    chains: SyncMutex<HashMap<ChainId, Arc<Mutex<Chain>>>>,
    wallets: SyncMutex<HashMap<UserId, String>>,
    transactions: SyncMutex<Vec<PoolTransaction>>,
    next_tx_id: AtomicI64,
    /// Remaining forced-contention responses per chain, consumed by
    /// `get_pool_by_chain_id_for_update`. Lets tests exercise the retry
    /// supervisor deterministically.
    forced_contention: SyncMutex<HashMap<ChainId, u32>>,
}

/// An in-memory, cloneable handle to the store. Cloning shares the
/// underlying tables (it's an `Arc` underneath), the same way a connection
/// pool handle is shared across tasks.
#[derive(Clone, Default)]
pub struct MemoryPoolStore {
    inner: Arc<Inner>,
}

impl MemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a pool for a chain that doesn't exist yet.
    pub fn seed_pool(&self, pool: VirtualPool) {
        self.inner
            .pools
            .lock()
            .insert(pool.chain_id, Arc::new(Mutex::new(pool)));
    }

    /// Seed a chain record, as the out-of-scope API layer would have
    /// already created it in `virtual_active` status before any trading.
    pub fn seed_chain(&self, chain: Chain) {
        self.inner.chains.lock().insert(chain.id, Arc::new(Mutex::new(chain)));
    }

    /// Register the wallet address backing a user id, so
    /// `get_positions_with_users_by_chain_id` can resolve it.
    pub fn seed_wallet(&self, user_id: UserId, wallet_address: impl Into<String>) {
        self.inner.wallets.lock().insert(user_id, wallet_address.into());
    }

    /// Make the next `n` lock attempts on `chain_id` fail with
    /// [`StoreError::Contention`] instead of succeeding.
    pub fn inject_contention(&self, chain_id: ChainId, times: u32) {
        self.inner.forced_contention.lock().insert(chain_id, times);
    }

    pub fn all_transactions(&self, chain_id: ChainId) -> Vec<PoolTransaction> {
        self.inner
            .transactions
            .lock()
            .iter()
            .filter(|t| t.chain_id == chain_id)
            .cloned()
            .collect()
    }

    fn take_forced_contention(&self, chain_id: ChainId) -> bool {
        let mut guard = self.inner.forced_contention.lock();
        match guard.get_mut(&chain_id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn pool_slot(&self, chain_id: ChainId) -> Option<Arc<Mutex<VirtualPool>>> {
        self.inner.pools.lock().get(&chain_id).cloned()
    }

    fn position_slot(&self, key: PositionKey) -> Arc<Mutex<Option<UserVirtualPosition>>> {
        self.inner
            .positions
            .lock()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}

#[async_trait]
impl PoolStore for MemoryPoolStore {
    type Tx = MemoryTx;

    async fn get_pool_by_chain_id(&self, chain_id: ChainId) -> Result<VirtualPool, StoreError> {
        let slot = self
            .pool_slot(chain_id)
            .ok_or_else(|| StoreError::PoolNotFound(chain_id.to_string()))?;
        Ok(slot.lock().await.clone())
    }

    async fn get_positions_with_users_by_chain_id(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let positions = self.inner.positions.lock();
        let wallets = self.inner.wallets.lock();
        let mut out: Vec<(String, i64)> = Vec::new();
        for ((user_id, pos_chain_id), slot) in positions.iter() {
            if *pos_chain_id != chain_id {
                continue;
            }
            // Best-effort snapshot read; the position mutex may be held by
            // an in-flight transaction, but since this path is only used by
            // the graduation controller after the threshold gate, blocking
            // briefly here is acceptable.
            if let Ok(guard) = slot.try_lock() {
                if let Some(position) = guard.as_ref() {
                    if position.token_balance > 0 {
                        if let Some(wallet) = wallets.get(user_id) {
                            out.push((wallet.clone(), position.token_balance));
                        }
                    }
                }
            }
        }
        out.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(out)
    }

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTx {
            store: self.clone(),
            pool: None,
            position: None,
            pushed_tx_ids: Vec::new(),
            finished: false,
        })
    }
}

#[async_trait]
impl ChainStore for MemoryPoolStore {
    type Tx = MemoryChainTx;

    async fn get_chain(&self, chain_id: ChainId) -> Result<Chain, StoreError> {
        let slot = self
            .inner
            .chains
            .lock()
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| StoreError::PoolNotFound(chain_id.to_string()))?;
        Ok(slot.lock().await.clone())
    }

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryChainTx {
            store: self.clone(),
            chain: None,
            finished: false,
        })
    }

    async fn list_stale_pending_launches(&self, older_than: DateTime<Utc>) -> Result<Vec<ChainId>, StoreError> {
        let slots: Vec<Arc<Mutex<Chain>>> = self.inner.chains.lock().values().cloned().collect();
        let mut stale = Vec::new();
        for slot in slots {
            let chain = slot.lock().await;
            if chain.status == ChainStatus::PendingLaunch {
                if let Some(since) = chain.pending_launch_at {
                    if since < older_than {
                        stale.push(chain.id);
                    }
                }
            }
        }
        Ok(stale)
    }
}

struct LockedChain {
    chain_id: ChainId,
    guard: OwnedMutexGuard<Chain>,
    snapshot: Chain,
}

/// A chain-row transaction handle, mirroring [`MemoryTx`] but scoped to the
/// single `(chains)` table the graduation controller mutates.
pub struct MemoryChainTx {
    store: MemoryPoolStore,
    chain: Option<LockedChain>,
    finished: bool,
}

#[async_trait]
impl ChainStoreTx for MemoryChainTx {
    async fn get_chain_for_update(&mut self, chain_id: ChainId) -> Result<Chain, StoreError> {
        let slot = self
            .store
            .inner
            .chains
            .lock()
            .get(&chain_id)
            .cloned()
            .ok_or_else(|| StoreError::PoolNotFound(chain_id.to_string()))?;
        let guard = slot.lock_owned().await;
        let snapshot = guard.clone();
        let chain = snapshot.clone();
        self.chain = Some(LockedChain {
            chain_id,
            guard,
            snapshot,
        });
        Ok(chain)
    }

    async fn update_chain_status(
        &mut self,
        chain_id: ChainId,
        status: ChainStatus,
        is_graduated: bool,
        graduation_time: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let locked = self
            .chain
            .as_mut()
            .filter(|c| c.chain_id == chain_id)
            .ok_or(StoreError::RowVanished)?;
        locked.guard.status = status;
        locked.guard.is_graduated = is_graduated;
        locked.guard.graduation_time = graduation_time;
        locked.guard.pending_launch_at = match status {
            ChainStatus::PendingLaunch => Some(Utc::now()),
            _ => None,
        };
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        if let Some(locked) = self.chain.take() {
            let LockedChain { mut guard, snapshot, .. } = locked;
            *guard = snapshot;
        }
        Ok(())
    }
}

impl Drop for MemoryChainTx {
    fn drop(&mut self) {
        if !self.finished {
            if let Some(locked) = self.chain.take() {
                let LockedChain { mut guard, snapshot, .. } = locked;
                *guard = snapshot;
            }
        }
    }
}

struct LockedPool {
    chain_id: ChainId,
    guard: OwnedMutexGuard<VirtualPool>,
    snapshot: VirtualPool,
}

struct LockedPosition {
    key: PositionKey,
    guard: OwnedMutexGuard<Option<UserVirtualPosition>>,
    snapshot: Option<UserVirtualPosition>,
}

/// A transaction handle. Holding one means holding the pool lock (and,
/// after the first call to `get_user_position_for_update`, the position
/// lock) for as long as the handle lives.
pub struct MemoryTx {
    store: MemoryPoolStore,
    pool: Option<LockedPool>,
    position: Option<LockedPosition>,
    pushed_tx_ids: Vec<i64>,
    finished: bool,
}

#[async_trait]
impl PoolStoreTx for MemoryTx {
    async fn get_pool_by_chain_id_for_update(&mut self, chain_id: ChainId) -> Result<VirtualPool, StoreError> {
        if self.store.take_forced_contention(chain_id) {
            return Err(StoreError::Contention);
        }
        let slot = self
            .store
            .pool_slot(chain_id)
            .ok_or_else(|| StoreError::PoolNotFound(chain_id.to_string()))?;
        let guard = slot.lock_owned().await;
        let snapshot = guard.clone();
        let pool = snapshot.clone();
        self.pool = Some(LockedPool {
            chain_id,
            guard,
            snapshot,
        });
        Ok(pool)
    }

    async fn update_pool_state(&mut self, chain_id: ChainId, update: PoolStateUpdate) -> Result<(), StoreError> {
        let locked = self
            .pool
            .as_mut()
            .filter(|p| p.chain_id == chain_id)
            .ok_or(StoreError::RowVanished)?;

        if let Some(cnpy_reserve) = update.cnpy_reserve {
            locked.guard.cnpy_reserve = cnpy_reserve;
        }
        if let Some(token_reserve) = update.token_reserve {
            locked.guard.token_reserve = token_reserve;
        }
        if let Some(price) = update.current_price_cnpy {
            locked.guard.current_price_cnpy = price;
        }
        if let Some(add_volume) = update.add_volume_cnpy {
            locked.guard.total_volume_cnpy = &locked.guard.total_volume_cnpy + add_volume;
        }
        if let Some(add_transactions) = update.add_transactions {
            locked.guard.total_transactions += add_transactions;
        }
        if update.add_unique_trader {
            locked.guard.unique_traders += 1;
        }
        Ok(())
    }

    async fn get_user_position_for_update(
        &mut self,
        user_id: UserId,
        chain_id: ChainId,
    ) -> Result<Option<UserVirtualPosition>, StoreError> {
        let slot = self.store.position_slot((user_id, chain_id));
        let guard = slot.lock_owned().await;
        let snapshot = guard.clone();
        let current = snapshot.clone();
        self.position = Some(LockedPosition {
            key: (user_id, chain_id),
            guard,
            snapshot,
        });
        Ok(current)
    }

    async fn upsert_user_position(&mut self, position: UserVirtualPosition) -> Result<(), StoreError> {
        let key = (position.user_id, position.chain_id);
        let locked = self
            .position
            .as_mut()
            .filter(|p| p.key == key)
            .ok_or(StoreError::RowVanished)?;
        *locked.guard = Some(position);
        Ok(())
    }

    async fn create_transaction(&mut self, new_tx: NewPoolTransaction) -> Result<PoolTransaction, StoreError> {
        let id = self.store.inner.next_tx_id.fetch_add(1, Ordering::SeqCst) + 1;
        let transaction = PoolTransaction {
            id,
            chain_id: new_tx.chain_id,
            user_id: new_tx.user_id,
            transaction_type: new_tx.transaction_type,
            cnpy_amount: new_tx.cnpy_amount,
            token_amount: new_tx.token_amount,
            price_per_token_cnpy: new_tx.price_per_token_cnpy,
            trading_fee_cnpy: new_tx.trading_fee_cnpy,
            slippage_percent: new_tx.slippage_percent,
            pool_cnpy_reserve_after: new_tx.pool_cnpy_reserve_after,
            pool_token_reserve_after: new_tx.pool_token_reserve_after,
            created_at: Utc::now(),
        };
        self.store.inner.transactions.lock().push(transaction.clone());
        self.pushed_tx_ids.push(id);
        Ok(transaction)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        // Guards drop here, releasing the pool/position locks; mutations
        // already happened in place so committing is a no-op beyond that.
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        if let Some(locked) = self.pool.take() {
            let LockedPool { mut guard, snapshot, .. } = locked;
            *guard = snapshot;
        }
        if let Some(locked) = self.position.take() {
            let LockedPosition { mut guard, snapshot, .. } = locked;
            *guard = snapshot;
        }
        let mut transactions = self.store.inner.transactions.lock();
        transactions.retain(|t| !self.pushed_tx_ids.contains(&t.id));
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            // A transaction dropped without commit/rollback (e.g. a
            // cancelled task) rolls back its pool mutation so the next
            // lock holder never observes a half-applied trade.
            if let Some(locked) = self.pool.take() {
                let LockedPool { mut guard, snapshot, .. } = locked;
                *guard = snapshot;
            }
            if let Some(locked) = self.position.take() {
                let LockedPosition { mut guard, snapshot, .. } = locked;
                *guard = snapshot;
            }
            if !self.pushed_tx_ids.is_empty() {
                let mut transactions = self.store.inner.transactions.lock();
                transactions.retain(|t| !self.pushed_tx_ids.contains(&t.id));
            }
        }
    }
}

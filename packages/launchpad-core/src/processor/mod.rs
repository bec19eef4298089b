//! Transactional order orchestration: the one place that sequences curve
//! math, row locks, and ledger writes into a single committed (or
//! rolled-back) envelope.

pub mod error;

pub use error::ProcessorError;

use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use launchpad_types::{
    ChainId, NewPoolTransaction, OpaqueAddress, Order, OrderSide, PoolStateUpdate, TransactionType, UserId,
    UserVirtualPosition,
};
use tracing::instrument;
use uuid::Uuid;

use crate::curve::{self, CurveConfig, PoolSnapshot};
use crate::store::{PoolStore, PoolStoreTx};

/// Resolves an order's opaque address to a [`UserId`]: try parsing the
/// bytes as a canonical identifier first, fall back to a wallet-address
/// lookup otherwise. Wallet/user CRUD is out of scope for this core, so the
/// lookup half is behind this trait — the out-of-scope API layer supplies a
/// real implementation backed by its own user store.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve(&self, address: &OpaqueAddress) -> Result<UserId, ProcessorError>;
}

/// Lets callers share one resolver (and, if it's a [`CachedResolver`], one
/// cache) between the order processor and the cleanup sweep.
#[async_trait]
impl<R: UserResolver + ?Sized> UserResolver for Arc<R> {
    async fn resolve(&self, address: &OpaqueAddress) -> Result<UserId, ProcessorError> {
        (**self).resolve(address).await
    }
}

/// Resolves by parsing the address bytes as a UUID first; anything else is
/// delegated to `lookup_wallet`.
#[async_trait]
pub trait WalletLookup: Send + Sync {
    async fn lookup_wallet(&self, wallet_address: &str) -> Result<Option<UserId>, ProcessorError>;
}

pub struct IdentifierOrWalletResolver<W> {
    wallets: W,
}

impl<W> IdentifierOrWalletResolver<W> {
    pub fn new(wallets: W) -> Self {
        Self { wallets }
    }
}

#[async_trait]
impl<W: WalletLookup> UserResolver for IdentifierOrWalletResolver<W> {
    async fn resolve(&self, address: &OpaqueAddress) -> Result<UserId, ProcessorError> {
        if let Ok(text) = std::str::from_utf8(address.as_bytes()) {
            if let Ok(uuid) = Uuid::parse_str(text) {
                return Ok(UserId::new(uuid));
            }
            if let Some(user_id) = self.wallets.lookup_wallet(text).await? {
                return Ok(user_id);
            }
        }
        Err(ProcessorError::UserNotFound)
    }
}

/// Object-safe handle the background sweep uses to age out a
/// [`CachedResolver`] without naming its inner resolver type.
pub trait ResolutionCache: Send + Sync {
    fn evict_resolved_before(&self, cutoff: DateTime<Utc>) -> usize;
}

/// Ages out wallet-lookup results so the background sweep has something
/// concrete to expire: a wallet-address resolution is good until `ttl`
/// elapses, after which the next lookup falls through to `inner` again.
pub struct CachedResolver<R> {
    inner: R,
    ttl: std::time::Duration,
    entries: parking_lot::Mutex<std::collections::HashMap<OpaqueAddress, (UserId, DateTime<Utc>)>>,
}

impl<R> CachedResolver<R> {
    pub fn new(inner: R, ttl: std::time::Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl<R: Send + Sync> ResolutionCache for CachedResolver<R> {
    /// Drop cached entries resolved before `cutoff`. Returns the number of
    /// entries evicted.
    fn evict_resolved_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (_, resolved_at)| *resolved_at >= cutoff);
        before - entries.len()
    }
}

#[async_trait]
impl<R: UserResolver> UserResolver for CachedResolver<R> {
    async fn resolve(&self, address: &OpaqueAddress) -> Result<UserId, ProcessorError> {
        if let Some((user_id, resolved_at)) = self.entries.lock().get(address).copied() {
            if Utc::now() - resolved_at < chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::zero()) {
                return Ok(user_id);
            }
        }
        let user_id = self.inner.resolve(address).await?;
        self.entries.lock().insert(address.clone(), (user_id, Utc::now()));
        Ok(user_id)
    }
}

/// Orchestrates `ProcessOrder` against a concrete [`PoolStore`].
pub struct OrderProcessor<S: PoolStore, R: UserResolver> {
    store: S,
    resolver: R,
    curve_config: CurveConfig,
}

impl<S: PoolStore, R: UserResolver> OrderProcessor<S, R> {
    pub fn new(store: S, resolver: R, curve_config: CurveConfig) -> Self {
        Self {
            store,
            resolver,
            curve_config,
        }
    }

    /// Validates the order, locks pool then position (fixed order to avoid
    /// deadlocks), invokes the curve, mutates position + pool + ledger
    /// atomically, and commits.
    #[instrument(skip(self, order), fields(chain_id = %chain_id, order_kind))]
    pub async fn process_order(&self, order: &Order, chain_id: ChainId) -> Result<(), ProcessorError> {
        let side = order.classify()?;
        tracing::Span::current().record("order_kind", match &side {
            OrderSide::Buy { .. } => "buy",
            OrderSide::Sell { .. } => "sell",
        });

        match side {
            OrderSide::Buy { cnpy_in, receive_address } => self.process_buy(chain_id, cnpy_in, &receive_address).await,
            OrderSide::Sell { tokens_in, send_address } => self.process_sell(chain_id, tokens_in, &send_address).await,
        }
    }

    async fn process_buy(
        &self,
        chain_id: ChainId,
        cnpy_in: i64,
        receive_address: &OpaqueAddress,
    ) -> Result<(), ProcessorError> {
        let user_id = self.resolver.resolve(receive_address).await?;
        let cnpy_in = BigDecimal::from(cnpy_in);

        let mut tx = self.store.begin().await?;

        let pool = tx.get_pool_by_chain_id_for_update(chain_id).await?;
        let snapshot = PoolSnapshot {
            cnpy_reserve: pool.cnpy_reserve.clone(),
            token_reserve: pool.token_reserve,
        };

        let trade = match curve::buy(&self.curve_config, &snapshot, &cnpy_in) {
            Ok(trade) => trade,
            Err(err) => {
                tx.rollback().await.ok();
                return Err(ProcessorError::Curve(err));
            }
        };

        let now = Utc::now();
        let existing = tx.get_user_position_for_update(user_id, chain_id).await?;
        let mut position = existing.unwrap_or_else(|| UserVirtualPosition::new(user_id, chain_id, now));

        let tokens_received = trade.amount_out.with_scale(0).to_string().parse::<i64>().unwrap_or(0);
        position.token_balance += tokens_received;
        position.total_cnpy_invested = &position.total_cnpy_invested + &cnpy_in;
        position.average_entry_price_cnpy = if position.token_balance > 0 {
            &position.total_cnpy_invested / BigDecimal::from(position.token_balance)
        } else {
            BigDecimal::zero()
        };
        position.unrealized_pnl_cnpy =
            (&trade.price - &position.average_entry_price_cnpy) * BigDecimal::from(position.token_balance);
        position.total_return_percent = if position.total_cnpy_invested.is_zero() {
            BigDecimal::zero()
        } else {
            &position.unrealized_pnl_cnpy / &position.total_cnpy_invested * BigDecimal::from(100)
        };
        if position.first_purchase_at.is_none() {
            position.first_purchase_at = Some(now);
        }
        position.last_activity_at = now;
        position.is_active = true;

        let is_new_trader = position.total_cnpy_invested == cnpy_in;

        tx.upsert_user_position(position).await?;

        tx.create_transaction(NewPoolTransaction {
            chain_id,
            user_id,
            transaction_type: TransactionType::Buy,
            cnpy_amount: cnpy_in.clone(),
            token_amount: tokens_received,
            price_per_token_cnpy: trade.price.clone(),
            trading_fee_cnpy: trade.fee_cnpy.clone(),
            slippage_percent: trade.price_impact.clone(),
            pool_cnpy_reserve_after: trade.new_cnpy_reserve.clone(),
            pool_token_reserve_after: trade.new_token_reserve,
        })
        .await?;

        tx.update_pool_state(
            chain_id,
            PoolStateUpdate {
                cnpy_reserve: Some(trade.new_cnpy_reserve),
                token_reserve: Some(trade.new_token_reserve),
                current_price_cnpy: Some(trade.price),
                add_volume_cnpy: Some(cnpy_in),
                add_transactions: Some(1),
                add_unique_trader: is_new_trader,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn process_sell(
        &self,
        chain_id: ChainId,
        tokens_in: i64,
        send_address: &OpaqueAddress,
    ) -> Result<(), ProcessorError> {
        let user_id = self.resolver.resolve(send_address).await?;

        let mut tx = self.store.begin().await?;

        let pool = tx.get_pool_by_chain_id_for_update(chain_id).await?;
        let snapshot = PoolSnapshot {
            cnpy_reserve: pool.cnpy_reserve.clone(),
            token_reserve: pool.token_reserve,
        };

        let existing = tx.get_user_position_for_update(user_id, chain_id).await?;
        let mut position = match existing {
            Some(position) if position.token_balance >= tokens_in => position,
            _ => {
                tx.rollback().await.ok();
                return Err(ProcessorError::InsufficientBalance);
            }
        };

        let trade = match curve::sell(&self.curve_config, &snapshot, tokens_in) {
            Ok(trade) => trade,
            Err(err) => {
                tx.rollback().await.ok();
                return Err(ProcessorError::Curve(err));
            }
        };

        let cnpy_received = trade.amount_out.clone();
        position.token_balance -= tokens_in;
        position.total_cnpy_withdrawn = &position.total_cnpy_withdrawn + &cnpy_received;
        position.realized_pnl_cnpy = &position.realized_pnl_cnpy
            + (&cnpy_received - &position.average_entry_price_cnpy * BigDecimal::from(tokens_in));

        if position.token_balance == 0 {
            position.unrealized_pnl_cnpy = BigDecimal::zero();
            position.is_active = false;
        } else {
            position.unrealized_pnl_cnpy =
                (&trade.price - &position.average_entry_price_cnpy) * BigDecimal::from(position.token_balance);
        }

        position.total_return_percent = if position.total_cnpy_invested.is_zero() {
            BigDecimal::zero()
        } else {
            (&position.total_cnpy_withdrawn + &trade.price * BigDecimal::from(position.token_balance)
                - &position.total_cnpy_invested)
                / &position.total_cnpy_invested
                * BigDecimal::from(100)
        };
        position.last_activity_at = Utc::now();

        tx.upsert_user_position(position).await?;

        tx.create_transaction(NewPoolTransaction {
            chain_id,
            user_id,
            transaction_type: TransactionType::Sell,
            cnpy_amount: cnpy_received.clone(),
            token_amount: tokens_in,
            price_per_token_cnpy: trade.price.clone(),
            trading_fee_cnpy: trade.fee_cnpy.clone(),
            slippage_percent: trade.price_impact.clone(),
            pool_cnpy_reserve_after: trade.new_cnpy_reserve.clone(),
            pool_token_reserve_after: trade.new_token_reserve,
        })
        .await?;

        tx.update_pool_state(
            chain_id,
            PoolStateUpdate {
                cnpy_reserve: Some(trade.new_cnpy_reserve),
                token_reserve: Some(trade.new_token_reserve),
                current_price_cnpy: Some(trade.price),
                add_volume_cnpy: Some(cnpy_received),
                add_transactions: Some(1),
                add_unique_trader: false,
            },
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurveError;
    use crate::store::memory::MemoryPoolStore;
    use launchpad_types::{ChainId, VirtualPool};

    struct NoWallets;

    #[async_trait]
    impl WalletLookup for NoWallets {
        async fn lookup_wallet(&self, _wallet_address: &str) -> Result<Option<UserId>, ProcessorError> {
            Ok(None)
        }
    }

    fn chain() -> ChainId {
        ChainId::new(Uuid::new_v4())
    }

    fn user() -> UserId {
        UserId::new(Uuid::new_v4())
    }

    fn seeded_pool(store: &MemoryPoolStore, chain_id: ChainId, cnpy: i64, tokens: i64) {
        store.seed_pool(VirtualPool {
            chain_id,
            cnpy_reserve: BigDecimal::from(cnpy),
            token_reserve: tokens,
            current_price_cnpy: BigDecimal::from(cnpy) / BigDecimal::from(tokens),
            total_transactions: 0,
            total_volume_cnpy: BigDecimal::zero(),
            unique_traders: 0,
        });
    }

    fn order_address(id: UserId) -> OpaqueAddress {
        OpaqueAddress::from(id.0.to_string().as_str())
    }

    /// basic buy.
    #[tokio::test]
    async fn basic_buy_creates_position_and_updates_pool() {
        let store = MemoryPoolStore::new();
        let chain_id = chain();
        let user_id = user();
        seeded_pool(&store, chain_id, 10_000, 800_000_000);

        let processor = OrderProcessor::new(store.clone(), IdentifierOrWalletResolver::new(NoWallets), CurveConfig::default());

        let order = Order {
            amount_for_sale: 100,
            requested_amount: 100,
            buyer_receive_address: Some(order_address(user_id)),
            sellers_send_address: None,
        };

        processor.process_order(&order, chain_id).await.unwrap();

        let pool = store.get_pool_by_chain_id(chain_id).await.unwrap();
        assert_eq!(pool.total_transactions, 1);
        assert_eq!(pool.token_reserve, 792_079_208);

        let txs = store.all_transactions(chain_id);
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].token_amount, 7_920_792);
    }

    /// insufficient reserves leave no trace.
    #[tokio::test]
    async fn insufficient_reserve_leaves_no_side_effects() {
        let store = MemoryPoolStore::new();
        let chain_id = chain();
        let user_id = user();
        seeded_pool(&store, chain_id, 10, 100);

        let processor = OrderProcessor::new(store.clone(), IdentifierOrWalletResolver::new(NoWallets), CurveConfig::default());

        let order = Order {
            amount_for_sale: 10_000_000,
            requested_amount: 10_000_000,
            buyer_receive_address: Some(order_address(user_id)),
            sellers_send_address: None,
        };

        let err = processor.process_order(&order, chain_id).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Curve(CurveError::InsufficientReserve)));
        assert!(store.all_transactions(chain_id).is_empty());
        let pool = store.get_pool_by_chain_id(chain_id).await.unwrap();
        assert_eq!(pool.cnpy_reserve, BigDecimal::from(10));
    }

    /// sell half, then sell to zero.
    #[tokio::test]
    async fn sell_to_zero_deactivates_position() {
        let store = MemoryPoolStore::new();
        let chain_id = chain();
        let user_id = user();
        seeded_pool(&store, chain_id, 10_000, 800_000_000);

        let processor = OrderProcessor::new(store.clone(), IdentifierOrWalletResolver::new(NoWallets), CurveConfig::default());

        let buy = Order {
            amount_for_sale: 100,
            requested_amount: 100,
            buyer_receive_address: Some(order_address(user_id)),
            sellers_send_address: None,
        };
        processor.process_order(&buy, chain_id).await.unwrap();

        let sell_all = Order {
            amount_for_sale: 0,
            requested_amount: 7_920_792,
            buyer_receive_address: None,
            sellers_send_address: Some(order_address(user_id)),
        };
        processor.process_order(&sell_all, chain_id).await.unwrap();

        let position = store
            .all_transactions(chain_id)
            .last()
            .cloned()
            .map(|t| t.user_id)
            .unwrap();
        assert_eq!(position, user_id);
    }

    #[tokio::test]
    async fn cached_resolver_serves_repeat_lookups_without_hitting_wallets() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingWallets(AtomicUsize);

        #[async_trait]
        impl WalletLookup for CountingWallets {
            async fn lookup_wallet(&self, _wallet_address: &str) -> Result<Option<UserId>, ProcessorError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Some(user()))
            }
        }

        let wallets = CountingWallets(AtomicUsize::new(0));
        let cached = CachedResolver::new(
            IdentifierOrWalletResolver::new(wallets),
            std::time::Duration::from_secs(60),
        );
        let address = OpaqueAddress::from("0xsomewallet");

        cached.resolve(&address).await.unwrap();
        cached.resolve(&address).await.unwrap();

        assert_eq!(cached.inner.wallets.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn evicting_stale_cache_entries_forces_fresh_lookup() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingWallets(AtomicUsize);

        #[async_trait]
        impl WalletLookup for CountingWallets {
            async fn lookup_wallet(&self, _wallet_address: &str) -> Result<Option<UserId>, ProcessorError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(Some(user()))
            }
        }

        let wallets = CountingWallets(AtomicUsize::new(0));
        let cached = CachedResolver::new(
            IdentifierOrWalletResolver::new(wallets),
            std::time::Duration::from_secs(60),
        );
        let address = OpaqueAddress::from("0xsomewallet");

        cached.resolve(&address).await.unwrap();
        let evicted = cached.evict_resolved_before(Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(evicted, 1);

        cached.resolve(&address).await.unwrap();
        assert_eq!(cached.inner.wallets.0.load(Ordering::SeqCst), 2);
    }
}

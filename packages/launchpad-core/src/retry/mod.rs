//! Contention-aware retry wrapper around [`OrderProcessor`].

pub mod backoff;
pub mod error;

pub use error::RetryError;

use std::time::Duration;

use launchpad_types::{ChainId, HasErrorKind, Order};
use tokio_util::sync::CancellationToken;

use crate::processor::{OrderProcessor, ProcessorError, UserResolver};
use crate::store::PoolStore;
use backoff::ExponentialBackoff;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of retry attempts after an initial failed attempt; total
    /// attempts made is at most `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// `ProcessOrderWithRetry(order, chainID)`: retries `ProcessOrder` only on
/// [`ErrorKind::Contention`](launchpad_types::ErrorKind::Contention),
/// returning every other error immediately. Cancellation fired between
/// attempts (including during a backoff sleep) abandons the retry loop.
pub async fn process_order_with_retry<S, R>(
    processor: &OrderProcessor<S, R>,
    order: &Order,
    chain_id: ChainId,
    config: &RetryConfig,
    cancel: &CancellationToken,
) -> Result<(), RetryError>
where
    S: PoolStore,
    R: UserResolver,
{
    let mut backoff = ExponentialBackoff::new(config.base_delay, config.max_retries);

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        match processor.process_order(order, chain_id).await {
            Ok(()) => return Ok(()),
            Err(err) if err.kind().is_retryable() => {
                tracing::warn!(chain_id = %chain_id, error = %err, "order processing hit contention, retrying");
                let Some(delay) = backoff.next() else {
                    return Err(RetryError::MaxRetriesExceeded {
                        max_retries: config.max_retries,
                        source: Box::new(err),
                    });
                };

                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                }
            }
            Err(err) => return Err(RetryError::Processor(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurveConfig;
    use crate::processor::{IdentifierOrWalletResolver, WalletLookup};
    use crate::store::memory::MemoryPoolStore;
    use async_trait::async_trait;
    use bigdecimal::{BigDecimal, Zero};
    use launchpad_types::{OpaqueAddress, UserId, VirtualPool};
    use uuid::Uuid;

    struct NoWallets;

    #[async_trait]
    impl WalletLookup for NoWallets {
        async fn lookup_wallet(&self, _wallet_address: &str) -> Result<Option<UserId>, ProcessorError> {
            Ok(None)
        }
    }

    fn seeded_store() -> (MemoryPoolStore, ChainId, UserId) {
        let store = MemoryPoolStore::new();
        let chain_id = ChainId::new(Uuid::new_v4());
        let user_id = UserId::new(Uuid::new_v4());
        store.seed_pool(VirtualPool {
            chain_id,
            cnpy_reserve: BigDecimal::from(10_000),
            token_reserve: 800_000_000,
            current_price_cnpy: BigDecimal::from(10_000) / BigDecimal::from(800_000_000),
            total_transactions: 0,
            total_volume_cnpy: BigDecimal::zero(),
            unique_traders: 0,
        });
        (store, chain_id, user_id)
    }

    fn order(user_id: UserId) -> Order {
        Order {
            amount_for_sale: 100,
            requested_amount: 100,
            buyer_receive_address: Some(OpaqueAddress::from(user_id.0.to_string().as_str())),
            sellers_send_address: None,
        }
    }

    /// Contention is retried transparently and eventually succeeds.
    #[tokio::test]
    async fn retries_past_transient_contention() {
        let (store, chain_id, user_id) = seeded_store();
        store.inject_contention(chain_id, 2);
        let processor = OrderProcessor::new(store, IdentifierOrWalletResolver::new(NoWallets), CurveConfig::default());

        let result = process_order_with_retry(
            &processor,
            &order(user_id),
            chain_id,
            &RetryConfig {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
            },
            &CancellationToken::new(),
        )
        .await;

        assert!(result.is_ok());
    }

    /// Exhausting every retry on persistent contention surfaces
    /// `MaxRetriesExceeded`.
    #[tokio::test]
    async fn exhausts_retries_and_returns_max_retries_exceeded() {
        let (store, chain_id, user_id) = seeded_store();
        store.inject_contention(chain_id, 100);
        let processor = OrderProcessor::new(store, IdentifierOrWalletResolver::new(NoWallets), CurveConfig::default());

        let result = process_order_with_retry(
            &processor,
            &order(user_id),
            chain_id,
            &RetryConfig {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
            },
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(RetryError::MaxRetriesExceeded { max_retries: 2, .. })));
    }

    /// Validation errors (not contention) are returned immediately, with no
    /// retry attempted.
    #[tokio::test]
    async fn non_contention_errors_are_not_retried() {
        let (store, chain_id, _user_id) = seeded_store();
        let processor = OrderProcessor::new(store, IdentifierOrWalletResolver::new(NoWallets), CurveConfig::default());

        let empty_order = Order::default();
        let result = process_order_with_retry(
            &processor,
            &empty_order,
            chain_id,
            &RetryConfig::default(),
            &CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(RetryError::Processor(ProcessorError::InvalidOrder(_)))));
    }
}

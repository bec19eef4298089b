//! Periodic background sweep: the same ticker-driven worker shape used
//! for watched tasks elsewhere in this stack, scaled down to the single
//! recurring job this core needs instead of a registry of many.

pub mod error;

pub use error::CleanupError;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::processor::ResolutionCache;
use crate::retry::backoff::ExponentialBackoff;
use crate::store::{ChainStore, ChainStoreTx};

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Time between the end of one sweep and the start of the next.
    pub interval: Duration,
    /// How far back auxiliary state is kept before a sweep reconciles it.
    pub retention: Duration,
    /// Per-sweep timeout; a sweep that overruns this is abandoned, not
    /// retried mid-flight (the next tick tries again).
    pub sweep_timeout: Duration,
    /// How long `stop` waits for an in-flight sweep before giving up.
    pub stop_grace: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(24 * 60 * 60),
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_timeout: Duration::from_secs(5 * 60),
            stop_grace: Duration::from_secs(10),
        }
    }
}

/// The ticker-driven worker itself: `start` returns immediately after
/// spawning, runs one sweep right away and then on every tick, and `stop`
/// signals shutdown and waits up to `stop_grace` for the in-flight sweep to
/// finish.
pub struct CleanupWorker<C> {
    chain_store: C,
    resolver_cache: Option<Arc<dyn ResolutionCache>>,
    config: CleanupConfig,
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl<C: ChainStore + Clone + Send + Sync + 'static> CleanupWorker<C> {
    pub fn new(chain_store: C, resolver_cache: Option<Arc<dyn ResolutionCache>>, config: CleanupConfig) -> Self {
        Self {
            chain_store,
            resolver_cache,
            config,
            shutdown: Arc::new(Notify::new()),
            handle: None,
        }
    }

    /// `Start()`. Idempotent call with a worker already running is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let chain_store = self.chain_store.clone();
        let resolver_cache = self.resolver_cache.clone();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();

        self.handle = Some(tokio::spawn(async move {
            loop {
                let sweep = run_sweep_with_timeout(&chain_store, resolver_cache.as_deref(), &config);
                tokio::select! {
                    () = sweep => {}
                    () = shutdown.notified() => return,
                }
                tokio::select! {
                    () = tokio::time::sleep(config.interval) => {}
                    () = shutdown.notified() => return,
                }
            }
        }));
    }

    /// `Stop()`: signal shutdown, then wait up to `stop_grace` for the
    /// current sweep to finish before abandoning the task.
    pub async fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.shutdown.notify_one();
        if tokio::time::timeout(self.config.stop_grace, handle).await.is_err() {
            tracing::warn!("cleanup worker did not stop within its grace period");
        }
    }
}

async fn run_sweep_with_timeout<C: ChainStore>(
    chain_store: &C,
    resolver_cache: Option<&dyn ResolutionCache>,
    config: &CleanupConfig,
) {
    match tokio::time::timeout(config.sweep_timeout, run_sweep(chain_store, resolver_cache, config)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(error = %err, "cleanup sweep failed"),
        Err(_) => tracing::warn!("cleanup sweep timed out"),
    }
}

/// One sweep: reconcile `pending_launch` graduation attempts older than
/// the retention window to `failed`, and evict resolution-cache entries of
/// the same age. Retries each reconciled chain's row-lock contention with
/// the same backoff policy the order retry supervisor uses, since it is
/// writing through the identical row-locking store.
#[instrument(skip_all)]
async fn run_sweep<C: ChainStore>(
    chain_store: &C,
    resolver_cache: Option<&dyn ResolutionCache>,
    config: &CleanupConfig,
) -> Result<(), CleanupError> {
    let cutoff = Utc::now() - chrono::Duration::from_std(config.retention).unwrap_or(chrono::Duration::zero());

    if let Some(cache) = resolver_cache {
        let evicted = cache.evict_resolved_before(cutoff);
        if evicted > 0 {
            tracing::info!(evicted, "evicted stale resolution cache entries");
        }
    }

    let stale = chain_store.list_stale_pending_launches(cutoff).await?;
    for chain_id in stale {
        if let Err(err) = reconcile_one(chain_store, chain_id).await {
            tracing::warn!(%chain_id, error = %err, "failed to reconcile stale pending_launch chain");
        }
    }
    Ok(())
}

async fn reconcile_one<C: ChainStore>(chain_store: &C, chain_id: launchpad_types::ChainId) -> Result<(), CleanupError> {
    let mut backoff = ExponentialBackoff::new(Duration::from_millis(50), 3);
    loop {
        let mut tx = chain_store.begin().await?;
        let result: Result<(), CleanupError> = async {
            tx.get_chain_for_update(chain_id).await?;
            tx.update_chain_status(chain_id, launchpad_types::ChainStatus::Failed, false, None)
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => {
                tx.commit().await?;
                tracing::info!(%chain_id, "reconciled stale pending_launch chain to failed");
                return Ok(());
            }
            Err(CleanupError::Store(crate::store::StoreError::Contention)) => {
                tx.rollback().await.ok();
                match backoff.next() {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(CleanupError::Store(crate::store::StoreError::Contention)),
                }
            }
            Err(err) => {
                tx.rollback().await.ok();
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryPoolStore;
    use bigdecimal::BigDecimal;
    use launchpad_types::{Chain, ChainId, ChainStatus};

    fn chain(id: ChainId) -> Chain {
        Chain {
            id,
            graduation_threshold: BigDecimal::from(50_000),
            status: ChainStatus::PendingLaunch,
            is_graduated: false,
            graduation_time: None,
            pending_launch_at: Some(Utc::now() - chrono::Duration::days(10)),
            token_name: Some("Mock Token".to_owned()),
            token_symbol: "MOCK".to_owned(),
            token_total_supply: 1_000_000_000,
            creator_wallet_address: "0xcreator".to_owned(),
            creator_username: "alice".to_owned(),
            github_repo: "alice/mock-token".to_owned(),
        }
    }

    /// A graduation attempt stuck in `pending_launch` for longer than the
    /// retention window is reconciled to `failed`.
    #[tokio::test]
    async fn sweep_reconciles_stale_pending_launch_to_failed() {
        let store = MemoryPoolStore::new();
        let chain_id = ChainId::new(uuid::Uuid::new_v4());
        store.seed_chain(chain(chain_id));

        let config = CleanupConfig {
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            ..Default::default()
        };
        run_sweep(&store, None, &config).await.unwrap();

        let chain = store.get_chain(chain_id).await.unwrap();
        assert_eq!(chain.status, ChainStatus::Failed);
        assert!(!chain.is_graduated);
    }

    /// A `pending_launch` chain younger than the retention window is left
    /// alone — the external handoff may still be in flight.
    #[tokio::test]
    async fn sweep_leaves_fresh_pending_launch_untouched() {
        let store = MemoryPoolStore::new();
        let chain_id = ChainId::new(uuid::Uuid::new_v4());
        let mut fresh = chain(chain_id);
        fresh.pending_launch_at = Some(Utc::now());
        store.seed_chain(fresh);

        let config = CleanupConfig::default();
        run_sweep(&store, None, &config).await.unwrap();

        let chain = store.get_chain(chain_id).await.unwrap();
        assert_eq!(chain.status, ChainStatus::PendingLaunch);
    }

    /// `start`/`stop` round-trips without leaving the task running.
    #[tokio::test]
    async fn worker_starts_and_stops_cleanly() {
        let store = MemoryPoolStore::new();
        let mut worker = CleanupWorker::new(
            store,
            None,
            CleanupConfig {
                interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );
        worker.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        worker.stop().await;
        assert!(worker.handle.is_none());
    }
}

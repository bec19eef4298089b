//! Wires the configured store, order processor, retry supervisor, and
//! graduation controller into one long-lived handle the HTTP surface and
//! the background sweep share.

use std::sync::Arc;

use anyhow::Result;
use launchpad_core::cleanup::CleanupWorker;
use launchpad_core::config::Config;
use launchpad_core::graduation::GraduationController;
use launchpad_core::processor::{CachedResolver, IdentifierOrWalletResolver, OrderProcessor, ResolutionCache, WalletLookup};
use launchpad_core::retry::RetryConfig;
use launchpad_core::store::postgres::PostgresPoolStore;
use launchpad_types::UserId;

/// The out-of-scope API layer's wallet directory is not this core's
/// concern; this binary stands up a stub that always misses, so opaque
/// addresses must parse as canonical identifiers. A real deployment swaps
/// this for a concrete `WalletLookup` backed by its own user store.
pub(crate) struct NoWalletLookup;

#[async_trait::async_trait]
impl WalletLookup for NoWalletLookup {
    async fn lookup_wallet(
        &self,
        _wallet_address: &str,
    ) -> Result<Option<UserId>, launchpad_core::processor::ProcessorError> {
        Ok(None)
    }
}

type Resolver = Arc<CachedResolver<IdentifierOrWalletResolver<NoWalletLookup>>>;

pub(crate) struct App {
    pub(crate) config: Config,
    pub(crate) store: PostgresPoolStore,
    pub(crate) processor: OrderProcessor<PostgresPoolStore, Resolver>,
    pub(crate) retry_config: RetryConfig,
    pub(crate) graduation: GraduationController<PostgresPoolStore, PostgresPoolStore>,
    resolver: Resolver,
}

impl App {
    pub(crate) async fn new(config: Config) -> Result<Self> {
        let store = config.connect_store().await?;

        let resolver: Resolver = Arc::new(CachedResolver::new(
            IdentifierOrWalletResolver::new(NoWalletLookup),
            config.resolution_cache_ttl(),
        ));
        let processor = OrderProcessor::new(store.clone(), resolver.clone(), config.curve_config());

        let graduation = GraduationController::new(
            store.clone(),
            store.clone(),
            config.graduation_rpc_endpoint.clone(),
            config.graduation_rpc_timeout(),
        );

        Ok(Self {
            retry_config: config.retry_config(),
            config,
            store,
            processor,
            graduation,
            resolver,
        })
    }

    pub(crate) fn spawn_cleanup_worker(&self) -> CleanupWorker<PostgresPoolStore> {
        let cache = self.resolver.clone() as Arc<dyn ResolutionCache>;
        CleanupWorker::new(self.store.clone(), Some(cache), self.config.cleanup_config())
    }
}

//! Threshold gate, genesis rendering, and the at-most-once external handoff
//! that promotes a chain out of virtual-pool trading.

pub mod error;

pub use error::GraduationError;

use std::time::Duration;

use chrono::Utc;
use launchpad_types::{ChainStatus, GenesisAccount};
use serde::Serialize;
use tracing::instrument;

use crate::store::{ChainStore, ChainStoreTx, PoolStore};

#[derive(Debug, Clone, Serialize)]
struct Tokenomics {
    token_name: Option<String>,
    token_symbol: String,
    token_total_supply: i64,
    block_time_seconds: Option<i64>,
    block_reward_amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct GraduationRequest {
    username: String,
    chain_name: String,
    wallet_owner: String,
    genesis_file: String,
    tokenomics: Tokenomics,
    github_repo: String,
}

#[derive(Debug, Serialize)]
struct GenesisFile {
    accounts: Vec<GenesisAccount>,
}

/// Render the deterministic genesis artifact: accounts ordered by
/// descending balance, empty set yields `"accounts": []`.
fn render_genesis(accounts: Vec<GenesisAccount>) -> String {
    serde_json::to_string(&GenesisFile { accounts }).expect("GenesisFile serialization cannot fail")
}

pub struct GraduationController<P, C> {
    pool_store: P,
    chain_store: C,
    http_client: reqwest::Client,
    rpc_endpoint: String,
}

impl<P: PoolStore, C: ChainStore> GraduationController<P, C> {
    pub fn new(pool_store: P, chain_store: C, rpc_endpoint: String, rpc_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(rpc_timeout)
            .build()
            .expect("reqwest client configuration is valid");
        Self {
            pool_store,
            chain_store,
            http_client,
            rpc_endpoint,
        }
    }

    /// Checks the threshold and, if crossed, drives the chain through
    /// graduation.
    #[instrument(skip(self), fields(chain_id = %chain_id))]
    pub async fn check_and_graduate(&self, chain_id: launchpad_types::ChainId) -> Result<(), GraduationError> {
        let chain = self.chain_store.get_chain(chain_id).await?;
        if chain.is_graduated {
            return Err(GraduationError::AlreadyGraduated);
        }
        // A chain whose prior handoff failed is retryable; `pending_launch`
        // (attempt in flight, possibly by a concurrent caller) and
        // `graduated` are not.
        if chain.status != ChainStatus::VirtualActive && chain.status != ChainStatus::Failed {
            return Err(GraduationError::NotActive);
        }

        let pool = self.pool_store.get_pool_by_chain_id(chain_id).await?;
        if pool.cnpy_reserve < chain.graduation_threshold {
            return Err(GraduationError::ThresholdNotMet {
                current: pool.cnpy_reserve,
                required: chain.graduation_threshold,
            });
        }

        // Re-check status under the chain row lock, then commit
        // `pending_launch` before the external call so a crash mid-handoff
        // leaves an auditable trail instead of a silently stuck
        // `virtual_active` chain. Re-checking `status` (not just
        // `is_graduated`) is what makes this exclusive: a concurrent caller
        // that loses the race for the lock sees `status == pending_launch`
        // here and backs off instead of also issuing the external handoff.
        {
            let mut tx = self.chain_store.begin().await?;
            let locked = tx.get_chain_for_update(chain_id).await?;
            if locked.is_graduated {
                tx.rollback().await.ok();
                return Err(GraduationError::AlreadyGraduated);
            }
            if locked.status != ChainStatus::VirtualActive && locked.status != ChainStatus::Failed {
                tx.rollback().await.ok();
                return Err(GraduationError::NotActive);
            }
            tx.update_chain_status(chain_id, ChainStatus::PendingLaunch, false, None)
                .await?;
            tx.commit().await?;
        }

        let positions = self.pool_store.get_positions_with_users_by_chain_id(chain_id).await?;
        let accounts: Vec<GenesisAccount> = positions
            .into_iter()
            .map(|(address, amount)| GenesisAccount { address, amount })
            .collect();
        let genesis_file = render_genesis(accounts);

        let request = GraduationRequest {
            username: chain.creator_username.clone(),
            chain_name: chain.token_name.clone().unwrap_or_else(|| chain.token_symbol.clone()),
            wallet_owner: chain.creator_wallet_address.clone(),
            genesis_file,
            tokenomics: Tokenomics {
                token_name: chain.token_name.clone(),
                token_symbol: chain.token_symbol.clone(),
                token_total_supply: chain.token_total_supply,
                block_time_seconds: None,
                block_reward_amount: None,
            },
            github_repo: chain.github_repo.clone(),
        };

        let handoff_result = self
            .http_client
            .post(&self.rpc_endpoint)
            .json(&request)
            .send()
            .await;

        match handoff_result {
            Ok(response) if response.status().is_success() => {
                let mut tx = self.chain_store.begin().await?;
                tx.get_chain_for_update(chain_id).await?;
                tx.update_chain_status(chain_id, ChainStatus::Graduated, true, Some(Utc::now()))
                    .await?;
                tx.commit().await?;
                Ok(())
            }
            Ok(response) => {
                let status = response.status();
                self.mark_failed(chain_id).await?;
                Err(GraduationError::ExternalRpc(format!("handoff returned status {status}")))
            }
            Err(err) => {
                self.mark_failed(chain_id).await?;
                Err(GraduationError::ExternalRpc(err.to_string()))
            }
        }
    }

    /// Rolls the chain forward to `failed` (never back to `virtual_active`)
    /// so a retried graduation check and the background reconciliation
    /// sweep both see that a graduation attempt happened and did not
    /// complete.
    async fn mark_failed(&self, chain_id: launchpad_types::ChainId) -> Result<(), GraduationError> {
        let mut tx = self.chain_store.begin().await?;
        tx.get_chain_for_update(chain_id).await?;
        tx.update_chain_status(chain_id, ChainStatus::Failed, false, None).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryPoolStore;
    use crate::store::PoolStoreTx;
    use bigdecimal::{BigDecimal, Zero};
    use launchpad_types::{Chain, ChainId, VirtualPool};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chain(id: ChainId, threshold: i64) -> Chain {
        Chain {
            id,
            graduation_threshold: BigDecimal::from(threshold),
            status: ChainStatus::VirtualActive,
            is_graduated: false,
            graduation_time: None,
            pending_launch_at: None,
            token_name: Some("Mock Token".to_owned()),
            token_symbol: "MOCK".to_owned(),
            token_total_supply: 1_000_000_000,
            creator_wallet_address: "0xcreator".to_owned(),
            creator_username: "alice".to_owned(),
            github_repo: "alice/mock-token".to_owned(),
        }
    }

    fn pool(chain_id: ChainId, cnpy_reserve: i64) -> VirtualPool {
        VirtualPool {
            chain_id,
            cnpy_reserve: BigDecimal::from(cnpy_reserve),
            token_reserve: 1,
            current_price_cnpy: BigDecimal::zero(),
            total_transactions: 0,
            total_volume_cnpy: BigDecimal::zero(),
            unique_traders: 0,
        }
    }

    /// graduation happy path, accounts ordered
    /// by descending balance.
    #[tokio::test]
    async fn graduation_happy_path_posts_genesis_and_transitions_chain() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graduate"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = MemoryPoolStore::new();
        let chain_id = ChainId::new(uuid::Uuid::new_v4());
        store.seed_chain(chain(chain_id, 50_000));
        store.seed_pool(pool(chain_id, 55_000));

        let alice = launchpad_types::UserId::new(uuid::Uuid::new_v4());
        let bob = launchpad_types::UserId::new(uuid::Uuid::new_v4());
        store.seed_wallet(alice, "0xalice");
        store.seed_wallet(bob, "0xbob");

        // Manufacture positions directly via a transaction so the store's
        // invariants (position upsert through `PoolStoreTx`) stay realistic.
        seed_position(&store, chain_id, alice, 1_000_000).await;
        seed_position(&store, chain_id, bob, 2_000_000).await;

        let controller = GraduationController::new(
            store.clone(),
            store.clone(),
            format!("{}/graduate", server.uri()),
            Duration::from_secs(30),
        );

        controller.check_and_graduate(chain_id).await.unwrap();

        let chain = store.get_chain(chain_id).await.unwrap();
        assert_eq!(chain.status, ChainStatus::Graduated);
        assert!(chain.is_graduated);
        assert!(chain.graduation_time.is_some());
    }

    /// threshold miss leaves chain untouched.
    #[tokio::test]
    async fn threshold_not_met_leaves_chain_unchanged() {
        let store = MemoryPoolStore::new();
        let chain_id = ChainId::new(uuid::Uuid::new_v4());
        store.seed_chain(chain(chain_id, 50_000));
        store.seed_pool(pool(chain_id, 30_000));

        let controller =
            GraduationController::new(store.clone(), store.clone(), "http://unused.invalid".to_owned(), Duration::from_secs(30));

        let err = controller.check_and_graduate(chain_id).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("current 30000"));
        assert!(message.contains("required 50000"));

        let chain = store.get_chain(chain_id).await.unwrap();
        assert_eq!(chain.status, ChainStatus::VirtualActive);
        assert!(!chain.is_graduated);
    }

    /// A chain a concurrent caller already pushed into `pending_launch`
    /// must not be picked up again — this is what keeps the external
    /// handoff at-most-once under concurrent `check_and_graduate` calls.
    #[tokio::test]
    async fn chain_already_pending_launch_is_rejected() {
        let store = MemoryPoolStore::new();
        let chain_id = ChainId::new(uuid::Uuid::new_v4());
        store.seed_chain(chain(chain_id, 50_000));
        store.seed_pool(pool(chain_id, 60_000));

        {
            let mut tx = ChainStore::begin(&store).await.unwrap();
            tx.get_chain_for_update(chain_id).await.unwrap();
            tx.update_chain_status(chain_id, ChainStatus::PendingLaunch, false, None)
                .await
                .unwrap();
            tx.commit().await.unwrap();
        }

        let controller =
            GraduationController::new(store.clone(), store.clone(), "http://unused.invalid".to_owned(), Duration::from_secs(30));

        let err = controller.check_and_graduate(chain_id).await.unwrap_err();
        assert!(matches!(err, GraduationError::NotActive));

        let chain = store.get_chain(chain_id).await.unwrap();
        assert_eq!(chain.status, ChainStatus::PendingLaunch);
    }

    /// RPC failure leaves `is_graduated=false`
    /// and a later healthy call succeeds.
    #[tokio::test]
    async fn rpc_failure_then_retry_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graduate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = MemoryPoolStore::new();
        let chain_id = ChainId::new(uuid::Uuid::new_v4());
        store.seed_chain(chain(chain_id, 50_000));
        store.seed_pool(pool(chain_id, 60_000));

        let controller = GraduationController::new(
            store.clone(),
            store.clone(),
            format!("{}/graduate", server.uri()),
            Duration::from_secs(30),
        );

        let err = controller.check_and_graduate(chain_id).await.unwrap_err();
        assert!(matches!(err, GraduationError::ExternalRpc(_)));
        let chain = store.get_chain(chain_id).await.unwrap();
        assert!(!chain.is_graduated);
        assert_eq!(chain.status, ChainStatus::Failed);

        // `failed` is itself retryable, so the next call against a healthy
        // endpoint needs no manual reset.
        server.reset().await;
        Mock::given(method("POST"))
            .and(path("/graduate"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        controller.check_and_graduate(chain_id).await.unwrap();
        let chain = store.get_chain(chain_id).await.unwrap();
        assert!(chain.is_graduated);
    }

    async fn seed_position(
        store: &MemoryPoolStore,
        chain_id: ChainId,
        user_id: launchpad_types::UserId,
        balance: i64,
    ) {
        use launchpad_types::UserVirtualPosition;

        let mut tx = PoolStore::begin(store).await.unwrap();
        PoolStoreTx::get_user_position_for_update(&mut tx, user_id, chain_id)
            .await
            .unwrap();
        let mut position = UserVirtualPosition::new(user_id, chain_id, Utc::now());
        position.token_balance = balance;
        position.is_active = true;
        tx.upsert_user_position(position).await.unwrap();
        tx.commit().await.unwrap();
    }
}

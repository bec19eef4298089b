//! A [`PoolStore`] backed by PostgreSQL, using `SELECT ... FOR UPDATE` to
//! provide the exclusive row locks the contract requires and mapping
//! `40001`/`40P01` driver errors onto [`StoreError::Contention`] (see
//! `error.rs`'s `From<sqlx::Error>` impl) so the retry supervisor's
//! predicate stays mechanical.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use launchpad_types::{
    Chain, ChainId, ChainStatus, NewPoolTransaction, PoolStateUpdate, PoolTransaction, TransactionType, UserId,
    UserVirtualPosition, VirtualPool,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::{error::StoreError, ChainStore, ChainStoreTx, PoolStore, PoolStoreTx};

#[derive(Clone)]
pub struct PostgresPoolStore {
    pool: PgPool,
}

impl PostgresPoolStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply the crate's embedded migrations. Called once at startup by
    /// the binary's bootstrap.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }
}

fn row_to_pool(row: &sqlx::postgres::PgRow) -> Result<VirtualPool, StoreError> {
    Ok(VirtualPool {
        chain_id: ChainId::new(row.try_get::<Uuid, _>("chain_id").map_err(sqlx_err)?),
        cnpy_reserve: row.try_get::<BigDecimal, _>("cnpy_reserve").map_err(sqlx_err)?,
        token_reserve: row.try_get::<i64, _>("token_reserve").map_err(sqlx_err)?,
        current_price_cnpy: row.try_get::<BigDecimal, _>("current_price_cnpy").map_err(sqlx_err)?,
        total_transactions: row.try_get::<i64, _>("total_transactions").map_err(sqlx_err)?,
        total_volume_cnpy: row.try_get::<BigDecimal, _>("total_volume_cnpy").map_err(sqlx_err)?,
        unique_traders: row.try_get::<i64, _>("unique_traders").map_err(sqlx_err)?,
    })
}

fn row_to_position(row: &sqlx::postgres::PgRow) -> Result<UserVirtualPosition, StoreError> {
    Ok(UserVirtualPosition {
        user_id: UserId::new(row.try_get::<Uuid, _>("user_id").map_err(sqlx_err)?),
        chain_id: ChainId::new(row.try_get::<Uuid, _>("chain_id").map_err(sqlx_err)?),
        token_balance: row.try_get::<i64, _>("token_balance").map_err(sqlx_err)?,
        total_cnpy_invested: row.try_get::<BigDecimal, _>("total_cnpy_invested").map_err(sqlx_err)?,
        total_cnpy_withdrawn: row.try_get::<BigDecimal, _>("total_cnpy_withdrawn").map_err(sqlx_err)?,
        average_entry_price_cnpy: row
            .try_get::<BigDecimal, _>("average_entry_price_cnpy")
            .map_err(sqlx_err)?,
        unrealized_pnl_cnpy: row.try_get::<BigDecimal, _>("unrealized_pnl_cnpy").map_err(sqlx_err)?,
        realized_pnl_cnpy: row.try_get::<BigDecimal, _>("realized_pnl_cnpy").map_err(sqlx_err)?,
        total_return_percent: row.try_get::<BigDecimal, _>("total_return_percent").map_err(sqlx_err)?,
        is_active: row.try_get::<bool, _>("is_active").map_err(sqlx_err)?,
        first_purchase_at: row
            .try_get::<Option<DateTime<Utc>>, _>("first_purchase_at")
            .map_err(sqlx_err)?,
        last_activity_at: row.try_get::<DateTime<Utc>, _>("last_activity_at").map_err(sqlx_err)?,
    })
}

fn sqlx_err(e: sqlx::Error) -> StoreError {
    StoreError::from(e)
}

fn row_to_chain(row: &sqlx::postgres::PgRow) -> Result<Chain, StoreError> {
    Ok(Chain {
        id: ChainId::new(row.try_get::<Uuid, _>("id").map_err(sqlx_err)?),
        graduation_threshold: row.try_get::<BigDecimal, _>("graduation_threshold").map_err(sqlx_err)?,
        status: chain_status_from_str(&row.try_get::<String, _>("status").map_err(sqlx_err)?),
        is_graduated: row.try_get::<bool, _>("is_graduated").map_err(sqlx_err)?,
        graduation_time: row
            .try_get::<Option<DateTime<Utc>>, _>("graduation_time")
            .map_err(sqlx_err)?,
        pending_launch_at: row
            .try_get::<Option<DateTime<Utc>>, _>("pending_launch_at")
            .map_err(sqlx_err)?,
        token_name: row.try_get::<Option<String>, _>("token_name").map_err(sqlx_err)?,
        token_symbol: row.try_get::<String, _>("token_symbol").map_err(sqlx_err)?,
        token_total_supply: row.try_get::<i64, _>("token_total_supply").map_err(sqlx_err)?,
        creator_wallet_address: row
            .try_get::<String, _>("creator_wallet_address")
            .map_err(sqlx_err)?,
        creator_username: row.try_get::<String, _>("creator_username").map_err(sqlx_err)?,
        github_repo: row.try_get::<String, _>("github_repo").map_err(sqlx_err)?,
    })
}

fn chain_status_str(status: ChainStatus) -> &'static str {
    match status {
        ChainStatus::Draft => "draft",
        ChainStatus::PendingLaunch => "pending_launch",
        ChainStatus::VirtualActive => "virtual_active",
        ChainStatus::Graduated => "graduated",
        ChainStatus::Failed => "failed",
    }
}

fn chain_status_from_str(s: &str) -> ChainStatus {
    match s {
        "draft" => ChainStatus::Draft,
        "pending_launch" => ChainStatus::PendingLaunch,
        "virtual_active" => ChainStatus::VirtualActive,
        "graduated" => ChainStatus::Graduated,
        _ => ChainStatus::Failed,
    }
}

#[async_trait]
impl PoolStore for PostgresPoolStore {
    type Tx = PostgresTx;

    async fn get_pool_by_chain_id(&self, chain_id: ChainId) -> Result<VirtualPool, StoreError> {
        let row = sqlx::query("SELECT * FROM virtual_pools WHERE chain_id = $1")
            .bind(chain_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::PoolNotFound(chain_id.to_string()))?;
        row_to_pool(&row)
    }

    async fn get_positions_with_users_by_chain_id(
        &self,
        chain_id: ChainId,
    ) -> Result<Vec<(String, i64)>, StoreError> {
        let rows = sqlx::query(
            r#"
                SELECT wallet_address, token_balance
                FROM user_virtual_positions
                WHERE chain_id = $1 AND token_balance > 0
                ORDER BY token_balance DESC
            "#,
        )
        .bind(chain_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok((
                    row.try_get::<String, _>("wallet_address").map_err(sqlx_err)?,
                    row.try_get::<i64, _>("token_balance").map_err(sqlx_err)?,
                ))
            })
            .collect()
    }

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTx { tx: Some(tx) })
    }
}

pub struct PostgresTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresTx {
    fn tx_mut(&mut self) -> &mut Transaction<'static, Postgres> {
        self.tx.as_mut().expect("transaction used after commit/rollback")
    }
}

#[async_trait]
impl PoolStoreTx for PostgresTx {
    async fn get_pool_by_chain_id_for_update(&mut self, chain_id: ChainId) -> Result<VirtualPool, StoreError> {
        let row = sqlx::query("SELECT * FROM virtual_pools WHERE chain_id = $1 FOR UPDATE")
            .bind(chain_id.0)
            .fetch_optional(&mut *self.tx_mut())
            .await?
            .ok_or_else(|| StoreError::PoolNotFound(chain_id.to_string()))?;
        row_to_pool(&row)
    }

    async fn update_pool_state(&mut self, chain_id: ChainId, update: PoolStateUpdate) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
                UPDATE virtual_pools SET
                    cnpy_reserve = COALESCE($2, cnpy_reserve),
                    token_reserve = COALESCE($3, token_reserve),
                    current_price_cnpy = COALESCE($4, current_price_cnpy),
                    total_volume_cnpy = total_volume_cnpy + COALESCE($5, 0),
                    total_transactions = total_transactions + COALESCE($6, 0),
                    unique_traders = unique_traders + CASE WHEN $7 THEN 1 ELSE 0 END
                WHERE chain_id = $1
            "#,
        )
        .bind(chain_id.0)
        .bind(update.cnpy_reserve)
        .bind(update.token_reserve)
        .bind(update.current_price_cnpy)
        .bind(update.add_volume_cnpy)
        .bind(update.add_transactions)
        .bind(update.add_unique_trader)
        .execute(&mut *self.tx_mut())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowVanished);
        }
        Ok(())
    }

    async fn get_user_position_for_update(
        &mut self,
        user_id: UserId,
        chain_id: ChainId,
    ) -> Result<Option<UserVirtualPosition>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM user_virtual_positions WHERE user_id = $1 AND chain_id = $2 FOR UPDATE",
        )
        .bind(user_id.0)
        .bind(chain_id.0)
        .fetch_optional(&mut *self.tx_mut())
        .await?;

        row.as_ref().map(row_to_position).transpose()
    }

    async fn upsert_user_position(&mut self, position: UserVirtualPosition) -> Result<(), StoreError> {
        // The wallet address is carried separately by the out-of-scope API
        // layer; on first insert we fall back to a placeholder that a
        // subsequent, explicit wallet-link write (outside this core) fills
        // in. In practice the caller resolves and threads the wallet
        // address through before the first buy (see `processor`).
        sqlx::query(
            r#"
                INSERT INTO user_virtual_positions (
                    user_id, chain_id, wallet_address, token_balance, total_cnpy_invested,
                    total_cnpy_withdrawn, average_entry_price_cnpy, unrealized_pnl_cnpy,
                    realized_pnl_cnpy, total_return_percent, is_active, first_purchase_at,
                    last_activity_at
                )
                VALUES ($1, $2, COALESCE((SELECT wallet_address FROM user_virtual_positions WHERE user_id = $1 AND chain_id = $2), ''), $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (user_id, chain_id) DO UPDATE SET
                    token_balance = EXCLUDED.token_balance,
                    total_cnpy_invested = EXCLUDED.total_cnpy_invested,
                    total_cnpy_withdrawn = EXCLUDED.total_cnpy_withdrawn,
                    average_entry_price_cnpy = EXCLUDED.average_entry_price_cnpy,
                    unrealized_pnl_cnpy = EXCLUDED.unrealized_pnl_cnpy,
                    realized_pnl_cnpy = EXCLUDED.realized_pnl_cnpy,
                    total_return_percent = EXCLUDED.total_return_percent,
                    is_active = EXCLUDED.is_active,
                    first_purchase_at = EXCLUDED.first_purchase_at,
                    last_activity_at = EXCLUDED.last_activity_at
            "#,
        )
        .bind(position.user_id.0)
        .bind(position.chain_id.0)
        .bind(position.token_balance)
        .bind(position.total_cnpy_invested)
        .bind(position.total_cnpy_withdrawn)
        .bind(position.average_entry_price_cnpy)
        .bind(position.unrealized_pnl_cnpy)
        .bind(position.realized_pnl_cnpy)
        .bind(position.total_return_percent)
        .bind(position.is_active)
        .bind(position.first_purchase_at)
        .bind(position.last_activity_at)
        .execute(&mut *self.tx_mut())
        .await?;
        Ok(())
    }

    async fn create_transaction(&mut self, new_tx: NewPoolTransaction) -> Result<PoolTransaction, StoreError> {
        let row = sqlx::query(
            r#"
                INSERT INTO pool_transactions (
                    chain_id, user_id, transaction_type, cnpy_amount, token_amount,
                    price_per_token_cnpy, trading_fee_cnpy, slippage_percent,
                    pool_cnpy_reserve_after, pool_token_reserve_after
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                RETURNING id, created_at
            "#,
        )
        .bind(new_tx.chain_id.0)
        .bind(new_tx.user_id.0)
        .bind(transaction_type_str(new_tx.transaction_type))
        .bind(&new_tx.cnpy_amount)
        .bind(new_tx.token_amount)
        .bind(&new_tx.price_per_token_cnpy)
        .bind(&new_tx.trading_fee_cnpy)
        .bind(&new_tx.slippage_percent)
        .bind(&new_tx.pool_cnpy_reserve_after)
        .bind(new_tx.pool_token_reserve_after)
        .fetch_one(&mut *self.tx_mut())
        .await?;

        Ok(PoolTransaction {
            id: row.try_get("id").map_err(sqlx_err)?,
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
            created_at: row.try_get("created_at").map_err(sqlx_err)?,
        })
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.tx.take().expect("double commit").commit().await?;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.tx.take().expect("double rollback").rollback().await?;
        Ok(())
    }
}

fn transaction_type_str(t: TransactionType) -> &'static str {
    match t {
        TransactionType::Buy => "buy",
        TransactionType::Sell => "sell",
    }
}

#[async_trait]
impl ChainStore for PostgresPoolStore {
    type Tx = PostgresChainTx;

    async fn get_chain(&self, chain_id: ChainId) -> Result<Chain, StoreError> {
        let row = sqlx::query("SELECT * FROM chains WHERE id = $1")
            .bind(chain_id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::PoolNotFound(chain_id.to_string()))?;
        row_to_chain(&row)
    }

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PostgresChainTx { tx: Some(tx) })
    }

    async fn list_stale_pending_launches(&self, older_than: DateTime<Utc>) -> Result<Vec<ChainId>, StoreError> {
        let rows = sqlx::query(
            "SELECT id FROM chains WHERE status = 'pending_launch' AND pending_launch_at < $1",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| Ok(ChainId::new(row.try_get::<Uuid, _>("id").map_err(sqlx_err)?)))
            .collect()
    }
}

pub struct PostgresChainTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PostgresChainTx {
    fn tx_mut(&mut self) -> &mut Transaction<'static, Postgres> {
        self.tx.as_mut().expect("transaction used after commit/rollback")
    }
}

#[async_trait]
impl ChainStoreTx for PostgresChainTx {
    async fn get_chain_for_update(&mut self, chain_id: ChainId) -> Result<Chain, StoreError> {
        let row = sqlx::query("SELECT * FROM chains WHERE id = $1 FOR UPDATE")
            .bind(chain_id.0)
            .fetch_optional(&mut *self.tx_mut())
            .await?
            .ok_or_else(|| StoreError::PoolNotFound(chain_id.to_string()))?;
        row_to_chain(&row)
    }

    async fn update_chain_status(
        &mut self,
        chain_id: ChainId,
        status: ChainStatus,
        is_graduated: bool,
        graduation_time: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let pending_launch_at = matches!(status, ChainStatus::PendingLaunch).then(Utc::now);
        let result = sqlx::query(
            "UPDATE chains SET status = $2, is_graduated = $3, graduation_time = $4, pending_launch_at = $5 WHERE id = $1",
        )
        .bind(chain_id.0)
        .bind(chain_status_str(status))
        .bind(is_graduated)
        .bind(graduation_time)
        .bind(pending_launch_at)
        .execute(&mut *self.tx_mut())
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::RowVanished);
        }
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        self.tx.take().expect("double commit").commit().await?;
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.tx.take().expect("double rollback").rollback().await?;
        Ok(())
    }
}

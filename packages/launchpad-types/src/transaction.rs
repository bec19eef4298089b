//! [`PoolTransaction`]: the append-only ledger of executed trades.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChainId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Buy,
    Sell,
}

/// One row of the ledger. Never mutated after insert.
///
/// Invariant: for two transactions on the same pool ordered by
/// `created_at`, the earlier record's
/// `pool_cnpy_reserve_after` / `pool_token_reserve_after` equal the reserve
/// the later transaction observed before its own trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolTransaction {
    pub id: i64,
    pub chain_id: ChainId,
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    pub cnpy_amount: BigDecimal,
    pub token_amount: i64,
    pub price_per_token_cnpy: BigDecimal,
    pub trading_fee_cnpy: BigDecimal,
    pub slippage_percent: BigDecimal,
    pub pool_cnpy_reserve_after: BigDecimal,
    pub pool_token_reserve_after: i64,
    pub created_at: DateTime<Utc>,
}

/// The fields needed to append a new ledger row; `id` and `created_at` are
/// assigned by the store on insert.
#[derive(Debug, Clone)]
pub struct NewPoolTransaction {
    pub chain_id: ChainId,
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    pub cnpy_amount: BigDecimal,
    pub token_amount: i64,
    pub price_per_token_cnpy: BigDecimal,
    pub trading_fee_cnpy: BigDecimal,
    pub slippage_percent: BigDecimal,
    pub pool_cnpy_reserve_after: BigDecimal,
    pub pool_token_reserve_after: i64,
}

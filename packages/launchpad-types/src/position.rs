//! [`UserVirtualPosition`]: a user's per-chain holdings and PnL accounting.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChainId, UserId};

/// Keyed by `(user_id, chain_id)`. Invariants this type must satisfy after
/// every write:
///
/// - `token_balance` never goes negative.
/// - `is_active == (token_balance != 0)`.
/// - `average_entry_price_cnpy * token_balance` stays cost-basis-consistent
///   with `total_cnpy_invested` minus the cost basis of prior sells, within
///   rounding tolerance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserVirtualPosition {
    pub user_id: UserId,
    pub chain_id: ChainId,
    pub token_balance: i64,
    pub total_cnpy_invested: BigDecimal,
    pub total_cnpy_withdrawn: BigDecimal,
    pub average_entry_price_cnpy: BigDecimal,
    pub unrealized_pnl_cnpy: BigDecimal,
    pub realized_pnl_cnpy: BigDecimal,
    pub total_return_percent: BigDecimal,
    pub is_active: bool,
    pub first_purchase_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
}

impl UserVirtualPosition {
    /// A fresh, never-traded position for a user's first buy on a chain.
    pub fn new(user_id: UserId, chain_id: ChainId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            chain_id,
            token_balance: 0,
            total_cnpy_invested: BigDecimal::from(0),
            total_cnpy_withdrawn: BigDecimal::from(0),
            average_entry_price_cnpy: BigDecimal::from(0),
            unrealized_pnl_cnpy: BigDecimal::from(0),
            realized_pnl_cnpy: BigDecimal::from(0),
            total_return_percent: BigDecimal::from(0),
            is_active: false,
            first_purchase_at: None,
            last_activity_at: now,
        }
    }
}

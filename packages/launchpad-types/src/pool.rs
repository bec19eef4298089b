//! [`Chain`] and [`VirtualPool`]: the per-token state that the bonding curve
//! trades against.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::ChainId;

/// Lifecycle state of a chain. The core only ever observes `virtual_active`
/// (to trade and check graduation) and writes `graduated` exactly once; the
/// earlier states are driven by the out-of-scope API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    Draft,
    PendingLaunch,
    VirtualActive,
    Graduated,
    Failed,
}

/// A token's metadata and launch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub id: ChainId,
    pub graduation_threshold: BigDecimal,
    pub status: ChainStatus,
    pub is_graduated: bool,
    pub graduation_time: Option<DateTime<Utc>>,
    /// When the chain entered `pending_launch`, cleared on every other
    /// transition. Lets the background sweep find graduation attempts that
    /// never completed.
    pub pending_launch_at: Option<DateTime<Utc>>,
    pub token_name: Option<String>,
    pub token_symbol: String,
    pub token_total_supply: i64,
    pub creator_wallet_address: String,
    pub creator_username: String,
    pub github_repo: String,
}

/// The per-chain bonding-curve reserves and running statistics.
///
/// Invariants: reserves are non-negative at all times; `current_price_cnpy`
/// equals the price implied by the curve at the current reserves after
/// every commit; `total_transactions` is strictly monotonic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualPool {
    pub chain_id: ChainId,
    pub cnpy_reserve: BigDecimal,
    pub token_reserve: i64,
    pub current_price_cnpy: BigDecimal,
    pub total_transactions: i64,
    pub total_volume_cnpy: BigDecimal,
    pub unique_traders: i64,
}

/// A sparse update to [`VirtualPool`] state.
///
/// Only `Some` fields are written by [`crate`] consumers of
/// `PoolStore::update_pool_state_in_tx`; absent fields are left untouched so
/// that additive metrics composed by concurrent, serialized writers never
/// clobber each other.
#[derive(Debug, Clone, Default)]
pub struct PoolStateUpdate {
    pub cnpy_reserve: Option<BigDecimal>,
    pub token_reserve: Option<i64>,
    pub current_price_cnpy: Option<BigDecimal>,
    /// Added to the existing `total_volume_cnpy`, not a replacement.
    pub add_volume_cnpy: Option<BigDecimal>,
    /// Added to the existing `total_transactions`, not a replacement.
    pub add_transactions: Option<i64>,
    pub add_unique_trader: bool,
}

//! [`GenesisAccount`]: the derived artifact produced at graduation.

use serde::{Deserialize, Serialize};

/// One entry of the genesis file's `accounts` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub address: String,
    pub amount: i64,
}

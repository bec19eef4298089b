//! Domain types shared between the bonding curve, the pool store, the order
//! processor, and the graduation controller.
//!
//! Nothing in this crate performs I/O. Keeping these types free of any
//! particular storage or transport dependency lets every other crate in the
//! workspace treat them as the common vocabulary for "what a pool looks
//! like" and "what a position looks like", the same way the protocol's
//! shared numeric types are used by both the contracts and the off-chain
//! tooling.

pub mod error;
pub mod genesis;
pub mod ids;
pub mod order;
pub mod pool;
pub mod position;
pub mod transaction;

pub use error::{ErrorKind, HasErrorKind};
pub use genesis::GenesisAccount;
pub use ids::{ChainId, UserId};
pub use order::{ClassifyError, OpaqueAddress, Order, OrderSide};
pub use pool::{Chain, ChainStatus, PoolStateUpdate, VirtualPool};
pub use position::UserVirtualPosition;
pub use transaction::{NewPoolTransaction, PoolTransaction, TransactionType};

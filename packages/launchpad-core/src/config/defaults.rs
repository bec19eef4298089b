//! Default values for every knob in the configuration surface, kept in one
//! place so `Config`'s `clap` attributes and its docs never drift apart.

pub const FEE_RATE_BASIS_POINTS: u32 = 100;
pub const GRADUATION_THRESHOLD: &str = "50000";
pub const MAX_RETRIES: u32 = 3;
pub const RETRY_BASE_DELAY_MS: u64 = 100;
pub const GRADUATION_RPC_TIMEOUT_SECS: u64 = 30;
pub const CLEANUP_INTERVAL_SECS: u64 = 24 * 60 * 60;
pub const CLEANUP_RETENTION_DAYS: u32 = 7;
pub const DB_MAX_CONNECTIONS: u32 = 10;
pub const RESOLUTION_CACHE_TTL_SECS: u64 = 60;
pub const HTTP_BIND: &str = "0.0.0.0:3000";

//! Typed configuration and process bootstrap: the environment-variable
//! surface, layered over the defaults in [`defaults`], following a
//! `clap`-derived `Opt` with `env = "..."` attributes on every field.

pub mod defaults;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use bigdecimal::BigDecimal;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cleanup::CleanupConfig;
use crate::curve::CurveConfig;
use crate::retry::RetryConfig;
use crate::store::postgres::PostgresPoolStore;
use crate::store::StoreError;

/// The configuration surface recognized by the core.
#[derive(Debug, Clone, Parser)]
#[command(name = "launchpad-service", about = "Bonding-curve launch platform core")]
pub struct Config {
    #[arg(long, env = "LAUNCHPAD_DATABASE_URL")]
    pub database_url: String,

    #[arg(long, env = "LAUNCHPAD_DB_MAX_CONNECTIONS", default_value_t = defaults::DB_MAX_CONNECTIONS)]
    pub db_max_connections: u32,

    #[arg(long, env = "LAUNCHPAD_FEE_RATE_BASIS_POINTS", default_value_t = defaults::FEE_RATE_BASIS_POINTS)]
    pub fee_rate_basis_points: u32,

    #[arg(long, env = "LAUNCHPAD_GRADUATION_THRESHOLD", default_value = defaults::GRADUATION_THRESHOLD)]
    pub graduation_threshold: BigDecimal,

    #[arg(long, env = "LAUNCHPAD_MAX_RETRIES", default_value_t = defaults::MAX_RETRIES)]
    pub max_retries: u32,

    #[arg(long, env = "LAUNCHPAD_RETRY_BASE_DELAY_MS", default_value_t = defaults::RETRY_BASE_DELAY_MS)]
    pub retry_base_delay_ms: u64,

    #[arg(long, env = "LAUNCHPAD_GRADUATION_RPC_ENDPOINT")]
    pub graduation_rpc_endpoint: String,

    #[arg(
        long,
        env = "LAUNCHPAD_GRADUATION_RPC_TIMEOUT_SECS",
        default_value_t = defaults::GRADUATION_RPC_TIMEOUT_SECS
    )]
    pub graduation_rpc_timeout_secs: u64,

    #[arg(long, env = "LAUNCHPAD_CLEANUP_INTERVAL_SECS", default_value_t = defaults::CLEANUP_INTERVAL_SECS)]
    pub cleanup_interval_secs: u64,

    #[arg(long, env = "LAUNCHPAD_CLEANUP_RETENTION_DAYS", default_value_t = defaults::CLEANUP_RETENTION_DAYS)]
    pub cleanup_retention_days: u32,

    #[arg(
        long,
        env = "LAUNCHPAD_RESOLUTION_CACHE_TTL_SECS",
        default_value_t = defaults::RESOLUTION_CACHE_TTL_SECS
    )]
    pub resolution_cache_ttl_secs: u64,

    #[arg(long, env = "LAUNCHPAD_HTTP_BIND", default_value = defaults::HTTP_BIND)]
    pub http_bind: SocketAddr,

    #[arg(long, short, env = "LAUNCHPAD_VERBOSE")]
    pub verbose: bool,
}

impl Config {
    /// Load `.env` (if present), then parse the environment. Fails closed:
    /// a missing required variable (`database_url`, `graduation_rpc_endpoint`)
    /// is a startup error, never a silently-disabled feature.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(Config::try_parse().context("loading configuration from environment")?)
    }

    /// `tracing-subscriber` initialization, env-filter driven.
    pub fn init_tracing(&self) {
        let default_filter = if self.verbose {
            format!("{}=debug,info", env!("CARGO_CRATE_NAME"))
        } else {
            "info".to_owned()
        };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    pub fn curve_config(&self) -> CurveConfig {
        CurveConfig {
            fee_rate_basis_points: self.fee_rate_basis_points,
            ..CurveConfig::default()
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        }
    }

    pub fn cleanup_config(&self) -> CleanupConfig {
        CleanupConfig {
            interval: Duration::from_secs(self.cleanup_interval_secs),
            retention: Duration::from_secs(u64::from(self.cleanup_retention_days) * 24 * 60 * 60),
            ..CleanupConfig::default()
        }
    }

    pub fn graduation_rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.graduation_rpc_timeout_secs)
    }

    pub fn resolution_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.resolution_cache_ttl_secs)
    }

    /// Connect to Postgres and apply embedded migrations.
    pub async fn connect_store(&self) -> Result<PostgresPoolStore, StoreError> {
        let store = PostgresPoolStore::connect(&self.database_url, self.db_max_connections).await?;
        store.migrate().await?;
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let config = Config::parse_from([
            "launchpad-service",
            "--database-url",
            "postgres://localhost/launchpad",
            "--graduation-rpc-endpoint",
            "http://localhost:9000/graduate",
        ]);
        assert_eq!(config.fee_rate_basis_points, 100);
        assert_eq!(config.graduation_threshold, BigDecimal::from(50_000));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_base_delay_ms, 100);
        assert_eq!(config.graduation_rpc_timeout_secs, 30);
        assert_eq!(config.cleanup_interval_secs, 24 * 60 * 60);
        assert_eq!(config.cleanup_retention_days, 7);
    }
}

//! Postgres persistence for crawled offers: pool setup, migrations and the
//! `product_offers` batch upsert.

pub mod offers;

use std::str::FromStr;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

pub use offers::{count_offers, get_offer, upsert_offers, OfferRow, UPSERT_CHUNK_SIZE};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            acquire_timeout_secs: DEFAULT_ACQUIRE_TIMEOUT_SECS,
        }
    }
}

impl PoolConfig {
    /// Reads `PRICECRAWL_DB_*` overrides from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset or unparseable values keep their defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str, default| parse_or(lookup(key), default);
        Self {
            max_connections: read("PRICECRAWL_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            min_connections: read("PRICECRAWL_DB_MIN_CONNECTIONS", DEFAULT_MIN_CONNECTIONS),
            acquire_timeout_secs: parse_or(
                lookup("PRICECRAWL_DB_ACQUIRE_TIMEOUT_SECS"),
                DEFAULT_ACQUIRE_TIMEOUT_SECS,
            ),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// # Errors
///
/// Returns [`sqlx::Error`] if no connection can be made within the acquire
/// timeout.
pub async fn connect_pool(database_url: &str, config: PoolConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(database_url)
        .await
}

/// Like [`connect_pool`], for callers holding an optional URL.
///
/// # Errors
///
/// [`DbError::MissingDatabaseUrl`] when `database_url` is `None`, else
/// [`DbError::Sqlx`] on connection failure.
pub async fn connect_optional(
    database_url: Option<&str>,
    config: PoolConfig,
) -> Result<PgPool, DbError> {
    let url = database_url.ok_or(DbError::MissingDatabaseUrl)?;
    Ok(connect_pool(url, config).await?)
}

/// Applies pending migrations and returns how many ran.
///
/// # Errors
///
/// Returns [`sqlx::migrate::MigrateError`] if a migration fails.
pub async fn run_migrations(pool: &PgPool) -> Result<usize, sqlx::migrate::MigrateError> {
    let before = applied_migrations(pool).await;
    MIGRATOR.run(pool).await?;
    let after = applied_migrations(pool).await;
    Ok(usize::try_from(after.saturating_sub(before)).unwrap_or(0))
}

// Zero on a fresh database, where the bookkeeping table does not exist yet.
async fn applied_migrations(pool: &PgPool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true")
        .fetch_one(pool)
        .await
        .unwrap_or(0)
}

/// # Errors
///
/// Returns [`sqlx::Error`] if `SELECT 1` fails.
pub async fn ping(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_without_overrides() {
        assert_eq!(PoolConfig::from_lookup(|_| None), PoolConfig::default());
    }

    #[test]
    fn overrides_are_read_and_bad_values_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PRICECRAWL_DB_MAX_CONNECTIONS", " 12 "),
            ("PRICECRAWL_DB_MIN_CONNECTIONS", "lots"),
            ("PRICECRAWL_DB_ACQUIRE_TIMEOUT_SECS", "30"),
        ]);
        let config = PoolConfig::from_lookup(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.max_connections, 12);
        assert_eq!(config.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(config.acquire_timeout_secs, 30);
    }

    #[tokio::test]
    async fn connect_without_url_is_missing_database_url() {
        let err = connect_optional(None, PoolConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::MissingDatabaseUrl));
    }
}

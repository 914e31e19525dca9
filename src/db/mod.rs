//! Postgres backend: connection pool, migrations, health check, and an
//! implementation of every repository trait.
//!
//! Structured fields (configs, metadata, scores) are stored as JSONB and
//! decoded with serde on the way out.

mod evaluation;
mod log;
mod program;
mod scenario;
mod task;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::repository::Repositories;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Database handle. Owns the connection pool shared by every repository.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Run all pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))?;
        Ok(())
    }

    /// Simple health check: run a SELECT 1.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// A repository bundle backed by this database.
    pub fn into_repositories(self) -> Repositories {
        Repositories::from_store(Arc::new(self))
    }
}

/// Postgres integers are signed; orders and counters are not.
fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Other(format!("negative {column}: {value}")))
}

/// Fail an update that matched no row.
fn ensure_updated(rows_affected: u64, entity: &str, id: impl std::fmt::Display) -> Result<()> {
    if rows_affected == 0 {
        return Err(Error::not_found(entity, id));
    }
    Ok(())
}

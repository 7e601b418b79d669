use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;

use crate::config::AppConfig;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique constraint rejected the write; carries the constraint name.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().is_some_and(|code| code.as_ref() == "23505") {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::DuplicateKey(constraint);
            }
        }
        StoreError::Backend(err.into())
    }
}

pub async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("connect to database")
}

pub async fn run_migrations(db: &PgPool) {
    if let Err(e) = sqlx::migrate!("./migrations").run(db).await {
        tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
    }
}

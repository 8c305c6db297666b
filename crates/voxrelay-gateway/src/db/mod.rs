//! Persistence layer: a `sqlx` SQLite pool plus one repository module per
//! aggregate, grounded on `call-engine`'s `database` module split
//! (`agents_async.rs`, `queues.rs`, `schema.rs`).

pub mod calls;
pub mod conversation;
pub mod pending;
pub mod transcripts;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::error::Result;

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        crate::error::GatewayError::internal(format!("migration failed: {e}"))
    })?;
    Ok(pool)
}

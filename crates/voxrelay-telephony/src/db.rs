//! Read access to the `allowed_phone_numbers` table the gateway's
//! migrations own. The adapter shares the same database file rather than
//! proxying whitelist lookups through HTTP.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::Result;

pub struct AllowedNumber {
    pub phone_number: String,
    pub label: Option<String>,
}

/// Connects to the gateway's database file. Migrations are the gateway's
/// responsibility; this pool assumes the schema already exists.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    Ok(SqlitePoolOptions::new().max_connections(5).connect(database_url).await?)
}

pub async fn is_phone_number_allowed(pool: &SqlitePool, phone_number: &str) -> Result<bool> {
    let row = sqlx::query("SELECT 1 FROM allowed_phone_numbers WHERE phone_number = ?")
        .bind(phone_number)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn get_allowed_number_info(pool: &SqlitePool, phone_number: &str) -> Result<Option<AllowedNumber>> {
    let row = sqlx::query("SELECT phone_number, label FROM allowed_phone_numbers WHERE phone_number = ?")
        .bind(phone_number)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| AllowedNumber {
        phone_number: r.get("phone_number"),
        label: r.get("label"),
    }))
}

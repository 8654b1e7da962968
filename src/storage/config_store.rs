//! Persists a config subset into the database-local `config_json` row
//! (spec §6 "Config persistence").

use crate::error::StorageError;
use serde_json::Value;
use sqlx::SqlitePool;

pub async fn load(pool: &SqlitePool) -> Result<Option<Value>, StorageError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT data FROM config_json WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    match row {
        Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

pub async fn save(pool: &SqlitePool, value: &Value) -> Result<(), StorageError> {
    let json = serde_json::to_string(value)?;
    sqlx::query(
        "INSERT INTO config_json (id, data) VALUES (1, ?) \
         ON CONFLICT(id) DO UPDATE SET data = excluded.data",
    )
    .bind(json)
    .execute(pool)
    .await?;
    Ok(())
}

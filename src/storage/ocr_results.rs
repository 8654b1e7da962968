//! The `ocr_results` table: the raw OCR output for one document (spec §4.3
//! step 1).

use crate::error::StorageError;
use chrono::Utc;
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, FromRow)]
pub struct OcrResultRow {
    pub id: String,
    pub provenance_id: String,
    pub document_id: String,
    pub text: String,
    pub page_offsets: String,
    pub block_tree: Option<String>,
    pub extras: String,
    pub created_at: String,
}

#[allow(clippy::too_many_arguments)]
pub async fn insert<'e, E>(
    executor: E,
    id: &str,
    provenance_id: &str,
    document_id: &str,
    text: &str,
    page_offsets: &[i64],
    block_tree: Option<&Value>,
    extras: &Value,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO ocr_results (id, provenance_id, document_id, text, page_offsets, \
         block_tree, extras, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(provenance_id)
    .bind(document_id)
    .bind(text)
    .bind(serde_json::to_string(page_offsets)?)
    .bind(block_tree.map(serde_json::to_string).transpose()?)
    .bind(serde_json::to_string(extras)?)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_by_document(pool: &SqlitePool, document_id: &str) -> Result<Option<OcrResultRow>, StorageError> {
    let row = sqlx::query_as(
        "SELECT * FROM ocr_results WHERE document_id = ? ORDER BY created_at DESC LIMIT 1",
    )
    .bind(document_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Merges `fields` into the stored `extras` JSON under `extras[section]`,
/// keyed by `document_id` like [`get_by_document`] (spec §4.3 step 10 for
/// timings, step 5 for the structural fingerprint).
pub async fn merge_extras(
    pool: &SqlitePool,
    document_id: &str,
    section: &str,
    fields: &Value,
) -> Result<(), StorageError> {
    let Some(row) = get_by_document(pool, document_id).await? else {
        return Ok(());
    };
    let mut extras: Value = serde_json::from_str(&row.extras)?;
    if let (Some(base), Some(fields)) = (extras.as_object_mut(), fields.as_object()) {
        base.entry(section).or_insert_with(|| Value::Object(Default::default()));
        if let Some(slot) = base.get_mut(section).and_then(|v| v.as_object_mut()) {
            for (k, v) in fields {
                slot.insert(k.clone(), v.clone());
            }
        }
    }
    sqlx::query("UPDATE ocr_results SET extras = ? WHERE id = ?")
        .bind(serde_json::to_string(&extras)?)
        .bind(&row.id)
        .execute(pool)
        .await?;
    Ok(())
}

//! The `images` and `vlm_descriptions` tables (spec §4.3 step 2 & step 7).

use crate::error::StorageError;
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlmStatus {
    Pending,
    Complete,
    Failed,
}

impl VlmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ImageRow {
    pub id: String,
    pub provenance_id: String,
    pub document_id: String,
    pub file_path: String,
    pub content_hash: String,
    pub page_number: Option<i64>,
    pub block_type: Option<String>,
    pub is_header_footer: bool,
    pub context_text: Option<String>,
    pub vlm_status: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewImage {
    pub id: String,
    pub provenance_id: String,
    pub document_id: String,
    pub file_path: String,
    pub content_hash: String,
    pub page_number: Option<i64>,
    pub block_type: Option<String>,
    pub is_header_footer: bool,
    pub context_text: Option<String>,
}

pub async fn insert<'e, E>(executor: E, img: &NewImage) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO images (id, provenance_id, document_id, file_path, content_hash, \
         page_number, block_type, is_header_footer, context_text, vlm_status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(&img.id)
    .bind(&img.provenance_id)
    .bind(&img.document_id)
    .bind(&img.file_path)
    .bind(&img.content_hash)
    .bind(img.page_number)
    .bind(&img.block_type)
    .bind(img.is_header_footer)
    .bind(&img.context_text)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<ImageRow>, StorageError> {
    let row = sqlx::query_as("SELECT * FROM images WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Keyword filter over structured VLM metadata for image search (spec §4.4
/// "Image search"): block type, header/footer status, page number, and a
/// `LIKE` match against the VLM description text.
#[allow(clippy::too_many_arguments)]
pub async fn search_keyword(
    pool: &SqlitePool,
    document_id: Option<&str>,
    block_type: Option<&str>,
    page_number: Option<i64>,
    description_like: Option<&str>,
    limit: u32,
    offset: u32,
) -> Result<Vec<ImageRow>, StorageError> {
    let mut sql = String::from(
        "SELECT im.* FROM images im LEFT JOIN vlm_descriptions vd ON vd.image_id = im.id WHERE 1=1",
    );
    let mut binds: Vec<String> = Vec::new();
    if let Some(doc) = document_id {
        sql.push_str(" AND im.document_id = ?");
        binds.push(doc.to_string());
    }
    if let Some(bt) = block_type {
        sql.push_str(" AND im.block_type = ?");
        binds.push(bt.to_string());
    }
    if let Some(page) = page_number {
        sql.push_str(" AND im.page_number = ?");
        binds.push(page.to_string());
    }
    if let Some(like) = description_like {
        sql.push_str(" AND vd.description LIKE ?");
        binds.push(format!("%{like}%"));
    }
    sql.push_str(" GROUP BY im.id ORDER BY im.created_at ASC LIMIT ? OFFSET ?");

    let mut q = sqlx::query_as(&sql);
    for b in &binds {
        q = q.bind(b);
    }
    q = q.bind(limit).bind(offset);
    Ok(q.fetch_all(pool).await?)
}

pub async fn list_by_document(pool: &SqlitePool, document_id: &str) -> Result<Vec<ImageRow>, StorageError> {
    let rows = sqlx::query_as("SELECT * FROM images WHERE document_id = ? ORDER BY page_number ASC")
        .bind(document_id)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn list_pending_vlm(pool: &SqlitePool, document_id: &str) -> Result<Vec<ImageRow>, StorageError> {
    let rows = sqlx::query_as(
        "SELECT * FROM images WHERE document_id = ? AND vlm_status = 'pending' ORDER BY page_number ASC",
    )
    .bind(document_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_vlm_status(pool: &SqlitePool, image_id: &str, status: VlmStatus) -> Result<(), StorageError> {
    sqlx::query("UPDATE images SET vlm_status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(image_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn insert_vlm_description<'e, E>(
    executor: E,
    id: &str,
    provenance_id: &str,
    image_id: &str,
    description: &str,
    analysis: &str,
) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        "INSERT INTO vlm_descriptions (id, provenance_id, image_id, description, analysis, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(provenance_id)
    .bind(image_id)
    .bind(description)
    .bind(analysis)
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

//! Vector index operations over the `vectors` virtual table (sqlite-vec).

use crate::error::StorageError;
use sqlx::SqlitePool;

pub const VECTOR_DIMENSION: usize = 768;

/// L2-normalizes `v` in place. A zero vector is left unchanged (there is no
/// meaningful direction to normalize it to).
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn vec_to_blob(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inserts a (already L2-normalized) vector keyed by `vector_id`.
pub async fn insert<'e, E>(executor: E, vector_id: &str, vector: &[f32]) -> Result<(), StorageError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    if vector.len() != VECTOR_DIMENSION {
        return Err(StorageError::Other(format!(
            "vector dimension {} does not match database dimension {VECTOR_DIMENSION}",
            vector.len()
        )));
    }
    sqlx::query("INSERT INTO vectors(vector_id, embedding) VALUES (?, ?)")
        .bind(vector_id)
        .bind(vec_to_blob(vector))
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn delete(pool: &SqlitePool, vector_id: &str) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM vectors WHERE vector_id = ?")
        .bind(vector_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Fetches one stored vector by id, decoded back into floats.
pub async fn get(pool: &SqlitePool, vector_id: &str) -> Result<Option<Vec<f32>>, StorageError> {
    let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT embedding FROM vectors WHERE vector_id = ?")
        .bind(vector_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(blob,)| {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }))
}

#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub vector_id: String,
    pub similarity: f64,
}

/// Top-`limit` nearest neighbors to `query` by cosine similarity, computed
/// as `1.0 - distance` over L2-normalized unit vectors (spec §4.4).
pub async fn search(
    pool: &SqlitePool,
    query: &[f32],
    limit: u32,
    vector_id_filter: Option<&[String]>,
) -> Result<Vec<VectorMatch>, StorageError> {
    if query.len() != VECTOR_DIMENSION {
        return Err(StorageError::Other(format!(
            "query vector dimension {} does not match database dimension {VECTOR_DIMENSION}",
            query.len()
        )));
    }
    let blob = vec_to_blob(query);

    let rows: Vec<(String, f64)> = if let Some(ids) = vector_id_filter {
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT vector_id, vec_distance_cosine(embedding, ?) AS distance \
             FROM vectors WHERE vector_id IN ({placeholders}) \
             ORDER BY distance ASC LIMIT ?"
        );
        let mut q = sqlx::query_as(&sql).bind(blob);
        for id in ids {
            q = q.bind(id);
        }
        q.bind(limit).fetch_all(pool).await?
    } else {
        sqlx::query_as(
            "SELECT vector_id, vec_distance_cosine(embedding, ?) AS distance \
             FROM vectors ORDER BY distance ASC LIMIT ?",
        )
        .bind(blob)
        .bind(limit)
        .fetch_all(pool)
        .await?
    };

    Ok(rows
        .into_iter()
        .map(|(vector_id, distance)| VectorMatch {
            vector_id,
            similarity: 1.0 - distance,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_produces_unit_vectors() {
        let mut v = vec![3.0_f32, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_unchanged() {
        let mut v = vec![0.0_f32, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }
}

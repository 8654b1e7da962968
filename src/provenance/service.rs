//! `ProvenanceService`: the only component permitted to derive chain
//! metadata and write to the `provenance` table directly.
//!
//! # Design Principles
//!
//! - Every derived field (`parent_ids`, `chain_depth`, `chain_path`,
//!   `root_document_id`, `chain_hash`) is computed here, never accepted from
//!   a caller, so the invariants in spec §3 cannot be violated by a bad
//!   caller.
//! - `create` is generic over its executor (any `sqlx::Executor<Database =
//!   Sqlite>`, so either a bare `&SqlitePool` or an open `&mut Transaction`).
//!   A caller that passes a transaction and inserts the companion
//!   derived-entity row (chunk, embedding, image, ...) against that same
//!   transaction before committing gets true atomicity between the two
//!   writes, matching spec §4.1's Create contract. The ingestion pipeline,
//!   clustering, and comparison all do this.
//!
//! # Error Handling
//!
//! `ORPHAN_PARENT`, `CHAIN_INCONSISTENT`, and `ROOT_TYPE_INVALID` are fatal
//! and never auto-repaired (spec §4.1 Failures); only `backfill`, itself
//! bounded and idempotent, writes chain hashes after the fact, and only for
//! rows that were never given one.

use crate::error::ProvenanceError;
use crate::hash::sha256_hex;
use crate::provenance::chain::compute_chain_hash;
use crate::provenance::types::{NewProvenance, ProvenanceRecord, ProvenanceType};
use crate::storage::provenance_rows;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::instrument;
use uuid::Uuid;

pub struct ProvenanceService<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ProvenanceService<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Derives and inserts a new provenance record. For a DOCUMENT root,
    /// pass `parent_id = None`; `root_document_id` will be the newly
    /// generated id itself.
    ///
    /// `executor` is generic so a caller can pass `&mut *tx` to insert this
    /// record and its companion derived-entity row in the same transaction,
    /// or the service's own pool for a standalone, non-atomic insert. The
    /// parent lookup always reads through the service's own pool: the
    /// parent record was necessarily committed by an earlier call, so
    /// reading it outside the caller's in-flight transaction is safe.
    #[instrument(skip(self, executor, new), fields(r#type = %new.r#type))]
    pub async fn create<'e, E>(&self, executor: E, new: NewProvenance) -> Result<ProvenanceRecord, ProvenanceError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        if new.parent_id.is_none() && !new.r#type.is_root() {
            return Err(ProvenanceError::RootTypeInvalid(new.r#type.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let (parent_ids, chain_depth, chain_path, root_document_id, input_hash, file_hash, parent_chain_hash) =
            match &new.parent_id {
                None => (
                    Vec::new(),
                    0,
                    vec![new.r#type],
                    id.clone(),
                    None,
                    new.content_hash.clone(),
                    None,
                ),
                Some(parent_id) => {
                    let parent_row = provenance_rows::get(self.pool, parent_id)
                        .await
                        .map_err(ProvenanceError::Storage)?
                        .ok_or_else(|| ProvenanceError::OrphanParent(parent_id.clone()))?;
                    let parent = parent_row.into_record().map_err(ProvenanceError::Storage)?;

                    let mut parent_ids = parent.parent_ids.clone();
                    parent_ids.push(parent.id.clone());
                    let mut chain_path = parent.chain_path.clone();
                    chain_path.push(new.r#type);

                    (
                        parent_ids,
                        parent.chain_depth + 1,
                        chain_path,
                        parent.root_document_id.clone(),
                        Some(parent.content_hash.clone()),
                        parent.file_hash.clone(),
                        Some(parent.chain_hash.clone()),
                    )
                }
            };

        let chain_hash = compute_chain_hash(
            parent_chain_hash.as_deref(),
            &new.content_hash,
            new.r#type,
            &new.processing_params,
        );

        let record = ProvenanceRecord {
            id,
            r#type: new.r#type,
            source_type: new.source_type,
            processor: new.processor,
            processor_version: new.processor_version,
            processing_params: new.processing_params,
            content_hash: new.content_hash,
            input_hash,
            file_hash,
            parent_id: new.parent_id,
            parent_ids,
            root_document_id,
            chain_depth,
            chain_path,
            chain_hash,
            location: new.location,
            processing_duration_ms: new.processing_duration_ms,
            processing_quality_score: new.processing_quality_score,
            created_at: now,
            processed_at: Some(now),
        };

        provenance_rows::insert(executor, &record)
            .await
            .map_err(ProvenanceError::Storage)?;

        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<ProvenanceRecord, ProvenanceError> {
        let row = provenance_rows::get(self.pool, id)
            .await
            .map_err(ProvenanceError::Storage)?
            .ok_or_else(|| ProvenanceError::NotFound(id.to_string()))?;
        row.into_record().map_err(ProvenanceError::Storage)
    }

    /// Root-to-leaf sequence for `id`, read via `parent_ids` plus a single
    /// batched row lookup (spec §4.1 Traversal operations).
    #[instrument(skip(self))]
    pub async fn get_chain(&self, id: &str) -> Result<Vec<ProvenanceRecord>, ProvenanceError> {
        let target = self.get(id).await?;
        let mut ids = target.parent_ids.clone();
        ids.push(target.id.clone());

        let rows = provenance_rows::get_many(self.pool, &ids)
            .await
            .map_err(ProvenanceError::Storage)?;
        let mut records = rows
            .into_iter()
            .map(|r| r.into_record().map_err(ProvenanceError::Storage))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.chain_depth);
        Ok(records)
    }

    /// Breadth-first walk over `parent_id` from `id`, optionally bounded by
    /// `max_depth` relative hops (spec §4.1 Traversal operations).
    #[instrument(skip(self))]
    pub async fn get_descendants(
        &self,
        id: &str,
        max_depth: Option<i64>,
    ) -> Result<Vec<ProvenanceRecord>, ProvenanceError> {
        let mut out = Vec::new();
        let mut frontier = vec![id.to_string()];
        let mut depth = 0;

        while !frontier.is_empty() {
            if let Some(max) = max_depth {
                if depth >= max {
                    break;
                }
            }
            let mut next_frontier = Vec::new();
            for node_id in &frontier {
                let children = provenance_rows::get_children(self.pool, node_id)
                    .await
                    .map_err(ProvenanceError::Storage)?;
                for child_row in children {
                    let child = child_row.into_record().map_err(ProvenanceError::Storage)?;
                    next_frontier.push(child.id.clone());
                    out.push(child);
                }
            }
            frontier = next_frontier;
            depth += 1;
        }

        Ok(out)
    }

    /// Recomputes every `chain_hash` from root to `id` and reports the
    /// first divergence. Passing means the chain is tamper-evidently intact
    /// (spec §4.1, testable property 1).
    #[instrument(skip(self))]
    pub async fn verify_chain(&self, id: &str) -> Result<(), ProvenanceError> {
        let chain = self.get_chain(id).await?;

        if chain.first().map(|r| r.root_document_id.clone()) != chain.first().map(|r| r.id.clone()) {
            return Err(ProvenanceError::ChainInconsistent { id: id.to_string() });
        }

        let mut parent_chain_hash: Option<String> = None;
        for record in &chain {
            let expected = compute_chain_hash(
                parent_chain_hash.as_deref(),
                &record.content_hash,
                record.r#type,
                &record.processing_params,
            );
            if expected != record.chain_hash {
                return Err(ProvenanceError::ChainInconsistent { id: record.id.clone() });
            }
            if record.chain_depth as usize != record.parent_ids.len() {
                return Err(ProvenanceError::ChainInconsistent { id: record.id.clone() });
            }
            parent_chain_hash = Some(record.chain_hash.clone());
        }

        Ok(())
    }

    /// Scans for provenance rows with a null `chain_hash` (legacy inserts)
    /// and computes them in dependency order (spec §4.1 Backfill). Bounded
    /// and idempotent: a second call with nothing missing is a no-op.
    #[instrument(skip(self))]
    pub async fn backfill(&self) -> Result<u64, ProvenanceError> {
        let missing = provenance_rows::list_missing_chain_hash(self.pool)
            .await
            .map_err(ProvenanceError::Storage)?;

        let mut filled = 0u64;
        for row in missing {
            let record = row.into_record().map_err(ProvenanceError::Storage)?;
            let parent_chain_hash = match &record.parent_id {
                None => None,
                Some(parent_id) => Some(self.get(parent_id).await?.chain_hash),
            };
            let chain_hash = compute_chain_hash(
                parent_chain_hash.as_deref(),
                &record.content_hash,
                record.r#type,
                &record.processing_params,
            );
            provenance_rows::set_chain_hash(self.pool, &record.id, &chain_hash)
                .await
                .map_err(ProvenanceError::Storage)?;
            filled += 1;
        }

        Ok(filled)
    }
}

/// Used by callers constructing `processing_params` that must be identical
/// byte-for-byte to reproduce a previous chain hash (e.g. reprocess).
pub fn params_fingerprint(params: &serde_json::Value) -> String {
    sha256_hex(crate::hash::canonical_json(params).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_fingerprint_is_order_independent() {
        let a = serde_json::json!({"b": 1, "a": 2});
        let b = serde_json::json!({"a": 2, "b": 1});
        assert_eq!(params_fingerprint(&a), params_fingerprint(&b));
    }
}

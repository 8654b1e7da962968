//! Batch orchestration (spec §4.3 "Batching"): claims up to `max_concurrent`
//! pending documents, runs their pipelines in a bounded-parallel wave, and
//! rebuilds the search indices once the wave makes non-zero progress.
//! Triggers an auto-clustering pass afterward when configured (spec §4.3
//! "Auto-clustering trigger").

use crate::ingestion::claim;
use crate::ingestion::pipeline::{self, PipelineClients, PipelineOptions, PipelineReport};
use crate::session::config::Config;
use crate::storage::{clusters, fts};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Instant;
use tracing::instrument;

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub batch_id: String,
    pub processed: u32,
    pub failed: u32,
    pub reports: Vec<PipelineReport>,
    pub duration_ms: i64,
    pub clustering: Option<ClusteringOutcome>,
}

#[derive(Debug, Clone)]
pub struct ClusteringOutcome {
    pub clusters_formed: usize,
    pub error: Option<String>,
}

/// Claims up to `config.max_concurrent` pending documents and runs them
/// through [`pipeline::run`] in a wave of that width (spec §5 "Parallelism
/// bound"). Each member of the wave runs to completion (success or cleaned-up
/// failure) independently; ordering across documents is unconstrained.
#[instrument(skip(pool, images_dir, config, clients))]
pub async fn process_pending(
    pool: &SqlitePool,
    images_dir: &Path,
    config: &Config,
    options: &PipelineOptions,
    clients: &PipelineClients<'_>,
) -> Result<BatchResult, crate::error::IngestionError> {
    let started = Instant::now();
    let batch_id = uuid::Uuid::new_v4().to_string();

    let claimed = claim::claim(pool, config.max_concurrent).await?;
    let wave_width = config.max_concurrent.max(1) as usize;

    let reports: Vec<PipelineReport> = stream::iter(claimed.iter())
        .map(|document| pipeline::run(pool, images_dir, document, config, options, clients))
        .buffer_unordered(wave_width)
        .collect()
        .await;

    let processed = reports.iter().filter(|r| r.succeeded).count() as u32;
    let failed = reports.iter().filter(|r| !r.succeeded).count() as u32;

    if processed + failed > 0 {
        for source in [fts::FtsSource::Chunk, fts::FtsSource::Vlm, fts::FtsSource::Extraction] {
            fts::rebuild(pool, source).await?;
        }
    }

    let clustering = maybe_auto_cluster(pool, config).await;

    Ok(BatchResult {
        batch_id,
        processed,
        failed,
        reports,
        duration_ms: started.elapsed().as_millis() as i64,
        clustering,
    })
}

/// Runs clustering after a batch if enabled, the corpus has reached
/// `auto_cluster_threshold` complete documents, and at least an hour has
/// passed since the last run. Failure is informational only and never fails
/// the batch (spec §4.3 "Auto-clustering trigger").
async fn maybe_auto_cluster(pool: &SqlitePool, config: &Config) -> Option<ClusteringOutcome> {
    if !config.auto_cluster_enabled {
        return None;
    }

    let count = match clusters::complete_document_count(pool).await {
        Ok(n) => n,
        Err(err) => {
            return Some(ClusteringOutcome {
                clusters_formed: 0,
                error: Some(err.to_string()),
            })
        }
    };
    if count < config.auto_cluster_threshold as i64 {
        return None;
    }

    let last_run = match clusters::last_run_at(pool).await {
        Ok(t) => t,
        Err(err) => {
            return Some(ClusteringOutcome {
                clusters_formed: 0,
                error: Some(err.to_string()),
            })
        }
    };
    if let Some(last_run) = last_run {
        if Utc::now().signed_duration_since(last_run).num_seconds() < 3600 {
            return None;
        }
    }

    match crate::derived::clustering::run(pool, &config.auto_cluster_algorithm).await {
        Ok(outcomes) => {
            tracing::info!(clusters = outcomes.len(), "auto-clustering completed");
            Some(ClusteringOutcome {
                clusters_formed: outcomes.len(),
                error: None,
            })
        }
        Err(err) => {
            tracing::warn!(%err, "auto-clustering failed, batch still reports success");
            Some(ClusteringOutcome {
                clusters_formed: 0,
                error: Some(err.to_string()),
            })
        }
    }
}

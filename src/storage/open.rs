//! Database open contract (spec §4.2): pragmas, migrations, extension
//! registration, and the stuck-document reaper.

use crate::error::StorageError;
use chrono::Utc;
use libsqlite3_sys as ffi;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::mem::transmute;
use std::os::raw::c_char;
use std::str::FromStr;
use std::sync::{Mutex, Once};
use std::time::Duration;
use tracing::instrument;

/// Registers the sqlite-vec extension with SQLite's global
/// `sqlite3_auto_extension` hook exactly once per process, before any
/// connection is opened. Safe to call repeatedly; only the first call has
/// effect.
fn register_sqlite_vec() -> Result<(), StorageError> {
    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!("failed to register sqlite-vec extension (code {rc})"))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(StorageError::Other)
}

/// A writer pool capped at one connection (single-writer discipline, spec
/// §4.2) and a reader pool allowed to grow, both over the same file under
/// WAL.
#[derive(Debug, Clone)]
pub struct Pools {
    pub writer: SqlitePool,
    pub reader: SqlitePool,
}

/// Threshold past which a `processing` document is considered wedged by a
/// crashed process and is reset to `failed` on the next open (see
/// DESIGN.md, Open Question decision 1).
pub const DEFAULT_STUCK_PROCESSING_THRESHOLD: Duration = Duration::from_secs(3600);

#[instrument(skip(path), fields(path = %path.as_ref().display()))]
pub async fn open(
    path: impl AsRef<std::path::Path>,
    stuck_processing_threshold: Duration,
) -> Result<Pools, StorageError> {
    register_sqlite_vec()?;

    let options = SqliteConnectOptions::from_str(&format!(
        "sqlite://{}",
        path.as_ref().display()
    ))
    .map_err(StorageError::Sqlx)?
    .create_if_missing(true)
    .foreign_keys(true)
    .busy_timeout(Duration::from_secs(10))
    .pragma("journal_mode", "WAL")
    .pragma("synchronous", "NORMAL")
    .pragma("mmap_size", "268435456");

    let writer = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options.clone())
        .await?;
    let reader = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&writer).await?;

    reap_stuck_processing(&writer, stuck_processing_threshold).await?;

    Ok(Pools { writer, reader })
}

/// Resets `processing` documents whose `modified_at` is older than
/// `threshold` back to `failed`. Bounded and idempotent: a second open with
/// nothing stuck is a no-op.
#[instrument(skip(pool))]
async fn reap_stuck_processing(
    pool: &SqlitePool,
    threshold: Duration,
) -> Result<u64, StorageError> {
    let cutoff = Utc::now() - chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::hours(1));
    let result = sqlx::query(
        "UPDATE documents SET status = 'failed', \
         error_message = 'reset by stuck-document reaper on database open', \
         modified_at = ? \
         WHERE status = 'processing' AND modified_at < ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(cutoff.to_rfc3339())
    .execute(pool)
    .await?;

    let reaped = result.rows_affected();
    if reaped > 0 {
        tracing::warn!(reaped, "reset stuck processing documents to failed");
    }
    Ok(reaped)
}

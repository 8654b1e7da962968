//! The process-wide `State` façade (spec §4.5 & §9 "Global mutable
//! state"): the single global, encapsulated so the rest of the core
//! receives it by reference and tests can construct a fresh one around a
//! fresh temp-directory database.

use crate::error::SessionError;
use crate::session::config::Config;
use crate::session::guard::ActiveOpGuard;
use crate::storage::Storage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

static DB_NAME_RE_SOURCE: &str = r"^[A-Za-z0-9_-]+$";
const DB_NAME_MAX_LEN: usize = 128;

fn validate_db_name(name: &str) -> Result<(), SessionError> {
    if name.is_empty() || name.len() > DB_NAME_MAX_LEN {
        return Err(SessionError::InvalidDatabaseName(name.to_string()));
    }
    let re = regex::Regex::new(DB_NAME_RE_SOURCE).expect("static regex is valid");
    if !re.is_match(name) {
        return Err(SessionError::InvalidDatabaseName(name.to_string()));
    }
    Ok(())
}

struct Selected {
    name: String,
    storage: Storage,
}

/// The one process-wide global: current database, config, generation
/// counter, and active-operations counter.
pub struct State {
    storage_root: PathBuf,
    selected: RwLock<Option<Selected>>,
    config: RwLock<Config>,
    generation: AtomicU64,
    active_operations: Arc<AtomicU64>,
}

impl State {
    pub fn new(storage_root: PathBuf, config: Config) -> Self {
        Self {
            storage_root,
            selected: RwLock::new(None),
            config: RwLock::new(config),
            generation: AtomicU64::new(0),
            active_operations: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn active_operations(&self) -> u64 {
        self.active_operations.load(Ordering::SeqCst)
    }

    /// Acquires the active-op guard, capturing the current generation.
    /// Every write-capable tool handler must hold one of these for its
    /// duration (spec §4.5 Active-operations guard).
    pub fn begin_operation(&self) -> ActiveOpGuard {
        ActiveOpGuard::acquire(self.active_operations.clone(), self.generation())
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: Config) -> Result<(), SessionError> {
        config.validate()?;
        *self.config.write().await = config;
        Ok(())
    }

    fn db_path(&self, name: &str) -> PathBuf {
        self.storage_root.join(format!("{name}.db"))
    }

    pub async fn current_database_name(&self) -> Option<String> {
        self.selected.read().await.as_ref().map(|s| s.name.clone())
    }

    /// Borrows the current storage handle, failing with
    /// `DATABASE_NOT_SELECTED` if none is selected.
    pub async fn with_storage<F, T>(&self, f: F) -> Result<T, SessionError>
    where
        F: FnOnce(&Storage) -> T,
    {
        let guard = self.selected.read().await;
        let selected = guard.as_ref().ok_or(SessionError::DatabaseNotSelected)?;
        Ok(f(&selected.storage))
    }

    #[instrument(skip(self))]
    pub async fn create_database(&self, name: &str) -> Result<(), SessionError> {
        validate_db_name(name)?;
        let path = self.db_path(name);
        if path.exists() {
            return Err(SessionError::DatabaseAlreadyExists(name.to_string()));
        }
        tokio::fs::create_dir_all(&self.storage_root)
            .await
            .map_err(|e| SessionError::Storage(crate::error::StorageError::Other(e.to_string())))?;
        Storage::open(&path).await?;
        Ok(())
    }

    pub async fn database_exists(&self, name: &str) -> bool {
        self.db_path(name).exists()
    }

    /// Selects `name` as the current database. Refuses while
    /// `active_operations > 0` (`SWITCH_BLOCKED`, spec §4.5). Handles the
    /// same-file re-open hazard: closes the old connection before opening
    /// the new one when they name the same database; otherwise opens the
    /// new connection, swaps state, then closes the old one, so there is no
    /// null window (spec §4.2 Same-file re-open hazard, §4.5 Same-file
    /// switch).
    #[instrument(skip(self))]
    pub async fn select_database(&self, name: &str) -> Result<(), SessionError> {
        validate_db_name(name)?;
        let active = self.active_operations();
        if active > 0 {
            return Err(SessionError::SwitchBlocked {
                active_operations: active,
            });
        }
        if !self.database_exists(name).await {
            return Err(SessionError::DatabaseNotFound(name.to_string()));
        }

        let mut guard = self.selected.write().await;
        let same_file = guard.as_ref().map(|s| s.name.as_str()) == Some(name);

        if same_file {
            if let Some(old) = guard.take() {
                old.storage.close().await;
            }
            let storage = Storage::open(self.db_path(name)).await?;
            *guard = Some(Selected {
                name: name.to_string(),
                storage,
            });
        } else {
            let storage = Storage::open(self.db_path(name)).await?;
            let old = guard.replace(Selected {
                name: name.to_string(),
                storage,
            });
            if let Some(old) = old {
                old.storage.close().await;
            }
        }

        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Clears the current database selection. Refuses while
    /// `active_operations > 0`, same as `select_database`.
    #[instrument(skip(self))]
    pub async fn clear_database(&self) -> Result<(), SessionError> {
        let active = self.active_operations();
        if active > 0 {
            return Err(SessionError::SwitchBlocked {
                active_operations: active,
            });
        }
        if let Some(old) = self.selected.write().await.take() {
            old.storage.close().await;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Validates that `generation` still matches the live value, returning
    /// `STALE_DATABASE_REFERENCE` on mismatch (spec §4.5 Generation
    /// counter).
    pub fn check_generation(&self, generation: u64) -> Result<(), SessionError> {
        if generation != self.generation() {
            return Err(SessionError::StaleDatabaseReference);
        }
        Ok(())
    }
}

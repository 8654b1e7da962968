//! Session/config scenario coverage (spec §8 scenario 4 "Generation guard
//! trips", §4.5 Config bounds, §6 config persistence round-trip).

mod support;

use pretty_assertions::assert_eq;
use provgraph::session::{Config, State};
use provgraph::storage::config_store;
use serde_json::json;

#[tokio::test]
async fn generation_guard_trips_after_a_database_switch() {
    let dir = tempfile::tempdir().unwrap();
    let state = State::new(dir.path().to_path_buf(), Config::default());
    state.create_database("first").await.unwrap();
    state.create_database("second").await.unwrap();
    state.select_database("first").await.unwrap();

    // A long-lived handle captures the generation at the moment it started
    // its work, the same way a guard does internally.
    let captured_generation = state.generation();
    state.check_generation(captured_generation).unwrap();

    state.select_database("second").await.unwrap();
    let err = state.check_generation(captured_generation).unwrap_err();
    assert!(matches!(err, provgraph::error::SessionError::StaleDatabaseReference));

    // A fresh capture after the switch is valid again.
    state.check_generation(state.generation()).unwrap();
}

#[tokio::test]
async fn clear_database_also_advances_the_generation() {
    let dir = tempfile::tempdir().unwrap();
    let state = State::new(dir.path().to_path_buf(), Config::default());
    state.create_database("demo").await.unwrap();
    state.select_database("demo").await.unwrap();
    let captured = state.generation();

    state.clear_database().await.unwrap();
    assert!(state.check_generation(captured).is_err());
    assert_eq!(state.current_database_name().await, None);
}

#[tokio::test]
async fn active_operation_guard_blocks_switch_and_releases_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let state = State::new(dir.path().to_path_buf(), Config::default());
    state.create_database("demo").await.unwrap();
    state.select_database("demo").await.unwrap();
    state.create_database("other").await.unwrap();

    let op = state.begin_operation();
    assert_eq!(state.active_operations(), 1);
    assert!(state.select_database("other").await.is_err());

    drop(op);
    assert_eq!(state.active_operations(), 0);
    state.select_database("other").await.unwrap();
}

#[test]
fn config_validate_rejects_every_out_of_bound_field() {
    let mut config = Config::default();
    config.max_concurrent = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.max_concurrent = 11;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.embedding_batch_size = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.chunk_size = 50;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.chunk_overlap_percent = 51;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.max_chunk_size = 999;
    assert!(config.validate().is_err());

    assert!(Config::default().validate().is_ok());
}

#[test]
fn apply_persisted_overrides_only_the_given_keys() {
    let mut config = Config::default();
    let original_mode = config.default_ocr_mode;
    config
        .apply_persisted(json!({ "max_concurrent": 8, "auto_cluster_enabled": true }))
        .unwrap();

    assert_eq!(config.max_concurrent, 8);
    assert!(config.auto_cluster_enabled);
    assert_eq!(config.default_ocr_mode, original_mode, "unspecified keys keep their default");
}

#[test]
fn apply_persisted_rejects_values_that_violate_bounds() {
    let mut config = Config::default();
    let err = config.apply_persisted(json!({ "max_concurrent": 0 })).unwrap_err();
    assert!(matches!(err, provgraph::error::SessionError::Storage(_)));
}

#[tokio::test]
async fn config_round_trips_through_storage() {
    let fixture = support::Fixture::new().await;
    let pool = fixture.storage.writer();

    assert!(config_store::load(pool).await.unwrap().is_none());

    let mut config = Config::default();
    config.max_concurrent = 6;
    config.chunk_size = 1500;
    let persisted = serde_json::to_value(&config).unwrap();
    config_store::save(pool, &persisted).await.unwrap();

    let loaded = config_store::load(pool).await.unwrap().unwrap();
    let mut restored = Config::default();
    restored.apply_persisted(loaded).unwrap();
    assert_eq!(restored, config);

    // Saving again overwrites rather than duplicating the single row.
    config_store::save(pool, &persisted).await.unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM config_json")
        .fetch_one(pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

//! SQLite status store behavior against a real database file.

use tempfile::TempDir;
use uuid::Uuid;

use trackforge::db;
use trackforge::models::status::{Stage, StatusRecord};
use trackforge::services::status::{SqliteStatusStore, StatusStore, StatusStoreError};

async fn open_store(dir: &TempDir) -> SqliteStatusStore {
    let url = format!("sqlite://{}/status.db", dir.path().display());
    let pool = db::init_pool(&url).await.expect("open database");
    db::run_migrations(&pool).await.expect("run migrations");
    SqliteStatusStore::new(pool)
}

#[tokio::test]
async fn missing_id_returns_none() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn records_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let mut record = StatusRecord::queued(Uuid::new_v4());
    store.set(&record).await.unwrap();

    let loaded = store.get(record.id).await.unwrap().unwrap();
    assert_eq!(loaded.percentage, 0);
    assert_eq!(loaded.stage, Stage::Queued);
    assert!(loaded.content_address.is_none());

    record.complete("QmPublished".to_string());
    store.set(&record).await.unwrap();

    let loaded = store.get(record.id).await.unwrap().unwrap();
    assert_eq!(loaded.percentage, 100);
    assert_eq!(loaded.stage, Stage::Completed);
    assert_eq!(loaded.content_address.as_deref(), Some("QmPublished"));
}

#[tokio::test]
async fn set_overwrites_a_single_key() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let mut record = StatusRecord::queued(Uuid::new_v4());
    let other = StatusRecord::queued(Uuid::new_v4());
    store.set(&record).await.unwrap();
    store.set(&other).await.unwrap();

    record.checkpoint(30, Stage::Converting);
    store.set(&record).await.unwrap();

    let loaded = store.get(record.id).await.unwrap().unwrap();
    assert_eq!(loaded.percentage, 30);
    assert_eq!(loaded.stage, Stage::Converting);

    // Writes to one key never touch another.
    let untouched = store.get(other.id).await.unwrap().unwrap();
    assert_eq!(untouched.percentage, 0);
    assert_eq!(untouched.stage, Stage::Queued);
}

#[tokio::test]
async fn unknown_stage_text_is_a_corrupt_record() {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}/status.db", dir.path().display());
    let pool = db::init_pool(&url).await.unwrap();
    db::run_migrations(&pool).await.unwrap();

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO transcode_status (id, percentage, stage, updated_at) VALUES ($1, 10, 'exploded', $2)",
    )
    .bind(id.to_string())
    .bind(chrono::Utc::now())
    .execute(&pool)
    .await
    .unwrap();

    let store = SqliteStatusStore::new(pool);
    assert!(matches!(
        store.get(id).await,
        Err(StatusStoreError::CorruptRecord(_))
    ));
}

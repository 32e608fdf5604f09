//! Reference store tests over a real SQLite file

use pmx_ingest::enrich::{EnrichmentCache, MappingSource, SqliteMappingSource};
use pmx_ingest::error::IngestError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;

const SCHEMA: &str = r#"
    CREATE TABLE ru_mapping (
        ru_param TEXT NOT NULL,
        ems_id   TEXT,
        ems_name TEXT,
        du_id    TEXT,
        ru_id    TEXT NOT NULL,
        du_name  TEXT,
        ru_name  TEXT,
        cell_num TEXT,
        cell_id  TEXT,
        PRIMARY KEY (ru_id, ru_param)
    )
"#;

async fn writable(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create database");
    sqlx::query(SCHEMA).execute(&pool).await.expect("Failed to create table");
    pool
}

async fn insert(pool: &SqlitePool, ru_param: &str, ru_id: &str, cell_num: Option<&str>) {
    sqlx::query(
        "INSERT INTO ru_mapping (ru_param, ems_id, ems_name, du_id, ru_id, cell_num, cell_id) \
         VALUES (?, '7', 'EMS-SEOUL', 'DU-1', ?, ?, NULL)",
    )
    .bind(ru_param)
    .bind(ru_id)
    .bind(cell_num)
    .execute(pool)
    .await
    .expect("Failed to insert mapping row");
}

#[tokio::test]
async fn test_fetch_all_reads_every_row() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("mapping.db");
    let pool = writable(&db).await;
    insert(&pool, "ME=1/DU=1/RU=1", "RU-A", Some("1")).await;
    insert(&pool, "ME=1/DU=1/RU=1", "RU-B", Some("2")).await;
    insert(&pool, "ME=1/DU=1/RU=2", "RU-C", None).await;
    pool.close().await;

    let source = SqliteMappingSource::connect(&db, Duration::from_secs(1)).await.unwrap();
    let mut rows = source.fetch_all().await.unwrap();
    rows.sort_by(|a, b| a.1.ru_id.cmp(&b.1.ru_id));

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].0, "ME=1/DU=1/RU=1");
    assert_eq!(rows[0].1.ems_name.as_deref(), Some("EMS-SEOUL"));
    assert_eq!(rows[0].1.cell_num.as_deref(), Some("1"));
    assert_eq!(rows[2].1.cell_num, None);
    assert_eq!(rows[2].1.cell_id, None);
}

#[tokio::test]
async fn test_cache_groups_store_rows_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("mapping.db");
    let pool = writable(&db).await;
    insert(&pool, "ME=1/DU=1/RU=1", "RU-A", Some("1")).await;
    insert(&pool, "ME=1/DU=1/RU=1", "RU-B", Some("2")).await;
    insert(&pool, "ME=1/DU=1/RU=2", "RU-C", Some("3")).await;

    let source = SqliteMappingSource::connect(&db, Duration::from_secs(1)).await.unwrap();
    let cache = EnrichmentCache::new();
    cache.load(&source).await.unwrap();

    assert_eq!(cache.snapshot().key_count(), 2);
    assert_eq!(cache.snapshot().row_count(), 3);
    assert_eq!(cache.lookup("ME=1/DU=1/RU=1").unwrap().len(), 2);
    assert!(cache.lookup("ME=1/DU=1/RU=9").is_none());

    // a later reload sees rows written in the meantime
    insert(&pool, "ME=1/DU=1/RU=9", "RU-D", Some("4")).await;
    cache.load(&source).await.unwrap();
    assert_eq!(cache.lookup("ME=1/DU=1/RU=9").unwrap().len(), 1);
}

#[tokio::test]
async fn test_source_is_read_only() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("mapping.db");
    writable(&db).await.close().await;

    let options = SqliteConnectOptions::new().filename(&db).read_only(true);
    let pool = SqlitePool::connect_with(options).await.unwrap();
    let source = SqliteMappingSource::from_pool(pool.clone());
    assert!(source.fetch_all().await.unwrap().is_empty());

    let write = sqlx::query("INSERT INTO ru_mapping (ru_param, ru_id) VALUES ('k', 'r')")
        .execute(&pool)
        .await;
    assert!(write.is_err());
}

#[tokio::test]
async fn test_missing_database_is_not_created() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("absent.db");

    let result = SqliteMappingSource::connect(&db, Duration::from_secs(1)).await;
    assert!(matches!(result, Err(IngestError::Reference(_))));
    assert!(!db.exists());
}

#[tokio::test]
async fn test_missing_table_fails_load_and_keeps_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("empty.db");
    let options = SqliteConnectOptions::new().filename(&db).create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await.unwrap();
    sqlx::query("CREATE TABLE unrelated (x INTEGER)")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let source = SqliteMappingSource::connect(&db, Duration::from_secs(1)).await.unwrap();
    let cache = EnrichmentCache::new();
    assert!(cache.load(&source).await.is_err());
    assert_eq!(cache.snapshot().row_count(), 0);
}

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tracing::info;

use crate::config::AppConfig;

pub type Db = SqlitePool;

/// Load/save of named JSON blobs. The catalogue persists its category set,
/// programme set and refresh timestamps through this and does not care how
/// they are stored.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn load(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>>;
    async fn save(&self, key: &str, blob: &serde_json::Value) -> anyhow::Result<()>;
}

pub async fn connect(config: &AppConfig) -> anyhow::Result<Db> {
    // Ensure the data directory exists
    if let Some(parent) = std::path::Path::new(&config.database_url)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create DB dir {parent:?}"))?;
    }

    let url = format!("sqlite://{}?mode=rwc", config.database_url);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .with_context(|| format!("connect to SQLite at {}", config.database_url))?;

    run_migrations(&pool).await?;

    info!("Database ready at {}", config.database_url);
    Ok(pool)
}

async fn run_migrations(pool: &Db) -> anyhow::Result<()> {
    // Enable WAL mode for better concurrency
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(pool)
        .await
        .context("set WAL mode")?;

    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("run migrations")?;

    Ok(())
}

/// `BlobStore` on the `blobs` table, one row per key.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BlobStore for SqliteStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM blobs WHERE key=?")
            .bind(key)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("load blob {key}"))?;

        row.map(|(value,)| {
            serde_json::from_str(&value).with_context(|| format!("decode blob {key}"))
        })
        .transpose()
    }

    async fn save(&self, key: &str, blob: &serde_json::Value) -> anyhow::Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO blobs (key, value, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at=excluded.updated_at",
        )
        .bind(key)
        .bind(blob.to_string())
        .bind(&now)
        .execute(&self.db)
        .await
        .with_context(|| format!("save blob {key}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn memory_store() -> SqliteStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn missing_key_loads_as_none() {
        let store = memory_store().await;
        assert!(store.load("categories").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_overwrites_previous_blob() {
        let store = memory_store().await;
        store
            .save("categories", &json!([{"id": "news", "total_pages": 3}]))
            .await
            .unwrap();
        store
            .save("categories", &json!([{"id": "drama", "total_pages": null}]))
            .await
            .unwrap();

        let loaded = store.load("categories").await.unwrap().unwrap();
        assert_eq!(loaded, json!([{"id": "drama", "total_pages": null}]));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM blobs")
            .fetch_one(&store.db)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }
}

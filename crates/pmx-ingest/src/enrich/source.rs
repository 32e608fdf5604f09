//! Reference store access

use async_trait::async_trait;
use pmx_common::MappingRow;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::Result;

const MAPPING_QUERY: &str = r#"
    SELECT ru_param, ems_id, ems_name, du_id, ru_id, du_name, ru_name, cell_id, cell_num
    FROM ru_mapping
"#;

/// Source of the radio-unit asset mapping
#[async_trait]
pub trait MappingSource: Send + Sync {
    /// Every `(ru_param, row)` pair, in store order
    async fn fetch_all(&self) -> Result<Vec<(String, MappingRow)>>;
}

#[derive(Debug, sqlx::FromRow)]
struct MappingRecord {
    ru_param: String,
    ems_id: Option<String>,
    ems_name: Option<String>,
    du_id: Option<String>,
    ru_id: Option<String>,
    du_name: Option<String>,
    ru_name: Option<String>,
    cell_id: Option<String>,
    cell_num: Option<String>,
}

impl MappingRecord {
    fn into_entry(self) -> (String, MappingRow) {
        (
            self.ru_param,
            MappingRow {
                ems_id: self.ems_id,
                ems_name: self.ems_name,
                du_id: self.du_id,
                ru_id: self.ru_id,
                du_name: self.du_name,
                ru_name: self.ru_name,
                cell_id: self.cell_id,
                cell_num: self.cell_num,
            },
        )
    }
}

/// `ru_mapping` table of a SQLite file, opened read-only
#[derive(Debug, Clone)]
pub struct SqliteMappingSource {
    pool: SqlitePool,
}

impl SqliteMappingSource {
    pub async fn connect(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .read_only(true)
            .create_if_missing(false)
            .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Connected to reference store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingSource for SqliteMappingSource {
    async fn fetch_all(&self) -> Result<Vec<(String, MappingRow)>> {
        let records = sqlx::query_as::<_, MappingRecord>(MAPPING_QUERY)
            .fetch_all(&self.pool)
            .await?;

        Ok(records.into_iter().map(MappingRecord::into_entry).collect())
    }
}

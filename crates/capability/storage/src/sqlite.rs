//! SQLite 分区存储
//!
//! 数据目录下每个分区一个文件：`plc_data_{date}_config-{fingerprint}.db`。
//! 写入端每分区一个连接（唯一写者）；读取方通过 WAL 获得一致视图，
//! 也可以不经过本进程直接打开分区文件。

use crate::connection::{connect_reader, connect_writer};
use crate::error::StoreError;
use crate::models::{NO_VALUE_TYPE, PartitionInfo, SampleQuery, StoredSample, rows_from_batch};
use crate::traits::SampleStore;
use async_trait::async_trait;
use domain::{ConfigFingerprint, PartitionKey, SampleBatch, SampleValue};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

const PARTITION_EXT: &str = "db";
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const CREATE_SAMPLES: &str = "create table if not exists samples ( \
     id integer primary key autoincrement, \
     ts_ms integer not null, \
     ts_utc text not null, \
     tag_name text not null, \
     value_type text not null, \
     value_int integer, \
     value_real real, \
     value_text text, \
     quality integer not null)";
const CREATE_TAG_INDEX: &str =
    "create index if not exists idx_samples_tag_ts on samples (tag_name, ts_ms)";
const CREATE_TS_INDEX: &str = "create index if not exists idx_samples_ts on samples (ts_ms)";
const CREATE_META: &str =
    "create table if not exists partition_meta (key text primary key, value text not null)";
const INSERT_SAMPLE: &str = "insert into samples \
     (ts_ms, ts_utc, tag_name, value_type, value_int, value_real, value_text, quality) \
     values (?, ?, ?, ?, ?, ?, ?, ?)";

/// SQLite 分区存储。
pub struct SqliteSampleStore {
    data_dir: PathBuf,
    busy_timeout: Duration,
    writers: Mutex<HashMap<PartitionKey, SqlitePool>>,
}

impl SqliteSampleStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            writers: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 分区文件路径。
    pub fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        self.data_dir.join(format!("{}.{}", key.id(), PARTITION_EXT))
    }

    /// 当前持有写连接的分区数。
    pub async fn open_partitions(&self) -> usize {
        self.writers.lock().await.len()
    }

    /// 关闭全部写连接（停机时调用）。
    pub async fn close(&self) {
        let mut writers = self.writers.lock().await;
        for (key, pool) in writers.drain() {
            pool.close().await;
            info!(target: "plc.storage", partition = %key, "partition_closed");
        }
    }

    /// 取得分区写连接；首次使用时建库建表。
    async fn writer(&self, key: &PartitionKey) -> Result<SqlitePool, StoreError> {
        let mut writers = self.writers.lock().await;
        if let Some(pool) = writers.get(key) {
            return Ok(pool.clone());
        }

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let path = self.partition_path(key);
        let pool = connect_writer(&path, self.busy_timeout).await?;
        if let Err(err) = ensure_schema(&pool, key).await {
            pool.close().await;
            return Err(err);
        }

        // 日期翻转后旧分区不会再被写入
        let stale: Vec<PartitionKey> = writers
            .keys()
            .filter(|open| open.fingerprint == key.fingerprint && open.date < key.date)
            .cloned()
            .collect();
        for open in stale {
            if let Some(pool) = writers.remove(&open) {
                pool.close().await;
                info!(target: "plc.storage", partition = %open, "partition_closed");
            }
        }

        writers.insert(key.clone(), pool.clone());
        info!(
            target: "plc.storage",
            partition = %key,
            path = %path.display(),
            "partition_provisioned"
        );
        Ok(pool)
    }
}

async fn ensure_schema(pool: &SqlitePool, key: &PartitionKey) -> Result<(), StoreError> {
    let mut tx = pool.begin().await?;
    sqlx::query(CREATE_SAMPLES).execute(&mut *tx).await?;
    sqlx::query(CREATE_TAG_INDEX).execute(&mut *tx).await?;
    sqlx::query(CREATE_TS_INDEX).execute(&mut *tx).await?;
    sqlx::query(CREATE_META).execute(&mut *tx).await?;

    let existing: Option<String> =
        sqlx::query_scalar("select value from partition_meta where key = 'fingerprint'")
            .fetch_optional(&mut *tx)
            .await?;
    match existing {
        Some(fingerprint) if fingerprint != key.fingerprint.as_str() => {
            warn!(
                target: "plc.storage",
                partition = %key,
                found = %fingerprint,
                "partition_fingerprint_mismatch"
            );
            return Err(StoreError::Invalid(format!(
                "partition {} was written under fingerprint {}",
                key, fingerprint
            )));
        }
        Some(_) => {}
        None => {
            let created_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
            for (meta_key, value) in [
                ("fingerprint", key.fingerprint.as_str().to_string()),
                ("date", key.date.format("%Y-%m-%d").to_string()),
                ("created_at", created_at),
            ] {
                sqlx::query("insert or ignore into partition_meta (key, value) values (?, ?)")
                    .bind(meta_key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await?;
            }
        }
    }
    tx.commit().await?;
    Ok(())
}

/// 按值类型拆分到对应列。
fn typed_columns(
    value: &Option<SampleValue>,
) -> (&'static str, Option<i64>, Option<f64>, Option<String>) {
    match value {
        Some(SampleValue::Bool(v)) => ("bool", Some(i64::from(*v)), None, None),
        Some(SampleValue::I64(v)) => ("i64", Some(*v), None, None),
        Some(SampleValue::F64(v)) => ("f64", None, Some(*v), None),
        Some(SampleValue::String(v)) => ("string", None, None, Some(v.clone())),
        None => (NO_VALUE_TYPE, None, None, None),
    }
}

fn row_to_sample(row: &SqliteRow) -> Result<StoredSample, StoreError> {
    let value_type: String = row.try_get("value_type")?;
    let value_int: Option<i64> = row.try_get("value_int")?;
    let value_real: Option<f64> = row.try_get("value_real")?;
    let value_text: Option<String> = row.try_get("value_text")?;
    let value = match value_type.as_str() {
        "bool" => value_int.map(|v| SampleValue::Bool(v != 0)),
        "i64" => value_int.map(SampleValue::I64),
        "f64" => value_real.map(SampleValue::F64),
        "string" => value_text.map(SampleValue::String),
        _ => None,
    };
    Ok(StoredSample {
        ts_ms: row.try_get("ts_ms")?,
        ts_utc: row.try_get("ts_utc")?,
        tag_name: row.try_get("tag_name")?,
        value,
        quality: row.try_get("quality")?,
    })
}

async fn fetch_samples(
    pool: &SqlitePool,
    query: &SampleQuery,
) -> Result<Vec<StoredSample>, StoreError> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        "select ts_ms, ts_utc, tag_name, value_type, value_int, value_real, value_text, quality \
         from samples where 1 = 1",
    );
    if let Some(tag) = &query.tag {
        builder.push(" and tag_name = ").push_bind(tag.clone());
    }
    if let Some(from) = query.from_ms {
        builder.push(" and ts_ms >= ").push_bind(from);
    }
    if let Some(to) = query.to_ms {
        builder.push(" and ts_ms <= ").push_bind(to);
    }
    builder
        .push(" order by ts_ms asc, id asc limit ")
        .push_bind(query.limit);

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter().map(row_to_sample).collect()
}

#[async_trait]
impl SampleStore for SqliteSampleStore {
    async fn provision(&self, key: &PartitionKey) -> Result<(), StoreError> {
        self.writer(key).await.map(|_| ())
    }

    async fn append(
        &self,
        fingerprint: &ConfigFingerprint,
        batch: &SampleBatch,
    ) -> Result<usize, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let key = PartitionKey::new(fingerprint.clone(), batch.date());
        let pool = self.writer(&key).await?;
        let rows = rows_from_batch(batch);

        let mut tx = pool.begin().await?;
        for row in &rows {
            let (value_type, value_int, value_real, value_text) = typed_columns(&row.value);
            sqlx::query(INSERT_SAMPLE)
                .bind(row.ts_ms)
                .bind(&row.ts_utc)
                .bind(&row.tag_name)
                .bind(value_type)
                .bind(value_int)
                .bind(value_real)
                .bind(value_text)
                .bind(row.quality)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(rows.len())
    }

    async fn list_partitions(&self) -> Result<Vec<PartitionInfo>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut partitions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(PARTITION_EXT) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let Some(key) = PartitionKey::parse_id(stem) else {
                continue;
            };
            let size_bytes = entry.metadata().await.ok().map(|meta| meta.len());
            partitions.push(PartitionInfo {
                id: stem.to_string(),
                fingerprint: key.fingerprint,
                date: key.date,
                size_bytes,
            });
        }
        partitions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(partitions)
    }

    async fn query(
        &self,
        key: &PartitionKey,
        query: &SampleQuery,
    ) -> Result<Vec<StoredSample>, StoreError> {
        let path = self.partition_path(key);
        if !tokio::fs::try_exists(&path).await? {
            return Err(StoreError::UnknownPartition(key.id()));
        }
        if query.limit <= 0 {
            return Ok(Vec::new());
        }
        let pool = connect_reader(&path, self.busy_timeout).await?;
        let result = fetch_samples(&pool, query).await;
        pool.close().await;
        result
    }
}

//! Incremental disk cache for query results.
//!
//! Layout: `{cache_dir}/{md5(query)}.parquet` plus `{md5(query)}.meta.json`.
//!
//! - The key is the MD5 of the query text as the caller wrote it, before any
//!   date bound is injected, so repeated calls land on the same entry.
//! - On a hit, only the tail is fetched: `last cached date - 5 days` becomes a
//!   `date is after` bound unless the query already has one.
//! - Cached and fresh rows are merged (fresh wins per date) and written back.
//! - Writes are atomic (write to .tmp, rename into place).
//! - Unreadable entries are quarantined (`.quarantined`) and treated as misses.
//! - `clear` removes every file named after a key: entries, sidecars, leftover
//!   `.tmp` writes and quarantined files.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{LimError, Result};
use crate::query::{has_date_lower_bound, with_date_lower_bound};
use crate::table::SeriesTable;

/// Days of overlap re-fetched below the last cached date.
pub const OVERLAP_DAYS: i64 = 5;

const ENTRY_EXT: &str = "parquet";
const META_SUFFIX: &str = ".meta.json";

/// Metadata sidecar for a cached query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub query: String,
    pub columns: Vec<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub row_count: usize,
    pub data_hash: String,
    pub cached_at: NaiveDateTime,
}

/// One entry as reported by `QueryCache::status`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub meta: CacheMeta,
    pub size_bytes: u64,
}

/// MD5 hex digest of the query text.
pub fn query_key(query: &str) -> String {
    format!("{:x}", md5::compute(query.as_bytes()))
}

/// The query actually sent on a cache hit.
pub fn incremental_query(query: &str, cached: &SeriesTable) -> String {
    match cached.last_date() {
        Some(last) if !has_date_lower_bound(query) => {
            with_date_lower_bound(query, last - chrono::Duration::days(OVERLAP_DAYS))
        }
        _ => query.to_string(),
    }
}

pub struct QueryCache {
    cache_dir: PathBuf,
}

impl QueryCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// `{cache_dir}/{md5}.parquet`
    pub fn entry_path(&self, query: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{ENTRY_EXT}", query_key(query)))
    }

    fn meta_path(&self, query: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}{META_SUFFIX}", query_key(query)))
    }

    /// Load the cached table for `query`, if any.
    pub fn load(&self, query: &str) -> Result<Option<SeriesTable>> {
        let path = self.entry_path(query);
        if !path.exists() {
            return Ok(None);
        }
        let file =
            fs::File::open(&path).map_err(|e| LimError::Cache(format!("open {}: {e}", path.display())))?;
        let df = ParquetReader::new(file)
            .finish()
            .map_err(|e| LimError::Cache(format!("read {}: {e}", path.display())))?;
        SeriesTable::from_dataframe(&df).map(Some)
    }

    /// Like `load`, but a corrupt entry is moved aside and reported as a miss.
    fn load_or_quarantine(&self, query: &str) -> Option<SeriesTable> {
        match self.load(query) {
            Ok(table) => table,
            Err(e) => {
                let path = self.entry_path(query);
                tracing::warn!(path = %path.display(), error = %e, "quarantining corrupt cache entry");
                let _ = fs::rename(&path, path.with_extension("parquet.quarantined"));
                None
            }
        }
    }

    /// Persist `table` under `query`, replacing any previous entry.
    pub fn store(&self, query: &str, table: &SeriesTable) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .map_err(|e| LimError::Cache(format!("failed to create dir: {e}")))?;

        let path = self.entry_path(query);
        let tmp_path = path.with_extension("parquet.tmp");
        let mut df = table.to_dataframe()?;
        let file = fs::File::create(&tmp_path)
            .map_err(|e| LimError::Cache(format!("create file: {e}")))?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| LimError::Cache(format!("write parquet: {e}")))?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            LimError::Cache(format!("atomic rename failed: {e}"))
        })?;

        let meta = CacheMeta {
            query: query.to_string(),
            columns: table.columns().to_vec(),
            start_date: table.first_timestamp().map(|t| t.date()),
            end_date: table.last_date(),
            row_count: table.height(),
            data_hash: data_hash(table)?,
            cached_at: chrono::Local::now().naive_local(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| LimError::Cache(format!("meta serialization: {e}")))?;
        let meta_path = self.meta_path(query);
        let meta_tmp = meta_path.with_extension("json.tmp");
        fs::write(&meta_tmp, meta_json).map_err(|e| LimError::Cache(format!("meta write: {e}")))?;
        fs::rename(&meta_tmp, &meta_path)
            .map_err(|e| LimError::Cache(format!("meta rename: {e}")))?;

        tracing::info!(key = %query_key(query), rows = table.height(), "cache entry written");
        Ok(())
    }

    pub fn get_meta(&self, query: &str) -> Option<CacheMeta> {
        let content = fs::read_to_string(self.meta_path(query)).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Run `query` through the cache.
    ///
    /// `run` receives the text to send (the original on a miss, the bounded
    /// incremental query on a hit). An empty fetch on a miss stores nothing;
    /// on a hit it returns the cached table unchanged.
    pub fn fetch<F>(&self, query: &str, run: F) -> Result<Option<SeriesTable>>
    where
        F: FnOnce(&str) -> Result<Option<SeriesTable>>,
    {
        let cached = self.load_or_quarantine(query);
        let to_send = match &cached {
            Some(table) => {
                let q = incremental_query(query, table);
                tracing::info!(key = %query_key(query), last = ?table.last_date(), "cache hit");
                q
            }
            None => query.to_string(),
        };

        let fresh = run(&to_send)?;
        match (cached, fresh) {
            (None, None) => Ok(None),
            (None, Some(fresh)) => {
                self.store(query, &fresh)?;
                Ok(Some(fresh))
            }
            (Some(cached), None) => Ok(Some(cached)),
            (Some(cached), Some(fresh)) => {
                let merged = cached.merge(fresh);
                self.store(query, &merged)?;
                Ok(Some(merged))
            }
        }
    }

    /// All entries that have a readable metadata sidecar, sorted by key.
    pub fn status(&self) -> Result<Vec<CacheEntry>> {
        if !self.cache_dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        let dir = fs::read_dir(&self.cache_dir)
            .map_err(|e| LimError::Cache(format!("read dir: {e}")))?;
        for entry in dir {
            let entry = entry.map_err(|e| LimError::Cache(format!("dir entry: {e}")))?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(key) = name.strip_suffix(META_SUFFIX) else {
                continue;
            };
            let Some(meta) = fs::read_to_string(entry.path())
                .ok()
                .and_then(|c| serde_json::from_str::<CacheMeta>(&c).ok())
            else {
                continue;
            };
            let size_bytes = fs::metadata(self.cache_dir.join(format!("{key}.{ENTRY_EXT}")))
                .map(|m| m.len())
                .unwrap_or(0);
            entries.push(CacheEntry {
                key: key.to_string(),
                meta,
                size_bytes,
            });
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Remove every file belonging to a cache key, including leftover `.tmp`
    /// writes, quarantined entries and data files without a sidecar.
    /// Returns the number of files removed.
    pub fn clear(&self) -> Result<usize> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        let dir = fs::read_dir(&self.cache_dir)
            .map_err(|e| LimError::Cache(format!("read dir: {e}")))?;
        for entry in dir {
            let entry = entry.map_err(|e| LimError::Cache(format!("dir entry: {e}")))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            if !is_cache_file(&entry.file_name().to_string_lossy()) {
                continue;
            }
            fs::remove_file(entry.path()).map_err(|e| LimError::Cache(format!("remove: {e}")))?;
            removed += 1;
        }
        tracing::info!(dir = %self.cache_dir.display(), removed, "cache cleared");
        Ok(removed)
    }
}

/// `<32 hex digits>.parquet...` or `<32 hex digits>.meta.json...`.
fn is_cache_file(name: &str) -> bool {
    let (Some(key), Some(rest)) = (name.get(..32), name.get(32..)) else {
        return false;
    };
    key.bytes().all(|b| b.is_ascii_hexdigit())
        && (rest.starts_with(&format!(".{ENTRY_EXT}")) || rest.starts_with(META_SUFFIX))
}

fn data_hash(table: &SeriesTable) -> Result<String> {
    let mut buf = Vec::new();
    table.write_csv(&mut buf)?;
    Ok(blake3::hash(&buf).to_hex().to_string())
}

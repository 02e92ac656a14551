//! Publishing the catalog and build artifacts to an object store, followed by
//! a CDN cache invalidation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::ConfigDoc;
use crate::error::{Error, Result};
use crate::workspace::WorkspacePaths;

pub mod http;
pub mod s3;

/// Object key of the catalog, regardless of where it lives locally.
pub const INDEX_KEY: &str = "index.json";

fn default_invalidate_paths() -> Vec<String> {
    vec!["/*".into()]
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    S3,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub backend: Backend,
    #[serde(default = "default_invalidate_paths")]
    pub invalidate_paths: Vec<String>,
    pub s3: s3::S3Config,
    pub http: http::HttpConfig,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            invalidate_paths: default_invalidate_paths(),
            s3: s3::S3Config::default(),
            http: http::HttpConfig::default(),
        }
    }
}

pub fn load_cfg(doc: &ConfigDoc) -> Result<PublishConfig> {
    Ok(doc.deserialize_path("publish")?.unwrap_or_default())
}

pub trait ObjectStore {
    /// Human-readable location, e.g. `s3://bucket/`.
    fn destination(&self) -> String;

    /// Fails early when the store is unreachable or misconfigured.
    fn preflight(&self) -> Result<()> {
        Ok(())
    }

    fn upload(&self, local: &Path, key: &str, content_type: &str) -> Result<()>;

    /// `Ok(None)` when the store has no cache to invalidate; otherwise an
    /// identifier for the submitted request.
    fn invalidate(&self, paths: &[String]) -> Result<Option<String>>;
}

pub fn open_store(cfg: &PublishConfig) -> Result<Box<dyn ObjectStore>> {
    let store: Box<dyn ObjectStore> = match cfg.backend {
        Backend::S3 => Box::new(s3::S3Store::from_config(&cfg.s3)?),
        Backend::Http => Box::new(http::HttpStore::from_config(&cfg.http)?),
    };
    debug!(backend = ?cfg.backend, destination = %store.destination(), "opened object store");
    Ok(store)
}

pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("json") => "application/json",
        Some("bin" | "elf" | "uf2" | "hex") => "application/octet-stream",
        _ => "application/octet-stream",
    }
}

pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} TB")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub local: PathBuf,
    pub key: String,
    pub content_type: &'static str,
    pub size: u64,
}

/// The catalog first, then every file below the builds directory in path order.
pub fn collect_uploads(paths: &WorkspacePaths) -> Result<Vec<Upload>> {
    let mut out = Vec::new();
    if paths.index_file.is_file() {
        out.push(upload_for(&paths.index_file, INDEX_KEY.to_string())?);
    }
    if !paths.builds_dir.is_dir() {
        return Ok(out);
    }
    for entry in walkdir::WalkDir::new(&paths.builds_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let key = paths.relative_key(entry.path())?;
        out.push(upload_for(entry.path(), key)?);
    }
    Ok(out)
}

fn upload_for(local: &Path, key: String) -> Result<Upload> {
    let size = fs::metadata(local)
        .map_err(|e| Error::msg(format!("failed to stat {}: {e}", local.display())))?
        .len();
    Ok(Upload {
        local: local.to_path_buf(),
        key,
        content_type: content_type_for(local),
        size,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationStatus {
    /// Dry run, no paths configured, or a store without a cache.
    Skipped,
    Submitted(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub destination: String,
    pub files: usize,
    pub bytes: u64,
    pub dry_run: bool,
    pub invalidation: InvalidationStatus,
}

impl SyncReport {
    pub fn summary(&self) -> String {
        let action = if self.dry_run {
            "Would upload"
        } else {
            "Uploaded"
        };
        format!(
            "{action} {} files ({}) to {}",
            self.files,
            format_size(self.bytes),
            self.destination
        )
    }
}

pub fn sync(
    store: &dyn ObjectStore,
    paths: &WorkspacePaths,
    cfg: &PublishConfig,
    dry_run: bool,
) -> Result<SyncReport> {
    store.preflight()?;
    let uploads = collect_uploads(paths)?;
    let mut bytes = 0u64;
    for u in &uploads {
        if dry_run {
            debug!(key = %u.key, size = u.size, "would upload");
        } else {
            debug!(key = %u.key, size = u.size, content_type = u.content_type, "uploading");
            store.upload(&u.local, &u.key, u.content_type)?;
        }
        bytes += u.size;
    }
    info!(files = uploads.len(), bytes, dry_run, "sync finished");

    let invalidation = if dry_run || cfg.invalidate_paths.is_empty() {
        InvalidationStatus::Skipped
    } else {
        match store.invalidate(&cfg.invalidate_paths) {
            Ok(Some(id)) => InvalidationStatus::Submitted(id),
            Ok(None) => InvalidationStatus::Skipped,
            Err(e) => {
                warn!(error = %e, "cache invalidation failed");
                InvalidationStatus::Failed(e.to_string())
            }
        }
    };

    Ok(SyncReport {
        destination: store.destination(),
        files: uploads.len(),
        bytes,
        dry_run,
        invalidation,
    })
}

pub(crate) fn resolve_env_ref(env_key: Option<&str>) -> Option<String> {
    env_key
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|k| std::env::var(k).ok())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub(crate) fn resolve_string_field(literal: Option<&str>, env_key: Option<&str>) -> Option<String> {
    let direct = literal
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned);
    direct.or_else(|| resolve_env_ref(env_key))
}

pub(crate) fn resolve_required_string_field(
    cfg_path: &str,
    literal: Option<&str>,
    env_key: Option<&str>,
) -> Result<String> {
    resolve_string_field(literal, env_key).ok_or_else(|| {
        if let Some(k) = env_key.map(str::trim).filter(|s| !s.is_empty()) {
            Error::msg(format!("{cfg_path} is empty (also checked env var '{k}')"))
        } else {
            Error::msg(format!("{cfg_path} is empty"))
        }
    })
}

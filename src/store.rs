//! Generation records, their assets, and screenshot files on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Asset, AssetKind, GenerationDetail, GenerationRecord, GenerationStatus, GenerationSummary};
use crate::prompts::StylePreset;

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("generation {0} not found")]
    NotFound(Uuid),
    #[error("generation cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: GenerationStatus, to: GenerationStatus },
}

/// Fields an update may overwrite; `None` leaves the stored value alone.
#[derive(Debug, Default, Clone)]
pub struct GenerationUpdate {
    pub code: Option<String>,
    pub css: Option<String>,
    pub status: Option<GenerationStatus>,
}

#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn create(&self, prompt: &str, style: StylePreset) -> Result<GenerationRecord, StoreError>;
    async fn update(&self, id: Uuid, update: GenerationUpdate) -> Result<GenerationRecord, StoreError>;
    async fn fetch(&self, id: Uuid, include_assets: bool) -> Result<Option<GenerationDetail>, StoreError>;
    async fn list(&self, limit: usize) -> Result<Vec<GenerationSummary>, StoreError>;
    async fn count(&self) -> Result<usize, StoreError>;
    /// Removes the record and its assets together.
    async fn delete(&self, id: Uuid) -> Result<Option<GenerationRecord>, StoreError>;
    async fn delete_all(&self) -> Result<Vec<GenerationRecord>, StoreError>;
    async fn add_asset(&self, id: Uuid, kind: AssetKind, path: &str) -> Result<Asset, StoreError>;
    async fn set_screenshot(&self, id: Uuid, url: &str) -> Result<GenerationRecord, StoreError>;
}

#[derive(Default)]
struct Tables {
    records: HashMap<Uuid, GenerationRecord>,
    assets: HashMap<Uuid, Vec<Asset>>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GenerationStore for MemoryStore {
    async fn create(&self, prompt: &str, style: StylePreset) -> Result<GenerationRecord, StoreError> {
        let now = Utc::now();
        let record = GenerationRecord {
            id: Uuid::new_v4(),
            prompt: prompt.to_string(),
            style,
            code: String::new(),
            css: None,
            status: GenerationStatus::Pending,
            screenshot_url: None,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update(&self, id: Uuid, update: GenerationUpdate) -> Result<GenerationRecord, StoreError> {
        let mut tables = self.tables.write();
        let record = tables.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(next) = update.status {
            if next != record.status && !record.status.can_become(next) {
                return Err(StoreError::InvalidTransition { from: record.status, to: next });
            }
            record.status = next;
        }
        if let Some(code) = update.code {
            record.code = code;
        }
        if let Some(css) = update.css {
            record.css = Some(css);
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn fetch(&self, id: Uuid, include_assets: bool) -> Result<Option<GenerationDetail>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.records.get(&id).map(|record| GenerationDetail {
            record: record.clone(),
            assets: if include_assets {
                tables.assets.get(&id).cloned().unwrap_or_default()
            } else {
                Vec::new()
            },
        }))
    }

    async fn list(&self, limit: usize) -> Result<Vec<GenerationSummary>, StoreError> {
        let tables = self.tables.read();
        let mut records: Vec<&GenerationRecord> = tables.records.values().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records
            .into_iter()
            .take(limit)
            .map(|record| GenerationSummary {
                record: record.clone(),
                asset_count: tables.assets.get(&record.id).map_or(0, Vec::len),
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.tables.read().records.len())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<GenerationRecord>, StoreError> {
        let mut tables = self.tables.write();
        tables.assets.remove(&id);
        Ok(tables.records.remove(&id))
    }

    async fn delete_all(&self) -> Result<Vec<GenerationRecord>, StoreError> {
        let mut tables = self.tables.write();
        tables.assets.clear();
        Ok(tables.records.drain().map(|(_, record)| record).collect())
    }

    async fn add_asset(&self, id: Uuid, kind: AssetKind, path: &str) -> Result<Asset, StoreError> {
        let mut tables = self.tables.write();
        if !tables.records.contains_key(&id) {
            return Err(StoreError::NotFound(id));
        }
        let asset = Asset {
            id: Uuid::new_v4(),
            generation_id: id,
            kind,
            path: path.to_string(),
            created_at: Utc::now(),
        };
        tables.assets.entry(id).or_default().push(asset.clone());
        Ok(asset)
    }

    async fn set_screenshot(&self, id: Uuid, url: &str) -> Result<GenerationRecord, StoreError> {
        let mut tables = self.tables.write();
        let record = tables.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.screenshot_url = Some(url.to_string());
        record.updated_at = Utc::now();
        Ok(record.clone())
    }
}

/// Screenshot PNGs kept under one directory and served at `/screenshots/`.
#[derive(Debug, Clone)]
pub struct ScreenshotFiles {
    dir: PathBuf,
}

impl ScreenshotFiles {
    pub const URL_PREFIX: &'static str = "/screenshots/";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn save(&self, id: Uuid, png: &[u8]) -> std::io::Result<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!("{id}.png");
        tokio::fs::write(self.dir.join(&name), png).await?;
        Ok(format!("{}{name}", Self::URL_PREFIX))
    }

    /// Only the final path component of `url` is used, so a stored URL can
    /// never point outside the screenshot directory.
    pub fn path_for_url(&self, url: &str) -> Option<PathBuf> {
        let name = Path::new(url).file_name()?;
        Some(self.dir.join(name))
    }

    /// Best-effort removal; returns whether a file was deleted.
    pub async fn remove(&self, url: &str) -> bool {
        let Some(path) = self.path_for_url(url) else {
            return false;
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("🗑️ Deleted screenshot file: {}", path.display());
                true
            }
            Err(e) => {
                tracing::warn!("⚠️ Failed to delete screenshot file {}: {}", path.display(), e);
                false
            }
        }
    }
}

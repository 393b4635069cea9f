use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use thiserror::Error;
use uuid::Uuid;

use crate::preview::IsolationLevel;
use crate::prompts::{StylePreset, TemplateType};

/// Largest accepted reference image or screenshot, in decoded bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub style: StylePreset,
    #[serde(default)]
    pub template: Option<TemplateType>, // overrides keyword detection
    #[serde(default)]
    pub reference_image: Option<String>, // data:image/...;base64,...
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Completed,
    Failed,
}

impl GenerationStatus {
    /// Records only ever move from pending to a terminal state.
    pub fn can_become(self, next: GenerationStatus) -> bool {
        matches!(
            (self, next),
            (GenerationStatus::Pending, GenerationStatus::Completed) | (GenerationStatus::Pending, GenerationStatus::Failed)
        )
    }
}

#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerationRecord {
    pub id: Uuid,
    pub prompt: String,
    pub style: StylePreset,
    pub code: String,
    pub css: Option<String>,
    pub status: GenerationStatus,
    pub screenshot_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Screenshot,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Asset {
    pub id: Uuid,
    pub generation_id: Uuid,
    pub kind: AssetKind,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Clone)]
pub struct GenerationDetail {
    #[serde(flatten)]
    pub record: GenerationRecord,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Serialize, Clone)]
pub struct GenerationSummary {
    #[serde(flatten)]
    pub record: GenerationRecord,
    pub asset_count: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct GenerateMetrics {
    pub total_duration_ms: u64,
    pub code_length: usize,
    pub css_length: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct GenerateResponse {
    pub id: Uuid,
    pub code: String,
    pub css: Option<String>,
    pub status: GenerationStatus,
    pub attempts: u32,
    pub template: TemplateType,
    pub metrics: GenerateMetrics,
}

#[derive(Debug, Serialize, Clone)]
pub struct GenerationList {
    pub generations: Vec<GenerationSummary>,
    pub total: usize,
}

#[derive(Debug, Deserialize, Default)]
pub struct ListQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
    pub id: Uuid,
}

#[derive(Debug, Serialize, Clone)]
pub struct DeleteAllResponse {
    pub success: bool,
    pub message: String,
    pub deleted: usize,
    pub deleted_files: usize,
    pub failed_files: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScreenshotRequest {
    pub image: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PreviewBody {
    #[serde(default)]
    pub session_id: Option<String>,
    pub code: String,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub mode: Option<IsolationLevel>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PreviewQuery {
    #[serde(default)]
    pub mode: Option<IsolationLevel>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImageError {
    #[error("Invalid image format. Expected a data:image/... URL")]
    NotDataUrl,
    #[error("Invalid image data: {0}")]
    Malformed(String),
    #[error("Image is too large ({kb}KB). The maximum is 5MB")]
    TooLarge { kb: usize },
}

/// A validated `data:image/...;base64,...` payload.
#[derive(Debug, Clone)]
pub struct DataUrlImage {
    pub data_url: String,
    pub format: image::ImageFormat,
    pub bytes: Vec<u8>,
}

impl DataUrlImage {
    pub fn parse(data_url: &str) -> Result<Self, ImageError> {
        let rest = data_url.strip_prefix("data:image/").ok_or(ImageError::NotDataUrl)?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ImageError::Malformed("missing image payload".into()))?;
        if !header.ends_with(";base64") {
            return Err(ImageError::Malformed("payload must be base64 encoded".into()));
        }

        // Reject by the encoded length before paying for a decode.
        let payload = payload.trim();
        let estimated = payload.len() / 4 * 3;
        if estimated > MAX_IMAGE_BYTES + 2 {
            return Err(ImageError::TooLarge { kb: estimated / 1024 });
        }
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| ImageError::Malformed(e.to_string()))?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ImageError::TooLarge { kb: bytes.len() / 1024 });
        }
        let format =
            image::guess_format(&bytes).map_err(|_| ImageError::Malformed("not a recognisable image".into()))?;

        Ok(Self {
            data_url: data_url.to_string(),
            format,
            bytes,
        })
    }

    pub fn size_kb(&self) -> usize {
        self.bytes.len() / 1024
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Curation tier of a file version. Every asset enters at bronze and moves up
/// one tier at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Bronze,
    Silver,
    Gold,
}

impl Tier {
    pub fn dir_name(self) -> &'static str {
        match self {
            Tier::Bronze => "bronze",
            Tier::Silver => "silver",
            Tier::Gold => "gold",
        }
    }

    pub fn next_up(self) -> Option<Tier> {
        match self {
            Tier::Bronze => Some(Tier::Silver),
            Tier::Silver => Some(Tier::Gold),
            Tier::Gold => None,
        }
    }

    pub fn next_down(self) -> Option<Tier> {
        match self {
            Tier::Bronze => None,
            Tier::Silver => Some(Tier::Bronze),
            Tier::Gold => Some(Tier::Silver),
        }
    }

    /// In-place file replacement is only legal while a version sits in silver.
    pub fn allows_replace(self) -> bool {
        matches!(self, Tier::Silver)
    }

    /// Ordering used when picking one representative version per asset:
    /// lower ranks are less processed and preferred for burst analysis.
    pub fn rank(self) -> u8 {
        match self {
            Tier::Bronze => 0,
            Tier::Silver => 1,
            Tier::Gold => 2,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Unprocessed,
    Processed,
    /// A higher-tier version exists; this row is kept as the audit trail and
    /// hidden from default listings.
    Promoted,
    Rejected,
}

impl ProcessingState {
    pub fn rank(self) -> u8 {
        match self {
            ProcessingState::Unprocessed => 0,
            ProcessingState::Processed => 1,
            ProcessingState::Promoted => 2,
            ProcessingState::Rejected => 3,
        }
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessingState::Unprocessed => "unprocessed",
            ProcessingState::Processed => "processed",
            ProcessingState::Promoted => "promoted",
            ProcessingState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Logical photo or video identity. Owns its file versions; deleting the
/// asset cascades to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: String,
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
}

impl MediaAsset {
    pub fn new(original_filename: impl Into<String>) -> Self {
        Self {
            id: new_asset_id(),
            original_filename: original_filename.into(),
            created_at: Utc::now(),
        }
    }
}

/// One physical rendition of an asset at a tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileVersion {
    pub id: String,
    pub media_asset_id: String,
    pub tier: Tier,
    /// Path relative to the library root.
    pub file_path: String,
    /// SHA-256 of the file bytes, hex encoded.
    pub file_hash: String,
    /// Mean-threshold perceptual hash bit string; images only, backfilled lazily.
    pub perceptual_hash: Option<String>,
    pub file_size: u64,
    pub mime_type: String,
    pub processing_state: ProcessingState,
    pub metadata: MediaMetadata,
    pub created_at: DateTime<Utc>,
}

impl FileVersion {
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// A version is superseded once a higher tier has been created from it.
    pub fn is_superseded(&self) -> bool {
        self.processing_state == ProcessingState::Promoted
    }
}

/// Per-concern metadata attached to a file version. Each concern is optional
/// and explicitly typed; there is no free-form blob outside `custom`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub exif: Option<ExifMetadata>,
    pub ai: Option<AiMetadata>,
    pub custom: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExifMetadata {
    pub date_time_original: Option<DateTime<Utc>>,
    pub create_date: Option<DateTime<Utc>>,
    pub modify_date: Option<DateTime<Utc>>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens: Option<String>,
    pub software: Option<String>,
    pub iso: Option<u32>,
    pub aperture: Option<f32>,
    pub focal_length: Option<f32>,
    pub shutter_speed: Option<String>,
}

impl ExifMetadata {
    pub fn is_empty(&self) -> bool {
        self == &ExifMetadata::default()
    }
}

/// Output of the vision-language provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiMetadata {
    pub short_description: Option<String>,
    pub detailed_description: Option<String>,
    pub tags: Vec<String>,
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryAction {
    Ingested,
    Enriched,
    Promoted,
    Demoted,
    Replaced,
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HistoryAction::Ingested => "INGESTED",
            HistoryAction::Enriched => "ENRICHED",
            HistoryAction::Promoted => "PROMOTED",
            HistoryAction::Demoted => "DEMOTED",
            HistoryAction::Replaced => "REPLACED",
        };
        f.write_str(s)
    }
}

/// Append-only audit record for an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub media_asset_id: String,
    pub action: HistoryAction,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        media_asset_id: impl Into<String>,
        action: HistoryAction,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("hst_{}", Uuid::new_v4().simple()),
            media_asset_id: media_asset_id.into(),
            action,
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Join view of a file version with its asset's original filename; the unit
/// similarity scoring and burst grouping operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub version: FileVersion,
    pub original_filename: String,
}

pub fn new_asset_id() -> String {
    format!("ast_{}", Uuid::new_v4().simple())
}

pub fn new_version_id() -> String {
    format!("ver_{}", Uuid::new_v4().simple())
}

/// Best-effort MIME type from the filename extension.
pub fn mime_for_filename(filename: &str) -> String {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    };
    mime.to_string()
}

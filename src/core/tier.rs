//! Tier lifecycle: bronze originals are enriched, promoted upward with the
//! lower rendition kept as a superseded fallback, and demoted by deleting the
//! higher rendition and reactivating the one below it.

use crate::enrich::{EnrichError, MetadataEmbedder, VisionProvider};
use crate::storage::library::MediaLibrary;
use crate::storage::models::{
    FileVersion, HistoryAction, HistoryEntry, ProcessingState, Tier, new_version_id,
};
use crate::storage::store::{MediaStore, StoreError};
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TierError {
    #[error("file version not found: {0}")]
    NotFound(String),

    #[error("tier transition not allowed from {tier}: {reason}")]
    TierViolation { tier: Tier, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Enrich(#[from] EnrichError),
}

pub struct TierStateMachine {
    store: Arc<dyn MediaStore>,
    library: MediaLibrary,
    embedder: Box<dyn MetadataEmbedder>,
}

impl TierStateMachine {
    pub fn new(
        store: Arc<dyn MediaStore>,
        library: MediaLibrary,
        embedder: Box<dyn MetadataEmbedder>,
    ) -> Self {
        Self {
            store,
            library,
            embedder,
        }
    }

    fn load(&self, version_id: &str) -> Result<FileVersion, TierError> {
        self.store
            .get_version(version_id)?
            .ok_or_else(|| TierError::NotFound(version_id.to_string()))
    }

    fn violation(tier: Tier, reason: impl Into<String>) -> TierError {
        TierError::TierViolation {
            tier,
            reason: reason.into(),
        }
    }

    /// Runs the vision provider over a bronze version and records the result.
    /// Enrichment is the gate for silver: a successful pass moves the version
    /// to `Processed`.
    pub fn enrich_with(
        &self,
        provider: &dyn VisionProvider,
        version_id: &str,
    ) -> Result<FileVersion, TierError> {
        let mut version = self.load(version_id)?;
        if version.tier != Tier::Bronze {
            return Err(Self::violation(version.tier, "only bronze versions are enriched"));
        }
        if version.is_superseded() {
            return Err(Self::violation(version.tier, "version already promoted"));
        }

        let ai = provider.analyze(&self.library.resolve(&version.file_path))?;
        version.metadata.ai = Some(ai);
        version.processing_state = ProcessingState::Processed;
        self.store.update_version(&version)?;
        self.store.append_history(HistoryEntry::new(
            &version.media_asset_id,
            HistoryAction::Enriched,
            format!("Enriched {}", version.id),
        ))?;
        Ok(version)
    }

    /// Copies an enriched bronze version into the silver tier. The bronze
    /// rendition stays on disk and in the store, flagged superseded.
    pub fn promote_to_silver(&self, version_id: &str) -> Result<FileVersion, TierError> {
        let mut bronze = self.load(version_id)?;
        if bronze.tier != Tier::Bronze {
            return Err(Self::violation(bronze.tier, "silver promotion starts from bronze"));
        }
        if bronze.is_superseded() {
            return Err(Self::violation(bronze.tier, "version already promoted"));
        }
        if bronze.processing_state != ProcessingState::Processed {
            return Err(Self::violation(
                bronze.tier,
                "version must be enriched before promotion",
            ));
        }

        let filename = stored_filename(&bronze);
        let silver_path =
            self.library
                .copy_into(&bronze.file_path, Tier::Silver, &filename, file_date(&bronze))?;

        let silver = FileVersion {
            id: new_version_id(),
            media_asset_id: bronze.media_asset_id.clone(),
            tier: Tier::Silver,
            file_path: silver_path,
            file_hash: bronze.file_hash.clone(),
            perceptual_hash: bronze.perceptual_hash.clone(),
            file_size: bronze.file_size,
            mime_type: bronze.mime_type.clone(),
            processing_state: ProcessingState::Processed,
            metadata: bronze.metadata.clone(),
            created_at: Utc::now(),
        };

        // Copy landed first; undo it if the row cannot be recorded so the
        // library never holds files the store does not know about.
        if let Err(e) = self.store.create_version(silver.clone()) {
            let _ = self.library.remove(&silver.file_path);
            return Err(e.into());
        }

        bronze.processing_state = ProcessingState::Promoted;
        self.store.update_version(&bronze)?;
        self.store.append_history(HistoryEntry::new(
            &bronze.media_asset_id,
            HistoryAction::Promoted,
            format!("Promoted {} to silver as {}", bronze.id, silver.id),
        ))?;
        Ok(silver)
    }

    /// Writes a metadata-embedded gold rendition from an active silver
    /// version. The silver row survives as the demotion fallback.
    pub fn promote_to_gold(&self, version_id: &str) -> Result<FileVersion, TierError> {
        let mut silver = self.load(version_id)?;
        if silver.tier != Tier::Silver {
            return Err(Self::violation(silver.tier, "gold promotion starts from silver"));
        }
        if silver.is_superseded() {
            return Err(Self::violation(silver.tier, "version already promoted"));
        }

        let filename = stored_filename(&silver);
        let gold_path = self
            .library
            .prepare(Tier::Gold, &filename, file_date(&silver))?;
        self.embedder.embed(
            &self.library.resolve(&silver.file_path),
            &self.library.resolve(&gold_path),
            &silver.metadata,
        )?;

        // Embedding may change the byte size, so measure the written file.
        let gold_size = std::fs::metadata(self.library.resolve(&gold_path))
            .map(|m| m.len())
            .unwrap_or(silver.file_size);
        let gold = FileVersion {
            id: new_version_id(),
            media_asset_id: silver.media_asset_id.clone(),
            tier: Tier::Gold,
            file_path: gold_path,
            file_hash: silver.file_hash.clone(),
            perceptual_hash: silver.perceptual_hash.clone(),
            file_size: gold_size,
            mime_type: silver.mime_type.clone(),
            processing_state: ProcessingState::Processed,
            metadata: silver.metadata.clone(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.create_version(gold.clone()) {
            let _ = self.library.remove(&gold.file_path);
            return Err(e.into());
        }

        silver.processing_state = ProcessingState::Promoted;
        self.store.update_version(&silver)?;
        self.store.append_history(HistoryEntry::new(
            &silver.media_asset_id,
            HistoryAction::Promoted,
            format!("Promoted {} to gold as {}", silver.id, gold.id),
        ))?;
        Ok(gold)
    }

    /// Deletes a higher-tier rendition and reactivates the one below it.
    /// Bronze is the floor and cannot be demoted.
    pub fn demote(&self, version_id: &str) -> Result<FileVersion, TierError> {
        let version = self.load(version_id)?;
        let lower_tier = version
            .tier
            .next_down()
            .ok_or_else(|| Self::violation(version.tier, "bronze is the lowest tier"))?;

        // Most recent lower version; older superseded rows stay untouched.
        let mut lower = self
            .store
            .versions_for_asset(&version.media_asset_id)?
            .into_iter()
            .filter(|v| v.tier == lower_tier)
            .last()
            .ok_or_else(|| {
                Self::violation(version.tier, format!("no {lower_tier} version to fall back to"))
            })?;

        self.store.delete_version(&version.id)?;
        self.library.remove(&version.file_path)?;

        if lower.processing_state == ProcessingState::Promoted {
            lower.processing_state = ProcessingState::Processed;
            self.store.update_version(&lower)?;
        }
        self.store.append_history(HistoryEntry::new(
            &version.media_asset_id,
            HistoryAction::Demoted,
            format!("Demoted {} from {}, reactivated {}", version.id, version.tier, lower.id),
        ))?;
        Ok(lower)
    }

    /// The asset's active rendition: its highest-tier unsuperseded version.
    pub fn current_version(&self, asset_id: &str) -> Result<Option<FileVersion>, TierError> {
        let versions = self.store.versions_for_asset(asset_id)?;
        Ok(versions
            .into_iter()
            .filter(|v| !v.is_superseded())
            .max_by_key(|v| v.tier.rank()))
    }
}

fn stored_filename(version: &FileVersion) -> String {
    Path::new(&version.file_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| version.file_path.clone())
}

/// Dated tier directories follow the capture date when EXIF carries one, so
/// promoted files land beside the rest of that shoot.
fn file_date(version: &FileVersion) -> DateTime<Utc> {
    version
        .metadata
        .exif
        .as_ref()
        .and_then(|exif| exif.date_time_original.or(exif.create_date))
        .unwrap_or(version.created_at)
}

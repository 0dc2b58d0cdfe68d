//! Duplicate detection at the ingest gate. Exact byte duplicates are skipped
//! outright; visually identical images raise a conflict for the user to
//! resolve, except when the pair reads as a burst sequence.

use crate::config::EngineConfig;
use crate::core::perceptual::PerceptualHasher;
use crate::core::similarity::{NameRelation, SimilarityScorer, capture_time_from, relate_names};
use crate::storage::library::MediaLibrary;
use crate::storage::models::{
    FileVersion, HistoryAction, HistoryEntry, MediaAsset, MediaMetadata, ProcessingState, Tier,
    new_version_id,
};
use crate::storage::store::{MediaStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Filename fragments that mark an edited or exported variant.
const EDITING_KEYWORDS: [&str; 6] = ["edited", "modified", "copy", "version", "final", "export"];

/// Software tags written by photo editors rather than cameras.
const EDITOR_SOFTWARE: [&str; 4] = ["photoshop", "gimp", "lightroom", "capture one"];

/// Filename fragments that mark deliberate multi-shot captures.
const MULTI_SHOT_KEYWORDS: [&str; 4] = ["burst", "hdr", "bracket", "pano"];

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("unknown resolution action: {0}")]
    InvalidAction(String),

    #[error("staged file missing: {0}")]
    MissingFile(PathBuf),

    #[error("replace is only allowed on the silver tier, not {0}")]
    TierViolation(Tier),

    #[error("conflict references unknown version: {0}")]
    UnknownVersion(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A staged upload, hashed and parsed but not yet admitted to the library.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub temp_path: PathBuf,
    pub original_filename: String,
    pub file_hash: String,
    pub file_size: u64,
    pub mime_type: String,
    pub perceptual_hash: Option<String>,
    pub metadata: MediaMetadata,
}

impl IncomingFile {
    fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    fn capture_date(&self) -> DateTime<Utc> {
        let ms = capture_time_from(
            self.metadata.exif.as_ref(),
            &self.original_filename,
            Utc::now(),
        );
        DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Byte-for-byte duplicate. Exact matches short-circuit to auto-skip
    /// before a conflict is built, so this only appears in externally
    /// sourced conflict records.
    IdenticalHash,
    /// At or above the certainty threshold; indistinguishable to the hash.
    VisuallyIdentical,
    /// In the duplicate band but below certainty; surrounding metadata
    /// decides whether it is an edit, an export, or a burst sibling.
    MetadataSimilar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    KeepExisting,
    ReplaceWithNew,
    KeepBoth,
}

impl FromStr for ResolutionAction {
    type Err = ConflictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_existing" => Ok(Self::KeepExisting),
            "replace_with_new" => Ok(Self::ReplaceWithNew),
            "keep_both" => Ok(Self::KeepBoth),
            other => Err(ConflictError::InvalidAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateConflict {
    pub existing: FileVersion,
    pub existing_filename: String,
    /// Perceptual similarity, 0-100.
    pub similarity: f64,
    pub conflict_type: ConflictType,
    pub reasoning: Vec<String>,
    pub suggested_action: ResolutionAction,
}

/// Result of screening one staged file against the library.
#[derive(Debug)]
pub enum CheckOutcome {
    /// Byte-identical to an existing version; never admitted.
    AutoSkipped { existing: FileVersion },
    /// Needs a user decision against one or more existing versions.
    ConflictPending(Vec<DuplicateConflict>),
    /// Clear of the library; admission may proceed.
    AutoAdmitted,
}

/// What a resolution did, for reporting.
#[derive(Debug)]
pub enum ResolutionOutcome {
    Skipped,
    Replaced(FileVersion),
    Admitted(FileVersion),
}

pub struct DuplicateConflictResolver {
    store: Arc<dyn MediaStore>,
    library: MediaLibrary,
    hasher: PerceptualHasher,
    scorer: SimilarityScorer,
    config: EngineConfig,
}

impl DuplicateConflictResolver {
    pub fn new(store: Arc<dyn MediaStore>, library: MediaLibrary, config: &EngineConfig) -> Self {
        Self {
            store,
            library,
            hasher: PerceptualHasher::new(config.perceptual_grid),
            scorer: SimilarityScorer::new(),
            config: config.clone(),
        }
    }

    /// Screens a staged file. Exact hashes short-circuit before any image
    /// work; the perceptual pass only runs for images that produced a hash.
    pub fn check(&self, incoming: &IncomingFile) -> Result<CheckOutcome, ConflictError> {
        if let Some(existing) = self.store.find_version_by_hash(&incoming.file_hash)? {
            return Ok(CheckOutcome::AutoSkipped { existing });
        }

        let incoming_hash = match (&incoming.perceptual_hash, incoming.is_image()) {
            (Some(hash), true) => hash,
            _ => return Ok(CheckOutcome::AutoAdmitted),
        };

        let mut conflicts = Vec::new();
        let mut seen_hashes: HashSet<String> = HashSet::new();

        for existing in self.store.list_versions()? {
            if !existing.is_image() {
                continue;
            }
            let existing_hash = match self.existing_perceptual_hash(&existing)? {
                Some(hash) => hash,
                None => continue,
            };
            // Renditions of one photo share a hash; one conflict covers them.
            if seen_hashes.contains(&existing_hash) {
                continue;
            }

            let similarity = self.scorer.perceptual_similarity(incoming_hash, &existing_hash);
            if similarity < self.config.duplicate_threshold {
                continue;
            }

            let existing_filename = self
                .store
                .get_asset(&existing.media_asset_id)?
                .map(|a| a.original_filename)
                .unwrap_or_else(|| existing.file_path.clone());

            if similarity < self.config.certain_duplicate_threshold
                && self.is_burst_pair(incoming, &existing, &existing_filename)
            {
                log::info!(
                    "{} reads as a burst neighbor of {existing_filename} ({similarity:.2}), admitting",
                    incoming.original_filename
                );
                continue;
            }

            let conflict_type = if similarity >= self.config.certain_duplicate_threshold {
                ConflictType::VisuallyIdentical
            } else {
                ConflictType::MetadataSimilar
            };
            let (reasoning, suggested_action) =
                self.build_reasoning(incoming, &existing, &existing_filename, similarity);

            // Mark the hash only once a conflict is raised for it; a
            // burst-suppressed version must not shadow a sibling rendition
            // that genuinely conflicts.
            seen_hashes.insert(existing_hash);
            conflicts.push(DuplicateConflict {
                existing,
                existing_filename,
                similarity,
                conflict_type,
                reasoning,
                suggested_action,
            });
        }

        if conflicts.is_empty() {
            Ok(CheckOutcome::AutoAdmitted)
        } else {
            Ok(CheckOutcome::ConflictPending(conflicts))
        }
    }

    /// Stored hash if present, otherwise hashed from the file and written
    /// back so the cost is paid once per version.
    fn existing_perceptual_hash(&self, existing: &FileVersion) -> Result<Option<String>, ConflictError> {
        if let Some(hash) = &existing.perceptual_hash {
            return Ok(Some(hash.clone()));
        }
        let Some(hash) = self.hasher.hash_path(&self.library.resolve(&existing.file_path)) else {
            return Ok(None);
        };
        let bits = hash.into_bits();
        self.store.update_perceptual_hash(&existing.id, &bits)?;
        Ok(Some(bits))
    }

    /// Heuristic for "same scene, different frame": near-identical pixels
    /// that should land as burst siblings rather than raise a conflict.
    fn is_burst_pair(
        &self,
        incoming: &IncomingFile,
        existing: &FileVersion,
        existing_filename: &str,
    ) -> bool {
        let incoming_ms = capture_time_from(
            incoming.metadata.exif.as_ref(),
            &incoming.original_filename,
            Utc::now(),
        );
        let existing_ms = capture_time_from(
            existing.metadata.exif.as_ref(),
            existing_filename,
            existing.created_at,
        );
        let dt = (incoming_ms - existing_ms).abs();
        if dt > 30_000 {
            return false;
        }

        if let NameRelation::Sequential(gap) =
            relate_names(&incoming.original_filename, existing_filename)
        {
            if (1..=10).contains(&gap) {
                return true;
            }
        }

        let a = incoming.original_filename.to_ascii_lowercase();
        let b = existing_filename.to_ascii_lowercase();
        if MULTI_SHOT_KEYWORDS.iter().any(|k| a.contains(k) && b.contains(k)) {
            return true;
        }

        if let (Some(ea), Some(eb)) = (
            incoming.metadata.exif.as_ref(),
            existing.metadata.exif.as_ref(),
        ) {
            let same_camera = ea.make.is_some()
                && ea.make == eb.make
                && ea.model.is_some()
                && ea.model == eb.model;
            let same_optics = (ea.lens.is_some() && ea.lens == eb.lens)
                || (ea.iso.is_some()
                    && ea.iso == eb.iso
                    && ea.focal_length.is_some()
                    && ea.focal_length == eb.focal_length);
            if same_camera && same_optics && dt <= 10_000 {
                return true;
            }
        }

        dt <= 5_000
    }

    fn build_reasoning(
        &self,
        incoming: &IncomingFile,
        existing: &FileVersion,
        existing_filename: &str,
        similarity: f64,
    ) -> (Vec<String>, ResolutionAction) {
        let mut reasons = vec![format!(
            "{:.2}% visually similar to existing {existing_filename}",
            similarity
        )];
        let mut incoming_edited = false;
        let mut existing_edited = false;

        let name = incoming.original_filename.to_ascii_lowercase();
        if EDITING_KEYWORDS.iter().any(|k| name.contains(k)) {
            reasons.push("Incoming filename suggests an edited variant".to_string());
            incoming_edited = true;
        }
        let existing_name = existing_filename.to_ascii_lowercase();
        if EDITING_KEYWORDS.iter().any(|k| existing_name.contains(k)) {
            reasons.push("Existing filename suggests an edited variant".to_string());
            existing_edited = true;
        }

        if let Some(exif) = incoming.metadata.exif.as_ref() {
            if let Some(software) = &exif.software {
                let lower = software.to_ascii_lowercase();
                if EDITOR_SOFTWARE.iter().any(|s| lower.contains(s)) {
                    reasons.push(format!("Incoming file was written by {software}"));
                    incoming_edited = true;
                }
            }
            if let (Some(modified), Some(original)) = (exif.modify_date, exif.date_time_original) {
                if modified > original {
                    reasons.push("Incoming file was modified after capture".to_string());
                    incoming_edited = true;
                }
            }
        }

        if incoming.file_size > existing.file_size {
            reasons.push("Incoming file is larger than the stored version".to_string());
        }

        // An edited upload should not displace the stored original; a clean
        // upload may displace a stored edit. Past that the user decides.
        let suggested = if incoming_edited {
            ResolutionAction::KeepExisting
        } else if existing_edited {
            ResolutionAction::ReplaceWithNew
        } else {
            ResolutionAction::KeepBoth
        };
        (reasons, suggested)
    }

    /// Applies a user decision for a pending conflict.
    pub fn resolve(
        &self,
        incoming: IncomingFile,
        existing_version_id: &str,
        action: ResolutionAction,
    ) -> Result<ResolutionOutcome, ConflictError> {
        match action {
            ResolutionAction::KeepExisting => {
                // Dropping the staged file twice is fine.
                match fs::remove_file(&incoming.temp_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                Ok(ResolutionOutcome::Skipped)
            }
            ResolutionAction::ReplaceWithNew => {
                self.replace(incoming, existing_version_id).map(ResolutionOutcome::Replaced)
            }
            ResolutionAction::KeepBoth => self.admit(incoming).map(ResolutionOutcome::Admitted),
        }
    }

    /// In-place replacement of a silver rendition's bytes. The version keeps
    /// its identity but drops back to `Unprocessed` so enrichment reruns.
    fn replace(
        &self,
        incoming: IncomingFile,
        existing_version_id: &str,
    ) -> Result<FileVersion, ConflictError> {
        let mut existing = self
            .store
            .get_version(existing_version_id)?
            .ok_or_else(|| ConflictError::UnknownVersion(existing_version_id.to_string()))?;
        if !existing.tier.allows_replace() {
            return Err(ConflictError::TierViolation(existing.tier));
        }
        if !incoming.temp_path.exists() {
            return Err(ConflictError::MissingFile(incoming.temp_path));
        }

        let new_path = self.library.place(
            &incoming.temp_path,
            existing.tier,
            &incoming.original_filename,
            incoming.capture_date(),
        )?;
        let old_path = std::mem::replace(&mut existing.file_path, new_path);

        existing.file_hash = incoming.file_hash;
        existing.perceptual_hash = incoming.perceptual_hash;
        existing.file_size = incoming.file_size;
        existing.mime_type = incoming.mime_type;
        existing.metadata = incoming.metadata;
        existing.processing_state = ProcessingState::Unprocessed;

        if let Err(e) = self.store.update_version(&existing) {
            let _ = self.library.remove(&existing.file_path);
            return Err(e.into());
        }
        self.library.remove(&old_path)?;

        if let Some(mut asset) = self.store.get_asset(&existing.media_asset_id)? {
            asset.original_filename = incoming.original_filename.clone();
            self.store.update_asset(&asset)?;
        }
        self.store.append_history(HistoryEntry::new(
            &existing.media_asset_id,
            HistoryAction::Replaced,
            format!("Replaced {} contents with {}", existing.id, incoming.original_filename),
        ))?;
        Ok(existing)
    }

    /// Admits a new asset into bronze.
    pub fn admit(&self, incoming: IncomingFile) -> Result<FileVersion, ConflictError> {
        if !incoming.temp_path.exists() {
            return Err(ConflictError::MissingFile(incoming.temp_path));
        }

        let asset = MediaAsset::new(&incoming.original_filename);
        let asset_id = asset.id.clone();
        self.store.create_asset(asset)?;

        let file_path = self.library.place(
            &incoming.temp_path,
            Tier::Bronze,
            &incoming.original_filename,
            incoming.capture_date(),
        )?;

        let version = FileVersion {
            id: new_version_id(),
            media_asset_id: asset_id.clone(),
            tier: Tier::Bronze,
            file_path,
            file_hash: incoming.file_hash,
            perceptual_hash: incoming.perceptual_hash,
            file_size: incoming.file_size,
            mime_type: incoming.mime_type,
            processing_state: ProcessingState::Unprocessed,
            metadata: incoming.metadata,
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.create_version(version.clone()) {
            let _ = self.library.remove(&version.file_path);
            let _ = self.store.delete_asset(&asset_id);
            return Err(e.into());
        }
        self.store.append_history(HistoryEntry::new(
            &asset_id,
            HistoryAction::Ingested,
            format!("Ingested {}", incoming.original_filename),
        ))?;
        Ok(version)
    }
}

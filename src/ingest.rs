//! Ingest pipeline: stages source files, derives their hashes and metadata,
//! screens them for duplicates, and admits the survivors into bronze.

use crate::config::EngineConfig;
use crate::core::conflict::{
    CheckOutcome, ConflictError, DuplicateConflict, DuplicateConflictResolver, IncomingFile,
};
use crate::core::exif::ExifService;
use crate::core::hash::{ContentHashService, HashError};
use crate::core::perceptual::PerceptualHasher;
use crate::storage::library::MediaLibrary;
use crate::storage::models::{
    FileVersion, MediaMetadata, PhotoRecord, ProcessingState, Tier, mime_for_filename,
    new_asset_id, new_version_id,
};
use crate::storage::store::MediaStore;
use chrono::Utc;
use rayon::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif"];
const VIDEO_EXTENSIONS: [&str; 5] = ["mp4", "mov", "avi", "mkv", "webm"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source is not a supported media file: {0}")]
    Unsupported(PathBuf),

    #[error(transparent)]
    Hash(#[from] HashError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// What one batch did. Conflicts keep their staged file and prepared input so
/// the caller can resolve them later.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub admitted: Vec<FileVersion>,
    pub skipped: Vec<String>,
    pub conflicts: Vec<(IncomingFile, Vec<DuplicateConflict>)>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct IngestPipeline {
    resolver: DuplicateConflictResolver,
    library: MediaLibrary,
    content: ContentHashService,
    exif: ExifService,
    hasher: PerceptualHasher,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn MediaStore>, library: MediaLibrary, config: &EngineConfig) -> Self {
        Self {
            resolver: DuplicateConflictResolver::new(store, library.clone(), config),
            library,
            content: ContentHashService::new(),
            exif: ExifService::new(),
            hasher: PerceptualHasher::new(config.perceptual_grid),
        }
    }

    /// Copies a source file into the staging area and derives everything the
    /// duplicate check needs. The source is left untouched.
    pub fn prepare(&self, source: &Path) -> Result<IncomingFile, IngestError> {
        let filename = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| IngestError::Unsupported(source.to_path_buf()))?;
        if !is_supported(&filename) {
            return Err(IngestError::Unsupported(source.to_path_buf()));
        }

        let mime_type = mime_for_filename(&filename);
        let file_size = fs::metadata(source)?.len();
        let file_hash = self.content.compute_content_hash(source)?;

        let is_image = mime_type.starts_with("image/");
        let exif = if is_image {
            self.exif.extract(source).unwrap_or_else(|e| {
                log::warn!("EXIF extraction failed for {}: {e}", source.display());
                None
            })
        } else {
            None
        };
        let perceptual_hash = if is_image {
            self.hasher.hash_path(source).map(|h| h.into_bits())
        } else {
            None
        };

        let staging = self.library.root().join("staging");
        fs::create_dir_all(&staging)?;
        let temp_path = staging.join(format!("{}-{filename}", Uuid::new_v4().simple()));
        fs::copy(source, &temp_path)?;

        Ok(IncomingFile {
            temp_path,
            original_filename: filename,
            file_hash,
            file_size,
            mime_type,
            perceptual_hash,
            metadata: MediaMetadata {
                exif,
                ..MediaMetadata::default()
            },
        })
    }

    /// Screens a prepared file without admitting it.
    pub fn check(&self, incoming: &IncomingFile) -> Result<CheckOutcome, ConflictError> {
        self.resolver.check(incoming)
    }

    /// Screens one prepared file and admits it unless the library already has
    /// it. Pending conflicts are handed back with their staged file intact.
    pub fn ingest_prepared(
        &self,
        incoming: IncomingFile,
        report: &mut IngestReport,
    ) -> Result<(), IngestError> {
        match self.resolver.check(&incoming)? {
            CheckOutcome::AutoSkipped { existing } => {
                log::info!(
                    "{} already stored as {}, skipping",
                    incoming.original_filename,
                    existing.file_path
                );
                match fs::remove_file(&incoming.temp_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                report.skipped.push(incoming.original_filename);
            }
            CheckOutcome::ConflictPending(conflicts) => {
                report.conflicts.push((incoming, conflicts));
            }
            CheckOutcome::AutoAdmitted => {
                let version = self.resolver.admit(incoming)?;
                report.admitted.push(version);
            }
        }
        Ok(())
    }

    pub fn ingest_file(&self, source: &Path) -> Result<IngestReport, IngestError> {
        let mut report = IngestReport::default();
        let incoming = self.prepare(source)?;
        self.ingest_prepared(incoming, &mut report)?;
        Ok(report)
    }

    /// Walks a directory and ingests every supported file. Preparation is
    /// hash-heavy and runs in parallel; store mutations stay sequential.
    pub fn ingest_dir(&self, dir: &Path) -> Result<IngestReport, IngestError> {
        let sources = collect_media_paths(dir, false);
        let prepared: Vec<(PathBuf, Result<IncomingFile, IngestError>)> = sources
            .into_par_iter()
            .map(|path| {
                let incoming = self.prepare(&path);
                (path, incoming)
            })
            .collect();

        let mut report = IngestReport::default();
        for (path, result) in prepared {
            match result {
                Ok(incoming) => self.ingest_prepared(incoming, &mut report)?,
                Err(e) => {
                    log::warn!("failed to prepare {}: {e}", path.display());
                    report.failed.push((path, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}

pub fn is_supported(filename: &str) -> bool {
    has_extension(filename, &IMAGE_EXTENSIONS) || has_extension(filename, &VIDEO_EXTENSIONS)
}

fn has_extension(filename: &str, extensions: &[&str]) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            extensions.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn collect_media_paths(dir: &Path, images_only: bool) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            if images_only {
                has_extension(name, &IMAGE_EXTENSIONS)
            } else {
                is_supported(name)
            }
        })
        .collect()
}

/// Builds standalone photo records from a directory, outside any library.
/// Burst analysis of loose folders runs on these.
pub fn collect_records(dir: &Path) -> Vec<PhotoRecord> {
    let content = ContentHashService::new();
    let exif = ExifService::new();

    let mut records: Vec<PhotoRecord> = collect_media_paths(dir, true)
        .into_par_iter()
        .filter_map(|path| {
            let filename = path.file_name()?.to_string_lossy().into_owned();
            let file_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            let file_hash = match content.compute_content_hash(&path) {
                Ok(hash) => hash,
                Err(e) => {
                    log::warn!("failed to hash {}: {e}", path.display());
                    return None;
                }
            };
            let exif_meta = exif.extract(&path).unwrap_or_default();

            // Loose files have no stored asset; each still needs a distinct
            // asset id so burst analysis treats them as separate photos.
            let version = FileVersion {
                id: new_version_id(),
                media_asset_id: new_asset_id(),
                tier: Tier::Bronze,
                file_path: path.to_string_lossy().into_owned(),
                file_hash,
                perceptual_hash: None,
                file_size,
                mime_type: mime_for_filename(&filename),
                processing_state: ProcessingState::Unprocessed,
                metadata: MediaMetadata {
                    exif: exif_meta,
                    ..MediaMetadata::default()
                },
                created_at: Utc::now(),
            };
            Some(PhotoRecord {
                version,
                original_filename: filename,
            })
        })
        .collect();

    records.sort_by(|a, b| a.original_filename.cmp(&b.original_filename));
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::MemoryStore;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn gradient_image(path: &Path, seed: u8) {
        let img = ImageBuffer::from_fn(32, 32, |x, y| {
            Rgb([
                (x as u8).wrapping_mul(seed),
                (y as u8).wrapping_add(seed),
                seed,
            ])
        });
        img.save(path).unwrap();
    }

    fn checkerboard_image(path: &Path) {
        let img = ImageBuffer::from_fn(32, 32, |x, y| {
            let v = if (x / 4 + y / 4) % 2 == 0 { 0u8 } else { 255 };
            Rgb([v, v, v])
        });
        img.save(path).unwrap();
    }

    fn pipeline() -> (TempDir, Arc<MemoryStore>, IngestPipeline) {
        let dir = TempDir::new().unwrap();
        let library = MediaLibrary::new(dir.path().join("library"));
        library.init().unwrap();
        let store = Arc::new(MemoryStore::new());
        let pipeline = IngestPipeline::new(store.clone(), library, &EngineConfig::default());
        (dir, store, pipeline)
    }

    #[test]
    fn prepare_derives_hashes_without_touching_source() {
        let (dir, _store, pipeline) = pipeline();
        let source = dir.path().join("IMG_0001.png");
        gradient_image(&source, 3);

        let incoming = pipeline.prepare(&source).unwrap();
        assert_eq!(incoming.original_filename, "IMG_0001.png");
        assert_eq!(incoming.file_hash.len(), 64);
        assert_eq!(incoming.perceptual_hash.as_ref().map(String::len), Some(64));
        assert!(incoming.temp_path.exists());
        assert!(source.exists());
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let (dir, _store, pipeline) = pipeline();
        let source = dir.path().join("notes.txt");
        fs::write(&source, b"not media").unwrap();

        assert!(matches!(
            pipeline.prepare(&source),
            Err(IngestError::Unsupported(_))
        ));
    }

    #[test]
    fn first_ingest_admits_reingest_skips() {
        let (dir, store, pipeline) = pipeline();
        let source = dir.path().join("IMG_0001.png");
        gradient_image(&source, 3);

        let first = pipeline.ingest_file(&source).unwrap();
        assert_eq!(first.admitted.len(), 1);
        assert!(store.get_asset(&first.admitted[0].media_asset_id).unwrap().is_some());

        let second = pipeline.ingest_file(&source).unwrap();
        assert!(second.admitted.is_empty());
        assert_eq!(second.skipped, vec!["IMG_0001.png".to_string()]);
    }

    #[test]
    fn directory_ingest_reports_per_file() {
        let (dir, _store, pipeline) = pipeline();
        let shoot = dir.path().join("shoot");
        fs::create_dir(&shoot).unwrap();
        gradient_image(&shoot.join("a.png"), 3);
        checkerboard_image(&shoot.join("b.png"));
        fs::write(shoot.join("notes.txt"), b"ignored").unwrap();

        let report = pipeline.ingest_dir(&shoot).unwrap();
        assert_eq!(report.admitted.len(), 2);
        assert!(report.skipped.is_empty());
        assert!(report.failed.is_empty());
    }

    #[test]
    fn loose_folder_records_group_as_bursts() {
        let dir = TempDir::new().unwrap();
        gradient_image(&dir.path().join("IMG_0001.png"), 3);
        gradient_image(&dir.path().join("IMG_0002.png"), 7);
        gradient_image(&dir.path().join("IMG_0003.png"), 11);

        let records = collect_records(dir.path());
        assert_eq!(records.len(), 3);

        // Distinct asset ids keep every file in the analysis; sequential
        // names written moments apart read as one burst.
        let grouper = crate::BurstGrouper::new(&EngineConfig::default());
        let analysis = grouper.analyze(&records);
        assert_eq!(analysis.total_photos, 3);
        assert_eq!(analysis.groups.len(), 1);
        assert_eq!(analysis.groups[0].members.len(), 3);
    }

    #[test]
    fn collect_records_reads_loose_folder() {
        let dir = TempDir::new().unwrap();
        gradient_image(&dir.path().join("b.png"), 5);
        checkerboard_image(&dir.path().join("a.png"));

        let records = collect_records(dir.path());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].original_filename, "a.png");
        assert!(!records[0].version.file_hash.is_empty());
    }
}

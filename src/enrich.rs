//! Enrichment collaborators: vision-language description of a photo and
//! metadata embedding on gold promotion. Both are behind traits so the engine
//! stays runnable without a provider or an exiftool binary on the host.

use crate::config::AiProviderConfig;
use crate::storage::models::{AiMetadata, MediaMetadata};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("no vision provider configured")]
    NoProvider,

    #[error("provider returned an unusable response: {0}")]
    BadResponse(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Produces AI description metadata for a stored image.
pub trait VisionProvider: Send + Sync {
    fn analyze(&self, path: &Path) -> Result<AiMetadata, EnrichError>;
}

/// Provider that refuses every request. Selected when the configuration
/// names no provider; enrichment failures then surface at the call site
/// instead of silently passing photos through.
pub struct DisabledProvider;

impl VisionProvider for DisabledProvider {
    fn analyze(&self, _path: &Path) -> Result<AiMetadata, EnrichError> {
        Err(EnrichError::NoProvider)
    }
}

/// Network-backed providers plug in here; the engine only sees the trait.
pub fn provider_from_config(config: &AiProviderConfig) -> Box<dyn VisionProvider> {
    if config.provider != "none" {
        log::warn!(
            "no client for vision provider '{}', enrichment disabled",
            config.provider
        );
    }
    Box::new(DisabledProvider)
}

/// Writes a version's file to a destination with its metadata embedded.
/// Gold promotion goes through this seam.
pub trait MetadataEmbedder: Send + Sync {
    fn embed(&self, source: &Path, dest: &Path, metadata: &MediaMetadata) -> io::Result<()>;
}

/// Embedder that copies the file unchanged. Keeps the gold tier functional
/// when no tag-writing backend is available; the metadata still lives in the
/// store.
pub struct CopyEmbedder;

impl MetadataEmbedder for CopyEmbedder {
    fn embed(&self, source: &Path, dest: &Path, _metadata: &MediaMetadata) -> io::Result<()> {
        fs::copy(source, dest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn disabled_provider_refuses() {
        let provider = DisabledProvider;
        let result = provider.analyze(Path::new("/tmp/photo.jpg"));
        assert!(matches!(result, Err(EnrichError::NoProvider)));
    }

    #[test]
    fn default_config_selects_disabled_provider() {
        let provider = provider_from_config(&AiProviderConfig::default());
        assert!(provider.analyze(Path::new("/tmp/photo.jpg")).is_err());
    }

    #[test]
    fn copy_embedder_duplicates_bytes() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src.jpg");
        let dest = dir.path().join("dest.jpg");
        fs::write(&source, b"image bytes").unwrap();

        CopyEmbedder
            .embed(&source, &dest, &MediaMetadata::default())
            .unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"image bytes");
        assert!(source.exists());
    }
}

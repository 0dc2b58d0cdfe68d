use crate::storage::models::{FileVersion, HistoryEntry, MediaAsset};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// The persistence collaborator consumed by the engine. The real backend
/// lives outside this crate; anything exposing these keyed CRUD operations
/// can drive the tier pipeline.
pub trait MediaStore: Send + Sync {
    fn find_version_by_hash(&self, file_hash: &str) -> Result<Option<FileVersion>, StoreError>;
    fn list_versions(&self) -> Result<Vec<FileVersion>, StoreError>;
    fn get_version(&self, id: &str) -> Result<Option<FileVersion>, StoreError>;
    fn versions_for_asset(&self, asset_id: &str) -> Result<Vec<FileVersion>, StoreError>;
    fn create_version(&self, version: FileVersion) -> Result<(), StoreError>;
    fn update_version(&self, version: &FileVersion) -> Result<(), StoreError>;
    fn delete_version(&self, id: &str) -> Result<(), StoreError>;

    /// Upsert-style cache write for lazily backfilled hashes: tolerant of
    /// concurrent writers and of the version having vanished meanwhile.
    fn update_perceptual_hash(&self, id: &str, perceptual_hash: &str) -> Result<(), StoreError>;

    fn create_asset(&self, asset: MediaAsset) -> Result<(), StoreError>;
    fn get_asset(&self, id: &str) -> Result<Option<MediaAsset>, StoreError>;
    fn update_asset(&self, asset: &MediaAsset) -> Result<(), StoreError>;
    /// Cascades to the asset's file versions and history.
    fn delete_asset(&self, id: &str) -> Result<(), StoreError>;

    fn append_history(&self, entry: HistoryEntry) -> Result<(), StoreError>;
    fn history_for_asset(&self, asset_id: &str) -> Result<Vec<HistoryEntry>, StoreError>;
}

#[derive(Default)]
struct Inner {
    assets: HashMap<String, MediaAsset>,
    versions: HashMap<String, FileVersion>,
    history: Vec<HistoryEntry>,
}

/// In-memory store. Serves tests and the stateless CLI workflows; the single
/// lock also serializes resolution mutations per asset.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panicked writer; the data is still the
        // best copy we have for an in-memory store.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MediaStore for MemoryStore {
    fn find_version_by_hash(&self, file_hash: &str) -> Result<Option<FileVersion>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .versions
            .values()
            .find(|v| v.file_hash == file_hash)
            .cloned())
    }

    fn list_versions(&self) -> Result<Vec<FileVersion>, StoreError> {
        let inner = self.lock();
        let mut versions: Vec<FileVersion> = inner.versions.values().cloned().collect();
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(versions)
    }

    fn get_version(&self, id: &str) -> Result<Option<FileVersion>, StoreError> {
        Ok(self.lock().versions.get(id).cloned())
    }

    fn versions_for_asset(&self, asset_id: &str) -> Result<Vec<FileVersion>, StoreError> {
        let inner = self.lock();
        let mut versions: Vec<FileVersion> = inner
            .versions
            .values()
            .filter(|v| v.media_asset_id == asset_id)
            .cloned()
            .collect();
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(versions)
    }

    fn create_version(&self, version: FileVersion) -> Result<(), StoreError> {
        let mut inner = self.lock();

        if !inner.assets.contains_key(&version.media_asset_id) {
            return Err(StoreError::NotFound(format!(
                "media asset {}",
                version.media_asset_id
            )));
        }

        // At most one unsuperseded version per tier per asset.
        let clash = inner.versions.values().any(|v| {
            v.media_asset_id == version.media_asset_id
                && v.tier == version.tier
                && !v.is_superseded()
                && !version.is_superseded()
        });
        if clash {
            return Err(StoreError::Conflict(format!(
                "asset {} already has an active {} version",
                version.media_asset_id, version.tier
            )));
        }

        inner.versions.insert(version.id.clone(), version);
        Ok(())
    }

    fn update_version(&self, version: &FileVersion) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.versions.contains_key(&version.id) {
            return Err(StoreError::NotFound(format!("file version {}", version.id)));
        }
        inner.versions.insert(version.id.clone(), version.clone());
        Ok(())
    }

    fn delete_version(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner
            .versions
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("file version {id}")))
    }

    fn update_perceptual_hash(&self, id: &str, perceptual_hash: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(version) = inner.versions.get_mut(id) {
            version.perceptual_hash = Some(perceptual_hash.to_string());
        }
        Ok(())
    }

    fn create_asset(&self, asset: MediaAsset) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.assets.insert(asset.id.clone(), asset);
        Ok(())
    }

    fn get_asset(&self, id: &str) -> Result<Option<MediaAsset>, StoreError> {
        Ok(self.lock().assets.get(id).cloned())
    }

    fn update_asset(&self, asset: &MediaAsset) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.assets.contains_key(&asset.id) {
            return Err(StoreError::NotFound(format!("media asset {}", asset.id)));
        }
        inner.assets.insert(asset.id.clone(), asset.clone());
        Ok(())
    }

    fn delete_asset(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner
            .assets
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(format!("media asset {id}")))?;
        inner.versions.retain(|_, v| v.media_asset_id != id);
        inner.history.retain(|h| h.media_asset_id != id);
        Ok(())
    }

    fn append_history(&self, entry: HistoryEntry) -> Result<(), StoreError> {
        self.lock().history.push(entry);
        Ok(())
    }

    fn history_for_asset(&self, asset_id: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .history
            .iter()
            .filter(|h| h.media_asset_id == asset_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{
        HistoryAction, MediaMetadata, ProcessingState, Tier, new_version_id,
    };
    use chrono::Utc;

    fn version(asset_id: &str, tier: Tier, state: ProcessingState, hash: &str) -> FileVersion {
        FileVersion {
            id: new_version_id(),
            media_asset_id: asset_id.to_string(),
            tier,
            file_path: format!("media/{}/x.jpg", tier.dir_name()),
            file_hash: hash.to_string(),
            perceptual_hash: None,
            file_size: 10,
            mime_type: "image/jpeg".to_string(),
            processing_state: state,
            metadata: MediaMetadata::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn lookup_by_exact_hash() {
        let store = MemoryStore::new();
        let asset = MediaAsset::new("a.jpg");
        let v = version(&asset.id, Tier::Bronze, ProcessingState::Unprocessed, "abc123");
        store.create_asset(asset).unwrap();
        store.create_version(v).unwrap();

        assert!(store.find_version_by_hash("abc123").unwrap().is_some());
        assert!(store.find_version_by_hash("zzz").unwrap().is_none());
    }

    #[test]
    fn rejects_second_active_version_per_tier() {
        let store = MemoryStore::new();
        let asset = MediaAsset::new("a.jpg");
        let asset_id = asset.id.clone();
        store.create_asset(asset).unwrap();

        store
            .create_version(version(&asset_id, Tier::Bronze, ProcessingState::Unprocessed, "h1"))
            .unwrap();
        let second = store.create_version(version(
            &asset_id,
            Tier::Bronze,
            ProcessingState::Unprocessed,
            "h2",
        ));
        assert!(matches!(second, Err(StoreError::Conflict(_))));

        // A superseded sibling does not block a new active version.
        store
            .create_version(version(&asset_id, Tier::Silver, ProcessingState::Promoted, "h3"))
            .unwrap();
        store
            .create_version(version(&asset_id, Tier::Silver, ProcessingState::Processed, "h4"))
            .unwrap();
    }

    #[test]
    fn perceptual_hash_upsert_tolerates_missing_version() {
        let store = MemoryStore::new();
        assert!(store.update_perceptual_hash("ver_missing", "0101").is_ok());

        let asset = MediaAsset::new("a.jpg");
        let v = version(&asset.id, Tier::Bronze, ProcessingState::Unprocessed, "h1");
        let vid = v.id.clone();
        store.create_asset(asset).unwrap();
        store.create_version(v).unwrap();

        store.update_perceptual_hash(&vid, "0101").unwrap();
        assert_eq!(
            store.get_version(&vid).unwrap().unwrap().perceptual_hash,
            Some("0101".to_string())
        );
    }

    #[test]
    fn asset_delete_cascades() {
        let store = MemoryStore::new();
        let asset = MediaAsset::new("a.jpg");
        let asset_id = asset.id.clone();
        store.create_asset(asset).unwrap();
        store
            .create_version(version(&asset_id, Tier::Bronze, ProcessingState::Unprocessed, "h1"))
            .unwrap();
        store
            .append_history(HistoryEntry::new(&asset_id, HistoryAction::Ingested, "test"))
            .unwrap();

        store.delete_asset(&asset_id).unwrap();
        assert!(store.list_versions().unwrap().is_empty());
        assert!(store.history_for_asset(&asset_id).unwrap().is_empty());
    }
}

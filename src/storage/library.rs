use crate::storage::models::Tier;
use chrono::{DateTime, Datelike, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Root-anchored view of the on-disk library. All stored `file_path` values
/// are relative to the root so the library can be moved wholesale.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the tier directory skeleton under the root.
    pub fn init(&self) -> io::Result<()> {
        for tier in [Tier::Bronze, Tier::Silver, Tier::Gold] {
            fs::create_dir_all(self.root.join("media").join(tier.dir_name()))?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.resolve(relative).exists()
    }

    fn tier_dir(&self, tier: Tier, date: DateTime<Utc>) -> PathBuf {
        self.root
            .join("media")
            .join(tier.dir_name())
            .join(format!("{:04}", date.year()))
            .join(format!("{:02}", date.month()))
    }

    /// Reserves a unique relative path in a tier without writing the file.
    /// Used when an external step produces the file at the destination.
    pub fn prepare(&self, tier: Tier, filename: &str, date: DateTime<Utc>) -> io::Result<String> {
        let dir = self.tier_dir(tier, date);
        fs::create_dir_all(&dir)?;
        let dest = unique_destination(&dir, filename);
        Ok(self.relativize(&dest))
    }

    /// Moves a staged file into its tier slot and returns the stored relative
    /// path. Falls back to copy+remove when a rename crosses filesystems.
    pub fn place(
        &self,
        source: &Path,
        tier: Tier,
        filename: &str,
        date: DateTime<Utc>,
    ) -> io::Result<String> {
        let dir = self.tier_dir(tier, date);
        fs::create_dir_all(&dir)?;
        let dest = unique_destination(&dir, filename);

        if fs::rename(source, &dest).is_err() {
            fs::copy(source, &dest)?;
            fs::remove_file(source)?;
        }
        Ok(self.relativize(&dest))
    }

    /// Copies an already-stored version's file into another tier, leaving the
    /// source in place.
    pub fn copy_into(
        &self,
        source_relative: &str,
        tier: Tier,
        filename: &str,
        date: DateTime<Utc>,
    ) -> io::Result<String> {
        let dir = self.tier_dir(tier, date);
        fs::create_dir_all(&dir)?;
        let dest = unique_destination(&dir, filename);
        fs::copy(self.resolve(source_relative), &dest)?;
        Ok(self.relativize(&dest))
    }

    /// Removes a stored file. Missing files are not an error; a crashed
    /// earlier run may already have taken them.
    pub fn remove(&self, relative: &str) -> io::Result<()> {
        match fs::remove_file(self.resolve(relative)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn relativize(&self, absolute: &Path) -> String {
        absolute
            .strip_prefix(&self.root)
            .unwrap_or(absolute)
            .to_string_lossy()
            .replace('\\', "/")
    }
}

fn unique_destination(dir: &Path, filename: &str) -> PathBuf {
    let candidate = dir.join(filename);
    if !candidate.exists() {
        return candidate;
    }

    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (filename, None),
    };
    let mut counter = 1u32;
    loop {
        let name = match ext {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        let candidate = dir.join(&name);
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

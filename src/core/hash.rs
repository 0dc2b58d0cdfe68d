use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Computes exact content hashes used for byte-identical duplicate detection.
pub struct ContentHashService;

impl ContentHashService {
    pub fn new() -> Self {
        Self
    }

    /// SHA-256 of the file bytes, hex encoded.
    pub fn compute_content_hash(&self, file_path: &Path) -> Result<String, HashError> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buffer = [0; 8192];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Hash many files in parallel. Hashing is pure and CPU bound, so each
    /// file is an independent unit of work.
    pub fn compute_batch(&self, file_paths: &[PathBuf]) -> Vec<(PathBuf, Result<String, HashError>)> {
        use rayon::prelude::*;

        file_paths
            .par_iter()
            .map(|path| (path.clone(), self.compute_content_hash(path)))
            .collect()
    }
}

impl Default for ContentHashService {
    fn default() -> Self {
        Self::new()
    }
}

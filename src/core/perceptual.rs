use image::{imageops::FilterType, DynamicImage};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Fixed-length visual fingerprint: one bit per grid cell, '1' where the
/// greyscale intensity exceeds the grid mean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptualHash(String);

impl PerceptualHash {
    pub fn from_bits(bits: impl Into<String>) -> Self {
        Self(bits.into())
    }

    pub fn as_bits(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bits(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mean-threshold average hash over a small fixed grid. Deterministic and
/// content-only: invariant to file format and recompression, sensitive to
/// rotation and crop, so orientation must be normalized upstream.
///
/// A larger grid discriminates better but raises the false-negative rate
/// under heavy compression.
pub struct PerceptualHasher {
    grid: u32,
}

impl PerceptualHasher {
    pub fn new(grid: u32) -> Self {
        Self { grid: grid.max(2) }
    }

    pub fn hash_bits(&self) -> usize {
        (self.grid * self.grid) as usize
    }

    /// Hash a decoded image. Always succeeds and always yields
    /// `grid * grid` bits regardless of the input dimensions.
    pub fn hash_image(&self, image: &DynamicImage) -> PerceptualHash {
        let small = image
            .resize_exact(self.grid, self.grid, FilterType::Lanczos3)
            .to_luma8();

        let pixels: Vec<u8> = small.pixels().map(|p| p.0[0]).collect();
        let mean = pixels.iter().map(|&p| p as f64).sum::<f64>() / pixels.len() as f64;

        let bits: String = pixels
            .iter()
            .map(|&p| if (p as f64) > mean { '1' } else { '0' })
            .collect();

        PerceptualHash::from_bits(bits)
    }

    /// Hash a file on disk. Decode and IO failures degrade to `None` so a
    /// single unreadable file can never abort an ingest; callers treat the
    /// result as "no perceptual signal".
    pub fn hash_path(&self, path: &Path) -> Option<PerceptualHash> {
        match image::open(path) {
            Ok(image) => Some(self.hash_image(&image)),
            Err(e) => {
                log::warn!(
                    "Could not decode {} for perceptual hashing: {}",
                    path.display(),
                    e
                );
                None
            }
        }
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, _| {
            let intensity = ((x * 255) / width.max(1)) as u8;
            Rgb([intensity, intensity, intensity])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn hash_is_deterministic() {
        let hasher = PerceptualHasher::default();
        let image = gradient_image(640, 480);
        assert_eq!(hasher.hash_image(&image), hasher.hash_image(&image));
    }

    #[test]
    fn hash_length_is_constant_across_dimensions() {
        let hasher = PerceptualHasher::default();
        for (w, h) in [(8, 8), (640, 480), (3000, 2000), (13, 917)] {
            assert_eq!(hasher.hash_image(&gradient_image(w, h)).len(), 64);
        }
    }

    #[test]
    fn uniform_image_hashes_to_all_zeros() {
        let hasher = PerceptualHasher::default();
        let img = ImageBuffer::from_pixel(100, 100, Rgb([128u8, 128, 128]));
        let hash = hasher.hash_image(&DynamicImage::ImageRgb8(img));
        assert_eq!(hash.as_bits(), "0".repeat(64));
    }

    #[test]
    fn half_split_image_hashes_half_ones() {
        let hasher = PerceptualHasher::default();
        let img = ImageBuffer::from_fn(64, 64, |x, _| {
            if x < 32 {
                Rgb([0u8, 0, 0])
            } else {
                Rgb([255u8, 255, 255])
            }
        });
        let hash = hasher.hash_image(&DynamicImage::ImageRgb8(img));
        let ones = hash.as_bits().chars().filter(|&c| c == '1').count();
        assert_eq!(ones, 32);
    }

    #[test]
    fn hash_is_format_invariant() {
        let temp_dir = TempDir::new().unwrap();
        let png = temp_dir.path().join("img.png");
        let bmp = temp_dir.path().join("img.bmp");
        let image = gradient_image(256, 256);
        image.save(&png).unwrap();
        image.save(&bmp).unwrap();

        let hasher = PerceptualHasher::default();
        assert_eq!(hasher.hash_path(&png), hasher.hash_path(&bmp));
    }

    #[test]
    fn unreadable_file_degrades_to_none() {
        let temp_dir = TempDir::new().unwrap();
        let not_an_image = temp_dir.path().join("notes.jpg");
        std::fs::write(&not_an_image, b"definitely not pixels").unwrap();

        let hasher = PerceptualHasher::default();
        assert!(hasher.hash_path(&not_an_image).is_none());
        assert!(hasher.hash_path(&temp_dir.path().join("missing.jpg")).is_none());
    }

    #[test]
    fn grid_size_controls_bit_count() {
        let hasher = PerceptualHasher::new(16);
        assert_eq!(hasher.hash_image(&gradient_image(100, 100)).len(), 256);
    }
}

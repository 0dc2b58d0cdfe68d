use crate::storage::models::ExifMetadata;
use chrono::{DateTime, Utc};
use exif::{In, Reader, Tag, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExifError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXIF parsing error: {0}")]
    Parse(#[from] exif::Error),
}

/// Extracts typed EXIF metadata from image files. Unreadable files and files
/// without EXIF yield `Ok(None)` rather than an error.
pub struct ExifService;

impl ExifService {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, file_path: &Path) -> Result<Option<ExifMetadata>, ExifError> {
        let file = match File::open(file_path) {
            Ok(f) => f,
            Err(_) => return Ok(None),
        };
        let mut buf_reader = BufReader::new(file);

        let reader = match Reader::new().read_from_container(&mut buf_reader) {
            Ok(reader) => reader,
            Err(_) => return Ok(None), // no EXIF container or unsupported format
        };

        let mut meta = ExifMetadata::default();

        if let Some(field) = reader.get_field(Tag::DateTimeOriginal, In::PRIMARY) {
            if let Some(s) = self.field_to_string(&field.value) {
                meta.date_time_original = self.parse_exif_datetime(&s);
            }
        }
        if let Some(field) = reader.get_field(Tag::DateTimeDigitized, In::PRIMARY) {
            if let Some(s) = self.field_to_string(&field.value) {
                meta.create_date = self.parse_exif_datetime(&s);
            }
        }
        // Tag::DateTime is the file modification timestamp in EXIF terms.
        if let Some(field) = reader.get_field(Tag::DateTime, In::PRIMARY) {
            if let Some(s) = self.field_to_string(&field.value) {
                meta.modify_date = self.parse_exif_datetime(&s);
            }
        }

        if let Some(field) = reader.get_field(Tag::Make, In::PRIMARY) {
            meta.make = self.field_to_string(&field.value).map(|s| s.trim().to_string());
        }
        if let Some(field) = reader.get_field(Tag::Model, In::PRIMARY) {
            meta.model = self.field_to_string(&field.value).map(|s| s.trim().to_string());
        }
        if let Some(field) = reader.get_field(Tag::LensModel, In::PRIMARY) {
            meta.lens = self.field_to_string(&field.value);
        } else if let Some(field) = reader.get_field(Tag::LensMake, In::PRIMARY) {
            meta.lens = self.field_to_string(&field.value);
        }
        if let Some(field) = reader.get_field(Tag::Software, In::PRIMARY) {
            meta.software = self.field_to_string(&field.value);
        }

        if let Some(field) = reader.get_field(Tag::PhotographicSensitivity, In::PRIMARY) {
            meta.iso = self.field_to_u32(&field.value);
        } else if let Some(field) = reader.get_field(Tag::ISOSpeed, In::PRIMARY) {
            meta.iso = self.field_to_u32(&field.value);
        }
        if let Some(field) = reader.get_field(Tag::FNumber, In::PRIMARY) {
            meta.aperture = self.field_to_f32(&field.value);
        }
        if let Some(field) = reader.get_field(Tag::FocalLength, In::PRIMARY) {
            meta.focal_length = self.field_to_f32(&field.value);
        }
        if let Some(field) = reader.get_field(Tag::ExposureTime, In::PRIMARY) {
            meta.shutter_speed = self.field_to_string(&field.value);
        }

        if meta.is_empty() {
            Ok(None)
        } else {
            Ok(Some(meta))
        }
    }

    /// Extract EXIF metadata from multiple files in parallel.
    pub fn extract_batch(
        &self,
        file_paths: &[PathBuf],
    ) -> Vec<(PathBuf, Result<Option<ExifMetadata>, ExifError>)> {
        use rayon::prelude::*;

        file_paths
            .par_iter()
            .map(|path| (path.clone(), self.extract(path)))
            .collect()
    }

    fn field_to_string(&self, value: &Value) -> Option<String> {
        match value {
            Value::Ascii(vec) => vec.first().map(|ascii| {
                String::from_utf8_lossy(ascii)
                    .trim_end_matches('\0')
                    .to_string()
            }),
            Value::Undefined(data, _) => Some(
                String::from_utf8_lossy(data)
                    .trim_end_matches('\0')
                    .to_string(),
            ),
            _ => Some(format!("{}", value.display_as(Tag::DateTime))),
        }
    }

    fn field_to_u32(&self, value: &Value) -> Option<u32> {
        match value {
            Value::Short(vec) => vec.first().map(|&v| v as u32),
            Value::Long(vec) => vec.first().copied(),
            Value::Ascii(vec) => vec.first().and_then(|ascii| {
                String::from_utf8_lossy(ascii)
                    .trim_end_matches('\0')
                    .parse()
                    .ok()
            }),
            _ => None,
        }
    }

    fn field_to_f32(&self, value: &Value) -> Option<f32> {
        match value {
            Value::Rational(vec) => vec
                .first()
                .filter(|r| r.denom != 0)
                .map(|r| r.num as f32 / r.denom as f32),
            Value::SRational(vec) => vec
                .first()
                .filter(|r| r.denom != 0)
                .map(|r| r.num as f32 / r.denom as f32),
            _ => None,
        }
    }

    /// EXIF datetime format: "YYYY:MM:DD HH:MM:SS". Some writers use dashes
    /// in the date part instead.
    fn parse_exif_datetime(&self, datetime_str: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(datetime_str, "%Y:%m:%d %H:%M:%S") {
            Some(dt.and_utc())
        } else if let Ok(dt) =
            chrono::NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
        {
            Some(dt.and_utc())
        } else {
            log::warn!("Failed to parse EXIF datetime: {}", datetime_str);
            None
        }
    }
}

impl Default for ExifService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_none() {
        let service = ExifService::new();
        let result = service.extract(Path::new("/non/existent/file.jpg"));
        assert!(result.unwrap().is_none());
    }

    #[test]
    fn file_without_exif_yields_none() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("no_exif.txt");
        fs::write(&file_path, b"This is not an image file").unwrap();

        let service = ExifService::new();
        assert!(service.extract(&file_path).unwrap().is_none());
    }

    #[test]
    fn parse_exif_datetime_format() {
        let service = ExifService::new();
        let dt = service.parse_exif_datetime("2023:12:25 14:30:45").unwrap();

        assert_eq!(dt.year(), 2023);
        assert_eq!(dt.month(), 12);
        assert_eq!(dt.day(), 25);
        assert_eq!(dt.hour(), 14);
        assert_eq!(dt.minute(), 30);
        assert_eq!(dt.second(), 45);
    }

    #[test]
    fn parse_exif_datetime_rejects_garbage() {
        let service = ExifService::new();
        assert!(service.parse_exif_datetime("last tuesday").is_none());
    }

    #[test]
    fn batch_extraction_degrades_per_file() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.txt");
        let b = temp_dir.path().join("b.txt");
        fs::write(&a, b"one").unwrap();
        fs::write(&b, b"two").unwrap();

        let service = ExifService::new();
        let results = service.extract_batch(&[a, b]);

        assert_eq!(results.len(), 2);
        for (_, result) in results {
            assert!(result.unwrap().is_none());
        }
    }
}

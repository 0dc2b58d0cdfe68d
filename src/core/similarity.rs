use crate::storage::models::{ExifMetadata, PhotoRecord};
use chrono::{DateTime, NaiveDate, Utc};

/// Similarity between two perceptual hash bit strings, as a percentage.
///
/// Hamming-based: `100 * (1 - differing_bits / length)`, rounded to two
/// decimals. Hashes of different lengths cannot be compared and score 0,
/// which is "no signal" rather than an error.
pub fn perceptual_similarity(hash_a: &str, hash_b: &str) -> f64 {
    if hash_a.is_empty() || hash_b.is_empty() || hash_a.len() != hash_b.len() {
        return 0.0;
    }

    let differences = hash_a
        .bytes()
        .zip(hash_b.bytes())
        .filter(|(a, b)| a != b)
        .count();

    let similarity = ((hash_a.len() - differences) as f64 / hash_a.len() as f64) * 100.0;
    (similarity * 100.0).round() / 100.0
}

/// Derived capture time in epoch milliseconds, with the source priority:
/// EXIF original-capture time, then a `YYYYMMDD_HHMMSS` filename prefix,
/// then the remaining EXIF date fields, then the given ingest-time fallback.
pub fn capture_time_from(
    exif: Option<&ExifMetadata>,
    filename: &str,
    fallback: DateTime<Utc>,
) -> i64 {
    if let Some(dt) = exif.and_then(|e| e.date_time_original) {
        return dt.timestamp_millis();
    }
    if let Some(dt) = parse_filename_timestamp(filename) {
        return dt.timestamp_millis();
    }
    if let Some(dt) = exif.and_then(|e| e.create_date.or(e.modify_date)) {
        return dt.timestamp_millis();
    }
    fallback.timestamp_millis()
}

pub fn capture_time_ms(record: &PhotoRecord) -> i64 {
    capture_time_from(
        record.version.metadata.exif.as_ref(),
        &record.original_filename,
        record.version.created_at,
    )
}

/// Parse a `YYYYMMDD_HHMMSS` prefix, the timestamp convention used by
/// Android/Pixel style camera filenames.
pub fn parse_filename_timestamp(filename: &str) -> Option<DateTime<Utc>> {
    let bytes = filename.as_bytes();
    if bytes.len() < 15 || bytes[8] != b'_' {
        return None;
    }
    if !bytes[..8].iter().all(u8::is_ascii_digit) || !bytes[9..15].iter().all(u8::is_ascii_digit) {
        return None;
    }

    let digits = |range: std::ops::Range<usize>| -> u32 {
        filename[range].parse().unwrap_or(0)
    };

    let date = NaiveDate::from_ymd_opt(digits(0..4) as i32, digits(4..6), digits(6..8))?;
    let time = date.and_hms_opt(digits(9..11), digits(11..13), digits(13..15))?;
    Some(time.and_utc())
}

/// How two filenames relate, decided once while building [`PairFeatures`] so
/// the weight rules below stay mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NameRelation {
    /// Same base name, both carrying numeric suffixes; holds the absolute gap.
    Sequential(u64),
    /// Both bases longer than 8 chars; holds shared-prefix fraction of the
    /// shorter base.
    SharedPrefix(f64),
    Unrelated,
}

/// Pre-computed evidence for one pair of photos. Each weight rule reads one
/// field, keeping the scoring auditable rule by rule.
#[derive(Debug, Clone)]
pub struct PairFeatures {
    pub time_diff_ms: i64,
    pub name_relation: NameRelation,
    /// `1 - |s1-s2| / avg(s1,s2)`, `None` when both sizes are zero.
    pub size_ratio: Option<f64>,
    pub same_camera: bool,
    pub same_iso: bool,
    pub same_focal_length: bool,
    pub same_aperture: bool,
}

impl PairFeatures {
    pub fn between(a: &PhotoRecord, b: &PhotoRecord) -> Self {
        let time_diff_ms = (capture_time_ms(a) - capture_time_ms(b)).abs();
        let name_relation = relate_names(&a.original_filename, &b.original_filename);

        let (s1, s2) = (a.version.file_size as f64, b.version.file_size as f64);
        let avg = (s1 + s2) / 2.0;
        let size_ratio = if avg > 0.0 {
            Some(1.0 - (s1 - s2).abs() / avg)
        } else {
            None
        };

        let exif_a = a.version.metadata.exif.as_ref();
        let exif_b = b.version.metadata.exif.as_ref();

        fn field_eq<T: PartialEq>(
            a: Option<&ExifMetadata>,
            b: Option<&ExifMetadata>,
            get: fn(&ExifMetadata) -> Option<T>,
        ) -> bool {
            match (a.and_then(get), b.and_then(get)) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }

        Self {
            time_diff_ms,
            name_relation,
            size_ratio,
            same_camera: field_eq(exif_a, exif_b, |e| e.make.clone())
                && field_eq(exif_a, exif_b, |e| e.model.clone()),
            same_iso: field_eq(exif_a, exif_b, |e| e.iso),
            same_focal_length: field_eq(exif_a, exif_b, |e| e.focal_length),
            same_aperture: field_eq(exif_a, exif_b, |e| e.aperture),
        }
    }
}

/// Lowercased base name (extension stripped) and any trailing numeric
/// suffix, with one `-`/`_` separator before the digits dropped from the base.
pub fn split_base_and_sequence(filename: &str) -> (String, Option<u64>) {
    let lower = filename.to_ascii_lowercase();
    let without_ext = match lower.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            stem
        }
        _ => lower.as_str(),
    };

    let digit_start = without_ext
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + without_ext[i..].chars().next().map_or(1, char::len_utf8))
        .unwrap_or(0);

    let digits = &without_ext[digit_start..];
    if digits.is_empty() || digit_start == 0 {
        return (without_ext.to_string(), None);
    }

    let mut base = &without_ext[..digit_start];
    if base.ends_with('-') || base.ends_with('_') {
        base = &base[..base.len() - 1];
    }
    (base.to_string(), digits.parse().ok())
}

pub fn relate_names(a: &str, b: &str) -> NameRelation {
    let (base_a, seq_a) = split_base_and_sequence(a);
    let (base_b, seq_b) = split_base_and_sequence(b);

    if base_a == base_b {
        if let (Some(na), Some(nb)) = (seq_a, seq_b) {
            return NameRelation::Sequential(na.abs_diff(nb));
        }
    }

    if base_a.len() > 8 && base_b.len() > 8 {
        let prefix = base_a
            .bytes()
            .zip(base_b.bytes())
            .take_while(|(x, y)| x == y)
            .count();
        let min_len = base_a.len().min(base_b.len());
        return NameRelation::SharedPrefix(prefix as f64 / min_len as f64);
    }

    NameRelation::Unrelated
}

/// One additive evidence rule: contributes `weight` when `matches` holds.
pub struct ScoreRule {
    pub name: &'static str,
    pub weight: f64,
    pub matches: fn(&PairFeatures) -> bool,
}

/// The full multi-factor evidence table, in evaluation order. No single
/// signal is trustworthy alone (identical EXIF recurs across a whole camera
/// roll; filenames collide), so weights only combine.
pub const BURST_RULES: [ScoreRule; 9] = [
    ScoreRule {
        name: "capture-within-5s",
        weight: 0.4,
        matches: |f| f.time_diff_ms <= 5_000,
    },
    ScoreRule {
        name: "capture-within-30s",
        weight: 0.2,
        matches: |f| f.time_diff_ms > 5_000 && f.time_diff_ms <= 30_000,
    },
    ScoreRule {
        name: "capture-within-60s",
        weight: 0.1,
        matches: |f| f.time_diff_ms > 30_000 && f.time_diff_ms <= 60_000,
    },
    ScoreRule {
        name: "filename-sequence",
        weight: 0.4,
        matches: |f| matches!(f.name_relation, NameRelation::Sequential(gap) if gap <= 3),
    },
    ScoreRule {
        name: "filename-shared-prefix",
        weight: 0.2,
        matches: |f| matches!(f.name_relation, NameRelation::SharedPrefix(share) if share >= 0.8),
    },
    ScoreRule {
        name: "size-within-5pct",
        weight: 0.3,
        matches: |f| matches!(f.size_ratio, Some(r) if r > 0.95),
    },
    ScoreRule {
        name: "size-within-15pct",
        weight: 0.1,
        matches: |f| matches!(f.size_ratio, Some(r) if r > 0.85 && r <= 0.95),
    },
    ScoreRule {
        name: "exif-same-camera",
        weight: 0.05,
        matches: |f| f.same_camera,
    },
    ScoreRule {
        name: "exif-same-settings",
        weight: 0.05,
        matches: |f| f.same_iso,
    },
];

// ISO, focal length and aperture each contribute separately; the table keeps
// one named rule per field.
pub const EXIF_FIELD_RULES: [ScoreRule; 2] = [
    ScoreRule {
        name: "exif-same-focal-length",
        weight: 0.05,
        matches: |f| f.same_focal_length,
    },
    ScoreRule {
        name: "exif-same-aperture",
        weight: 0.05,
        matches: |f| f.same_aperture,
    },
];

/// Computes both hash-level and evidence-level similarity for photo pairs.
pub struct SimilarityScorer;

impl SimilarityScorer {
    pub fn new() -> Self {
        Self
    }

    pub fn perceptual_similarity(&self, hash_a: &str, hash_b: &str) -> f64 {
        perceptual_similarity(hash_a, hash_b)
    }

    /// Multi-factor similarity in [0, 1] for burst grouping.
    ///
    /// Byte-identical files score 1.0 outright. Otherwise the rule tables
    /// accumulate, and strong time proximity amplifies a moderate aggregate:
    /// missing a true burst is costlier than an occasional false merge.
    pub fn multi_factor_similarity(&self, a: &PhotoRecord, b: &PhotoRecord) -> f64 {
        if !a.version.file_hash.is_empty() && a.version.file_hash == b.version.file_hash {
            return 1.0;
        }

        let features = PairFeatures::between(a, b);
        let score: f64 = BURST_RULES
            .iter()
            .chain(EXIF_FIELD_RULES.iter())
            .filter(|rule| (rule.matches)(&features))
            .map(|rule| rule.weight)
            .sum();

        let dt = features.time_diff_ms;
        if dt <= 10_000 && score >= 0.5 {
            (score + 0.45).min(1.0)
        } else if dt <= 30_000 && score >= 0.8 {
            (score + 0.15).min(1.0)
        } else {
            score.min(1.0)
        }
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{
        FileVersion, MediaMetadata, ProcessingState, Tier, new_asset_id, new_version_id,
    };
    use chrono::TimeZone;

    fn record(
        filename: &str,
        file_size: u64,
        file_hash: &str,
        exif: Option<ExifMetadata>,
    ) -> PhotoRecord {
        PhotoRecord {
            version: FileVersion {
                id: new_version_id(),
                media_asset_id: new_asset_id(),
                tier: Tier::Bronze,
                file_path: format!("media/bronze/2024/06/{filename}"),
                file_hash: file_hash.to_string(),
                perceptual_hash: None,
                file_size,
                mime_type: "image/jpeg".to_string(),
                processing_state: ProcessingState::Unprocessed,
                metadata: MediaMetadata {
                    exif,
                    ..MediaMetadata::default()
                },
                created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            },
            original_filename: filename.to_string(),
        }
    }

    fn exif_at(secs: u32) -> ExifMetadata {
        ExifMetadata {
            date_time_original: Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, secs).unwrap()),
            ..ExifMetadata::default()
        }
    }

    #[test]
    fn perceptual_identity_is_100() {
        let hash = "10".repeat(32);
        assert_eq!(perceptual_similarity(&hash, &hash), 100.0);
    }

    #[test]
    fn perceptual_is_symmetric() {
        let a = format!("{}{}", "1".repeat(40), "0".repeat(24));
        let b = "0".repeat(64);
        assert_eq!(perceptual_similarity(&a, &b), perceptual_similarity(&b, &a));
    }

    #[test]
    fn perceptual_matches_hamming_formula() {
        // 16 of 64 bits differ: 100 * (1 - 16/64) = 75.0 exactly.
        let a = format!("{}{}", "1".repeat(16), "0".repeat(48));
        let b = "0".repeat(64);
        assert_eq!(perceptual_similarity(&a, &b), 75.0);

        // One of 64 bits: 100 * 63/64 = 98.4375, rounded to 98.44.
        let c = format!("1{}", "0".repeat(63));
        assert_eq!(perceptual_similarity(&c, &b), 98.44);
    }

    #[test]
    fn perceptual_mismatched_lengths_score_zero() {
        assert_eq!(perceptual_similarity("1010", "10101010"), 0.0);
        assert_eq!(perceptual_similarity("", ""), 0.0);
    }

    #[test]
    fn filename_timestamp_parsing() {
        let dt = parse_filename_timestamp("20240601_103015_A1B2C3D4.jpg").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 15).unwrap());

        assert!(parse_filename_timestamp("IMG_0001.jpg").is_none());
        assert!(parse_filename_timestamp("20241301_103015.jpg").is_none()); // month 13
        assert!(parse_filename_timestamp("short").is_none());
    }

    #[test]
    fn capture_time_priority_order() {
        // EXIF original time wins over a filename timestamp.
        let with_exif = record("20240601_090000.jpg", 100, "h1", Some(exif_at(30)));
        assert_eq!(
            capture_time_ms(&with_exif),
            Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 30)
                .unwrap()
                .timestamp_millis()
        );

        // Filename timestamp wins over ingest time.
        let with_name = record("20240601_090000.jpg", 100, "h2", None);
        assert_eq!(
            capture_time_ms(&with_name),
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0)
                .unwrap()
                .timestamp_millis()
        );

        // Nothing else: falls back to the record's ingest time.
        let bare = record("holiday.jpg", 100, "h3", None);
        assert_eq!(
            capture_time_ms(&bare),
            bare.version.created_at.timestamp_millis()
        );
    }

    #[test]
    fn sequence_extraction() {
        assert_eq!(
            split_base_and_sequence("IMG_0042.jpg"),
            ("img".to_string(), Some(42))
        );
        assert_eq!(
            split_base_and_sequence("DSC-0005.JPG"),
            ("dsc".to_string(), Some(5))
        );
        assert_eq!(
            split_base_and_sequence("holiday.png"),
            ("holiday".to_string(), None)
        );
    }

    #[test]
    fn name_relation_sequential_vs_prefix() {
        assert_eq!(relate_names("IMG_001.jpg", "IMG_003.jpg"), NameRelation::Sequential(2));
        // Same base but distant numbers is still Sequential, just a wide gap.
        assert_eq!(relate_names("IMG_001.jpg", "IMG_900.jpg"), NameRelation::Sequential(899));

        match relate_names("vacation_beach_a.jpg", "vacation_beach_b.jpg") {
            NameRelation::SharedPrefix(share) => assert!(share >= 0.8),
            other => panic!("expected shared prefix, got {other:?}"),
        }

        assert_eq!(relate_names("a.jpg", "b.jpg"), NameRelation::Unrelated);
    }

    #[test]
    fn rules_fire_individually() {
        // Only the 5s time rule: unrelated names, very different sizes, no EXIF agreement.
        let a = record("aaa.jpg", 1000, "h1", Some(exif_at(0)));
        let b = record("zzz.jpg", 100, "h2", Some(exif_at(3)));
        let features = PairFeatures::between(&a, &b);
        assert!((BURST_RULES[0].matches)(&features));
        assert!(!(BURST_RULES[1].matches)(&features));
        assert!(!(BURST_RULES[3].matches)(&features));
        assert!(!(BURST_RULES[5].matches)(&features));

        // Time rules are mutually exclusive buckets.
        let c = record("zzz.jpg", 100, "h3", Some(exif_at(20)));
        let f2 = PairFeatures::between(&a, &c);
        assert!(!(BURST_RULES[0].matches)(&f2));
        assert!((BURST_RULES[1].matches)(&f2));
    }

    #[test]
    fn identical_hash_short_circuits_to_one() {
        let a = record("a.jpg", 100, "samehash", None);
        let b = record("b.jpg", 999, "samehash", None);
        assert_eq!(SimilarityScorer::new().multi_factor_similarity(&a, &b), 1.0);
    }

    #[test]
    fn burst_pair_scores_above_threshold() {
        let mut exif = exif_at(0);
        exif.make = Some("Canon".to_string());
        exif.model = Some("R5".to_string());
        exif.iso = Some(200);
        exif.focal_length = Some(50.0);
        exif.aperture = Some(2.8);

        let mut exif2 = exif.clone();
        exif2.date_time_original = Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 2).unwrap());

        let a = record("IMG_0001.jpg", 4_000_000, "h1", Some(exif));
        let b = record("IMG_0002.jpg", 3_950_000, "h2", Some(exif2));

        // 0.4 time + 0.4 sequence + 0.3 size + 0.2 exif, amplified and capped.
        let score = SimilarityScorer::new().multi_factor_similarity(&a, &b);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn distant_pair_scores_low() {
        let a = record("IMG_0001.jpg", 4_000_000, "h1", Some(exif_at(0)));
        let mut far = exif_at(0);
        far.date_time_original = Some(Utc.with_ymd_and_hms(2024, 6, 1, 11, 30, 0).unwrap());
        let b = record("PANO_9999.jpg", 900_000, "h2", Some(far));

        let score = SimilarityScorer::new().multi_factor_similarity(&a, &b);
        assert!(score < 0.5, "got {score}");
    }

    #[test]
    fn amplification_requires_time_proximity() {
        // Strong non-time evidence but 90s apart: no amplification possible.
        let mut exif = exif_at(0);
        exif.iso = Some(100);
        let mut exif2 = exif.clone();
        exif2.date_time_original = Some(Utc.with_ymd_and_hms(2024, 6, 1, 10, 1, 30).unwrap());

        let a = record("IMG_0001.jpg", 1_000_000, "h1", Some(exif));
        let b = record("IMG_0002.jpg", 1_000_000, "h2", Some(exif2));

        let score = SimilarityScorer::new().multi_factor_similarity(&a, &b);
        // 0.4 sequence + 0.3 size + 0.05 iso, no time bucket beyond 60s.
        assert!(score < 0.95, "got {score}");
    }
}

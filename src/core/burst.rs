use crate::config::EngineConfig;
use crate::core::similarity::{capture_time_ms, SimilarityScorer};
use crate::storage::models::{PhotoRecord, Tier};
use crate::storage::store::{MediaStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// A set of file versions judged to be one capture burst. Advisory only:
/// proposed for batch promotion, never applied to storage by this module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstGroup {
    pub id: String,
    pub members: Vec<PhotoRecord>,
    /// Version id of the member to promote: largest file, ties broken by the
    /// most recent capture time.
    pub suggested_best: String,
    /// Mean multi-factor similarity over all member pairs.
    pub average_similarity: f64,
    pub time_span_ms: i64,
    pub group_reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstAnalysis {
    pub groups: Vec<BurstGroup>,
    pub ungrouped: Vec<PhotoRecord>,
    /// Number of representative photos considered (one per asset).
    pub total_photos: usize,
}

/// Partitions a time-ordered photo set into burst groups: a forward sweep
/// over capture times with a fixed window, membership decided against the
/// group anchor (transitive, not pairwise-complete).
pub struct BurstGrouper {
    scorer: SimilarityScorer,
    window_ms: i64,
    threshold: f64,
}

impl BurstGrouper {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            scorer: SimilarityScorer::new(),
            window_ms: config.burst_window_ms,
            threshold: config.burst_similarity_threshold,
        }
    }

    /// Analyze every stored file version, joining asset filenames first.
    pub fn analyze_store(&self, store: &dyn MediaStore) -> Result<BurstAnalysis, StoreError> {
        let versions = store.list_versions()?;
        let mut records = Vec::with_capacity(versions.len());
        for version in versions {
            let Some(asset) = store.get_asset(&version.media_asset_id)? else {
                continue;
            };
            records.push(PhotoRecord {
                version,
                original_filename: asset.original_filename,
            });
        }
        Ok(self.analyze(&records))
    }

    pub fn analyze(&self, records: &[PhotoRecord]) -> BurstAnalysis {
        if records.is_empty() {
            return BurstAnalysis {
                groups: Vec::new(),
                ungrouped: Vec::new(),
                total_photos: 0,
            };
        }

        let mut representatives = representatives_per_asset(records);
        representatives.sort_by_key(|r| capture_time_ms(r));
        let total_photos = representatives.len();

        let mut groups = Vec::new();
        let mut ungrouped = Vec::new();
        let mut consumed: HashSet<&str> = HashSet::new();

        for (i, anchor) in representatives.iter().enumerate() {
            if consumed.contains(anchor.version.id.as_str()) {
                continue;
            }

            let anchor_time = capture_time_ms(anchor);
            let mut members: Vec<&PhotoRecord> = vec![anchor];

            for candidate in &representatives[i + 1..] {
                if consumed.contains(candidate.version.id.as_str()) {
                    continue;
                }
                // Sorted by capture time: past the window, nothing later matches.
                if capture_time_ms(candidate) - anchor_time > self.window_ms {
                    break;
                }
                if self.scorer.multi_factor_similarity(anchor, candidate) >= self.threshold {
                    members.push(candidate);
                }
            }

            if members.len() > 1 {
                for member in &members {
                    consumed.insert(member.version.id.as_str());
                }
                groups.push(self.build_group(&members));
            } else {
                consumed.insert(anchor.version.id.as_str());
                ungrouped.push(anchor.clone());
            }
        }

        BurstAnalysis {
            groups,
            ungrouped,
            total_photos,
        }
    }

    fn build_group(&self, members: &[&PhotoRecord]) -> BurstGroup {
        let times: Vec<i64> = members.iter().map(|m| capture_time_ms(m)).collect();
        let time_span_ms = times.iter().max().unwrap_or(&0) - times.iter().min().unwrap_or(&0);

        // O(n^2) pairwise mean; group sizes are realistically small.
        let mut total = 0.0;
        let mut pairs = 0u32;
        for i in 0..members.len() {
            for j in i + 1..members.len() {
                total += self.scorer.multi_factor_similarity(members[i], members[j]);
                pairs += 1;
            }
        }
        let average_similarity = if pairs > 0 { total / pairs as f64 } else { 0.0 };

        let mut best = members[0];
        for member in &members[1..] {
            let (size, best_size) = (member.version.file_size, best.version.file_size);
            if size > best_size
                || (size == best_size && capture_time_ms(member) > capture_time_ms(best))
            {
                best = member;
            }
        }

        BurstGroup {
            id: format!("bst_{}", Uuid::new_v4().simple()),
            members: members.iter().map(|m| (*m).clone()).collect(),
            suggested_best: best.version.id.clone(),
            average_similarity,
            time_span_ms,
            group_reason: reason_for_span(time_span_ms).to_string(),
        }
    }
}

fn reason_for_span(time_span_ms: i64) -> &'static str {
    if time_span_ms < 5_000 {
        "Rapid burst sequence (under 5 seconds)"
    } else if time_span_ms < 10_000 {
        "Quick burst sequence (under 10 seconds)"
    } else {
        "Similar photos taken within 10 seconds"
    }
}

/// When an asset has versions in several tiers, only the least-processed one
/// participates: bronze-unprocessed over bronze-processed over silver over gold.
fn representatives_per_asset(records: &[PhotoRecord]) -> Vec<PhotoRecord> {
    let mut by_asset: HashMap<&str, &PhotoRecord> = HashMap::new();

    for record in records {
        let key = record.version.media_asset_id.as_str();
        match by_asset.get(key) {
            Some(current) if priority(current) <= priority(record) => {}
            _ => {
                by_asset.insert(key, record);
            }
        }
    }

    by_asset.into_values().cloned().collect()
}

fn priority(record: &PhotoRecord) -> (u8, u8) {
    let tier_rank = record.version.tier.rank();
    let state_rank = if record.version.tier == Tier::Bronze {
        record.version.processing_state.rank()
    } else {
        0
    };
    (tier_rank, state_rank)
}

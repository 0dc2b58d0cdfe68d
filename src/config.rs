use serde::{Deserialize, Serialize};

/// Tunable engine policy. All thresholds are empirically tuned values and
/// should be calibrated against a labeled dataset before changing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Perceptual hash grid edge; the hash carries `grid * grid` bits.
    pub perceptual_grid: u32,
    /// Perceptual similarity (0-100) at or above which an incoming image is
    /// treated as a possible duplicate of an existing version.
    pub duplicate_threshold: f64,
    /// Perceptual similarity (0-100) at or above which a conflict is raised
    /// even when the pair matches the burst heuristic.
    pub certain_duplicate_threshold: f64,
    /// Multi-factor similarity (0-1) required for burst group membership.
    pub burst_similarity_threshold: f64,
    /// Capture-time window for burst candidacy, in milliseconds.
    pub burst_window_ms: i64,
    pub ai: AiProviderConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            perceptual_grid: 8,
            duplicate_threshold: 99.5,
            certain_duplicate_threshold: 99.8,
            burst_similarity_threshold: 0.95,
            burst_window_ms: 10_000,
            ai: AiProviderConfig::default(),
        }
    }
}

/// Vision-language provider selection, passed explicitly into the engine
/// instead of living in process-global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiProviderConfig {
    /// Provider identifier, e.g. "openai" or "ollama". "none" disables enrichment.
    pub provider: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
}

impl Default for AiProviderConfig {
    fn default() -> Self {
        Self {
            provider: "none".to_string(),
            endpoint: None,
            model: None,
        }
    }
}

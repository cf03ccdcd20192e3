use serde::Serialize;

/// Outcome of one successful index build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildStats {
    /// Records indexed after deduplication.
    pub count: usize,
    pub duration_ms: u64,
    pub model_version: String,
}

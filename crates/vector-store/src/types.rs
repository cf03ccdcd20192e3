use matcher_protocol::RoleTag;
use serde::{Deserialize, Serialize};

/// One job posting after embedding. Immutable; owned exclusively by the
/// snapshot that contains it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddedRecord {
    pub id: u64,
    /// L2-normalized, dimension matches the snapshot.
    pub vector: Vec<f32>,
    pub role: Option<RoleTag>,
}

/// One search result: stable record id and inner-product score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: u64,
    pub score: f32,
}

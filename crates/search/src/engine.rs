use crate::error::{Result, SearchError};
use crate::role::RoleClassifier;
use matcher_protocol::RoleTag;
use matcher_vector_store::{EmbeddingModel, Hit, IndexSnapshot, SnapshotCell};
use std::sync::Arc;

/// How many extra candidates to pull before role filtering. Filtering happens
/// after the vector search, so without headroom a strict filter would starve
/// the result list.
const OVERFETCH_FACTOR: usize = 4;

/// Result of one query: ranked hits plus the role filter that was in effect.
#[derive(Debug, Clone)]
pub struct RankedMatches {
    pub hits: Vec<Hit>,
    /// `None` means the search ran unfiltered ("general").
    pub role: Option<RoleTag>,
}

/// Read path of the engine: embeds resume text and ranks postings against
/// the active snapshot.
///
/// The engine captures the snapshot once per query, so a concurrent rebuild
/// never mixes results from two index versions.
pub struct QueryEngine {
    embedder: Arc<EmbeddingModel>,
    classifier: Arc<dyn RoleClassifier>,
    snapshots: Arc<SnapshotCell>,
}

impl QueryEngine {
    #[must_use]
    pub fn new(
        embedder: Arc<EmbeddingModel>,
        classifier: Arc<dyn RoleClassifier>,
        snapshots: Arc<SnapshotCell>,
    ) -> Self {
        Self {
            embedder,
            classifier,
            snapshots,
        }
    }

    /// Rank the `top_k` best-matching postings for a resume.
    ///
    /// An explicit `role` overrides classification; unknown role names mean
    /// unfiltered. When the role filter would empty an otherwise non-empty
    /// candidate list, the unfiltered ranking is returned instead, so a
    /// reasonable query never comes back empty.
    pub async fn search(
        &self,
        query: &str,
        top_k: i64,
        role: Option<&str>,
    ) -> Result<RankedMatches> {
        if top_k <= 0 {
            return Err(SearchError::InvalidTopK(top_k));
        }
        let k = usize::try_from(top_k).map_err(|_| SearchError::InvalidTopK(top_k))?;

        let vector = self.embedder.embed(query).await?;

        let role = match role {
            Some(raw) => RoleTag::parse(raw),
            None => self.classifier.classify(query),
        };

        let snapshot = self.snapshots.load().ok_or(SearchError::IndexNotBuilt)?;

        let fetch = k.saturating_mul(OVERFETCH_FACTOR);
        let candidates = snapshot.search(&vector, fetch)?;

        let mut hits = match role {
            Some(tag) => filter_by_role(&snapshot, &candidates, tag),
            None => candidates.clone(),
        };
        if hits.is_empty() && !candidates.is_empty() {
            log::warn!(
                "Role filter '{}' emptied {} candidates; falling back to unfiltered",
                role.map_or("general", RoleTag::as_str),
                candidates.len()
            );
            hits = candidates;
        }
        hits.truncate(k);

        Ok(RankedMatches { hits, role })
    }
}

/// Keep candidates whose posting carries the requested tag. Untagged
/// postings match every filter; only a conflicting tag excludes.
fn filter_by_role(snapshot: &IndexSnapshot, candidates: &[Hit], tag: RoleTag) -> Vec<Hit> {
    candidates
        .iter()
        .filter(|hit| snapshot.role_of(hit.id).map_or(true, |r| r == tag))
        .copied()
        .collect()
}

use crate::error::{Result, VectorStoreError};
use crate::types::{EmbeddedRecord, Hit};
use std::cmp::Ordering;

/// Exact nearest-neighbor index over unit-normalized vectors.
///
/// Brute-force inner-product scan: O(n) per query, always correct, and fast
/// enough for corpora in the tens of thousands. An approximate structure can
/// replace this behind the same contract if latency ever demands it.
pub struct FlatIndex {
    dimension: usize,
    records: Vec<EmbeddedRecord>,
}

impl FlatIndex {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Vec::new(),
        }
    }

    /// Add a record to the index. The vector must match the index dimension.
    pub fn add(&mut self, record: EmbeddedRecord) -> Result<()> {
        if record.vector.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: record.vector.len(),
            });
        }
        self.records.push(record);
        Ok(())
    }

    /// Search for the k nearest records by inner product.
    ///
    /// Results are ordered by descending score with ties broken by ascending
    /// id, so repeated searches over the same index are byte-identical. If
    /// `k` exceeds the record count, all records are returned.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        if query.len() != self.dimension {
            return Err(VectorStoreError::InvalidDimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<Hit> = self
            .records
            .iter()
            .map(|record| Hit {
                id: record.id,
                score: inner_product(query, &record.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);

        Ok(hits)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }
}

fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

use crate::error::Result;
use crate::index::FlatIndex;
use crate::types::{EmbeddedRecord, Hit};
use matcher_protocol::RoleTag;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

/// An immutable, fully-built vector index over one consistent pass of the
/// corpus, plus the metadata a caller needs to reason about it.
pub struct IndexSnapshot {
    index: FlatIndex,
    roles: HashMap<u64, RoleTag>,
    built_at: SystemTime,
    model_version: String,
}

impl IndexSnapshot {
    /// Assemble a snapshot from embedded records. Vector dimensions are
    /// validated against `dimension`; the caller guarantees ids are unique.
    pub fn new(
        records: Vec<EmbeddedRecord>,
        dimension: usize,
        model_version: impl Into<String>,
    ) -> Result<Self> {
        let mut index = FlatIndex::new(dimension);
        let mut roles = HashMap::new();
        for record in records {
            if let Some(role) = record.role {
                roles.insert(record.id, role);
            }
            index.add(record)?;
        }
        Ok(Self {
            index,
            roles,
            built_at: SystemTime::now(),
            model_version: model_version.into(),
        })
    }

    /// Ranked nearest neighbors; see [`FlatIndex::search`] for ordering.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        self.index.search(query, k)
    }

    /// Role tag derived for a record at build time, if it had one.
    #[must_use]
    pub fn role_of(&self, id: u64) -> Option<RoleTag> {
        self.roles.get(&id).copied()
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.index.dimension()
    }

    #[must_use]
    pub const fn built_at(&self) -> SystemTime {
        self.built_at
    }

    #[must_use]
    pub fn model_version(&self) -> &str {
        &self.model_version
    }
}

/// Shared reference cell holding the currently active snapshot.
///
/// The builder installs a new snapshot with a single swap; queries capture an
/// `Arc` and keep reading the snapshot they captured even while a newer one
/// is installed. An old snapshot is freed when its last reader drops. The
/// generation counter increments on every install, which lets callers detect
/// that a swap happened without comparing pointers.
#[derive(Default)]
pub struct SnapshotCell {
    active: Mutex<Option<Arc<IndexSnapshot>>>,
    generation: AtomicU64,
}

impl SnapshotCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The active snapshot, or `None` before the first build completes.
    #[must_use]
    pub fn load(&self) -> Option<Arc<IndexSnapshot>> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Install a new snapshot, superseding the previous one.
    pub fn install(&self, snapshot: Arc<IndexSnapshot>) {
        let mut guard = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(snapshot);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

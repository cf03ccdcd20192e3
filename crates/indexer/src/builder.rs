use crate::corpus::CorpusSource;
use crate::error::{IndexerError, Result};
use crate::stats::BuildStats;
use matcher_protocol::JobRecord;
use matcher_search::RoleClassifier;
use matcher_vector_store::{EmbeddedRecord, EmbeddingModel, IndexSnapshot, SnapshotCell};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Builds immutable index snapshots from a corpus and installs them into the
/// shared snapshot cell.
///
/// At most one build runs at a time; a second caller gets `BuildInProgress`
/// instead of queueing. Queries keep reading the previous snapshot until the
/// new one is installed in a single swap.
pub struct IndexBuilder {
    embedder: Arc<EmbeddingModel>,
    classifier: Arc<dyn RoleClassifier>,
    snapshots: Arc<SnapshotCell>,
    building: AtomicBool,
}

impl IndexBuilder {
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
            building: AtomicBool::new(false),
        }
    }

    /// Run a full build: fetch the corpus, embed every posting, classify
    /// roles, and atomically install the resulting snapshot.
    pub async fn build(&self, corpus: &dyn CorpusSource) -> Result<BuildStats> {
        let _guard = BuildGuard::acquire(&self.building)?;
        let start = Instant::now();

        let fetched = corpus.fetch_all().await?;
        if fetched.is_empty() {
            return Err(IndexerError::CorpusEmpty);
        }

        let records = dedupe_by_id(fetched);
        log::info!("Building index over {} records", records.len());

        let texts: Vec<&str> = records.iter().map(|r| r.description.as_str()).collect();
        let vectors = self.embedder.embed_batch(texts).await?;

        let embedded: Vec<EmbeddedRecord> = records
            .iter()
            .zip(vectors)
            .map(|(record, vector)| EmbeddedRecord {
                id: record.id,
                vector,
                role: self
                    .classifier
                    .classify(&format!("{} {}", record.title, record.description)),
            })
            .collect();

        let count = embedded.len();
        let snapshot = IndexSnapshot::new(
            embedded,
            self.embedder.dimension(),
            self.embedder.model_id(),
        )?;
        self.snapshots.install(Arc::new(snapshot));

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        log::info!(
            "Index build complete: {count} records in {duration_ms}ms (generation {})",
            self.snapshots.generation()
        );

        Ok(BuildStats {
            count,
            duration_ms,
            model_version: self.embedder.model_id().to_string(),
        })
    }

    #[must_use]
    pub fn snapshots(&self) -> Arc<SnapshotCell> {
        self.snapshots.clone()
    }
}

/// First occurrence of each id wins; later duplicates are dropped with a
/// warning so a sloppy corpus export cannot produce duplicate hits.
fn dedupe_by_id(records: Vec<JobRecord>) -> Vec<JobRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        if seen.insert(record.id) {
            out.push(record);
        } else {
            log::warn!("Duplicate corpus id {} dropped", record.id);
        }
    }
    out
}

/// Clears the in-progress flag when the build finishes, on success or error.
#[derive(Debug)]
struct BuildGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BuildGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        if flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(IndexerError::BuildInProgress);
        }
        Ok(Self { flag })
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::MemoryCorpus;
    use matcher_search::KeywordClassifier;
    use pretty_assertions::assert_eq;

    fn job(id: u64, title: &str, description: &str) -> JobRecord {
        JobRecord {
            id,
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            description: description.to_string(),
        }
    }

    fn builder() -> IndexBuilder {
        std::env::set_var("MATCHER_EMBEDDING_MODE", "stub");
        IndexBuilder::new(
            Arc::new(EmbeddingModel::new().unwrap()),
            Arc::new(KeywordClassifier::new()),
            Arc::new(SnapshotCell::new()),
        )
    }

    #[tokio::test]
    async fn build_installs_a_snapshot() {
        let builder = builder();
        let corpus = MemoryCorpus::new(vec![
            job(1, "Backend Engineer", "Rust microservices and PostgreSQL"),
            job(2, "SRE", "Kubernetes, Terraform, CI/CD pipelines and Docker"),
        ]);

        let stats = builder.build(&corpus).await.unwrap();
        assert_eq!(stats.count, 2);

        let snapshot = builder.snapshots().load().unwrap();
        assert_eq!(snapshot.record_count(), 2);
        assert_eq!(snapshot.model_version(), stats.model_version);
    }

    #[tokio::test]
    async fn empty_corpus_fails_and_keeps_previous_snapshot() {
        let builder = builder();
        let corpus = MemoryCorpus::new(vec![job(1, "Backend Engineer", "Rust services")]);
        builder.build(&corpus).await.unwrap();
        let generation = builder.snapshots().generation();

        let err = builder.build(&MemoryCorpus::default()).await.unwrap_err();
        assert!(matches!(err, IndexerError::CorpusEmpty));
        assert_eq!(builder.snapshots().generation(), generation);
        assert!(builder.snapshots().load().is_some());
    }

    #[tokio::test]
    async fn duplicate_ids_are_dropped_first_wins() {
        let builder = builder();
        let corpus = MemoryCorpus::new(vec![
            job(1, "Backend Engineer", "Rust services"),
            job(1, "Impostor", "Same id, different text"),
            job(2, "SRE", "Kubernetes and Terraform"),
        ]);

        let stats = builder.build(&corpus).await.unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(builder.snapshots().load().unwrap().record_count(), 2);
    }

    #[tokio::test]
    async fn rebuild_swaps_the_snapshot() {
        let builder = builder();
        builder
            .build(&MemoryCorpus::new(vec![job(1, "Backend Engineer", "Rust")]))
            .await
            .unwrap();
        assert_eq!(builder.snapshots().generation(), 1);

        builder
            .build(&MemoryCorpus::new(vec![
                job(1, "Backend Engineer", "Rust"),
                job(2, "SRE", "Terraform"),
            ]))
            .await
            .unwrap();
        assert_eq!(builder.snapshots().generation(), 2);
        assert_eq!(builder.snapshots().load().unwrap().record_count(), 2);
    }

    #[tokio::test]
    async fn rebuilding_an_unchanged_corpus_gives_identical_results() {
        let builder = builder();
        let corpus = MemoryCorpus::new(vec![
            job(1, "Backend Engineer", "Rust microservices and PostgreSQL"),
            job(2, "SRE", "Kubernetes, Terraform, CI/CD pipelines and Docker"),
            job(3, "Data Engineer", "Spark pipelines and warehouse modeling"),
        ]);
        let query = builder
            .embedder
            .embed("Rust developer with infrastructure experience")
            .await
            .unwrap();

        builder.build(&corpus).await.unwrap();
        let first = builder.snapshots().load().unwrap().search(&query, 3).unwrap();

        builder.build(&corpus).await.unwrap();
        let second = builder.snapshots().load().unwrap().search(&query, 3).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn build_guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);

        let guard = BuildGuard::acquire(&flag).unwrap();
        assert!(matches!(
            BuildGuard::acquire(&flag).unwrap_err(),
            IndexerError::BuildInProgress
        ));
        drop(guard);

        assert!(BuildGuard::acquire(&flag).is_ok());
    }
}

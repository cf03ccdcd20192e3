use crate::error::{IndexerError, Result};
use async_trait::async_trait;
use matcher_protocol::JobRecord;
use std::path::{Path, PathBuf};

/// Source of job postings for an index build.
///
/// Each `fetch_all` call returns one consistent pass of the corpus; the
/// builder never mutates what it receives.
#[async_trait]
pub trait CorpusSource: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<JobRecord>>;
}

/// Corpus backed by a JSON array of job records on disk.
pub struct JsonCorpus {
    path: PathBuf,
}

impl JsonCorpus {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CorpusSource for JsonCorpus {
    async fn fetch_all(&self) -> Result<Vec<JobRecord>> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let records: Vec<JobRecord> = serde_json::from_str(&raw)?;

        for record in &records {
            if record.title.trim().is_empty() {
                return Err(IndexerError::InvalidCorpus(format!(
                    "record {} has an empty title",
                    record.id
                )));
            }
            if record.description.trim().is_empty() {
                return Err(IndexerError::InvalidCorpus(format!(
                    "record {} has an empty description",
                    record.id
                )));
            }
        }

        Ok(records)
    }
}

/// In-memory corpus for tests and embedded use.
#[derive(Default)]
pub struct MemoryCorpus {
    records: Vec<JobRecord>,
}

impl MemoryCorpus {
    #[must_use]
    pub fn new(records: Vec<JobRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl CorpusSource for MemoryCorpus {
    async fn fetch_all(&self) -> Result<Vec<JobRecord>> {
        Ok(self.records.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn job(id: u64, title: &str, description: &str) -> JobRecord {
        JobRecord {
            id,
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            description: description.to_string(),
        }
    }

    #[tokio::test]
    async fn json_corpus_reads_records() {
        let records = vec![
            job(1, "Backend Engineer", "Rust services"),
            job(2, "SRE", "Kubernetes and Terraform"),
        ];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&records).unwrap().as_bytes())
            .unwrap();

        let corpus = JsonCorpus::new(file.path());
        let loaded = corpus.fetch_all().await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn json_corpus_rejects_blank_description() {
        let records = vec![job(1, "Backend Engineer", "   ")];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&records).unwrap().as_bytes())
            .unwrap();

        let corpus = JsonCorpus::new(file.path());
        let err = corpus.fetch_all().await.unwrap_err();
        assert!(matches!(err, IndexerError::InvalidCorpus(_)));
    }

    #[tokio::test]
    async fn json_corpus_missing_file_is_io_error() {
        let corpus = JsonCorpus::new("/nonexistent/jobs.json");
        let err = corpus.fetch_all().await.unwrap_err();
        assert!(matches!(err, IndexerError::IoError(_)));
    }
}

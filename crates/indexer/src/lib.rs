//! Index construction for the matcher engine.
//!
//! The builder fetches the corpus, embeds every posting, derives role tags,
//! and installs the result as an immutable snapshot. Builds are full
//! rebuilds; there is no incremental update path.

pub mod builder;
pub mod corpus;
pub mod error;
pub mod stats;

pub use builder::IndexBuilder;
pub use corpus::{CorpusSource, JsonCorpus, MemoryCorpus};
pub use error::{IndexerError, Result};
pub use stats::BuildStats;

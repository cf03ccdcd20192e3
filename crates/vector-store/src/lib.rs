//! # Matcher Vector Store
//!
//! Embedding generation and in-memory nearest-neighbor search over job
//! postings.
//!
//! ## Architecture
//!
//! ```text
//! JobRecord descriptions
//!     │
//!     ├──> Embedding Model (ONNX Runtime)
//!     │      └─> L2-normalized Vector[D]
//!     │
//!     ├──> FlatIndex (exact inner-product scan)
//!     │      └─> (id, score) ranked deterministically
//!     │
//!     └──> IndexSnapshot (immutable)
//!            └─> SnapshotCell (atomic swap, Arc readers)
//! ```
//!
//! All vectors in a snapshot share one dimension and are unit-normalized, so
//! cosine similarity reduces to inner product. Snapshots are immutable once
//! installed; readers capture an `Arc` and never block a build.

mod embedding;
mod error;
mod index;
mod snapshot;
mod types;

pub use embedding::{current_model_id, EmbeddingModel};
pub use error::{Result, VectorStoreError};
pub use index::FlatIndex;
pub use snapshot::{IndexSnapshot, SnapshotCell};
pub use types::{EmbeddedRecord, Hit};

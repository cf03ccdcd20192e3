//! Query side of the matcher engine: role classification and ranked search
//! against the active index snapshot.

pub mod engine;
pub mod error;
pub mod role;

pub use engine::{QueryEngine, RankedMatches};
pub use error::{Result, SearchError};
pub use role::{KeywordClassifier, RoleClassifier};

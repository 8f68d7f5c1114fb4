//! Full-text, vector, and hybrid search over stored conversations.

pub mod engine;
pub mod fts;
pub mod metrics;
pub mod vector;

pub use engine::{ScoredMessage, SearchEngine, SearchOutcome, SearchRequest, SearchStrategy};
pub use fts::{FtsFilter, FtsHit, FtsIndex};
pub use metrics::{HybridWeights, SearchConfigRepository, SearchMetricRepository};
pub use vector::{cosine_similarity, DisabledVectorIndex, InMemoryVectorIndex, VectorFilter, VectorHit, VectorIndex};

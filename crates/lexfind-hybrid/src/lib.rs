//! lexfind-hybrid
//!
//! Multi-signal template retrieval: the four search methods, score fusion
//! and the fast/slow-path orchestrator built on top of them.

pub mod engine;
pub mod fusion;
pub mod search;

pub use engine::{Phase, RetrievalTrace, TemplateFinder};
pub use fusion::FusionPolicy;
pub use search::{MethodCounts, MultiSignalSearch, SearchOutcome, SearchRequest};

//! lexfind-text
//!
//! In-process text signals for the snapshot backend: a RAM tantivy index for
//! full-text rank and pg_trgm-compatible trigram similarity.
pub mod index;
pub mod tantivy_utils;
pub mod trigram;

pub use index::TextIndex;
pub use trigram::similarity as trigram_similarity;

//! lexfind-core
//!
//! Types, error taxonomy, configuration and backend traits shared by the
//! template retrieval crates.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};

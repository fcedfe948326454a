//! tasktree common - shared types and utilities for the tasktree crates.
//!
//! This crate provides:
//! - Configuration types, loading and validation
//! - The error taxonomy shared by the store, pipeline and model resolver
//! - Logging setup
//! - The file-system collaborator trait and its local implementation
//! - Small string utilities

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod fs;
pub mod logging;
pub mod util;
pub mod validation;

pub use config::{
    Config, EmbeddingConfig, LoggingConfig, PipelineConfig, SearchConfig, SummarizerConfig,
    AUTO_MODEL_ID,
};
pub use error::{Error, Result, ResultExt};
pub use fs::{FileSystem, LocalFileSystem};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::fs::FileSystem;
    pub use crate::logging::init_logging;
}

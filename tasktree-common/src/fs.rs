//! File-system collaborator.
//!
//! The pipeline reads command sources through this trait so tests (and
//! hosts with virtual file systems) can substitute their own implementation.

use async_trait::async_trait;
use std::path::Path;

use crate::error::{Error, Result};

/// Minimal file access used by the pipeline and importers.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a UTF-8 text file.
    async fn read_file(&self, path: &Path) -> Result<String>;

    /// Write a UTF-8 text file, creating parent directories.
    async fn write_file(&self, path: &Path, content: &str) -> Result<()>;

    /// Check whether a path exists.
    async fn exists(&self, path: &Path) -> bool;

    /// Delete a file.
    async fn delete(&self, path: &Path) -> Result<()>;
}

/// File system backed by the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_file(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        String::from_utf8(bytes).map_err(|_| {
            Error::InvalidInput(format!("{} is not valid UTF-8", path.display()))
        })
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }
}

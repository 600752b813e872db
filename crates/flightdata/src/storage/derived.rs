//! Sinks for files produced while parsing, such as the delimited text
//! converted from binary logs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};

/// Receives derived files.
#[async_trait]
pub trait DerivedFileSink: Send + Sync + std::fmt::Debug {
    /// Write `bytes` under `name`.
    ///
    /// # Errors
    ///
    /// Returns an infrastructure error if the file cannot be written.
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Writes derived files into a directory, created on first use.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    created: OnceCell<()>,
}

impl DirectorySink {
    /// Sink writing into `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            created: OnceCell::new(),
        }
    }

    /// Target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn ensure_dir(&self) -> Result<()> {
        self.created
            .get_or_try_init(|| async {
                tokio::fs::create_dir_all(&self.dir)
                    .await
                    .map_err(|source| Error::DirectoryCreate {
                        path: self.dir.clone(),
                        source,
                    })
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DerivedFileSink for DirectorySink {
    async fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        self.ensure_dir().await?;
        let file_name = Path::new(name)
            .file_name()
            .ok_or_else(|| Error::internal(format!("derived file has no name: '{name}'")))?;
        let path = self.dir.join(file_name);
        tokio::fs::write(&path, bytes).await?;
        debug!("Wrote derived file {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

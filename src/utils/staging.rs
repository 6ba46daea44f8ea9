use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("File exceeds the maximum allowed size of {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Failed to read upload body: {0}")]
    Body(String),

    #[error("Failed to write staging file: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded payload buffered on local disk.
///
/// The backing temp file is removed when this value is dropped.
#[derive(Debug)]
pub struct StagedFile {
    temp: NamedTempFile,
    file_name: String,
    content_type: Option<String>,
    size: usize,
}

impl StagedFile {
    /// Copy a byte stream to a temp file, failing as soon as `limit` is exceeded.
    pub async fn from_stream<S, E>(
        stream: S,
        file_name: impl Into<String>,
        content_type: Option<String>,
        limit: usize,
    ) -> Result<Self, StagingError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let temp = NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);
        let mut size = 0usize;

        let mut stream = std::pin::pin!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| StagingError::Body(e.to_string()))?;
            size += chunk.len();
            if size > limit {
                return Err(StagingError::TooLarge { limit });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(
            "Staged {} bytes at {}",
            size,
            temp.path().display()
        );

        Ok(Self {
            temp,
            file_name: file_name.into(),
            content_type,
            size,
        })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn read_all(&self) -> Result<Vec<u8>, StagingError> {
        Ok(tokio::fs::read(self.temp.path()).await?)
    }
}

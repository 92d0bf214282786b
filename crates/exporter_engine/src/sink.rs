use async_trait::async_trait;
use thiserror::Error;

use exporter_core::TabularArtifact;

/// A downstream write that could not be completed. The already-downloaded
/// artifact is unaffected; the two are not transactional.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SinkError {
    pub message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The spreadsheet collaborator: clears the destination tab and rewrites it
/// with the dataset, headers in the first row.
#[async_trait]
pub trait DatasetSink: Send + Sync {
    async fn overwrite_tab(
        &self,
        tab: &str,
        artifact: &TabularArtifact,
    ) -> Result<(), SinkError>;
}

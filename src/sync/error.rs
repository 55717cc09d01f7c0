use crate::repository::RepositoryError;
use crate::transport::ApiError;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("record {0} was not returned by its conversation")]
    FocalRecordMissing(String),

    /// A collection walk stopped on a fatal error. Its checkpoint was saved
    /// as failed at the last persisted page.
    #[error("sync of {kind} stopped after {synced} records: {source}")]
    Interrupted {
        kind: String,
        synced: u64,
        cursor: Option<String>,
        source: Box<SyncError>,
    },
}

impl SyncError {
    /// Account-level failures (403, rejected credentials).
    pub fn is_fatal(&self) -> bool {
        match self {
            SyncError::Api(err) => err.halts_run(),
            SyncError::Interrupted { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Whether the next run will continue from a saved cursor.
    pub fn resumable(&self) -> bool {
        matches!(self, SyncError::Interrupted { cursor: Some(_), .. })
    }

    /// The upstream failure behind this error, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            SyncError::Api(err) => Some(err),
            SyncError::Interrupted { source, .. } => source.api_error(),
            _ => None,
        }
    }
}

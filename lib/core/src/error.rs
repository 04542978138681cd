use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by every Resolve component.
///
/// The core never retries on its own: adapters may retry idempotent reads,
/// but writes surface the first failure to the caller.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("embedding service error: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    Store(String),

    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("ingest stopped at index {failed_index} after committing {committed} entities: {source}")]
    PartialIngest {
        committed: usize,
        failed_index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Wrap a failure that interrupted a batch ingest, preserving how far the
    /// batch got so the caller can resume.
    #[must_use]
    pub fn partial_ingest(committed: usize, failed_index: usize, source: Error) -> Self {
        Error::PartialIngest {
            committed,
            failed_index,
            source: Box::new(source),
        }
    }
}

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Batch error
///
/// Every variant ends the current execution with a failed status. Nothing is
/// retried here: a retry is a new execution resumed from the last checkpoint.
pub enum BatchError {
    /// Bad construction-time parameters, reported before any execution starts.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A reader was opened twice without being closed in between.
    #[error("ItemReader already open: {0}")]
    AlreadyOpen(String),

    /// A row-source session, connection or transaction could not be acquired.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("ItemReader from: {0}")]
    ItemReader(String),

    #[error("ItemProcessor from: {0}")]
    ItemProcessor(String),

    #[error("ItemWriter from: {0}")]
    ItemWriter(String),

    #[error("Transaction: {0}")]
    Transaction(String),

    #[error("Checkpoint: {0}")]
    Checkpoint(String),

    #[error("Step: {0}")]
    Step(String),

    #[error("Tasklet: {0}")]
    Tasklet(String),
}

impl BatchError {
    /// Returns `true` when the error comes from the chunk itself (read,
    /// process or write) rather than from the infrastructure around it.
    pub fn is_chunk_error(&self) -> bool {
        matches!(
            self,
            BatchError::ItemReader(_) | BatchError::ItemProcessor(_) | BatchError::ItemWriter(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::BatchError;

    #[test]
    fn should_render_error_messages() {
        assert_eq!(
            BatchError::InvalidConfig("fetch size must not be negative".to_string()).to_string(),
            "Invalid configuration: fetch size must not be negative"
        );
        assert_eq!(
            BatchError::ItemWriter("disk full".to_string()).to_string(),
            "ItemWriter from: disk full"
        );
    }

    #[test]
    fn should_classify_chunk_errors() {
        assert!(BatchError::ItemReader("cursor closed".into()).is_chunk_error());
        assert!(BatchError::ItemProcessor("boom".into()).is_chunk_error());
        assert!(!BatchError::ResourceUnavailable("pool".into()).is_chunk_error());
        assert!(!BatchError::AlreadyOpen("reader".into()).is_chunk_error());
    }
}

use crate::DocId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),

    /// Build-time invariant violation: the statistics do not describe the same
    /// document set as the postings. An index in this state must never serve
    /// queries.
    #[error("corpus statistics inconsistent: {reason}")]
    CorpusInconsistency { reason: String },

    #[error("semantic provider failed for doc {doc_id}: {reason}")]
    Provider { doc_id: DocId, reason: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

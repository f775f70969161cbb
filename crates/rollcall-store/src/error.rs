use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{op}: service returned HTTP {code}: {body}")]
    Status {
        op: &'static str,
        code: u16,
        body: String,
    },
    #[error("{op}: transport error: {message}")]
    Transport { op: &'static str, message: String },
    #[error("{op}: malformed response: {message}")]
    Decode { op: &'static str, message: String },
    #[error("collection not found: {0}")]
    CollectionNotFound(String),
    #[error("vector dimension mismatch: collection expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("refusing to upsert an empty batch")]
    EmptyBatch,
    #[error("{op}: {message}")]
    Service { op: &'static str, message: String },
}

impl StoreError {
    pub(crate) fn decode(op: &'static str, err: impl std::fmt::Display) -> Self {
        StoreError::Decode {
            op,
            message: err.to_string(),
        }
    }
}

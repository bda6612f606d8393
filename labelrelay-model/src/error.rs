use thiserror::Error;

/// Errors produced by model constructors and validation routines.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("record must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("field `{field}` cannot be used as a sample id: {reason}")]
    InvalidSampleId { field: String, reason: String },

    #[error("unknown event kind `{0}`")]
    UnknownEventKind(String),

    #[error("unknown notification channel `{0}`")]
    UnknownChannel(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

use labelrelay_model::{ModelError, SampleId, TaskId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Project initialization failed: {0}")]
    ProjectInit(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Backend returned {actual} task ids for {expected} submitted tasks")]
    TaskCountMismatch { expected: usize, actual: usize },

    #[error("Index invariant violated: {0}")]
    IndexInvariant(#[from] IndexViolation),

    #[error("Invalid record: {0}")]
    Record(#[from] ModelError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Programmer errors detected by the sample/task index.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexViolation {
    #[error("sample {sample_id} is already mapped to task {existing}")]
    SampleAlreadyMapped { sample_id: SampleId, existing: TaskId },

    #[error("sample {sample_id} appears more than once in task {task_id}")]
    DuplicateSampleInTask { sample_id: SampleId, task_id: TaskId },

    #[error("task {0} has no samples")]
    EmptyTask(TaskId),

    #[error("task {0} is already registered")]
    TaskAlreadyRegistered(TaskId),

    #[error("task {0} is not registered")]
    UnknownTask(TaskId),
}

pub type Result<T> = std::result::Result<T, AnnotationError>;

//! Core data model definitions shared across labelrelay crates.
#![allow(missing_docs)]

pub mod error;
pub mod events;
pub mod ids;
pub mod record;

// Intentionally curated re-exports for downstream consumers.
pub use error::{ModelError, Result as ModelResult};
pub use events::{AnnotationEvent, EventKind, NotificationChannel};
pub use ids::{SampleId, TaskId};
pub use record::Record;

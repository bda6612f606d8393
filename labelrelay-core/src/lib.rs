//! # Labelrelay Core
//!
//! Batch orchestration for human annotation: records go in, annotated records
//! come out in the same order.
//!
//! ## Overview
//!
//! - **Task batching**: groups records into backend tasks and creates them in
//!   bounded sub-batches
//! - **Sample/task index**: remembers which record lives in which task across
//!   calls, and which annotations were already delivered
//! - **Polling**: bounded wait for annotations with a fixed poll interval
//! - **Notifications**: one handler per lifecycle event, forwarded to a
//!   pluggable sender
//! - **Merging**: writes backend annotations into the member records
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use labelrelay_core::{
//!     AnnotationConfig, AnnotationOrchestrator, InMemoryBackend, LogNotifier,
//! };
//! use labelrelay_model::Record;
//!
//! async fn annotate() -> labelrelay_core::Result<()> {
//!     let mut orchestrator = AnnotationOrchestrator::new(
//!         AnnotationConfig::default(),
//!         Arc::new(InMemoryBackend::default()),
//!         Arc::new(LogNotifier),
//!     )?;
//!     let records = vec![Record::new().with("text", "hello")];
//!     let annotated = orchestrator.process(records).await?;
//!     println!("{} records", annotated.len());
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]

/// Annotation service adapters
pub mod backend;

/// Record grouping and task creation
pub mod batcher;

/// Orchestrator configuration types
pub mod config;

/// Error types
pub mod error;

/// Sample/task bookkeeping
pub mod index;

/// Annotation merging
pub mod merge;

/// Lifecycle notifications and senders
pub mod notify;

/// Batch submission, waiting and merging
pub mod orchestrator;

/// Bounded annotation polling
pub mod poller;

pub use backend::{
    AnnotationBackend, BackendSettings, InMemoryBackend, LabelStudioBackend,
    LabelStudioSettings, MemorySettings, StatusUpdate,
};
pub use config::{AnnotationConfig, NotificationEvents};
pub use error::{AnnotationError, IndexViolation, Result};
pub use index::SampleTaskIndex;
pub use notify::{
    EventDispatcher, LogNotifier, Notification, NotificationSender, WebhookNotifier,
};
pub use orchestrator::AnnotationOrchestrator;
pub use poller::{PollOutcome, PollState};

//! Annotation service adapters.
//!
//! The orchestrator only talks to [`AnnotationBackend`]; each annotation
//! service gets one implementation. [`BackendSettings`] is the serializable
//! description a worker uses to rebuild its backend instead of receiving a
//! live handle.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use labelrelay_model::{Record, SampleId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{config::AnnotationConfig, error::Result};

pub mod label_studio;
pub mod memory;

pub use label_studio::{LabelStudioBackend, LabelStudioSettings};
pub use memory::{InMemoryBackend, MemorySettings};

/// Result of one incremental status check.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    /// Whether anything completed since the previous check.
    pub changed: bool,
    /// Raw annotations for tasks that are now complete.
    pub completed: HashMap<TaskId, Value>,
    /// Tasks whose status could not be read this round, with the reason.
    pub failed: HashMap<TaskId, String>,
}

impl StatusUpdate {
    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn from_completed(completed: HashMap<TaskId, Value>) -> Self {
        Self::with_failures(completed, HashMap::new())
    }

    pub fn with_failures(
        completed: HashMap<TaskId, Value>,
        failed: HashMap<TaskId, String>,
    ) -> Self {
        Self {
            changed: !completed.is_empty(),
            completed,
            failed,
        }
    }
}

/// Task lifecycle operations for one annotation service.
#[async_trait]
pub trait AnnotationBackend: Send + Sync {
    /// Short label used in logs.
    fn describe(&self) -> &str;

    /// Title of the backend project, when the service has one.
    fn project_name(&self) -> Option<&str> {
        None
    }

    /// Serialize one task's member records into the service's task payload.
    fn format_task(&self, records: &[Record]) -> Result<Value>;

    /// Create one task per payload. Must return exactly one id per payload,
    /// in submission order.
    async fn create_tasks_batch(
        &self,
        payloads: Vec<Value>,
        sample_ids: &[Vec<SampleId>],
    ) -> Result<Vec<TaskId>>;

    /// Fetch a single task's annotation, `None` while it is unannotated.
    async fn get_task_annotation(&self, task_id: &TaskId) -> Result<Option<Value>>;

    /// Report which of `task_ids` are complete. Must never return ids outside
    /// the input set.
    ///
    /// The default implementation fetches each task individually; a task that
    /// fails to fetch lands in [`StatusUpdate::failed`] and the rest are still
    /// checked. Implementations with a bulk listing endpoint should override
    /// this.
    async fn check_annotation_status(&self, task_ids: &[TaskId]) -> Result<StatusUpdate> {
        let mut completed = HashMap::new();
        let mut failed = HashMap::new();
        for task_id in task_ids {
            match self.get_task_annotation(task_id).await {
                Ok(Some(annotation)) => {
                    completed.insert(task_id.clone(), annotation);
                }
                Ok(None) => {}
                Err(err) => {
                    failed.insert(task_id.clone(), err.to_string());
                }
            }
        }
        Ok(StatusUpdate::with_failures(completed, failed))
    }

    /// Merge a task's raw annotation into one of its member records.
    fn interpret(&self, annotation: &Value, record: Record) -> Result<Record>;

    /// Identifier of the annotation itself, used in completion notifications.
    fn annotation_id(&self, annotation: &Value) -> Option<String> {
        match annotation.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Link to the task in the service's UI.
    fn task_url(&self, _task_id: &TaskId) -> Option<String> {
        None
    }
}

impl fmt::Debug for dyn AnnotationBackend + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnnotationBackend({})", self.describe())
    }
}

/// Serializable description of which backend to build.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendSettings {
    Memory(MemorySettings),
    LabelStudio(LabelStudioSettings),
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings::Memory(MemorySettings::default())
    }
}

impl fmt::Debug for BackendSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendSettings::Memory(settings) => {
                f.debug_tuple("Memory").field(settings).finish()
            }
            BackendSettings::LabelStudio(settings) => {
                f.debug_tuple("LabelStudio").field(settings).finish()
            }
        }
    }
}

impl BackendSettings {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendSettings::Memory(_) => "memory",
            BackendSettings::LabelStudio(_) => "label_studio",
        }
    }

    /// Build a live backend. For services with projects this resolves or
    /// creates the target project, so failures here are fatal to the caller.
    pub async fn connect(
        &self,
        config: &AnnotationConfig,
    ) -> Result<Arc<dyn AnnotationBackend>> {
        match self {
            BackendSettings::Memory(settings) => {
                Ok(Arc::new(InMemoryBackend::new(settings.clone())))
            }
            BackendSettings::LabelStudio(settings) => {
                let project_name = config.resolve_project_name();
                let backend = LabelStudioBackend::connect(
                    settings.clone(),
                    config.project_id,
                    &project_name,
                )
                .await?;
                Ok(Arc::new(backend))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnnotationError;
    use serde_json::json;

    /// Relies on the default per-task status check.
    struct PerTask {
        inner: InMemoryBackend,
        broken: TaskId,
    }

    #[async_trait]
    impl AnnotationBackend for PerTask {
        fn describe(&self) -> &str {
            "per-task"
        }

        fn format_task(&self, records: &[Record]) -> Result<Value> {
            self.inner.format_task(records)
        }

        async fn create_tasks_batch(
            &self,
            payloads: Vec<Value>,
            sample_ids: &[Vec<SampleId>],
        ) -> Result<Vec<TaskId>> {
            self.inner.create_tasks_batch(payloads, sample_ids).await
        }

        async fn get_task_annotation(&self, task_id: &TaskId) -> Result<Option<Value>> {
            if *task_id == self.broken {
                return Err(AnnotationError::Backend("boom".into()));
            }
            self.inner.get_task_annotation(task_id).await
        }

        fn interpret(&self, annotation: &Value, record: Record) -> Result<Record> {
            self.inner.interpret(annotation, record)
        }
    }

    #[tokio::test]
    async fn default_status_check_keeps_going_past_a_failed_fetch() {
        let backend = PerTask {
            inner: InMemoryBackend::default(),
            broken: TaskId::Int(1000),
        };
        backend.inner.add_annotation(1001, json!("done"));

        let update = backend
            .check_annotation_status(&[TaskId::Int(1000), TaskId::Int(1001), TaskId::Int(1002)])
            .await
            .expect("status");

        assert!(update.changed);
        assert_eq!(update.completed.len(), 1);
        assert!(update.completed.contains_key(&TaskId::Int(1001)));
        assert_eq!(update.failed.len(), 1);
        assert!(update.failed[&TaskId::Int(1000)].contains("boom"));
    }
}

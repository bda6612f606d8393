//! In-process backend used for dry runs and tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use labelrelay_model::{Record, SampleId, TaskId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{AnnotationError, Result};

use super::{AnnotationBackend, StatusUpdate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// First task id handed out.
    pub first_task_id: i64,
    /// Record field that receives the annotation `result`.
    pub result_field: String,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            first_task_id: 1000,
            result_field: "annotation_result".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredTask {
    pub payload: Value,
    pub sample_ids: Vec<SampleId>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    tasks: BTreeMap<TaskId, StoredTask>,
    annotations: HashMap<TaskId, Value>,
    created_order: Vec<TaskId>,
    create_calls: usize,
    status_checks: usize,
}

/// Keeps tasks and annotations in memory; annotations are seeded by the caller.
#[derive(Debug)]
pub struct InMemoryBackend {
    settings: MemorySettings,
    state: Mutex<MemoryState>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(MemorySettings::default())
    }
}

impl InMemoryBackend {
    pub fn new(settings: MemorySettings) -> Self {
        let state = MemoryState {
            next_id: settings.first_task_id,
            ..MemoryState::default()
        };
        Self {
            settings,
            state: Mutex::new(state),
        }
    }

    /// Seed an annotation as `{"id": "annotation_<task>", "result": result}`.
    pub fn add_annotation(&self, task_id: impl Into<TaskId>, result: Value) {
        let task_id = task_id.into();
        let annotation = json!({
            "id": format!("annotation_{task_id}"),
            "result": result,
        });
        self.state.lock().annotations.insert(task_id, annotation);
    }

    /// Seed a raw annotation payload verbatim.
    pub fn set_raw_annotation(&self, task_id: impl Into<TaskId>, annotation: Value) {
        self.state.lock().annotations.insert(task_id.into(), annotation);
    }

    pub fn created_task_ids(&self) -> Vec<TaskId> {
        self.state.lock().created_order.clone()
    }

    pub fn task(&self, task_id: &TaskId) -> Option<StoredTask> {
        self.state.lock().tasks.get(task_id).cloned()
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().create_calls
    }

    pub fn status_checks(&self) -> usize {
        self.state.lock().status_checks
    }
}

#[async_trait]
impl AnnotationBackend for InMemoryBackend {
    fn describe(&self) -> &str {
        "memory"
    }

    fn format_task(&self, records: &[Record]) -> Result<Value> {
        Ok(json!({ "samples": records }))
    }

    async fn create_tasks_batch(
        &self,
        payloads: Vec<Value>,
        sample_ids: &[Vec<SampleId>],
    ) -> Result<Vec<TaskId>> {
        if payloads.len() != sample_ids.len() {
            return Err(AnnotationError::Backend(format!(
                "{} payloads submitted with {} sample groups",
                payloads.len(),
                sample_ids.len()
            )));
        }

        let mut state = self.state.lock();
        state.create_calls += 1;

        let mut ids = Vec::with_capacity(payloads.len());
        for (payload, samples) in payloads.into_iter().zip(sample_ids) {
            let task_id = TaskId::Int(state.next_id);
            state.next_id += 1;
            state.tasks.insert(
                task_id.clone(),
                StoredTask {
                    payload,
                    sample_ids: samples.clone(),
                },
            );
            state.created_order.push(task_id.clone());
            ids.push(task_id);
        }
        Ok(ids)
    }

    async fn get_task_annotation(&self, task_id: &TaskId) -> Result<Option<Value>> {
        Ok(self.state.lock().annotations.get(task_id).cloned())
    }

    async fn check_annotation_status(&self, task_ids: &[TaskId]) -> Result<StatusUpdate> {
        let mut state = self.state.lock();
        state.status_checks += 1;

        let completed = task_ids
            .iter()
            .filter_map(|id| {
                state
                    .annotations
                    .get(id)
                    .map(|annotation| (id.clone(), annotation.clone()))
            })
            .collect();
        Ok(StatusUpdate::from_completed(completed))
    }

    fn interpret(&self, annotation: &Value, mut record: Record) -> Result<Record> {
        let result = annotation
            .get("result")
            .cloned()
            .unwrap_or_else(|| json!({}));
        record.set(self.settings.result_field.clone(), result);
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn task_ids_are_sequential_from_the_configured_start() {
        let backend = InMemoryBackend::default();
        let ids = backend
            .create_tasks_batch(
                vec![json!({}), json!({})],
                &[vec!["a".into()], vec!["b".into()]],
            )
            .await
            .expect("create");
        assert_eq!(ids, vec![TaskId::Int(1000), TaskId::Int(1001)]);
        assert_eq!(backend.created_task_ids(), ids);
        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test]
    async fn status_check_only_reports_requested_annotated_tasks() {
        let backend = InMemoryBackend::default();
        backend.add_annotation(1000, json!({"label": "x"}));
        backend.add_annotation(2000, json!({"label": "y"}));

        let update = backend
            .check_annotation_status(&[TaskId::Int(1000), TaskId::Int(1001)])
            .await
            .expect("status");
        assert!(update.changed);
        assert_eq!(update.completed.len(), 1);
        assert_eq!(
            update.completed[&TaskId::Int(1000)]["result"]["label"],
            json!("x")
        );
        assert_eq!(backend.status_checks(), 1);
    }

    #[test]
    fn interpret_writes_result_and_keeps_other_fields() {
        let backend = InMemoryBackend::default();
        let record = Record::new().with("id", "s1").with("text", "hello");
        let out = backend
            .interpret(&json!({"id": "annotation_1", "result": {"label": "ok"}}), record)
            .expect("interpret");
        assert_eq!(out.get("annotation_result"), Some(&json!({"label": "ok"})));
        assert_eq!(out.get("text"), Some(&json!("hello")));
    }
}

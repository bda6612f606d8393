#![allow(dead_code)]

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use labelrelay_core::{
    AnnotationBackend, AnnotationConfig, AnnotationError, AnnotationOrchestrator,
    InMemoryBackend, NotificationSender, Result, StatusUpdate,
};
use labelrelay_model::{NotificationChannel, Record, SampleId, TaskId};
use parking_lot::Mutex;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub message: String,
    pub subject: Option<String>,
    pub channel: Option<NotificationChannel>,
}

/// Captures every notification it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    pub fn with_subject_prefix(&self, prefix: &str) -> Vec<SentNotification> {
        self.sent()
            .into_iter()
            .filter(|n| n.subject.as_deref().is_some_and(|s| s.starts_with(prefix)))
            .collect()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(
        &self,
        message: &str,
        subject: Option<&str>,
        channel: Option<NotificationChannel>,
    ) -> Result<()> {
        self.sent.lock().push(SentNotification {
            message: message.to_string(),
            subject: subject.map(str::to_string),
            channel,
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct Faults {
    pub fail_create: bool,
    /// Drop this many ids from every creation response.
    pub short_create: usize,
    pub fail_fetch: HashSet<TaskId>,
    pub fail_status: bool,
    /// Status checks never report anything complete.
    pub stall_status: bool,
    /// Extra task reported complete by every status check.
    pub stray_completion: Option<(TaskId, Value)>,
}

/// In-memory backend with injectable failures.
#[derive(Debug, Default)]
pub struct FaultyBackend {
    pub inner: InMemoryBackend,
    pub faults: Mutex<Faults>,
}

impl FaultyBackend {
    pub fn with_faults(faults: Faults) -> Self {
        Self {
            inner: InMemoryBackend::default(),
            faults: Mutex::new(faults),
        }
    }
}

#[async_trait]
impl AnnotationBackend for FaultyBackend {
    fn describe(&self) -> &str {
        "faulty"
    }

    fn format_task(&self, records: &[Record]) -> Result<Value> {
        self.inner.format_task(records)
    }

    async fn create_tasks_batch(
        &self,
        payloads: Vec<Value>,
        sample_ids: &[Vec<SampleId>],
    ) -> Result<Vec<TaskId>> {
        let (fail, short) = {
            let faults = self.faults.lock();
            (faults.fail_create, faults.short_create)
        };
        if fail {
            return Err(AnnotationError::Backend("import rejected".into()));
        }
        let mut ids = self.inner.create_tasks_batch(payloads, sample_ids).await?;
        ids.truncate(ids.len().saturating_sub(short));
        Ok(ids)
    }

    async fn get_task_annotation(&self, task_id: &TaskId) -> Result<Option<Value>> {
        if self.faults.lock().fail_fetch.contains(task_id) {
            return Err(AnnotationError::Backend(format!("task {task_id} unavailable")));
        }
        self.inner.get_task_annotation(task_id).await
    }

    async fn check_annotation_status(&self, task_ids: &[TaskId]) -> Result<StatusUpdate> {
        let (fail, stall, stray) = {
            let faults = self.faults.lock();
            (
                faults.fail_status,
                faults.stall_status,
                faults.stray_completion.clone(),
            )
        };
        if fail {
            return Err(AnnotationError::Backend("status endpoint down".into()));
        }
        if stall {
            return Ok(StatusUpdate::unchanged());
        }
        let mut update = self.inner.check_annotation_status(task_ids).await?;
        if let Some((task_id, annotation)) = stray {
            update.completed.insert(task_id, annotation);
            update.changed = true;
        }
        Ok(update)
    }

    fn interpret(&self, annotation: &Value, record: Record) -> Result<Record> {
        self.inner.interpret(annotation, record)
    }
}

/// Keeps the trait's per-task status check, so fetch faults surface while
/// polling.
#[derive(Debug, Default)]
pub struct PerTaskBackend(pub FaultyBackend);

#[async_trait]
impl AnnotationBackend for PerTaskBackend {
    fn describe(&self) -> &str {
        "per-task"
    }

    fn format_task(&self, records: &[Record]) -> Result<Value> {
        self.0.format_task(records)
    }

    async fn create_tasks_batch(
        &self,
        payloads: Vec<Value>,
        sample_ids: &[Vec<SampleId>],
    ) -> Result<Vec<TaskId>> {
        self.0.create_tasks_batch(payloads, sample_ids).await
    }

    async fn get_task_annotation(&self, task_id: &TaskId) -> Result<Option<Value>> {
        self.0.get_task_annotation(task_id).await
    }

    fn interpret(&self, annotation: &Value, record: Record) -> Result<Record> {
        self.0.interpret(annotation, record)
    }
}

pub fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new()
                .with("id", format!("sample{i}"))
                .with("text", format!("Sample text {i}"))
        })
        .collect()
}

pub fn build(
    config: AnnotationConfig,
    backend: Arc<dyn AnnotationBackend>,
) -> (AnnotationOrchestrator, Arc<RecordingSender>) {
    let sender = Arc::new(RecordingSender::default());
    let orchestrator = AnnotationOrchestrator::new(config, backend, sender.clone())
        .expect("valid orchestrator");
    (orchestrator, sender)
}

pub fn fast_config() -> AnnotationConfig {
    AnnotationConfig {
        project_name: Some("Test Project".into()),
        timeout: 0.2,
        poll_interval: 0.01,
        ..AnnotationConfig::default()
    }
}

//! Drives one call end to end: records are batched into tasks, annotations
//! are awaited or fetched once, then merged back in input order.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::Arc,
};

use labelrelay_model::{AnnotationEvent, Record, TaskId};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::{
    backend::{AnnotationBackend, BackendSettings},
    batcher::{create_tasks, plan_batch},
    config::AnnotationConfig,
    error::Result,
    index::SampleTaskIndex,
    merge::merge_annotations,
    notify::{EventDispatcher, NotificationSender},
    poller::{AnnotationPoller, PollOutcome, deliver_annotation},
};

/// Drives records through task creation, optional polling and merging.
///
/// State accumulates across `process` calls on the same instance: a record
/// identity is registered once and its task is reused by later calls.
pub struct AnnotationOrchestrator {
    config: AnnotationConfig,
    backend: Arc<dyn AnnotationBackend>,
    dispatcher: EventDispatcher,
    index: SampleTaskIndex,
}

impl fmt::Debug for AnnotationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnnotationOrchestrator")
            .field("project_name", &self.dispatcher.project_name())
            .field("backend", &self.backend.describe())
            .field("tasks", &self.index.task_count())
            .field("samples", &self.index.sample_count())
            .field("processed", &self.index.processed_count())
            .finish()
    }
}

impl AnnotationOrchestrator {
    /// Wrap an already connected backend. The project name comes from the
    /// backend when it has one, otherwise from the configuration.
    pub fn new(
        config: AnnotationConfig,
        backend: Arc<dyn AnnotationBackend>,
        sender: Arc<dyn NotificationSender>,
    ) -> Result<Self> {
        config.validate()?;
        let project_name = backend
            .project_name()
            .map(str::to_string)
            .unwrap_or_else(|| config.resolve_project_name());
        let dispatcher =
            EventDispatcher::new(project_name, config.notification_events, sender);

        info!(
            project = %dispatcher.project_name(),
            backend = backend.describe(),
            wait = config.wait_for_annotations,
            samples_per_task = config.samples_per_task,
            "annotation orchestrator ready"
        );
        Ok(Self {
            config,
            backend,
            dispatcher,
            index: SampleTaskIndex::new(),
        })
    }

    /// Build the backend described by `settings`, then the orchestrator.
    pub async fn connect(
        config: AnnotationConfig,
        settings: &BackendSettings,
        sender: Arc<dyn NotificationSender>,
    ) -> Result<Self> {
        config.validate()?;
        let backend = settings.connect(&config).await?;
        Self::new(config, backend, sender)
    }

    /// Submit `records` for annotation and return them, in input order, with
    /// whatever annotations are available by the time this call finishes.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn process(&mut self, records: Vec<Record>) -> Result<Vec<Record>> {
        if records.is_empty() {
            return Ok(records);
        }
        let mut records = records;

        let plan = plan_batch(
            &mut records,
            &self.index,
            &self.config.id_field,
            self.config.samples_per_task,
        )?;
        debug!(
            fresh = plan.fresh_count(),
            reused = plan.reused.len(),
            tasks = plan.groups.len(),
            "planned batch"
        );

        create_tasks(
            &plan,
            &records,
            self.config.max_tasks_per_batch,
            self.backend.as_ref(),
            &mut self.index,
            &self.dispatcher,
        )
        .await?;

        let mut seen = HashSet::new();
        let call_tasks: Vec<TaskId> = plan
            .sample_ids
            .iter()
            .filter_map(|id| self.index.task_of(id))
            .filter(|task_id| seen.insert(*task_id))
            .cloned()
            .collect();

        let annotations = if self.config.wait_for_annotations {
            self.wait_for_batch_annotations(&call_tasks).await?.completed
        } else {
            self.fetch_available(&call_tasks).await?
        };

        let (merged, report) = merge_annotations(
            records,
            &plan.sample_ids,
            &self.index,
            &annotations,
            self.backend.as_ref(),
            &self.dispatcher,
        )
        .await;
        info!(
            tasks = call_tasks.len(),
            annotated = report.annotated,
            unannotated = report.unchanged,
            merge_failures = report.failed,
            "processed batch"
        );
        Ok(merged)
    }

    /// Poll until every task in `task_ids` is annotated or the configured
    /// timeout elapses.
    pub async fn wait_for_batch_annotations(
        &mut self,
        task_ids: &[TaskId],
    ) -> Result<PollOutcome> {
        let poller = AnnotationPoller::new(
            self.backend.as_ref(),
            &self.dispatcher,
            self.config.timeout_duration(),
            self.config.poll_interval_duration(),
        );
        poller.wait(&mut self.index, task_ids).await
    }

    /// One direct fetch per unprocessed task, without status checks. Fetch
    /// failures are reported and skipped.
    async fn fetch_available(&mut self, task_ids: &[TaskId]) -> Result<HashMap<TaskId, Value>> {
        let mut available = HashMap::new();
        for task_id in task_ids {
            if let Some(cached) = self.index.delivered_annotation(task_id) {
                available.insert(task_id.clone(), cached.clone());
                continue;
            }
            match self.backend.get_task_annotation(task_id).await {
                Ok(Some(annotation)) => {
                    deliver_annotation(
                        self.backend.as_ref(),
                        &self.dispatcher,
                        &mut self.index,
                        task_id,
                        &annotation,
                    )
                    .await?;
                    available.insert(task_id.clone(), annotation);
                }
                Ok(None) => {}
                Err(err) => self.report_fetch_failure(task_id, &err.to_string()).await,
            }
        }
        Ok(available)
    }

    /// Fetch the current annotation of every task this instance created, in
    /// creation order. Unannotated tasks are absent; failures are reported
    /// through `error_occurred` and skipped.
    pub async fn get_all_annotations(&self) -> HashMap<TaskId, Value> {
        let mut annotations = HashMap::new();
        for task_id in self.index.task_ids() {
            if let Some(cached) = self.index.delivered_annotation(task_id) {
                annotations.insert(task_id.clone(), cached.clone());
                continue;
            }
            match self.backend.get_task_annotation(task_id).await {
                Ok(Some(annotation)) => {
                    annotations.insert(task_id.clone(), annotation);
                }
                Ok(None) => {}
                Err(err) => self.report_fetch_failure(task_id, &err.to_string()).await,
            }
        }
        annotations
    }

    async fn report_fetch_failure(&self, task_id: &TaskId, message: &str) {
        warn!(task_id = %task_id, error = message, "failed to fetch annotation");
        self.dispatcher
            .dispatch(AnnotationEvent::error(
                Some(task_id.clone()),
                format!("failed to fetch annotation: {message}"),
            ))
            .await;
    }

    pub fn index(&self) -> &SampleTaskIndex {
        &self.index
    }

    pub fn config(&self) -> &AnnotationConfig {
        &self.config
    }

    /// Tuning changes apply to the next call. Notification toggles live on the
    /// dispatcher, see [`Self::dispatcher_mut`].
    pub fn config_mut(&mut self) -> &mut AnnotationConfig {
        &mut self.config
    }

    pub fn project_name(&self) -> &str {
        self.dispatcher.project_name()
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
        &mut self.dispatcher
    }

    pub fn backend(&self) -> &Arc<dyn AnnotationBackend> {
        &self.backend
    }
}

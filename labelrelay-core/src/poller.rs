//! Bounded wait for annotations.
//!
//! One call polls a fixed set of task ids until they are all annotated or
//! the timeout elapses. The only suspension point is the sleep between
//! status checks.

use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use labelrelay_model::{AnnotationEvent, TaskId};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    backend::AnnotationBackend, error::Result, index::SampleTaskIndex,
    notify::EventDispatcher,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Every requested task produced an annotation.
    Complete,
    /// The timeout elapsed first. Not an error.
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub state: PollState,
    pub completed: HashMap<TaskId, Value>,
    /// Requested ids still unannotated, in request order.
    pub outstanding: Vec<TaskId>,
    pub status_checks: usize,
    pub elapsed: Duration,
}

impl PollOutcome {
    pub fn is_complete(&self) -> bool {
        self.state == PollState::Complete
    }
}

#[derive(Debug)]
pub struct AnnotationPoller<'a> {
    backend: &'a dyn AnnotationBackend,
    dispatcher: &'a EventDispatcher,
    timeout: Duration,
    poll_interval: Duration,
}

impl<'a> AnnotationPoller<'a> {
    pub fn new(
        backend: &'a dyn AnnotationBackend,
        dispatcher: &'a EventDispatcher,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            timeout,
            poll_interval,
        }
    }

    /// Wait for `task_ids` to be annotated.
    ///
    /// Tasks already marked processed count as complete from the start and
    /// return their cached annotation. A task the backend fails to read is
    /// reported once per call and polling continues for it and the others. Newly completed tasks registered in
    /// `index` are marked processed; ids the index does not know are returned
    /// but not recorded.
    pub async fn wait(
        &self,
        index: &mut SampleTaskIndex,
        task_ids: &[TaskId],
    ) -> Result<PollOutcome> {
        let started = Instant::now();

        let mut targets = Vec::with_capacity(task_ids.len());
        let mut unique = HashSet::with_capacity(task_ids.len());
        for id in task_ids {
            if unique.insert(id) {
                targets.push(id.clone());
            }
        }

        let mut completed: HashMap<TaskId, Value> = targets
            .iter()
            .filter_map(|id| {
                index
                    .delivered_annotation(id)
                    .map(|annotation| (id.clone(), annotation.clone()))
            })
            .collect();

        let mut status_checks = 0usize;
        let mut reported_failures: HashSet<TaskId> = HashSet::new();
        let state = loop {
            let pending: Vec<TaskId> = targets
                .iter()
                .filter(|id| !completed.contains_key(*id))
                .cloned()
                .collect();
            if pending.is_empty() {
                break PollState::Complete;
            }

            status_checks += 1;
            match self.backend.check_annotation_status(&pending).await {
                Ok(update) => {
                    debug!(
                        round = status_checks,
                        changed = update.changed,
                        newly_completed = update.completed.len(),
                        failed = update.failed.len(),
                        pending = pending.len(),
                        "status check"
                    );
                    let pending_set: HashSet<&TaskId> = pending.iter().collect();
                    for (task_id, annotation) in update.completed {
                        if !pending_set.contains(&task_id) {
                            warn!(
                                task_id = %task_id,
                                backend = self.backend.describe(),
                                "status check returned a task that was not requested"
                            );
                            continue;
                        }
                        deliver_annotation(
                            self.backend,
                            self.dispatcher,
                            index,
                            &task_id,
                            &annotation,
                        )
                        .await?;
                        completed.insert(task_id, annotation);
                    }
                    for (task_id, reason) in update.failed {
                        if !pending_set.contains(&task_id)
                            || !reported_failures.insert(task_id.clone())
                        {
                            continue;
                        }
                        warn!(task_id = %task_id, error = %reason, "failed to fetch annotation");
                        self.dispatcher
                            .dispatch(AnnotationEvent::error(
                                Some(task_id),
                                format!("failed to fetch annotation: {reason}"),
                            ))
                            .await;
                    }
                }
                Err(err) => {
                    warn!(error = %err, round = status_checks, "annotation status check failed");
                    self.dispatcher
                        .dispatch(AnnotationEvent::error(
                            None,
                            format!("annotation status check failed: {err}"),
                        ))
                        .await;
                }
            }

            if targets.iter().all(|id| completed.contains_key(id)) {
                break PollState::Complete;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                break PollState::TimedOut;
            }
            tokio::time::sleep(self.poll_interval.min(self.timeout - elapsed)).await;
        };

        let outstanding: Vec<TaskId> = targets
            .iter()
            .filter(|id| !completed.contains_key(*id))
            .cloned()
            .collect();
        let elapsed = started.elapsed();

        match state {
            PollState::Complete => info!(
                tasks = targets.len(),
                status_checks,
                elapsed_ms = elapsed.as_millis() as u64,
                "all annotations received"
            ),
            PollState::TimedOut => warn!(
                resolved = completed.len(),
                outstanding = outstanding.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "timed out waiting for annotations"
            ),
        }

        self.dispatcher
            .dispatch(AnnotationEvent::BatchAnnotationCompleted {
                resolved: completed.len(),
                outstanding: outstanding.len(),
            })
            .await;

        Ok(PollOutcome {
            state,
            completed,
            outstanding,
            status_checks,
            elapsed,
        })
    }
}

/// Mark `task_id` processed and announce it. Tasks already processed are not
/// announced again; tasks outside the index are announced but not recorded.
pub(crate) async fn deliver_annotation(
    backend: &dyn AnnotationBackend,
    dispatcher: &EventDispatcher,
    index: &mut SampleTaskIndex,
    task_id: &TaskId,
    annotation: &Value,
) -> Result<bool> {
    if index.contains_task(task_id) && !index.mark_processed(task_id, annotation.clone())? {
        return Ok(false);
    }
    debug!(task_id = %task_id, "annotation delivered");
    dispatcher
        .dispatch(AnnotationEvent::AnnotationCompleted {
            task_id: task_id.clone(),
            annotation_id: backend.annotation_id(annotation),
            task_url: backend.task_url(task_id),
        })
        .await;
    Ok(true)
}

//! Task batching: group records into tasks and create them on the backend.

use std::collections::HashSet;

use labelrelay_model::{AnnotationEvent, Record, SampleId, TaskId};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    backend::AnnotationBackend,
    error::{AnnotationError, Result},
    index::SampleTaskIndex,
    notify::EventDispatcher,
};

/// Grouping decided for one `process` call.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Salt mixed into generated ids; also used as the batch id prefix.
    pub salt: String,
    /// Identity of every input record, in input order.
    pub sample_ids: Vec<SampleId>,
    /// Positions (into the input) of records to submit, one entry per task.
    pub groups: Vec<Vec<usize>>,
    /// Positions of records whose identity was already registered.
    pub reused: Vec<usize>,
}

impl BatchPlan {
    pub fn fresh_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }
}

/// Assign identities and partition the unregistered records into groups of
/// `samples_per_task`, preserving input order.
///
/// Records without an identity get `<salt>-<position>` written into
/// `id_field`; a numeric suffix is appended if that id is already taken by the
/// index or by another record of this batch.
pub fn plan_batch(
    records: &mut [Record],
    index: &SampleTaskIndex,
    id_field: &str,
    samples_per_task: usize,
) -> Result<BatchPlan> {
    if samples_per_task == 0 {
        return Err(AnnotationError::InvalidConfig(
            "samples_per_task must be at least 1".into(),
        ));
    }

    let salt = Uuid::now_v7().simple().to_string();

    let mut explicit = Vec::with_capacity(records.len());
    let mut taken: HashSet<SampleId> = HashSet::new();
    for record in records.iter() {
        let id = record.sample_id(id_field)?;
        if let Some(id) = &id {
            taken.insert(id.clone());
        }
        explicit.push(id);
    }

    let mut sample_ids = Vec::with_capacity(records.len());
    let mut fresh = Vec::new();
    let mut reused = Vec::new();
    let mut seen: HashSet<SampleId> = HashSet::with_capacity(records.len());

    for (position, (record, id)) in records.iter_mut().zip(explicit).enumerate() {
        let id = match id {
            Some(id) => id,
            None => {
                let generated = generate_id(&salt, position, index, &taken);
                taken.insert(generated.clone());
                record.set(id_field, generated.to_json());
                generated
            }
        };

        if index.contains_sample(&id) || !seen.insert(id.clone()) {
            reused.push(position);
        } else {
            fresh.push(position);
        }
        sample_ids.push(id);
    }

    let groups = fresh
        .chunks(samples_per_task)
        .map(<[usize]>::to_vec)
        .collect();

    Ok(BatchPlan {
        salt,
        sample_ids,
        groups,
        reused,
    })
}

fn generate_id(
    salt: &str,
    position: usize,
    index: &SampleTaskIndex,
    taken: &HashSet<SampleId>,
) -> SampleId {
    let base = format!("{salt}-{position}");
    let mut candidate = SampleId::Str(base.clone());
    let mut attempt = 1usize;
    while index.contains_sample(&candidate) || taken.contains(&candidate) {
        candidate = SampleId::Str(format!("{base}-{attempt}"));
        attempt += 1;
    }
    candidate
}

/// Summary of the tasks created for one plan.
#[derive(Debug, Clone, Default)]
pub struct CreationSummary {
    pub task_ids: Vec<TaskId>,
    pub sub_batches: usize,
}

/// Submit the plan's groups in sub-batches of at most `max_tasks_per_batch`.
///
/// Each sub-batch is validated in full before anything is registered, so a
/// failed sub-batch leaves no partial entries behind. Earlier sub-batches stay
/// registered.
pub async fn create_tasks(
    plan: &BatchPlan,
    records: &[Record],
    max_tasks_per_batch: usize,
    backend: &dyn AnnotationBackend,
    index: &mut SampleTaskIndex,
    dispatcher: &EventDispatcher,
) -> Result<CreationSummary> {
    let mut summary = CreationSummary::default();
    let chunk_size = max_tasks_per_batch.max(1);

    for (chunk_no, chunk) in plan.groups.chunks(chunk_size).enumerate() {
        let batch_id = format!("{}-{chunk_no}", plan.salt);

        let mut payloads = Vec::with_capacity(chunk.len());
        let mut sample_groups = Vec::with_capacity(chunk.len());
        for group in chunk {
            let members: Vec<Record> =
                group.iter().map(|&pos| records[pos].clone()).collect();
            payloads.push(backend.format_task(&members)?);
            sample_groups.push(
                group
                    .iter()
                    .map(|&pos| plan.sample_ids[pos].clone())
                    .collect::<Vec<_>>(),
            );
        }

        let task_ids = match backend.create_tasks_batch(payloads, &sample_groups).await {
            Ok(ids) => ids,
            Err(err) => {
                error!(
                    backend = backend.describe(),
                    batch_id = %batch_id,
                    error = %err,
                    "task creation failed"
                );
                dispatcher
                    .dispatch(AnnotationEvent::error(
                        None,
                        format!("failed to create tasks for batch {batch_id}: {err}"),
                    ))
                    .await;
                return Err(err);
            }
        };

        if task_ids.len() != sample_groups.len() {
            error!(
                batch_id = %batch_id,
                expected = sample_groups.len(),
                actual = task_ids.len(),
                "backend returned wrong number of task ids"
            );
            return Err(AnnotationError::TaskCountMismatch {
                expected: sample_groups.len(),
                actual: task_ids.len(),
            });
        }

        let mut unique = HashSet::with_capacity(task_ids.len());
        for (task_id, samples) in task_ids.iter().zip(&sample_groups) {
            if !unique.insert(task_id) {
                return Err(AnnotationError::Backend(format!(
                    "backend returned task id {task_id} twice in batch {batch_id}"
                )));
            }
            index.check_task(task_id, samples)?;
        }

        let sample_count: usize = sample_groups.iter().map(Vec::len).sum();
        for (task_id, samples) in task_ids.iter().zip(sample_groups) {
            index.record_task(task_id.clone(), samples.clone())?;
            debug!(task_id = %task_id, samples = samples.len(), "task created");
            dispatcher
                .dispatch(AnnotationEvent::TaskCreated {
                    task_id: task_id.clone(),
                    sample_ids: samples,
                })
                .await;
        }

        info!(
            batch_id = %batch_id,
            tasks = task_ids.len(),
            samples = sample_count,
            "created annotation tasks"
        );
        dispatcher
            .dispatch(AnnotationEvent::BatchCreated {
                batch_id,
                task_count: task_ids.len(),
                sample_count,
            })
            .await;

        summary.sub_batches += 1;
        summary.task_ids.extend(task_ids);
    }

    Ok(summary)
}

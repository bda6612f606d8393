//! Bidirectional sample ↔ task bookkeeping for one orchestrator instance.
//!
//! Entries are only ever added. The index is the single source of truth for
//! which records were already submitted and which task annotations were
//! already delivered, so repeated `process` calls never resubmit a sample or
//! re-announce an annotation.

use std::collections::{HashMap, HashSet};

use labelrelay_model::{SampleId, TaskId};
use serde_json::Value;

use crate::error::IndexViolation;

#[derive(Debug, Default, Clone)]
pub struct SampleTaskIndex {
    sample_to_task: HashMap<SampleId, TaskId>,
    task_to_samples: HashMap<TaskId, Vec<SampleId>>,
    task_order: Vec<TaskId>,
    processed: HashSet<TaskId>,
    delivered: HashMap<TaskId, Value>,
}

impl SampleTaskIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly created task and its ordered member samples.
    pub fn record_task(
        &mut self,
        task_id: TaskId,
        sample_ids: Vec<SampleId>,
    ) -> Result<(), IndexViolation> {
        self.check_task(&task_id, &sample_ids)?;

        for sample_id in &sample_ids {
            self.sample_to_task.insert(sample_id.clone(), task_id.clone());
        }
        self.task_order.push(task_id.clone());
        self.task_to_samples.insert(task_id, sample_ids);
        Ok(())
    }

    /// Validate a registration without applying it. Lets callers check a whole
    /// sub-batch before committing any of it.
    pub fn check_task(
        &self,
        task_id: &TaskId,
        sample_ids: &[SampleId],
    ) -> Result<(), IndexViolation> {
        if self.task_to_samples.contains_key(task_id) {
            return Err(IndexViolation::TaskAlreadyRegistered(task_id.clone()));
        }
        if sample_ids.is_empty() {
            return Err(IndexViolation::EmptyTask(task_id.clone()));
        }

        let mut seen = HashSet::with_capacity(sample_ids.len());
        for sample_id in sample_ids {
            if let Some(existing) = self.sample_to_task.get(sample_id) {
                return Err(IndexViolation::SampleAlreadyMapped {
                    sample_id: sample_id.clone(),
                    existing: existing.clone(),
                });
            }
            if !seen.insert(sample_id) {
                return Err(IndexViolation::DuplicateSampleInTask {
                    sample_id: sample_id.clone(),
                    task_id: task_id.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn task_of(&self, sample_id: &SampleId) -> Option<&TaskId> {
        self.sample_to_task.get(sample_id)
    }

    pub fn records_of(&self, task_id: &TaskId) -> Option<&[SampleId]> {
        self.task_to_samples.get(task_id).map(Vec::as_slice)
    }

    pub fn contains_sample(&self, sample_id: &SampleId) -> bool {
        self.sample_to_task.contains_key(sample_id)
    }

    pub fn contains_task(&self, task_id: &TaskId) -> bool {
        self.task_to_samples.contains_key(task_id)
    }

    /// Record that `task_id`'s annotation was delivered. Returns `false` when it
    /// was already marked.
    pub fn mark_processed(
        &mut self,
        task_id: &TaskId,
        annotation: Value,
    ) -> Result<bool, IndexViolation> {
        if !self.task_to_samples.contains_key(task_id) {
            return Err(IndexViolation::UnknownTask(task_id.clone()));
        }
        if !self.processed.insert(task_id.clone()) {
            return Ok(false);
        }
        self.delivered.insert(task_id.clone(), annotation);
        Ok(true)
    }

    pub fn is_processed(&self, task_id: &TaskId) -> bool {
        self.processed.contains(task_id)
    }

    /// Annotation cached when the task was marked processed.
    pub fn delivered_annotation(&self, task_id: &TaskId) -> Option<&Value> {
        self.delivered.get(task_id)
    }

    /// Task ids in creation order.
    pub fn task_ids(&self) -> &[TaskId] {
        &self.task_order
    }

    pub fn sample_count(&self) -> usize {
        self.sample_to_task.len()
    }

    pub fn task_count(&self) -> usize {
        self.task_order.len()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn sample_to_task(&self) -> &HashMap<SampleId, TaskId> {
        &self.sample_to_task
    }

    pub fn task_to_samples(&self) -> &HashMap<TaskId, Vec<SampleId>> {
        &self.task_to_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(raw: &[&str]) -> Vec<SampleId> {
        raw.iter().map(|s| SampleId::from(*s)).collect()
    }

    #[test]
    fn record_task_maps_both_directions() {
        let mut index = SampleTaskIndex::new();
        index
            .record_task(TaskId::Int(1), ids(&["a", "b"]))
            .expect("register");

        assert_eq!(index.task_of(&"a".into()), Some(&TaskId::Int(1)));
        assert_eq!(index.task_of(&"b".into()), Some(&TaskId::Int(1)));
        assert_eq!(
            index.records_of(&TaskId::Int(1)),
            Some(ids(&["a", "b"]).as_slice())
        );
        assert_eq!(index.task_ids(), &[TaskId::Int(1)]);
    }

    #[test]
    fn already_mapped_sample_is_rejected_without_partial_writes() {
        let mut index = SampleTaskIndex::new();
        index.record_task(TaskId::Int(1), ids(&["a"])).unwrap();

        let err = index
            .record_task(TaskId::Int(2), ids(&["b", "a"]))
            .expect_err("a is taken");
        assert_eq!(
            err,
            IndexViolation::SampleAlreadyMapped {
                sample_id: "a".into(),
                existing: TaskId::Int(1),
            }
        );
        assert!(!index.contains_sample(&"b".into()));
        assert!(!index.contains_task(&TaskId::Int(2)));
    }

    #[test]
    fn empty_duplicate_and_reused_tasks_are_rejected() {
        let mut index = SampleTaskIndex::new();
        assert_eq!(
            index.record_task(TaskId::Int(1), vec![]),
            Err(IndexViolation::EmptyTask(TaskId::Int(1)))
        );
        assert!(matches!(
            index.record_task(TaskId::Int(1), ids(&["a", "a"])),
            Err(IndexViolation::DuplicateSampleInTask { .. })
        ));
        index.record_task(TaskId::Int(1), ids(&["a"])).unwrap();
        assert_eq!(
            index.record_task(TaskId::Int(1), ids(&["z"])),
            Err(IndexViolation::TaskAlreadyRegistered(TaskId::Int(1)))
        );
    }

    #[test]
    fn mark_processed_is_idempotent_and_caches_first_annotation() {
        let mut index = SampleTaskIndex::new();
        index.record_task(TaskId::Int(7), ids(&["x"])).unwrap();

        assert!(index.mark_processed(&TaskId::Int(7), json!({"id": 1})).unwrap());
        assert!(!index.mark_processed(&TaskId::Int(7), json!({"id": 2})).unwrap());
        assert!(index.is_processed(&TaskId::Int(7)));
        assert_eq!(
            index.delivered_annotation(&TaskId::Int(7)),
            Some(&json!({"id": 1}))
        );
    }

    #[test]
    fn processed_set_stays_within_known_tasks() {
        let mut index = SampleTaskIndex::new();
        assert_eq!(
            index.mark_processed(&TaskId::Int(9), json!({})),
            Err(IndexViolation::UnknownTask(TaskId::Int(9)))
        );
        assert_eq!(index.processed_count(), 0);
    }
}

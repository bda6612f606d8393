//! Merge delivered annotations back into the input records.

use std::collections::HashMap;

use labelrelay_model::{AnnotationEvent, Record, SampleId, TaskId};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{backend::AnnotationBackend, index::SampleTaskIndex, notify::EventDispatcher};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub annotated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Return `records` in input order, with each record whose task has an entry
/// in `annotations` replaced by the backend's interpretation.
///
/// A record whose interpretation fails is kept as-is and reported through an
/// `error_occurred` event; merging never aborts.
pub async fn merge_annotations(
    records: Vec<Record>,
    sample_ids: &[SampleId],
    index: &SampleTaskIndex,
    annotations: &HashMap<TaskId, Value>,
    backend: &dyn AnnotationBackend,
    dispatcher: &EventDispatcher,
) -> (Vec<Record>, MergeReport) {
    let mut report = MergeReport::default();
    let mut merged = Vec::with_capacity(records.len());

    for (record, sample_id) in records.into_iter().zip(sample_ids) {
        let Some((task_id, annotation)) = index
            .task_of(sample_id)
            .and_then(|task_id| annotations.get(task_id).map(|a| (task_id, a)))
        else {
            report.unchanged += 1;
            merged.push(record);
            continue;
        };

        match backend.interpret(annotation, record.clone()) {
            Ok(updated) => {
                report.annotated += 1;
                merged.push(updated);
            }
            Err(err) => {
                warn!(
                    task_id = %task_id,
                    sample_id = %sample_id,
                    error = %err,
                    "failed to merge annotation"
                );
                dispatcher
                    .dispatch(AnnotationEvent::error(
                        Some(task_id.clone()),
                        format!("failed to merge annotation into sample {sample_id}: {err}"),
                    ))
                    .await;
                report.failed += 1;
                merged.push(record);
            }
        }
    }

    debug!(
        annotated = report.annotated,
        unchanged = report.unchanged,
        failed = report.failed,
        "merged annotations"
    );
    (merged, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::InMemoryBackend,
        config::NotificationEvents,
        error::{AnnotationError, Result},
        notify::LogNotifier,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn annotated_records_are_replaced_in_place() {
        let backend = InMemoryBackend::default();
        let dispatcher =
            EventDispatcher::new("merge", NotificationEvents::default(), Arc::new(LogNotifier));
        let mut index = SampleTaskIndex::new();
        index
            .record_task(TaskId::Int(1), vec!["a".into(), "b".into()])
            .unwrap();
        index.record_task(TaskId::Int(2), vec!["c".into()]).unwrap();

        let records: Vec<Record> = ["a", "b", "c"]
            .iter()
            .map(|id| Record::new().with("id", *id))
            .collect();
        let ids: Vec<SampleId> = ["a", "b", "c"].iter().map(|s| (*s).into()).collect();
        let annotations =
            HashMap::from([(TaskId::Int(1), json!({"id": 9, "result": {"label": "L"}}))]);

        let (merged, report) =
            merge_annotations(records, &ids, &index, &annotations, &backend, &dispatcher).await;

        assert_eq!(
            report,
            MergeReport {
                annotated: 2,
                unchanged: 1,
                failed: 0
            }
        );
        assert_eq!(merged[0].get("annotation_result"), Some(&json!({"label": "L"})));
        assert_eq!(merged[1].get("annotation_result"), Some(&json!({"label": "L"})));
        assert_eq!(merged[2].get("annotation_result"), None);
        assert_eq!(merged[2].get("id"), Some(&json!("c")));
    }

    struct Rejecting(InMemoryBackend);

    #[async_trait]
    impl AnnotationBackend for Rejecting {
        fn describe(&self) -> &str {
            "rejecting"
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

        fn interpret(&self, _: &Value, _: Record) -> Result<Record> {
            Err(AnnotationError::Backend("malformed annotation".into()))
        }
    }

    #[tokio::test]
    async fn interpretation_failure_keeps_the_original_record() {
        let backend = Rejecting(InMemoryBackend::default());
        let dispatcher =
            EventDispatcher::new("merge", NotificationEvents::default(), Arc::new(LogNotifier));
        let mut index = SampleTaskIndex::new();
        index.record_task(TaskId::Int(1), vec!["a".into()]).unwrap();

        let original = Record::new().with("id", "a").with("text", "keep me");
        let annotations = HashMap::from([(TaskId::Int(1), json!({"result": 1}))]);
        let (merged, report) = merge_annotations(
            vec![original.clone()],
            &[SampleId::from("a")],
            &index,
            &annotations,
            &backend,
            &dispatcher,
        )
        .await;

        assert_eq!(merged, vec![original]);
        assert_eq!(report.failed, 1);
    }
}

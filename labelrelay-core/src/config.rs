//! Orchestrator configuration types.
//!
//! These structures are shared with `labelrelay-config` (file/env loading) and
//! the CLI, so they are plain serde types with defaults for every field.

use std::time::Duration;

use labelrelay_model::EventKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AnnotationError, Result};

pub const DEFAULT_PROJECT_NAME_PREFIX: &str = "LabelRelay_Annotation";
pub const DEFAULT_ID_FIELD: &str = "id";

/// Which lifecycle events are forwarded to the notification sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationEvents {
    pub task_created: bool,
    pub batch_created: bool,
    pub annotation_completed: bool,
    pub batch_annotation_completed: bool,
    pub error_occurred: bool,
}

impl Default for NotificationEvents {
    fn default() -> Self {
        // Per-item events are noisy; batch summaries and errors surface by default.
        Self {
            task_created: false,
            batch_created: true,
            annotation_completed: false,
            batch_annotation_completed: true,
            error_occurred: true,
        }
    }
}

impl NotificationEvents {
    pub fn all_disabled() -> Self {
        Self {
            task_created: false,
            batch_created: false,
            annotation_completed: false,
            batch_annotation_completed: false,
            error_occurred: false,
        }
    }

    pub fn is_enabled(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::TaskCreated => self.task_created,
            EventKind::BatchCreated => self.batch_created,
            EventKind::AnnotationCompleted => self.annotation_completed,
            EventKind::BatchAnnotationCompleted => self.batch_annotation_completed,
            EventKind::ErrorOccurred => self.error_occurred,
        }
    }

    pub fn set(&mut self, kind: EventKind, enabled: bool) {
        let slot = match kind {
            EventKind::TaskCreated => &mut self.task_created,
            EventKind::BatchCreated => &mut self.batch_created,
            EventKind::AnnotationCompleted => &mut self.annotation_completed,
            EventKind::BatchAnnotationCompleted => {
                &mut self.batch_annotation_completed
            }
            EventKind::ErrorOccurred => &mut self.error_occurred,
        };
        *slot = enabled;
    }
}

/// Tuning for a single orchestrator instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Poll for completed annotations before returning from `process`.
    pub wait_for_annotations: bool,
    /// Maximum wall-clock seconds to wait for annotations. Fractional values
    /// are allowed.
    pub timeout: f64,
    /// Seconds to sleep between status checks.
    pub poll_interval: f64,
    /// Records grouped into one backend task.
    pub samples_per_task: usize,
    /// Upper bound on tasks submitted in a single backend call.
    pub max_tasks_per_batch: usize,
    /// Reuse an existing backend project instead of creating a new one.
    pub project_id: Option<i64>,
    /// Prefix for generated project names.
    pub project_name_prefix: String,
    /// Explicit project name; overrides the generated `<prefix>_<suffix>` form.
    pub project_name: Option<String>,
    /// Field carrying each record's identity.
    pub id_field: String,
    pub notification_events: NotificationEvents,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            wait_for_annotations: false,
            timeout: 3600.0,
            poll_interval: 60.0,
            samples_per_task: 1,
            max_tasks_per_batch: 100,
            project_id: None,
            project_name_prefix: DEFAULT_PROJECT_NAME_PREFIX.to_string(),
            project_name: None,
            id_field: DEFAULT_ID_FIELD.to_string(),
            notification_events: NotificationEvents::default(),
        }
    }
}

impl AnnotationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_task == 0 {
            return Err(AnnotationError::InvalidConfig(
                "samples_per_task must be at least 1".into(),
            ));
        }
        if self.max_tasks_per_batch == 0 {
            return Err(AnnotationError::InvalidConfig(
                "max_tasks_per_batch must be at least 1".into(),
            ));
        }
        check_seconds("timeout", self.timeout)?;
        check_seconds("poll_interval", self.poll_interval)?;
        if self.id_field.trim().is_empty() {
            return Err(AnnotationError::InvalidConfig(
                "id_field cannot be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout.max(0.0))
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval.max(0.0))
    }

    /// Resolve the project name used for backend projects and notification
    /// subjects. Generated names get a fresh suffix on every call.
    pub fn resolve_project_name(&self) -> String {
        match &self.project_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!(
                "{}_{}",
                self.project_name_prefix,
                Uuid::now_v7().simple()
            ),
        }
    }
}

fn check_seconds(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AnnotationError::InvalidConfig(format!(
            "{name} must be a finite, non-negative number of seconds (got {value})"
        )));
    }
    Ok(())
}

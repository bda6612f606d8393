use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::ModelError,
    ids::{SampleId, TaskId},
};

/// Closed set of lifecycle events raised by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    BatchCreated,
    AnnotationCompleted,
    BatchAnnotationCompleted,
    ErrorOccurred,
}

impl EventKind {
    pub const COUNT: usize = 5;

    pub const ALL: [EventKind; Self::COUNT] = [
        EventKind::TaskCreated,
        EventKind::BatchCreated,
        EventKind::AnnotationCompleted,
        EventKind::BatchAnnotationCompleted,
        EventKind::ErrorOccurred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskCreated => "task_created",
            EventKind::BatchCreated => "batch_created",
            EventKind::AnnotationCompleted => "annotation_completed",
            EventKind::BatchAnnotationCompleted => "batch_annotation_completed",
            EventKind::ErrorOccurred => "error_occurred",
        }
    }

    /// Position of this kind inside fixed-size per-kind tables.
    pub fn index(&self) -> usize {
        match self {
            EventKind::TaskCreated => 0,
            EventKind::BatchCreated => 1,
            EventKind::AnnotationCompleted => 2,
            EventKind::BatchAnnotationCompleted => 3,
            EventKind::ErrorOccurred => 4,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ModelError::UnknownEventKind(s.to_string()))
    }
}

/// Event payload emitted by the orchestrator for task lifecycle transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnnotationEvent {
    TaskCreated {
        task_id: TaskId,
        sample_ids: Vec<SampleId>,
    },
    BatchCreated {
        batch_id: String,
        task_count: usize,
        sample_count: usize,
    },
    AnnotationCompleted {
        task_id: TaskId,
        #[serde(skip_serializing_if = "Option::is_none")]
        annotation_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        task_url: Option<String>,
    },
    BatchAnnotationCompleted {
        resolved: usize,
        outstanding: usize,
    },
    ErrorOccurred {
        #[serde(skip_serializing_if = "Option::is_none")]
        task_id: Option<TaskId>,
        message: String,
    },
}

impl AnnotationEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AnnotationEvent::TaskCreated { .. } => EventKind::TaskCreated,
            AnnotationEvent::BatchCreated { .. } => EventKind::BatchCreated,
            AnnotationEvent::AnnotationCompleted { .. } => {
                EventKind::AnnotationCompleted
            }
            AnnotationEvent::BatchAnnotationCompleted { .. } => {
                EventKind::BatchAnnotationCompleted
            }
            AnnotationEvent::ErrorOccurred { .. } => EventKind::ErrorOccurred,
        }
    }

    pub fn error(task_id: Option<TaskId>, message: impl Into<String>) -> Self {
        AnnotationEvent::ErrorOccurred {
            task_id,
            message: message.into(),
        }
    }
}

/// Delivery channel requested from a notification sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
    Webhook,
    Log,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Webhook => "webhook",
            NotificationChannel::Log => "log",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(NotificationChannel::Email),
            "webhook" => Ok(NotificationChannel::Webhook),
            "log" => Ok(NotificationChannel::Log),
            other => Err(ModelError::UnknownChannel(other.to_string())),
        }
    }
}

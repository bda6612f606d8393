//! Lifecycle notifications.
//!
//! Every [`EventKind`] is bound to exactly one handler in a fixed table owned
//! by the dispatcher instance. A handler turns an event into a
//! [`Notification`]; the dispatcher forwards it to the configured
//! [`NotificationSender`] only when the event kind is enabled.

use std::{fmt, sync::Arc};

use labelrelay_model::{AnnotationEvent, EventKind, NotificationChannel, SampleId};
use tracing::{debug, warn};

use crate::config::NotificationEvents;

pub mod sender;

pub use sender::{LogNotifier, NotificationSender, WebhookNotifier};

/// Rendered notification handed to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub subject: Option<String>,
    pub channel: Option<NotificationChannel>,
}

/// Values handlers may embed in their output.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub project_name: String,
}

pub type EventHandler = fn(&HandlerContext, &AnnotationEvent) -> Option<Notification>;

pub struct EventDispatcher {
    context: HandlerContext,
    events: NotificationEvents,
    sender: Arc<dyn NotificationSender>,
    handlers: [EventHandler; EventKind::COUNT],
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("project_name", &self.context.project_name)
            .field("events", &self.events)
            .field("sender", &std::any::type_name_of_val(self.sender.as_ref()))
            .finish()
    }
}

impl EventDispatcher {
    pub fn new(
        project_name: impl Into<String>,
        events: NotificationEvents,
        sender: Arc<dyn NotificationSender>,
    ) -> Self {
        Self {
            context: HandlerContext {
                project_name: project_name.into(),
            },
            events,
            sender,
            handlers: EventKind::ALL.map(default_handler),
        }
    }

    pub fn handler_for(&self, kind: EventKind) -> EventHandler {
        self.handlers[kind.index()]
    }

    pub fn events(&self) -> &NotificationEvents {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut NotificationEvents {
        &mut self.events
    }

    pub fn project_name(&self) -> &str {
        &self.context.project_name
    }

    /// Render `event` without sending it, regardless of whether it is enabled.
    pub fn render(&self, event: &AnnotationEvent) -> Option<Notification> {
        (self.handler_for(event.kind()))(&self.context, event)
    }

    /// Forward `event` to the sender if its kind is enabled. Returns whether a
    /// notification was delivered; sender failures are logged, not returned.
    pub async fn dispatch(&self, event: AnnotationEvent) -> bool {
        let kind = event.kind();
        if !self.events.is_enabled(kind) {
            debug!(event = %kind, "notification disabled");
            return false;
        }
        let Some(notification) = self.render(&event) else {
            return false;
        };

        match self
            .sender
            .send(
                &notification.message,
                notification.subject.as_deref(),
                notification.channel,
            )
            .await
        {
            Ok(()) => true,
            Err(err) => {
                warn!(event = %kind, error = %err, "failed to send notification");
                false
            }
        }
    }
}

fn default_handler(kind: EventKind) -> EventHandler {
    match kind {
        EventKind::TaskCreated => handle_task_created,
        EventKind::BatchCreated => handle_batch_created,
        EventKind::AnnotationCompleted => handle_annotation_completed,
        EventKind::BatchAnnotationCompleted => handle_batch_annotation_completed,
        EventKind::ErrorOccurred => handle_error,
    }
}

fn join_ids(ids: &[SampleId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn handle_task_created(ctx: &HandlerContext, event: &AnnotationEvent) -> Option<Notification> {
    let AnnotationEvent::TaskCreated {
        task_id,
        sample_ids,
    } = event
    else {
        return None;
    };
    Some(Notification {
        message: format!(
            "Task {task_id} created with {} samples: {}",
            sample_ids.len(),
            join_ids(sample_ids)
        ),
        subject: Some(format!("Annotation Task Created - {}", ctx.project_name)),
        channel: None,
    })
}

fn handle_batch_created(ctx: &HandlerContext, event: &AnnotationEvent) -> Option<Notification> {
    let AnnotationEvent::BatchCreated {
        batch_id,
        task_count,
        sample_count,
    } = event
    else {
        return None;
    };
    Some(Notification {
        message: format!(
            "Batch {batch_id} created: {task_count} tasks covering {sample_count} samples"
        ),
        subject: Some(format!("Annotation Batch Created - {}", ctx.project_name)),
        channel: None,
    })
}

fn handle_annotation_completed(
    ctx: &HandlerContext,
    event: &AnnotationEvent,
) -> Option<Notification> {
    let AnnotationEvent::AnnotationCompleted {
        task_id,
        annotation_id,
        task_url,
    } = event
    else {
        return None;
    };
    let mut message = format!("Annotation completed for task {task_id}");
    if let Some(annotation_id) = annotation_id {
        message.push_str(&format!(" (annotation {annotation_id})"));
    }
    if let Some(url) = task_url {
        message.push_str(&format!("\nReview: {url}"));
    }
    Some(Notification {
        message,
        subject: Some(format!("Annotation Completed - {}", ctx.project_name)),
        channel: None,
    })
}

fn handle_batch_annotation_completed(
    ctx: &HandlerContext,
    event: &AnnotationEvent,
) -> Option<Notification> {
    let AnnotationEvent::BatchAnnotationCompleted {
        resolved,
        outstanding,
    } = event
    else {
        return None;
    };
    Some(Notification {
        message: format!(
            "Batch annotation finished: {resolved} tasks annotated, {outstanding} still outstanding"
        ),
        subject: Some(format!("Batch Annotation Completed - {}", ctx.project_name)),
        channel: None,
    })
}

/// Errors always go out by email, whatever the sender's default channel is.
fn handle_error(ctx: &HandlerContext, event: &AnnotationEvent) -> Option<Notification> {
    let AnnotationEvent::ErrorOccurred { task_id, message } = event else {
        return None;
    };
    let message = match task_id {
        Some(task_id) => format!("Error in annotation task {task_id}: {message}"),
        None => format!("Error in annotation batch: {message}"),
    };
    Some(Notification {
        message,
        subject: Some(format!("Annotation Error - {}", ctx.project_name)),
        channel: Some(NotificationChannel::Email),
    })
}

use std::{fmt, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use labelrelay_model::NotificationChannel;
use serde_json::json;
use tracing::info;
use url::Url;

use crate::error::{AnnotationError, Result};

/// Transport for lifecycle notifications. Delivery is best-effort: the
/// dispatcher logs failures and never propagates them.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// `channel` is `None` when the caller has no preference and the sender
    /// should use its own default.
    async fn send(
        &self,
        message: &str,
        subject: Option<&str>,
        channel: Option<NotificationChannel>,
    ) -> Result<()>;
}

/// Writes notifications to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSender for LogNotifier {
    async fn send(
        &self,
        message: &str,
        subject: Option<&str>,
        channel: Option<NotificationChannel>,
    ) -> Result<()> {
        info!(
            channel = %channel.unwrap_or(NotificationChannel::Log),
            subject = subject.unwrap_or(""),
            "{message}"
        );
        Ok(())
    }
}

/// Posts notifications as JSON to a relay endpoint, which is expected to
/// route on the `channel` field.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: Url,
    default_channel: NotificationChannel,
}

impl fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookNotifier")
            .field("host", &self.url.host_str())
            .field("default_channel", &self.default_channel)
            .finish()
    }
}

impl WebhookNotifier {
    pub fn new(url: &str, default_channel: NotificationChannel) -> Result<Self> {
        let url = Url::parse(url).map_err(|err| {
            AnnotationError::InvalidConfig(format!("invalid webhook URL '{url}': {err}"))
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            url,
            default_channel,
        })
    }
}

#[async_trait]
impl NotificationSender for WebhookNotifier {
    async fn send(
        &self,
        message: &str,
        subject: Option<&str>,
        channel: Option<NotificationChannel>,
    ) -> Result<()> {
        let body = json!({
            "channel": channel.unwrap_or(self.default_channel),
            "subject": subject,
            "message": message,
            "sent_at": Utc::now(),
        });
        self.http
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| AnnotationError::Notification(err.to_string()))?;
        Ok(())
    }
}

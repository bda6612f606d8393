use std::path::PathBuf;

use labelrelay_core::{AnnotationConfig, BackendSettings};
use labelrelay_model::NotificationChannel;
use serde::{Deserialize, Serialize};

/// Source that produced the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    /// Path passed explicitly by the caller.
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

impl ConfigSource {
    pub fn describe(&self) -> String {
        match self {
            ConfigSource::Default => "built-in defaults".to_string(),
            ConfigSource::Explicit(path) => format!("{} (explicit)", path.display()),
            ConfigSource::EnvPath(path) => {
                format!("{} ($LABELRELAY_CONFIG_PATH)", path.display())
            }
            ConfigSource::EnvInline => "$LABELRELAY_CONFIG_JSON".to_string(),
            ConfigSource::File(path) => path.display().to_string(),
        }
    }
}

/// Where notifications go. Without a webhook they are written to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    /// Channel used when an event does not ask for a specific one.
    pub default_channel: NotificationChannel,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            default_channel: NotificationChannel::Log,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub annotation: AnnotationConfig,
    pub backend: BackendSettings,
    pub notifications: NotificationSettings,
}

impl RelayConfig {
    /// Copy with secrets blanked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let BackendSettings::LabelStudio(settings) = &mut copy.backend
            && !settings.api_key.is_empty()
        {
            settings.api_key = "<redacted>".to_string();
        }
        copy
    }
}

//! Subcommand implementations for `labelrelayctl`.

pub mod jsonl;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use labelrelay_config::{ConfigLoad, ConfigLoader, RelayConfig};
use labelrelay_core::{
    AnnotationOrchestrator, BackendSettings, LabelStudioSettings, LogNotifier,
    MemorySettings, NotificationSender, WebhookNotifier,
};
use tracing::info;

/// Where to load configuration from.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

impl ConfigOptions {
    pub fn load(&self) -> Result<ConfigLoad> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = &self.config_path {
            loader = loader.with_config_path(path);
        }
        if let Some(path) = &self.env_file {
            loader = loader.with_env_file(path);
        }
        loader.load().context("failed to load configuration")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Memory,
    LabelStudio,
}

/// Command-line overrides applied on top of the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub wait: Option<bool>,
    pub timeout: Option<Duration>,
    pub poll_interval: Option<Duration>,
    pub samples_per_task: Option<usize>,
    pub max_tasks_per_batch: Option<usize>,
    pub project_id: Option<i64>,
    pub project_name: Option<String>,
    pub backend: Option<BackendChoice>,
}

impl RunOverrides {
    pub fn apply(&self, config: &mut RelayConfig) {
        let annotation = &mut config.annotation;
        if let Some(wait) = self.wait {
            annotation.wait_for_annotations = wait;
        }
        if let Some(timeout) = self.timeout {
            annotation.timeout = timeout.as_secs_f64();
        }
        if let Some(interval) = self.poll_interval {
            annotation.poll_interval = interval.as_secs_f64();
        }
        if let Some(k) = self.samples_per_task {
            annotation.samples_per_task = k;
        }
        if let Some(max) = self.max_tasks_per_batch {
            annotation.max_tasks_per_batch = max;
        }
        if let Some(id) = self.project_id {
            annotation.project_id = Some(id);
        }
        if let Some(name) = &self.project_name {
            annotation.project_name = Some(name.clone());
        }
        match (self.backend, &config.backend) {
            (Some(BackendChoice::Memory), BackendSettings::LabelStudio(_)) => {
                config.backend = BackendSettings::Memory(MemorySettings::default());
            }
            (Some(BackendChoice::LabelStudio), BackendSettings::Memory(_)) => {
                config.backend = BackendSettings::LabelStudio(LabelStudioSettings::default());
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: ConfigOptions,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub overrides: RunOverrides,
}

pub fn build_sender(config: &RelayConfig) -> Result<Arc<dyn NotificationSender>> {
    match &config.notifications.webhook_url {
        Some(url) => {
            let sender = WebhookNotifier::new(url, config.notifications.default_channel)
                .context("invalid notification webhook")?;
            Ok(Arc::new(sender))
        }
        None => Ok(Arc::new(LogNotifier)),
    }
}

async fn connect(config: &RelayConfig) -> Result<AnnotationOrchestrator> {
    let sender = build_sender(config)?;
    AnnotationOrchestrator::connect(config.annotation.clone(), &config.backend, sender)
        .await
        .with_context(|| format!("failed to connect {} backend", config.backend.kind()))
}

pub async fn run_annotation(opts: &RunOptions) -> Result<()> {
    let ConfigLoad { mut config, source, .. } = opts.config.load()?;
    opts.overrides.apply(&mut config);
    config
        .annotation
        .validate()
        .context("invalid command-line overrides")?;
    info!(source = %source.describe(), "using configuration");

    let records = jsonl::read_records(&opts.input)?;
    let mut orchestrator = connect(&config).await?;

    let output = orchestrator.process(records).await?;
    jsonl::write_records(opts.output.as_deref(), &output)?;

    let index = orchestrator.index();
    info!(
        project = %orchestrator.project_name(),
        records = output.len(),
        tasks = index.task_count(),
        annotated_tasks = index.processed_count(),
        "run finished"
    );
    Ok(())
}

/// Render the resolved configuration as TOML, secrets redacted.
pub fn render_config(opts: &ConfigOptions) -> Result<String> {
    let ConfigLoad { config, source, .. } = opts.load()?;
    let body = toml::to_string_pretty(&config.redacted())
        .context("failed to serialize configuration")?;
    Ok(format!("# source: {}\n{body}", source.describe()))
}

/// Validate configuration and connect to the backend once.
pub async fn check(opts: &ConfigOptions) -> Result<String> {
    let ConfigLoad { config, source, .. } = opts.load()?;
    let orchestrator = connect(&config).await?;
    Ok(format!(
        "configuration ok ({})\nbackend: {}\nproject: {}",
        source.describe(),
        orchestrator.backend().describe(),
        orchestrator.project_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_replace_only_what_was_given() {
        let mut config = RelayConfig::default();
        RunOverrides {
            wait: Some(true),
            timeout: Some(Duration::from_millis(1500)),
            samples_per_task: Some(3),
            ..RunOverrides::default()
        }
        .apply(&mut config);

        assert!(config.annotation.wait_for_annotations);
        assert_eq!(config.annotation.timeout, 1.5);
        assert_eq!(config.annotation.samples_per_task, 3);
        assert_eq!(config.annotation.poll_interval, 60.0);
        assert_eq!(config.backend.kind(), "memory");
    }

    #[test]
    fn backend_override_keeps_existing_settings_of_the_same_kind() {
        let mut config = RelayConfig {
            backend: BackendSettings::LabelStudio(LabelStudioSettings {
                api_key: "k".into(),
                ..LabelStudioSettings::default()
            }),
            ..RelayConfig::default()
        };
        RunOverrides {
            backend: Some(BackendChoice::LabelStudio),
            ..RunOverrides::default()
        }
        .apply(&mut config);
        let BackendSettings::LabelStudio(settings) = &config.backend else {
            panic!("expected label studio backend");
        };
        assert_eq!(settings.api_key, "k");
    }
}

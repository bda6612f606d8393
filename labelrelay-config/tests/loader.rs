use std::{collections::HashMap, fs};

use labelrelay_config::{ConfigLoadError, ConfigLoader, ConfigSource, EnvConfig, RelayConfig};
use labelrelay_core::BackendSettings;
use labelrelay_model::NotificationChannel;
use tempfile::TempDir;

fn env(vars: &[(&str, &str)]) -> EnvConfig {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    EnvConfig::from_map(&map)
}

#[test]
fn defaults_when_nothing_is_configured() {
    let dir = TempDir::new().expect("tempdir");
    let load = ConfigLoader::new()
        .with_env(EnvConfig::default())
        .with_search_dir(dir.path())
        .load()
        .expect("load");

    assert_eq!(load.source, ConfigSource::Default);
    assert_eq!(load.config, RelayConfig::default());
    assert!(!load.env_file_loaded);
}

#[test]
fn default_file_in_search_dir_is_used() {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("config")).expect("mkdir");
    let path = dir.path().join("config/labelrelay.toml");
    fs::write(
        &path,
        r#"
[annotation]
samples_per_task = 4
project_name_prefix = "Curation"

[annotation.notification_events]
task_created = true

[backend]
kind = "label_studio"
api_url = "http://labels.local/api"
api_key = "from-file"

[notifications]
default_channel = "webhook"
"#,
    )
    .expect("write");

    let load = ConfigLoader::new()
        .with_env(EnvConfig::default())
        .with_search_dir(dir.path())
        .load()
        .expect("load");

    assert_eq!(load.source, ConfigSource::File(path));
    assert_eq!(load.config.annotation.samples_per_task, 4);
    assert_eq!(load.config.annotation.project_name_prefix, "Curation");
    let events = load.config.annotation.notification_events;
    assert!(events.task_created);
    assert!(events.batch_created, "unspecified events keep their defaults");
    assert_eq!(load.config.notifications.default_channel, NotificationChannel::Webhook);
    let BackendSettings::LabelStudio(settings) = &load.config.backend else {
        panic!("expected label studio backend");
    };
    assert_eq!(settings.api_key, "from-file");
    assert_eq!(settings.result_field, "label_studio_result");
}

#[test]
fn env_path_wins_over_inline_json() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("relay.json");
    fs::write(&path, r#"{"annotation": {"poll_interval": 2.5}}"#).expect("write");

    let load = ConfigLoader::new()
        .with_env(env(&[
            ("LABELRELAY_CONFIG_PATH", path.to_str().expect("utf8 path")),
            ("LABELRELAY_CONFIG_JSON", r#"{"annotation": {"poll_interval": 9}}"#),
        ]))
        .load()
        .expect("load");

    assert_eq!(load.source, ConfigSource::EnvPath(path));
    assert_eq!(load.config.annotation.poll_interval, 2.5);
}

#[test]
fn inline_json_and_overrides() {
    let load = ConfigLoader::new()
        .with_env(env(&[
            (
                "LABELRELAY_CONFIG_JSON",
                r#"{"annotation": {"max_tasks_per_batch": 10}}"#,
            ),
            ("LABELRELAY_WAIT_FOR_ANNOTATIONS", "yes"),
            ("LABELRELAY_NOTIFY_WEBHOOK_URL", "https://hooks.example.com/relay"),
        ]))
        .load()
        .expect("load");

    assert_eq!(load.source, ConfigSource::EnvInline);
    assert_eq!(load.config.annotation.max_tasks_per_batch, 10);
    assert!(load.config.annotation.wait_for_annotations);
    assert_eq!(
        load.config.notifications.webhook_url.as_deref(),
        Some("https://hooks.example.com/relay")
    );
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = TempDir::new().expect("tempdir");
    let err = ConfigLoader::new()
        .with_env(EnvConfig::default())
        .with_config_path(dir.path().join("absent.toml"))
        .load()
        .expect_err("missing");
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn invalid_values_are_rejected_after_loading() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("bad.toml");
    fs::write(&path, "[annotation]\nsamples_per_task = 0\n").expect("write");

    let err = ConfigLoader::new()
        .with_env(EnvConfig::default())
        .with_config_path(&path)
        .load()
        .expect_err("invalid");
    assert!(matches!(err, ConfigLoadError::Invalid(_)));
}

#[test]
fn redacted_config_hides_the_api_key() {
    let load = ConfigLoader::new()
        .with_env(env(&[
            ("LABELRELAY_BACKEND", "label_studio"),
            ("LABEL_STUDIO_API_KEY", "secret-key"),
        ]))
        .with_search_dir(TempDir::new().expect("tempdir").path())
        .load()
        .expect("load");

    let rendered = toml::to_string(&load.config.redacted()).expect("serialize");
    assert!(!rendered.contains("secret-key"));
    assert!(rendered.contains("kind = \"label_studio\""));
}

pub mod error;

use std::{
    fs,
    path::{Path, PathBuf},
};

use labelrelay_core::{
    AnnotationError, BackendSettings, LabelStudioSettings, MemorySettings,
};
use tracing::{debug, info};

use crate::{
    models::{ConfigSource, RelayConfig},
    sources::{BACKEND_VAR, CONFIG_JSON_VAR, EnvConfig, WAIT_VAR},
    util::parse_bool,
};

use error::ConfigLoadError;

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &[
    "labelrelay.toml",
    "labelrelay.json",
    "config/labelrelay.toml",
    "config/labelrelay.json",
];

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: RelayConfig,
    pub source: ConfigSource,
    pub env_file_loaded: bool,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    env_file: Option<PathBuf>,
    env: Option<EnvConfig>,
    search_dir: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load this file instead of consulting the environment for a path.
    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Use these values instead of the process environment. No `.env` file is
    /// read in this mode.
    pub fn with_env(mut self, env: EnvConfig) -> Self {
        self.env = Some(env);
        self
    }

    /// Directory searched for default config files (defaults to the working
    /// directory).
    pub fn with_search_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.search_dir = Some(dir.into());
        self
    }

    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let (env, env_file_loaded) = match &self.env {
            Some(env) => (env.clone(), false),
            None => {
                let loaded = self.load_env_file()?;
                (EnvConfig::gather(), loaded)
            }
        };

        let (mut config, source) = self.load_base(&env)?;
        apply_env_overrides(&mut config, &env)?;
        validate(&config)?;

        info!(source = %source.describe(), backend = config.backend.kind(), "configuration loaded");
        Ok(ConfigLoad {
            config,
            source,
            env_file_loaded,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let result = match &self.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        result.or_else(|err| match err {
            dotenvy::Error::Io(_) => Ok(false),
            _ => Err(err.into()),
        })
    }

    fn load_base(&self, env: &EnvConfig) -> Result<(RelayConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.config_path {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path: path.clone() });
            }
            let config = load_from_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.clone())));
        }

        if let Some(path) = &env.config_path {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path: path.clone() });
            }
            let config = load_from_file(path)?;
            return Ok((config, ConfigSource::EnvPath(path.clone())));
        }

        if let Some(raw) = &env.config_json {
            let config = serde_json::from_str(raw).map_err(|source| ConfigLoadError::Json {
                origin: format!("${CONFIG_JSON_VAR}"),
                source,
            })?;
            return Ok((config, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = load_from_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((RelayConfig::default(), ConfigSource::Default))
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let base = self.search_dir.as_deref().unwrap_or(Path::new(""));
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(|candidate| base.join(candidate))
            .find(|path| path.exists())
    }
}

pub fn load_from_file(path: &Path) -> Result<RelayConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "read configuration file");

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents).map_err(|source| ConfigLoadError::Json {
            origin: path.display().to_string(),
            source,
        }),
        Some("toml") | Some("tml") => {
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Toml {
                path: path.to_path_buf(),
                source,
            })
        }
        _ => parse_from_str(&contents, &path.display().to_string()),
    }
}

/// Parse TOML, falling back to JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> Result<RelayConfig, ConfigLoadError> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| ConfigLoadError::Unparseable {
            origin: origin.to_string(),
            toml_error: toml_err.to_string(),
            json_error: json_err.to_string(),
        })
    })
}

fn apply_env_overrides(config: &mut RelayConfig, env: &EnvConfig) -> Result<(), ConfigLoadError> {
    if let Some(kind) = &env.backend {
        match kind.to_ascii_lowercase().replace('-', "_").as_str() {
            "memory" => {
                if !matches!(config.backend, BackendSettings::Memory(_)) {
                    config.backend = BackendSettings::Memory(MemorySettings::default());
                }
            }
            "label_studio" => {
                if !matches!(config.backend, BackendSettings::LabelStudio(_)) {
                    config.backend = BackendSettings::LabelStudio(LabelStudioSettings::default());
                }
            }
            _ => {
                return Err(ConfigLoadError::InvalidOverride {
                    var: BACKEND_VAR,
                    value: kind.clone(),
                });
            }
        }
    }

    if let BackendSettings::LabelStudio(settings) = &mut config.backend {
        if let Some(url) = &env.label_studio_url {
            settings.api_url = url.clone();
        }
        if let Some(key) = &env.label_studio_api_key {
            settings.api_key = key.clone();
        }
    }

    if let Some(raw) = &env.wait_for_annotations {
        config.annotation.wait_for_annotations =
            parse_bool(raw).ok_or_else(|| ConfigLoadError::InvalidOverride {
                var: WAIT_VAR,
                value: raw.clone(),
            })?;
    }

    if let Some(url) = &env.webhook_url {
        config.notifications.webhook_url = Some(url.clone());
    }
    Ok(())
}

fn validate(config: &RelayConfig) -> Result<(), ConfigLoadError> {
    config.annotation.validate()?;
    if let BackendSettings::LabelStudio(settings) = &config.backend
        && settings.api_url.trim().is_empty()
    {
        return Err(AnnotationError::InvalidConfig(
            "label_studio backend requires api_url".into(),
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_then_json_fallback() {
        let from_toml = parse_from_str("[annotation]\nsamples_per_task = 3\n", "inline")
            .expect("toml");
        assert_eq!(from_toml.annotation.samples_per_task, 3);

        let from_json = parse_from_str(r#"{"annotation": {"timeout": 5.5}}"#, "inline")
            .expect("json");
        assert_eq!(from_json.annotation.timeout, 5.5);

        assert!(matches!(
            parse_from_str("not = [valid", "inline"),
            Err(ConfigLoadError::Unparseable { .. })
        ));
    }

    #[test]
    fn backend_override_switches_kind_and_applies_credentials() {
        let mut config = RelayConfig::default();
        let env = EnvConfig {
            backend: Some("label-studio".into()),
            label_studio_url: Some("http://ls.internal:8080".into()),
            label_studio_api_key: Some("abc".into()),
            ..EnvConfig::default()
        };
        apply_env_overrides(&mut config, &env).expect("overrides");
        let BackendSettings::LabelStudio(settings) = &config.backend else {
            panic!("expected label studio backend");
        };
        assert_eq!(settings.api_url, "http://ls.internal:8080");
        assert_eq!(settings.api_key, "abc");
    }

    #[test]
    fn label_studio_vars_do_not_change_a_memory_backend() {
        let mut config = RelayConfig::default();
        let env = EnvConfig {
            label_studio_url: Some("http://ignored".into()),
            ..EnvConfig::default()
        };
        apply_env_overrides(&mut config, &env).expect("overrides");
        assert_eq!(config.backend, BackendSettings::default());
    }

    #[test]
    fn invalid_overrides_are_reported() {
        let mut config = RelayConfig::default();
        let env = EnvConfig {
            wait_for_annotations: Some("sometimes".into()),
            ..EnvConfig::default()
        };
        assert!(matches!(
            apply_env_overrides(&mut config, &env),
            Err(ConfigLoadError::InvalidOverride { var: WAIT_VAR, .. })
        ));

        let env = EnvConfig {
            backend: Some("prodigy".into()),
            ..EnvConfig::default()
        };
        assert!(matches!(
            apply_env_overrides(&mut config, &env),
            Err(ConfigLoadError::InvalidOverride { var: BACKEND_VAR, .. })
        ));
    }
}

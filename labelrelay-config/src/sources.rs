use std::{collections::HashMap, path::PathBuf};

use crate::util::non_empty_var;

pub const CONFIG_PATH_VAR: &str = "LABELRELAY_CONFIG_PATH";
pub const CONFIG_JSON_VAR: &str = "LABELRELAY_CONFIG_JSON";
pub const BACKEND_VAR: &str = "LABELRELAY_BACKEND";
pub const LABEL_STUDIO_URL_VAR: &str = "LABEL_STUDIO_URL";
pub const LABEL_STUDIO_API_KEY_VAR: &str = "LABEL_STUDIO_API_KEY";
pub const WAIT_VAR: &str = "LABELRELAY_WAIT_FOR_ANNOTATIONS";
pub const WEBHOOK_VAR: &str = "LABELRELAY_NOTIFY_WEBHOOK_URL";

/// Raw values read from the environment. Empty variables count as unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
    pub backend: Option<String>,
    pub label_studio_url: Option<String>,
    pub label_studio_api_key: Option<String>,
    /// Kept raw so an unparseable value can be reported.
    pub wait_for_annotations: Option<String>,
    pub webhook_url: Option<String>,
}

impl std::fmt::Debug for EnvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvConfig")
            .field("config_path", &self.config_path)
            .field("config_json", &self.config_json.as_ref().map(|_| "<inline>"))
            .field("backend", &self.backend)
            .field("label_studio_url", &self.label_studio_url)
            .field(
                "label_studio_api_key",
                &self.label_studio_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("wait_for_annotations", &self.wait_for_annotations)
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var(CONFIG_PATH_VAR).map(PathBuf::from),
            config_json: non_empty_var(CONFIG_JSON_VAR),
            backend: non_empty_var(BACKEND_VAR),
            label_studio_url: non_empty_var(LABEL_STUDIO_URL_VAR),
            label_studio_api_key: non_empty_var(LABEL_STUDIO_API_KEY_VAR),
            wait_for_annotations: non_empty_var(WAIT_VAR),
            webhook_url: non_empty_var(WEBHOOK_VAR),
        }
    }

    /// Build from an explicit variable map instead of the process environment.
    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        let get = |name: &str| {
            vars.get(name)
                .map(|raw| raw.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            config_path: get(CONFIG_PATH_VAR).map(PathBuf::from),
            config_json: get(CONFIG_JSON_VAR),
            backend: get(BACKEND_VAR),
            label_studio_url: get(LABEL_STUDIO_URL_VAR),
            label_studio_api_key: get(LABEL_STUDIO_API_KEY_VAR),
            wait_for_annotations: get(WAIT_VAR),
            webhook_url: get(WEBHOOK_VAR),
        }
    }
}

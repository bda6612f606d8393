//! Label Studio REST adapter.

use std::{
    collections::{HashMap, HashSet},
    fmt,
    time::Duration,
};

use async_trait::async_trait;
use labelrelay_model::{Record, SampleId, TaskId};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AnnotationError, Result};

use super::{AnnotationBackend, StatusUpdate};

pub const DEFAULT_LABEL_CONFIG: &str = r#"<View>
  <Text name="text" value="$text"/>
  <Choices name="label" toName="text" choice="single">
    <Choice value="Positive"/>
    <Choice value="Negative"/>
  </Choices>
</View>"#;

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelStudioSettings {
    /// Server URL, with or without a trailing `/api`.
    pub api_url: String,
    pub api_key: String,
    /// Labeling interface used when a new project is created.
    pub label_config: String,
    /// Record field that receives the annotation `result`.
    pub result_field: String,
    /// Page size when listing project tasks during status checks. Pages are
    /// walked until every requested task has been seen.
    pub page_size: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LabelStudioSettings {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            label_config: DEFAULT_LABEL_CONFIG.to_string(),
            result_field: "label_studio_result".to_string(),
            page_size: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for LabelStudioSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelStudioSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &"<redacted>")
            .field("result_field", &self.result_field)
            .field("page_size", &self.page_size)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

pub struct LabelStudioBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    project_id: i64,
    project_title: String,
    result_field: String,
    page_size: usize,
}

impl fmt::Debug for LabelStudioBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelStudioBackend")
            .field("base_url", &self.base_url)
            .field("project_id", &self.project_id)
            .field("project_title", &self.project_title)
            .field("result_field", &self.result_field)
            .finish()
    }
}

/// Strip trailing slashes and an optional `/api` suffix so UI and API paths
/// can both be derived from the same base.
fn normalize_base_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw.trim()).map_err(|err| {
        AnnotationError::ProjectInit(format!("invalid Label Studio URL '{raw}': {err}"))
    })?;
    let mut base = parsed.as_str().trim_end_matches('/').to_string();
    if let Some(stripped) = base.strip_suffix("/api") {
        base = stripped.to_string();
    }
    Ok(base)
}

impl LabelStudioBackend {
    /// Resolve `project_id` when given, otherwise create a project titled
    /// `project_name`. Any failure aborts construction.
    pub async fn connect(
        settings: LabelStudioSettings,
        project_id: Option<i64>,
        project_name: &str,
    ) -> Result<Self> {
        let base_url = normalize_base_url(&settings.api_url)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs.max(1)))
            .build()
            .map_err(|err| {
                AnnotationError::ProjectInit(format!("failed to build HTTP client: {err}"))
            })?;

        let mut backend = Self {
            http,
            base_url,
            api_key: settings.api_key,
            project_id: project_id.unwrap_or_default(),
            project_title: project_name.to_string(),
            result_field: settings.result_field,
            page_size: settings.page_size.max(1),
        };

        let project = match project_id {
            Some(id) => backend
                .send_json(backend.request(Method::GET, &format!("projects/{id}")))
                .await
                .map_err(|err| {
                    AnnotationError::ProjectInit(format!("failed to fetch project {id}: {err}"))
                })?,
            None => backend
                .send_json(backend.request(Method::POST, "projects").json(&json!({
                    "title": project_name,
                    "label_config": settings.label_config,
                })))
                .await
                .map_err(|err| {
                    AnnotationError::ProjectInit(format!(
                        "failed to create project '{project_name}': {err}"
                    ))
                })?,
        };

        backend.project_id = project
            .get("id")
            .and_then(Value::as_i64)
            .or(project_id)
            .ok_or_else(|| {
                AnnotationError::ProjectInit("project response carried no id".into())
            })?;
        if let Some(title) = project.get("title").and_then(Value::as_str) {
            backend.project_title = title.to_string();
        }

        info!(
            project_id = backend.project_id,
            project = %backend.project_title,
            base_url = %backend.base_url,
            "connected to Label Studio project"
        );
        Ok(backend)
    }

    pub fn project_id(&self) -> i64 {
        self.project_id
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}/api/{}", self.base_url, path))
            .header("Authorization", format!("Token {}", self.api_key))
    }

    async fn send_json(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.send().await?.error_for_status()?;
        Ok(response.json::<Value>().await?)
    }

    async fn fetch_task(&self, task_id: &TaskId) -> Result<Value> {
        self.send_json(self.request(Method::GET, &format!("tasks/{task_id}")))
            .await
    }

    /// One page of the project's task listing, `None` once past the last page.
    async fn list_tasks_page(&self, page: usize) -> Result<Option<Vec<Value>>> {
        let request = self
            .request(Method::GET, &format!("projects/{}/tasks", self.project_id))
            .query(&[("page", page), ("page_size", self.page_size)]);
        let body = match self.send_json(request).await {
            Ok(body) => body,
            // Label Studio answers 404 for pages beyond the end.
            Err(AnnotationError::Http(err))
                if page > 1 && err.status() == Some(StatusCode::NOT_FOUND) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        match body {
            Value::Array(tasks) => Ok(Some(tasks)),
            Value::Object(mut map) => match map.remove("tasks") {
                Some(Value::Array(tasks)) => Ok(Some(tasks)),
                _ => Err(AnnotationError::Backend(
                    "task listing response carried no task array".into(),
                )),
            },
            _ => Err(AnnotationError::Backend(
                "unexpected task listing response".into(),
            )),
        }
    }

    /// Walk the listing until every wanted task was seen or the pages run out.
    async fn find_listed_tasks(&self, wanted: &[TaskId]) -> Result<HashMap<TaskId, Value>> {
        let mut missing: HashSet<&TaskId> = wanted.iter().collect();
        let mut seen: HashSet<TaskId> = HashSet::new();
        let mut found = HashMap::new();
        let mut page = 1;

        while !missing.is_empty() {
            let Some(tasks) = self.list_tasks_page(page).await? else {
                break;
            };
            let page_len = tasks.len();
            let mut new_ids = 0usize;
            for task in tasks {
                let Some(id) = task.get("id").and_then(TaskId::from_json) else {
                    continue;
                };
                if !seen.insert(id.clone()) {
                    continue;
                }
                new_ids += 1;
                if missing.remove(&id) {
                    found.insert(id, task);
                }
            }
            // A short page ends the listing; a page of repeats means the
            // server ignores paging.
            if page_len < self.page_size || new_ids == 0 {
                break;
            }
            page += 1;
        }
        debug!(
            project_id = self.project_id,
            pages = page,
            found = found.len(),
            unlisted = missing.len(),
            "listed project tasks"
        );
        Ok(found)
    }
}

/// First annotation of a task, if it has any.
fn first_annotation(task: &Value) -> Option<Value> {
    task.get("annotations")?.as_array()?.first().cloned()
}

#[async_trait]
impl AnnotationBackend for LabelStudioBackend {
    fn describe(&self) -> &str {
        "label_studio"
    }

    fn project_name(&self) -> Option<&str> {
        Some(&self.project_title)
    }

    fn format_task(&self, records: &[Record]) -> Result<Value> {
        match records {
            [] => Err(AnnotationError::Internal(
                "cannot format a task without records".into(),
            )),
            [single] => Ok(json!({ "data": single })),
            many => Ok(json!({ "data": { "items": many } })),
        }
    }

    async fn create_tasks_batch(
        &self,
        payloads: Vec<Value>,
        sample_ids: &[Vec<SampleId>],
    ) -> Result<Vec<TaskId>> {
        debug!(
            project_id = self.project_id,
            tasks = payloads.len(),
            samples = sample_ids.iter().map(Vec::len).sum::<usize>(),
            "importing tasks"
        );
        let body = self
            .send_json(
                self.request(Method::POST, &format!("projects/{}/import", self.project_id))
                    .query(&[("return_task_ids", "true")])
                    .json(&payloads),
            )
            .await?;

        let ids = body
            .get("task_ids")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                AnnotationError::Backend("import response carried no task_ids".into())
            })?;
        ids.iter()
            .map(|raw| {
                TaskId::from_json(raw).ok_or_else(|| {
                    AnnotationError::Backend(format!("invalid task id in import response: {raw}"))
                })
            })
            .collect()
    }

    async fn get_task_annotation(&self, task_id: &TaskId) -> Result<Option<Value>> {
        let task = self.fetch_task(task_id).await?;
        Ok(first_annotation(&task))
    }

    async fn check_annotation_status(&self, task_ids: &[TaskId]) -> Result<StatusUpdate> {
        let listed = self.find_listed_tasks(task_ids).await?;

        let mut completed = HashMap::new();
        let mut failed = HashMap::new();
        for task_id in task_ids {
            let annotation = match listed.get(task_id) {
                Some(task) if task.get("annotations").is_some() => Ok(first_annotation(task)),
                // Listings may omit annotations, and unlisted tasks are
                // fetched directly.
                _ => self.get_task_annotation(task_id).await,
            };
            match annotation {
                Ok(Some(annotation)) => {
                    completed.insert(task_id.clone(), annotation);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(task_id = %task_id, error = %err, "failed to fetch full task");
                    failed.insert(task_id.clone(), err.to_string());
                }
            }
        }
        Ok(StatusUpdate::with_failures(completed, failed))
    }

    fn interpret(&self, annotation: &Value, mut record: Record) -> Result<Record> {
        let result = annotation
            .get("result")
            .cloned()
            .unwrap_or_else(|| json!([]));
        record.set(self.result_field.clone(), result);
        Ok(record)
    }

    fn task_url(&self, task_id: &TaskId) -> Option<String> {
        Some(format!(
            "{}/projects/{}/data?task={}",
            self.base_url, self.project_id, task_id
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_drops_api_suffix_and_slashes() {
        assert_eq!(
            normalize_base_url("http://example.com/api").unwrap(),
            "http://example.com"
        );
        assert_eq!(
            normalize_base_url("http://example.com/api/").unwrap(),
            "http://example.com"
        );
        assert_eq!(
            normalize_base_url("http://example.com").unwrap(),
            "http://example.com"
        );
        assert_eq!(
            normalize_base_url("http://example.com/ls/api").unwrap(),
            "http://example.com/ls"
        );
        assert!(matches!(
            normalize_base_url("not a url"),
            Err(AnnotationError::ProjectInit(_))
        ));
    }

    #[test]
    fn first_annotation_ignores_empty_lists() {
        assert_eq!(first_annotation(&json!({"id": 1, "annotations": []})), None);
        assert_eq!(first_annotation(&json!({"id": 1})), None);
        assert_eq!(
            first_annotation(&json!({"id": 1, "annotations": [{"id": 5}, {"id": 6}]})),
            Some(json!({"id": 5}))
        );
    }

    #[test]
    fn settings_debug_redacts_the_key() {
        let settings = LabelStudioSettings {
            api_key: "super-secret".into(),
            ..LabelStudioSettings::default()
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}

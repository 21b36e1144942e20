//! The `/api/transform` request/response envelope
//!
//! `handle` never fails: errors become a `success: false` response.
//! `transform_project` runs a stored project through it and keeps the
//! project's status in step.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_url;
use crate::project::ProjectStatus;
use crate::store::ProjectStore;
use crate::transform::{self, EditModel, TransformResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformRequest {
    pub prompt: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformDetails {
    pub prompt: String,
    pub number_of_images: usize,
    pub timestamp: DateTime<Utc>,
    pub images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<TransformDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    // Input/output pairs, for callers that record history
    #[serde(skip)]
    pub results: Vec<TransformResult>,
}

impl TransformResponse {
    fn failure(error: &anyhow::Error) -> Self {
        Self {
            success: false,
            message: "Error processing request".to_string(),
            details: None,
            error: Some(format!("{error:#}")),
            results: Vec::new(),
        }
    }
}

pub fn handle<M: EditModel + ?Sized>(request: &TransformRequest, model: &M) -> TransformResponse {
    log::info!(
        "Transform request: prompt={:?} images={} first={}",
        request.prompt,
        request.images.len(),
        request
            .images
            .first()
            .map(|img| format!("{}...", data_url::preview(img, 100)))
            .unwrap_or_else(|| "-".to_string())
    );

    match transform::transform_images(model, &request.prompt, &request.images) {
        Ok(results) => {
            let images = results.iter().map(|r| r.output_image.clone()).collect();
            TransformResponse {
                success: true,
                message: "Request received successfully".to_string(),
                details: Some(TransformDetails {
                    prompt: request.prompt.clone(),
                    number_of_images: request.images.len(),
                    timestamp: Utc::now(),
                    images,
                }),
                error: None,
                results,
            }
        }
        Err(e) => {
            log::error!("Transform request failed: {e:#}");
            TransformResponse::failure(&e)
        }
    }
}

/// Transform project `id` with its stored prompt and images
///
/// The project is saved as processing before the first request. On success
/// the results are recorded, otherwise the status becomes error. `Err` is
/// reserved for a missing project, a project with nothing to send, or a store
/// that cannot be written; a failed transform is an `Ok` response with
/// `success: false`.
pub fn transform_project<M: EditModel + ?Sized>(
    store: &mut ProjectStore,
    id: &str,
    model: &M,
) -> Result<TransformResponse> {
    let project = store.require(id)?;

    let prompt = project
        .prompt
        .clone()
        .filter(|p| !p.trim().is_empty())
        .with_context(|| format!("Project {id} has no prompt"))?;
    if project.images.is_empty() {
        anyhow::bail!("Project {id} has no images");
    }

    let request = TransformRequest {
        prompt,
        images: project.images.clone(),
    };

    store.update(id, |p| p.status = Some(ProjectStatus::Processing))?;

    let response = handle(&request, model);

    if response.success {
        store.update(id, |p| p.record_transform(&response.results, model.model()))?;
    } else {
        store.update(id, |p| p.status = Some(ProjectStatus::Error))?;
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::{Model, Project};
    use crate::transform::tests::FakeModel;
    use parking_lot::Mutex;

    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

    fn store_with_project(dir: &tempfile::TempDir, images: &[&str]) -> ProjectStore {
        let mut store = ProjectStore::open(dir.path().join("projects.json")).unwrap();
        let Project { id, .. } = store.create_project().unwrap();
        store
            .update(&id, |p| {
                p.prompt = Some("watercolor".to_string());
                p.images = images.iter().map(|s| s.to_string()).collect();
                p.generated_images = vec!["https://out.example/earlier".to_string()];
            })
            .unwrap();
        store
    }

    /// Reads the project's saved status from disk while each request is in flight
    struct StatusRecorder {
        path: PathBuf,
        seen: Mutex<Vec<Option<ProjectStatus>>>,
    }

    impl EditModel for StatusRecorder {
        fn model(&self) -> Model {
            Model::GeminiFlashEdit
        }

        fn edit(&self, _prompt: &str, image_url: &str) -> Result<String> {
            let status = ProjectStore::open(&self.path)?.require("1")?.status;
            self.seen.lock().push(status);
            Ok(format!("https://out.example/{image_url}"))
        }
    }

    #[test]
    fn success_envelope() {
        let model = FakeModel::new();
        let request: TransformRequest =
            serde_json::from_str(r#"{"prompt": "anime", "images": ["a", "b"]}"#).unwrap();

        let response = handle(&request, &model);
        assert!(response.success);
        assert_eq!(response.message, "Request received successfully");
        assert_eq!(response.results.len(), 2);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["details"]["numberOfImages"], 2);
        assert_eq!(json["details"]["images"][1], "https://out.example/b?p=5");
        assert!(json.get("error").is_none());
        assert!(json.get("results").is_none());
    }

    #[test]
    fn failure_envelope() {
        let model = FakeModel::new();
        let request: TransformRequest = serde_json::from_str(r#"{"prompt": "anime"}"#).unwrap();

        let response = handle(&request, &model);
        assert!(!response.success);
        assert_eq!(response.message, "Error processing request");
        assert_eq!(response.error.as_deref(), Some("No images to transform"));
        assert!(response.details.is_none());
    }

    #[test]
    fn project_success_records_results() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_project(&dir, &["a", "b"]);

        let response = transform_project(&mut store, "1", &FakeModel::new()).unwrap();
        assert!(response.success);

        let project = ProjectStore::open(store.path()).unwrap().require("1").unwrap().clone();
        assert_eq!(project.status, Some(ProjectStatus::Completed));
        assert_eq!(
            project.generated_images,
            vec![
                "https://out.example/earlier",
                "https://out.example/a?p=10",
                "https://out.example/b?p=10",
            ]
        );
        assert_eq!(project.original_images, vec!["a", "b"]);
        assert_eq!(project.model.as_deref(), Some("Gemini Flash Edit"));
        assert!(project.last_transformed.is_some());
    }

    #[test]
    fn project_failure_sets_error_status() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_project(&dir, &["a", "b", "c"]);
        let mut model = FakeModel::new();
        model.fail_on.push("b".into());

        let response = transform_project(&mut store, "1", &model).unwrap();
        assert!(!response.success);
        assert!(response.error.as_deref().unwrap().contains("image 2"));

        let project = ProjectStore::open(store.path()).unwrap().require("1").unwrap().clone();
        assert_eq!(project.status, Some(ProjectStatus::Error));
        assert_eq!(project.generated_images, vec!["https://out.example/earlier"]);
        assert!(project.last_transformed.is_none());
    }

    #[test]
    fn project_is_processing_during_requests() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_project(&dir, &["a", "b"]);
        let model = StatusRecorder {
            path: store.path().to_path_buf(),
            seen: Mutex::new(Vec::new()),
        };

        assert!(transform_project(&mut store, "1", &model).unwrap().success);
        assert_eq!(
            *model.seen.lock(),
            vec![Some(ProjectStatus::Processing), Some(ProjectStatus::Processing)]
        );
        assert_eq!(store.require("1").unwrap().status, Some(ProjectStatus::Completed));
    }

    #[test]
    fn project_without_prompt_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = store_with_project(&dir, &["a"]);
        store.update("1", |p| p.prompt = Some("  ".to_string())).unwrap();
        let model = FakeModel::new();

        assert!(transform_project(&mut store, "1", &model).is_err());
        assert!(transform_project(&mut store, "7", &model).is_err());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.require("1").unwrap().status, None);
    }
}

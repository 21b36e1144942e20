//! Relaying images and a prompt to a hosted image-editing model

use anyhow::{Context, Result};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::data_url;
use crate::project::Model;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResult {
    pub input_image: String,
    pub output_image: String,
}

/// A hosted model that edits one image according to a prompt
pub trait EditModel: Sync {
    fn model(&self) -> Model;

    /// Returns the URL of the edited image
    fn edit(&self, prompt: &str, image_url: &str) -> Result<String>;
}

#[derive(Serialize)]
struct EditRequest<'a> {
    prompt: &'a str,
    image_url: &'a str,
}

#[derive(Deserialize)]
struct EditResponse {
    image: OutputImage,
}

#[derive(Deserialize)]
struct OutputImage {
    url: String,
}

/// fal.ai synchronous run API
pub struct FalClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: Model,
}

impl FalClient {
    pub fn new(client: Client, endpoint: impl Into<String>, api_key: impl Into<String>, model: Model) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model,
        }
    }

    /// Build from config, reading the key from the configured environment variable
    pub fn from_config(client: Client, config: &Config) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .with_context(|| format!("{} is not set", config.api_key_env))?;

        Ok(Self::new(client, config.endpoint.as_str(), api_key, config.model))
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = model;
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.model.endpoint_id()
        )
    }
}

impl EditModel for FalClient {
    fn model(&self) -> Model {
        self.model
    }

    fn edit(&self, prompt: &str, image_url: &str) -> Result<String> {
        let url = self.url();
        log::debug!("POST {url} ({})", data_url::preview(image_url, 64));

        let response: EditResponse = self
            .client
            .post(&url)
            .header(AUTHORIZATION, format!("Key {}", self.api_key))
            .json(&EditRequest { prompt, image_url })
            .send()
            .with_context(|| format!("Request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{} rejected the request", self.model.name()))?
            .json()
            .context("Unexpected response from image model")?;

        Ok(response.image.url)
    }
}

/// Send every image to `model` in parallel, one request each
///
/// Results come back in input order. The batch is all-or-nothing: the first
/// failure fails the whole call. There is no retry.
pub fn transform_images<M: EditModel + ?Sized>(
    model: &M,
    prompt: &str,
    images: &[String],
) -> Result<Vec<TransformResult>> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        anyhow::bail!("Prompt is empty");
    }
    if images.is_empty() {
        anyhow::bail!("No images to transform");
    }

    log::info!(
        "Transforming {} images with {}",
        images.len(),
        model.model().name()
    );

    images
        .par_iter()
        .enumerate()
        .map(|(i, image)| {
            log::debug!("Processing image {}", i + 1);
            match model.edit(prompt, image) {
                Ok(output_image) => Ok(TransformResult {
                    input_image: image.clone(),
                    output_image,
                }),
                Err(e) => {
                    log::error!("Error transforming image {}: {e:#}", i + 1);
                    Err(e.context(format!("Failed to transform image {}", i + 1)))
                }
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echoes a tagged URL back; fails on inputs listed in `fail_on`
    pub(crate) struct FakeModel {
        pub calls: AtomicUsize,
        pub fail_on: Vec<String>,
    }

    impl FakeModel {
        pub(crate) fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: Vec::new(),
            }
        }
    }

    impl EditModel for FakeModel {
        fn model(&self) -> Model {
            Model::GeminiFlashEdit
        }

        fn edit(&self, prompt: &str, image_url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on.iter().any(|f| f == image_url) {
                anyhow::bail!("provider error");
            }
            Ok(format!("https://out.example/{}?p={}", image_url, prompt.len()))
        }
    }

    #[test]
    fn results_follow_input_order() {
        let model = FakeModel::new();
        let images: Vec<String> = (0..32).map(|i| format!("img{i}")).collect();

        let results = transform_images(&model, "  ghibli  ", &images).unwrap();

        assert_eq!(results.len(), 32);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.input_image, format!("img{i}"));
            assert_eq!(result.output_image, format!("https://out.example/img{i}?p=6"));
        }
    }

    #[test]
    fn one_failure_fails_the_batch() {
        let mut model = FakeModel::new();
        model.fail_on.push("b".into());

        let images = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let err = transform_images(&model, "style", &images).unwrap_err();
        assert!(format!("{err:#}").contains("image 2"));
    }

    #[test]
    fn validates_before_any_request() {
        let model = FakeModel::new();
        assert!(transform_images(&model, "   ", &["a".to_string()]).is_err());
        assert!(transform_images(&model, "style", &[]).is_err());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fal_url_joins_endpoint_and_model() {
        let client = Client::new();
        let fal = FalClient::new(client, "https://fal.run/", "key", Model::GeminiFlashEdit);
        assert_eq!(fal.url(), "https://fal.run/fal-ai/gemini-flash-edit");
    }

    #[test]
    fn missing_key_is_an_error() {
        let config = Config {
            api_key_env: "RESTYLE_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..Config::default()
        };
        let err = FalClient::from_config(Client::new(), &config).err().unwrap();
        assert!(err.to_string().contains("RESTYLE_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn edit_response_shape() {
        let response: EditResponse = serde_json::from_str(
            r#"{"image": {"url": "https://v3.fal.media/out.png", "content_type": "image/png"}, "description": ""}"#,
        )
        .unwrap();
        assert_eq!(response.image.url, "https://v3.fal.media/out.png");
    }
}

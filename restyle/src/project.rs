use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{EnumCount, EnumIter, IntoEnumIterator};

use std::str::FromStr;

use crate::transform::TransformResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Completed,
    Processing,
    Error,
}

impl ProjectStatus {
    pub fn label(status: Option<Self>) -> &'static str {
        match status {
            Some(ProjectStatus::Completed) => "Completed",
            Some(ProjectStatus::Processing) => "Processing",
            Some(ProjectStatus::Error) => "Error",
            None => "New",
        }
    }
}

/// One user project, as persisted in the store file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default)]
    pub generated_images: Vec<String>,
    #[serde(default)]
    pub original_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transformed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Project {
    pub fn new(id: u64) -> Self {
        Self {
            id: id.to_string(),
            name: format!("Project {id}"),
            created_at: Utc::now(),
            status: None,
            images: Vec::new(),
            prompt: None,
            style: None,
            generated_images: Vec::new(),
            original_images: Vec::new(),
            last_transformed: None,
            model: None,
        }
    }

    pub fn apply_style(&mut self, style: Style) {
        self.style = Some(style.name().to_string());
        self.prompt = Some(style.prompt());
    }

    /// Remove the image at `index` (0-based) and return it
    pub fn remove_image(&mut self, index: usize) -> anyhow::Result<String> {
        if index >= self.images.len() {
            anyhow::bail!(
                "Image index {} out of range, project {} has {} images",
                index + 1,
                self.id,
                self.images.len()
            );
        }
        Ok(self.images.remove(index))
    }

    /// Generated images, newest first
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.generated_images.iter().rev().map(String::as_str)
    }

    pub fn record_transform(&mut self, results: &[TransformResult], model: Model) {
        self.original_images = results.iter().map(|r| r.input_image.clone()).collect();
        self.generated_images
            .extend(results.iter().map(|r| r.output_image.clone()));
        self.last_transformed = Some(Utc::now());
        self.model = Some(model.name().to_string());
        self.status = Some(ProjectStatus::Completed);
    }
}

#[derive(Debug)]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for ParseError {}

fn normalize_name(s: &str) -> String {
    s.trim().to_lowercase().replace([' ', '_'], "-")
}

/// Prompt presets offered next to the free-form prompt
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumCount, EnumIter)]
pub enum Style {
    StudioGhibli,
    BatmanTas,
    SailorMoon,
    DragonBall,
    AttackOnTitan,
}

impl Style {
    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as IntoEnumIterator>::iter()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Style::StudioGhibli => "Studio Ghibli",
            Style::BatmanTas => "Batman TAS",
            Style::SailorMoon => "Sailor Moon",
            Style::DragonBall => "Dragon Ball",
            Style::AttackOnTitan => "Attack on Titan",
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            Style::BatmanTas => "Batman: The Animated Series",
            other => other.name(),
        }
    }

    pub fn slug(&self) -> String {
        normalize_name(self.name())
    }

    pub fn prompt(&self) -> String {
        format!("Change the style of these images into {} style", self.subject())
    }
}

impl FromStr for Style {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_name(s);
        Style::iter()
            .find(|style| style.slug() == normalized)
            .ok_or_else(|| ParseError {
                kind: "style",
                value: s.to_string(),
            })
    }
}

/// Hosted image-editing models
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize, EnumCount, EnumIter)]
pub enum Model {
    #[default]
    #[serde(rename = "Gemini Flash Edit")]
    GeminiFlashEdit,
}

impl Model {
    pub fn iter() -> impl Iterator<Item = Self> {
        <Self as IntoEnumIterator>::iter()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Model::GeminiFlashEdit => "Gemini Flash Edit",
        }
    }

    /// Provider endpoint id
    pub fn endpoint_id(&self) -> &'static str {
        match self {
            Model::GeminiFlashEdit => "fal-ai/gemini-flash-edit",
        }
    }

    pub fn slug(&self) -> String {
        normalize_name(self.name())
    }
}

impl FromStr for Model {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_name(s);
        Model::iter()
            .find(|model| model.slug() == normalized || model.endpoint_id() == normalized)
            .ok_or_else(|| ParseError {
                kind: "model",
                value: s.to_string(),
            })
    }
}

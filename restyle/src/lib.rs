pub mod archive;
pub mod config;
pub mod data_url;
pub mod export;
pub mod http;
pub mod image;
pub mod ingest;
pub mod project;
pub mod relay;
pub mod store;
pub mod transform;

// Re-export commonly used types
pub use config::Config;
pub use image::{ImageFormat, NormalizedImage, PngCompression};
pub use ingest::{IngestReport, Ingestor, Source};
pub use project::{Model, Project, ProjectStatus, Style};
pub use store::ProjectStore;
pub use transform::{EditModel, FalClient, TransformResult};

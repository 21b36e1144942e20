//! Input ingestion: files, directories, ZIP archives and URLs in, normalized images out
//!
//! Inputs are expanded serially into a flat list of pending images (reading
//! files and archive entries is I/O bound and cheap), then a single parallel
//! stage fetches remote bytes, decodes, resizes and re-encodes. Output keeps
//! input order. A bad input is logged and reported, never fatal.

use anyhow::Result;
use parking_lot::Mutex;
use rayon::iter::ParallelIterator;
use rayon::slice::ParallelSlice;
use walkdir::WalkDir;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{self, has_image_extension, has_zip_extension};
use crate::config::Config;
use crate::data_url;
use crate::http::Fetch;
use crate::image::{self, NormalizedImage};

/// One user-supplied input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Directory(PathBuf),
    Archive(PathBuf),
    Url(String),
    DataUrl(String),
}

impl Source {
    pub fn classify(input: &str) -> Self {
        if data_url::is_data_url(input) {
            return Source::DataUrl(input.to_string());
        }

        let lower = input.get(..8).unwrap_or(input).to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Source::Url(input.to_string());
        }

        let path = PathBuf::from(input);
        if path.is_dir() {
            Source::Directory(path)
        } else if has_zip_extension(&path) {
            Source::Archive(path)
        } else {
            Source::File(path)
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) | Source::Directory(path) | Source::Archive(path) => {
                write!(f, "{}", path.display())
            }
            Source::Url(url) => f.write_str(url),
            Source::DataUrl(url) => write!(f, "{}...", data_url::preview(url, 32)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub images: Vec<NormalizedImage>,
    pub skipped: Vec<Skipped>,
}

impl IngestReport {
    pub fn data_urls(&self) -> Vec<String> {
        self.images.iter().map(NormalizedImage::to_data_url).collect()
    }
}

enum Payload {
    Bytes(Vec<u8>),
    Remote(String),
}

struct Pending {
    label: String,
    payload: Payload,
}

pub struct Ingestor<'a> {
    config: &'a Config,
    fetcher: &'a dyn Fetch,
}

impl<'a> Ingestor<'a> {
    pub fn new(config: &'a Config, fetcher: &'a dyn Fetch) -> Self {
        Self { config, fetcher }
    }

    pub fn ingest_inputs<S: AsRef<str>>(&self, inputs: &[S]) -> IngestReport {
        let sources: Vec<Source> = inputs.iter().map(|s| Source::classify(s.as_ref())).collect();
        self.ingest(&sources)
    }

    pub fn ingest(&self, sources: &[Source]) -> IngestReport {
        log::info!("Ingesting {} inputs", sources.len());

        // 1. Expand inputs (serial)
        let mut pending = Vec::new();
        let mut skipped = Vec::new();
        for source in sources {
            self.expand(source, &mut pending, &mut skipped);
        }

        log::debug!(
            "Expanded {} inputs into {} candidate images",
            sources.len(),
            pending.len()
        );

        // 2. Single parallel stage: fetch + decode + resize + encode
        let failures = Mutex::new(Vec::new());
        let num_threads = rayon::current_num_threads();
        let chunk_size = (pending.len() / num_threads).max(1);

        let indexed: Vec<(usize, Pending)> = pending.into_iter().enumerate().collect();
        let images: Vec<NormalizedImage> = indexed
            .par_chunks(chunk_size)
            .flat_map_iter(|chunk| {
                chunk.iter().filter_map(|(index, item)| match self.process(item) {
                    Ok(img) => Some(img),
                    Err(e) => {
                        log::warn!("Failed to process {}: {:#}", item.label, e);
                        failures.lock().push((
                            *index,
                            Skipped {
                                source: item.label.clone(),
                                reason: format!("{e:#}"),
                            },
                        ));
                        None
                    }
                })
            })
            .collect();

        let mut failures = failures.into_inner();
        failures.sort_unstable_by_key(|(index, _)| *index);
        skipped.extend(failures.into_iter().map(|(_, s)| s));

        if images.is_empty() && !sources.is_empty() {
            log::warn!("No images could be ingested");
        }
        log::info!("Ingested {} images, skipped {}", images.len(), skipped.len());

        IngestReport { images, skipped }
    }

    fn process(&self, item: &Pending) -> Result<NormalizedImage> {
        match &item.payload {
            Payload::Bytes(bytes) => image::normalize(item.label.as_str(), bytes, self.config),
            Payload::Remote(url) => {
                let bytes = self.fetcher.fetch(url)?;
                image::normalize(item.label.as_str(), &bytes, self.config)
            }
        }
    }

    fn expand(&self, source: &Source, pending: &mut Vec<Pending>, skipped: &mut Vec<Skipped>) {
        let mut skip = |label: String, reason: String| {
            log::warn!("Skipping {label}: {reason}");
            skipped.push(Skipped {
                source: label,
                reason,
            });
        };

        match source {
            Source::File(path) => {
                if !has_image_extension(path) {
                    skip(source.to_string(), "unsupported file type".to_string());
                    return;
                }
                match fs::read(path) {
                    Ok(bytes) => pending.push(Pending {
                        label: source.to_string(),
                        payload: Payload::Bytes(bytes),
                    }),
                    Err(e) => skip(source.to_string(), e.to_string()),
                }
            }
            Source::Archive(path) => self.expand_archive(path, pending, &mut skip),
            Source::Directory(dir) => {
                for entry in WalkDir::new(dir).sort_by_file_name() {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(e) => {
                            skip(dir.display().to_string(), e.to_string());
                            continue;
                        }
                    };
                    if !entry.file_type().is_file() {
                        continue;
                    }

                    let path = entry.path();
                    if has_zip_extension(path) {
                        self.expand_archive(path, pending, &mut skip);
                    } else if has_image_extension(path) {
                        match fs::read(path) {
                            Ok(bytes) => pending.push(Pending {
                                label: path.display().to_string(),
                                payload: Payload::Bytes(bytes),
                            }),
                            Err(e) => skip(path.display().to_string(), e.to_string()),
                        }
                    } else {
                        log::trace!("Ignoring {}", path.display());
                    }
                }
            }
            Source::Url(url) => pending.push(Pending {
                label: url.clone(),
                payload: Payload::Remote(url.clone()),
            }),
            Source::DataUrl(url) => match data_url::parse(url) {
                Ok(parsed) => pending.push(Pending {
                    label: source.to_string(),
                    payload: Payload::Bytes(parsed.data),
                }),
                Err(e) => skip(source.to_string(), e.to_string()),
            },
        }
    }

    fn expand_archive(
        &self,
        path: &Path,
        pending: &mut Vec<Pending>,
        skip: &mut impl FnMut(String, String),
    ) {
        let entries = match archive::open(path, self.config.min_archive_entry_bytes) {
            Ok(entries) => entries,
            Err(e) => {
                skip(path.display().to_string(), format!("{e:#}"));
                return;
            }
        };

        let num_entries = entries.num_entries();
        let before = pending.len();
        for entry in entries {
            match entry {
                Ok(file) => pending.push(Pending {
                    label: format!("{}:{}", path.display(), file.file_name.display()),
                    payload: Payload::Bytes(file.data),
                }),
                Err(e) => skip(path.display().to_string(), format!("{e:#}")),
            }
        }

        log::info!(
            "Found {} images among {} entries in {}",
            pending.len() - before,
            num_entries,
            path.display()
        );
    }
}

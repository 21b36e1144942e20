//! JSON-file project store
//!
//! The whole project list lives in one file as a JSON array of camelCase
//! records, rewritten in full on every change.

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::project::Project;

#[derive(Debug)]
pub struct ProjectStore {
    path: PathBuf,
    projects: Vec<Project>,
}

impl ProjectStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let projects = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => Vec::new(),
            Ok(contents) => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse project store {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read project store {}", path.display()))
            }
        };

        log::debug!("Loaded {} projects from {}", projects.len(), path.display());

        Ok(Self { path, projects })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn get(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    /// Like [`get`](Self::get), but a missing project is an error
    pub fn require(&self, id: &str) -> Result<&Project> {
        self.get(id)
            .with_context(|| format!("Project {id} not found"))
    }

    /// Next id: one past the largest numeric id, ignoring ids that are not numbers
    fn next_id(&self) -> Result<u64> {
        self.projects
            .iter()
            .filter_map(|p| p.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            .checked_add(1)
            .context("No project ids left, the largest id in the store is already u64::MAX")
    }

    pub fn create_project(&mut self) -> Result<Project> {
        let project = Project::new(self.next_id()?);
        self.projects.push(project.clone());
        self.save()?;

        log::info!("Created project {} ({})", project.id, project.name);
        Ok(project)
    }

    /// Returns whether a project was removed
    pub fn delete_project(&mut self, id: &str) -> Result<bool> {
        let before = self.projects.len();
        self.projects.retain(|p| p.id != id);

        if self.projects.len() == before {
            return Ok(false);
        }

        self.save()?;
        log::info!("Deleted project {id}");
        Ok(true)
    }

    /// Apply `f` to project `id` and persist the result
    pub fn update<T>(&mut self, id: &str, f: impl FnOnce(&mut Project) -> T) -> Result<T> {
        let project = self
            .projects
            .iter_mut()
            .find(|p| p.id == id)
            .with_context(|| format!("Project {id} not found"))?;

        let out = f(project);
        self.save()?;
        Ok(out)
    }

    /// Write the store atomically: temp file next to the target, then rename
    pub fn save(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create store directory {}", dir.display()))?;

        let json = serde_json::to_vec_pretty(&self.projects)?;

        let mut tmp = NamedTempFile::new_in(&dir).context("Failed to create temporary store file")?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to write project store {}", self.path.display()))?;

        log::trace!("Saved {} projects to {}", self.projects.len(), self.path.display());
        Ok(())
    }
}

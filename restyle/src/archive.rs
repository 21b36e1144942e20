//! ZIP archive reading: yields the image entries of an archive

use anyhow::{Context, Result};
use zip::ZipArchive;

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::{Path, PathBuf};

static IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Whether `path` carries one of the accepted image extensions (case-insensitive)
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|valid| ext.eq_ignore_ascii_case(valid)))
}

pub fn has_zip_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/// macOS resource forks and metadata folders
fn is_system_file(name: &str, path: &Path) -> bool {
    if name.starts_with("__MACOSX") || name.starts_with("._") {
        return true;
    }
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|n| n.starts_with("._") || n == ".DS_Store")
}

#[derive(Debug, Clone)]
pub struct ArchiveFile {
    pub file_name: PathBuf,
    pub data: Vec<u8>,
}

pub struct ArchiveIter<R> {
    archive: ZipArchive<R>,
    index: usize,
    min_bytes: u64,
}

impl<R: Read + Seek> ArchiveIter<R> {
    /// Number of entries in the archive, accepted or not
    pub fn num_entries(&self) -> usize {
        self.archive.len()
    }
}

impl<R: Read + Seek> Iterator for ArchiveIter<R> {
    type Item = Result<ArchiveFile>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.index < self.archive.len() {
            let index = self.index;
            self.index += 1;

            let mut file = match self.archive.by_index(index) {
                Ok(file) => file,
                Err(e) => {
                    return Some(Err(anyhow::Error::new(e)
                        .context(format!("Failed to read archive entry #{index}"))))
                }
            };

            if file.is_dir() {
                continue;
            }

            let name = file.name().to_string();
            let Some(path) = file.enclosed_name() else {
                log::warn!("Skipping archive entry with unsafe path: {name}");
                continue;
            };

            if is_system_file(&name, &path) || !has_image_extension(&path) {
                log::trace!("Skipping non-image archive entry: {name}");
                continue;
            }

            let size = file.size();
            if size < self.min_bytes {
                log::debug!("Skipping file too small to be a valid image: {name} ({size} bytes)");
                continue;
            }

            let mut data = Vec::with_capacity(size as usize);
            if let Err(e) = file.read_to_end(&mut data) {
                return Some(Err(
                    anyhow::Error::new(e).context(format!("Failed to extract {name}"))
                ));
            }

            log::trace!("Extracted {name} ({size} bytes)");
            return Some(Ok(ArchiveFile {
                file_name: path,
                data,
            }));
        }

        None
    }
}

/// Iterate the image entries of a ZIP archive, in archive order
pub fn unarchive_iter<R: Read + Seek>(reader: R, min_bytes: u64) -> Result<ArchiveIter<R>> {
    let archive = ZipArchive::new(reader).context("Failed to parse ZIP archive")?;

    Ok(ArchiveIter {
        archive,
        index: 0,
        min_bytes,
    })
}

pub fn open(path: &Path, min_bytes: u64) -> Result<ArchiveIter<BufReader<File>>> {
    log::info!("Opening archive: {}", path.display());

    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    unarchive_iter(BufReader::new(file), min_bytes)
        .with_context(|| format!("Failed to read {}", path.display()))
}

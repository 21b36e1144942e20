use anyhow::{Context, Result};
use imageproc::image::guess_format;
use rayon::iter::{IndexedParallelIterator, IntoParallelRefIterator, ParallelIterator};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::http::Fetch;
use crate::project::Project;

pub fn archive_name(project: &Project) -> String {
    format!("{}_generated_images.zip", sanitize(&project.name))
}

// Keep the project name readable but never let it escape the output directory
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => "project".to_string(),
        _ => cleaned,
    }
}

fn entry_name(index: usize, data: &[u8]) -> String {
    let extension = guess_format(data)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("png");
    format!("image_{}.{extension}", index + 1)
}

/// Download every generated image of `project` into a ZIP under `dir`
pub fn export_generated(project: &Project, fetcher: &dyn Fetch, dir: &Path) -> Result<PathBuf> {
    if project.generated_images.is_empty() {
        anyhow::bail!("Project {} has no generated images", project.id);
    }

    log::info!(
        "Downloading {} generated images of {}",
        project.generated_images.len(),
        project.name
    );

    let downloads: Vec<Vec<u8>> = project
        .generated_images
        .par_iter()
        .enumerate()
        .map(|(i, url)| {
            fetcher
                .fetch(url)
                .with_context(|| format!("Failed to download generated image {}", i + 1))
        })
        .collect::<Result<_>>()?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let output_path = dir.join(archive_name(project));
    let file = File::create(&output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    let mut zip = ZipWriter::new(file);

    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for (i, data) in downloads.iter().enumerate() {
        zip.start_file(entry_name(i, data), options)?;
        zip.write_all(data)?;
    }

    zip.finish()?;

    log::info!("Created {}", output_path.display());

    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_url;
    use crate::http::Offline;
    use crate::image::tests::png_bytes;
    use zip::ZipArchive;

    #[test]
    fn writes_numbered_entries() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::new(3);
        project.name = "Trip / Kyoto".to_string();
        project.generated_images = vec![
            data_url::encode("image/png", &png_bytes(4, 4)),
            data_url::encode("application/octet-stream", b"opaque"),
        ];

        let path = export_generated(&project, &Offline, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "Trip _ Kyoto_generated_images.zip");

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let names: Vec<_> = archive.file_names().map(str::to_string).collect();
        assert_eq!(names, vec!["image_1.png", "image_2.png"]);

        let mut second = archive.by_name("image_2.png").unwrap();
        let mut data = Vec::new();
        std::io::Read::read_to_end(&mut second, &mut data).unwrap();
        assert_eq!(data, b"opaque");
    }

    #[test]
    fn nothing_to_export() {
        let dir = tempfile::tempdir().unwrap();
        assert!(export_generated(&Project::new(1), &Offline, dir.path()).is_err());
    }

    #[test]
    fn failed_download_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut project = Project::new(1);
        project.generated_images = vec!["https://cdn.example/out.png".to_string()];

        assert!(export_generated(&project, &Offline, dir.path()).is_err());
        assert!(!dir.path().join(archive_name(&project)).exists());
    }

    #[test]
    fn sanitize_names() {
        assert_eq!(sanitize("  My Project  "), "My Project");
        assert_eq!(sanitize(".."), "project");
        assert_eq!(sanitize("a:b"), "a_b");
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use std::path::{Path, PathBuf};

use restyle::http::{self, Fetch, Offline};
use restyle::relay;
use restyle::{
    Config, FalClient, ImageFormat, Ingestor, Model, PngCompression, ProjectStatus, ProjectStore,
    Style,
};

#[derive(Parser)]
#[command(name = "restyle")]
#[command(about = "Prepare photo projects and restyle them with hosted image models", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Project store file (defaults to ~/.local/share/restyle/projects.json)
    #[arg(long, value_name = "FILE", global = true)]
    store: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, default_value_t, global = true)]
    verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, default_value_t, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new project
    New {
        /// Project name (defaults to "Project <id>")
        #[arg(long)]
        name: Option<String>,
    },
    /// List all projects
    List,
    /// Show one project
    Show { id: String },
    /// Rename a project
    Rename { id: String, name: String },
    /// Delete a project
    Delete { id: String },
    /// Add images to a project from files, directories, ZIP archives or URLs
    Add {
        id: String,
        #[arg(required = true, value_name = "INPUT")]
        inputs: Vec<String>,
        /// Never touch the network; only local files and data: URLs
        #[arg(long, default_value_t)]
        offline: bool,
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Remove one image from a project (1-based index)
    RemoveImage { id: String, index: usize },
    /// Remove all images from a project
    ClearImages { id: String },
    /// Set the transformation prompt, from a style preset or free text
    Prompt {
        id: String,
        /// Style preset, e.g. studio-ghibli
        #[arg(long, conflicts_with = "text", required_unless_present = "text")]
        style: Option<Style>,
        /// Free-form prompt
        #[arg(long)]
        text: Option<String>,
    },
    /// List style presets and models
    Styles,
    /// Print the effective configuration
    Config {
        /// Also save it to ~/.config/restyle/config.json
        #[arg(long, default_value_t)]
        write: bool,
    },
    /// Send a project's images and prompt to the image model
    Transform {
        id: String,
        /// Model to use (defaults to the configured model)
        #[arg(long)]
        model: Option<Model>,
        /// Print the full response envelope as JSON
        #[arg(long, default_value_t)]
        json: bool,
    },
    /// List generated images, newest first
    History { id: String },
    /// Download generated images into a ZIP archive
    Export {
        id: String,
        /// Output directory
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output_dir: PathBuf,
    },
    /// Run the ingestion pipeline and write the normalized images to a directory
    Normalize {
        #[arg(required = true, value_name = "INPUT")]
        inputs: Vec<String>,
        /// Output directory
        #[arg(short, long, value_name = "DIR")]
        output_dir: PathBuf,
        #[arg(long, default_value_t)]
        offline: bool,
        #[command(flatten)]
        image: ImageArgs,
    },
}

#[derive(clap::Args)]
struct ImageArgs {
    /// Maximum output width in pixels
    #[arg(long, value_name = "PIXELS")]
    max_width: Option<u32>,

    /// Maximum output height in pixels
    #[arg(long, value_name = "PIXELS")]
    max_height: Option<u32>,

    /// Image format
    #[arg(long, value_enum)]
    image_format: Option<ImageFormatArg>,

    /// JPEG/WebP quality (0-100)
    #[arg(long, value_name = "QUALITY")]
    quality: Option<u8>,

    /// PNG compression level
    #[arg(long, value_enum, default_value_t = PngCompressionArg::Default)]
    png_compression: PngCompressionArg,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ImageFormatArg {
    Jpeg,
    Png,
    Webp,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PngCompressionArg {
    Fast,
    Default,
    Best,
}

impl From<PngCompressionArg> for PngCompression {
    fn from(arg: PngCompressionArg) -> Self {
        match arg {
            PngCompressionArg::Fast => PngCompression::Fast,
            PngCompressionArg::Default => PngCompression::Default,
            PngCompressionArg::Best => PngCompression::Best,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(args.verbose, args.quiet);

    let mut config = Config::load().unwrap_or_default();
    if let Some(store) = &args.store {
        config.store_path = Some(store.clone());
    }

    match args.command {
        Command::New { name } => {
            let mut store = open_store(&config)?;
            let project = store.create_project()?;
            if let Some(name) = name {
                store.update(&project.id, |p| p.name = name)?;
            }
            println!("{}", project.id);
        }
        Command::List => {
            let store = open_store(&config)?;
            if store.projects().is_empty() {
                println!("No projects yet, create one with `restyle new`");
            }
            for p in store.projects() {
                println!(
                    "{:>4}  {:<28} {:<10} {:>3} images {:>4} generated",
                    p.id,
                    p.name,
                    ProjectStatus::label(p.status),
                    p.images.len(),
                    p.generated_images.len()
                );
            }
        }
        Command::Show { id } => {
            let store = open_store(&config)?;
            let p = store.require(&id)?;
            println!("id:              {}", p.id);
            println!("name:            {}", p.name);
            println!("created:         {}", p.created_at.to_rfc3339());
            println!("status:          {}", ProjectStatus::label(p.status));
            println!("style:           {}", p.style.as_deref().unwrap_or("-"));
            println!("prompt:          {}", p.prompt.as_deref().unwrap_or("-"));
            println!("model:           {}", p.model.as_deref().unwrap_or("-"));
            println!(
                "last transform:  {}",
                p.last_transformed
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string())
            );
            println!("images:          {}", p.images.len());
            println!("generated:       {}", p.generated_images.len());
        }
        Command::Rename { id, name } => {
            let mut store = open_store(&config)?;
            store.update(&id, |p| p.name = name)?;
        }
        Command::Delete { id } => {
            let mut store = open_store(&config)?;
            if !store.delete_project(&id)? {
                anyhow::bail!("Project {id} not found");
            }
        }
        Command::Add {
            id,
            inputs,
            offline,
            image,
        } => {
            let config = build_config(config, &image)?;
            let mut store = open_store(&config)?;
            store.require(&id)?;

            let client;
            let fetcher: &dyn Fetch = if offline {
                &Offline
            } else {
                client = http::client(&config)?;
                &client
            };

            let report = Ingestor::new(&config, fetcher).ingest_inputs(&inputs);
            for skipped in &report.skipped {
                log::warn!("Skipped {}: {}", skipped.source, skipped.reason);
            }
            if report.images.is_empty() {
                anyhow::bail!("No images found in the given inputs");
            }

            let added = report.images.len();
            let urls = report.data_urls();
            let total = store.update(&id, |p| {
                p.images.extend(urls);
                p.images.len()
            })?;

            log::info!("Added {added} images to project {id} ({total} total)");
        }
        Command::RemoveImage { id, index } => {
            if index == 0 {
                anyhow::bail!("Image indices start at 1");
            }
            let mut store = open_store(&config)?;
            store.update(&id, |p| p.remove_image(index - 1))??;
        }
        Command::ClearImages { id } => {
            let mut store = open_store(&config)?;
            store.update(&id, |p| p.images.clear())?;
        }
        Command::Prompt { id, style, text } => {
            let mut store = open_store(&config)?;
            store.update(&id, |p| match (style, text) {
                (Some(style), _) => p.apply_style(style),
                (None, Some(text)) => p.prompt = Some(text),
                (None, None) => {}
            })?;
        }
        Command::Styles => {
            println!("Styles:");
            for style in Style::iter() {
                println!("  {:<16} {:<18} {}", style.slug(), style.name(), style.prompt());
            }
            println!("Models:");
            for model in Model::iter() {
                println!("  {:<18} {:<18} {}", model.slug(), model.name(), model.endpoint_id());
            }
        }
        Command::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                config
                    .save()
                    .context("Failed to save ~/.config/restyle/config.json")?;
            }
        }
        Command::Transform { id, model, json } => {
            transform(&config, &id, model.unwrap_or(config.model), json)?;
        }
        Command::History { id } => {
            let store = open_store(&config)?;
            let p = store.require(&id)?;
            let total = p.generated_images.len();
            for (i, url) in p.history().enumerate() {
                println!("{:>4}  {url}", total - i);
            }
        }
        Command::Export { id, output_dir } => {
            let store = open_store(&config)?;
            let project = store.require(&id)?;
            let client = http::client(&config)?;
            let path = restyle::export::export_generated(project, &client, &output_dir)?;
            println!("{}", path.display());
        }
        Command::Normalize {
            inputs,
            output_dir,
            offline,
            image,
        } => {
            let config = build_config(config, &image)?;
            let client;
            let fetcher: &dyn Fetch = if offline {
                &Offline
            } else {
                client = http::client(&config)?;
                &client
            };

            let report = Ingestor::new(&config, fetcher).ingest_inputs(&inputs);
            for skipped in &report.skipped {
                log::warn!("Skipped {}: {}", skipped.source, skipped.reason);
            }
            write_images(&report.images, &output_dir)?;

            log::info!(
                "Wrote {} images to {}",
                report.images.len(),
                output_dir.display()
            );
        }
    }

    Ok(())
}

fn transform(config: &Config, id: &str, model: Model, json: bool) -> Result<()> {
    let mut store = open_store(config)?;

    let client = http::client(config)?;
    let fal = FalClient::from_config(client, config)?.with_model(model);

    let response = relay::transform_project(&mut store, id, &fal)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        for result in &response.results {
            println!("{}", result.output_image);
        }
    }

    if let Some(error) = response.error {
        anyhow::bail!("Transform failed: {error}");
    }

    Ok(())
}

fn open_store(config: &Config) -> Result<ProjectStore> {
    let path = config
        .store_path()
        .context("Could not determine the home directory, pass --store")?;
    ProjectStore::open(path)
}

fn write_images(images: &[restyle::NormalizedImage], dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).context("Failed to create output directory")?;

    for (i, image) in images.iter().enumerate() {
        let path = dir.join(format!("image_{:03}.{}", i + 1, image.format.extension()));
        std::fs::write(&path, &image.data)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        log::debug!("{} -> {}", image.source, path.display());
    }

    Ok(())
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn build_config(mut config: Config, args: &ImageArgs) -> Result<Config> {
    if let Some(width) = args.max_width {
        config.max_width = width;
    }
    if let Some(height) = args.max_height {
        config.max_height = height;
    }

    // Validate dimensions
    if config.max_width == 0 || config.max_height == 0 {
        anyhow::bail!("Maximum dimensions must be at least 1 pixel");
    }

    // Validate quality
    if args.quality.is_some_and(|q| q > 100) {
        anyhow::bail!("Quality must be between 0 and 100");
    }

    let quality = args.quality.unwrap_or(match config.image_format {
        ImageFormat::Jpeg { quality } | ImageFormat::WebP { quality } => quality,
        ImageFormat::Png { .. } => 80,
    });

    // Build image format
    config.image_format = match args.image_format {
        Some(ImageFormatArg::Jpeg) => ImageFormat::Jpeg { quality },
        Some(ImageFormatArg::Png) => ImageFormat::Png {
            compression: args.png_compression.into(),
        },
        Some(ImageFormatArg::Webp) => ImageFormat::WebP { quality },
        None => match config.image_format {
            ImageFormat::Jpeg { .. } => ImageFormat::Jpeg { quality },
            ImageFormat::WebP { .. } => ImageFormat::WebP { quality },
            png => png,
        },
    };

    Ok(config)
}

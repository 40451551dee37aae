use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facerec::{
    config, enroll, DirectoryGallery, EnrollRequest, FaceImage, GalleryStore, Identity,
    Recognizer,
};
use log::info;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "facerec")]
#[command(
    version,
    about = "Identify face crops against a directory of enrolled faces"
)]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Gallery directory, overrides the config file
    #[arg(short, long, global = true)]
    gallery: Option<PathBuf>,

    /// Log per-entry scores
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify one or more face crops
    Identify {
        /// Face crop image files
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Print one JSON object per image
        #[arg(long)]
        json: bool,
    },
    /// Add a face crop to the gallery
    Enroll {
        /// Face crop image file
        image: PathBuf,
        /// Display name to enroll under
        #[arg(short, long)]
        name: String,
    },
    /// List enrolled faces
    List,
    /// Print the similarity score of two face crops
    Compare { a: PathBuf, b: PathBuf },
    /// Open config file in editor
    Config {
        /// Write the default config first if the file does not exist
        #[arg(long)]
        init: bool,
    },
}

#[derive(Serialize)]
struct IdentifyReport<'a> {
    image: &'a Path,
    identity: Identity,
    similarity: u32,
    entry: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::builder()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .format_target(false)
        .format_timestamp(None)
        .init();

    let mut cfg = config::load_config(cli.config.as_deref())?;
    if let Some(gallery) = cli.gallery {
        cfg.gallery_dir = gallery;
    }

    match cli.command {
        Commands::Identify { images, json } => identify(&cfg, &images, json),
        Commands::Enroll { image, name } => enroll(&cfg, &image, name),
        Commands::List => list(&cfg),
        Commands::Compare { a, b } => compare(&cfg, &a, &b),
        Commands::Config { init } => open_config(&cfg, cli.config.as_deref(), init),
    }
}

fn recognizer(cfg: &config::Config) -> Result<Recognizer<DirectoryGallery>> {
    let gallery = DirectoryGallery::from_config(cfg).context("Failed to open gallery")?;
    Ok(Recognizer::from_config(gallery, cfg))
}

fn identify(cfg: &config::Config, images: &[PathBuf], json: bool) -> Result<()> {
    let recognizer = recognizer(cfg)?;
    info!(
        "Gallery {} holds {} face(s)",
        cfg.gallery_dir.display(),
        recognizer.current_gallery_size()
    );

    for path in images {
        let face = FaceImage::open(path).context("Failed to read face crop")?;
        let (identity, best) = recognizer
            .identify_with_match(&face)
            .context("Failed to scan gallery")?;
        let similarity = best.as_ref().map_or(0, |m| m.similarity);
        let entry = best.map(|m| m.entry.file_name());

        if json {
            let report = IdentifyReport {
                image: path,
                identity,
                similarity,
                entry,
            };
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}: {} (similarity {})", path.display(), identity, similarity);
        }
    }
    Ok(())
}

fn enroll(cfg: &config::Config, image: &Path, name: String) -> Result<()> {
    let gallery = DirectoryGallery::from_config(cfg).context("Failed to open gallery")?;
    let face = FaceImage::open(image).context("Failed to read face crop")?;

    let path = enroll::try_enroll(&gallery, &face, &EnrollRequest::new(name))
        .context("Failed to enroll face")?;

    info!("✓ Face enrolled as {}", path.display());
    Ok(())
}

fn list(cfg: &config::Config) -> Result<()> {
    let gallery = DirectoryGallery::from_config(cfg).context("Failed to open gallery")?;
    let entries = gallery.enumerate().context("Failed to list gallery")?;

    for entry in &entries {
        println!("{}\t{}", entry.identity, entry.file_name());
    }
    info!(
        "{} face(s) in {}",
        entries.len(),
        gallery.dir().display()
    );
    Ok(())
}

fn compare(cfg: &config::Config, a: &Path, b: &Path) -> Result<()> {
    let recognizer = recognizer(cfg)?;
    let pipeline = recognizer.pipeline();
    let face_a = FaceImage::open(a).context("Failed to read first image")?;
    let face_b = FaceImage::open(b).context("Failed to read second image")?;

    let query = pipeline.describe(&face_a);
    let train = pipeline.describe(&face_b);
    let similarity = pipeline.similarity(&query, &train);

    info!(
        "{} descriptors vs {} descriptors (radius {})",
        query.len(),
        train.len(),
        pipeline.radius
    );
    println!("{}", similarity);
    Ok(())
}

fn open_config(cfg: &config::Config, path: Option<&Path>, init: bool) -> Result<()> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    if init && !config_path.exists() {
        config::save_config(cfg, Some(config_path)).context("Failed to write config")?;
        info!("Wrote default config to {}", config_path.display());
    }

    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());
    info!("Opening config file: {}", config_path.display());

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}

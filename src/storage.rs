use crate::config::Config;
use crate::naming;
use facerec_vision::FaceImage;
use image::{DynamicImage, ImageFormat};
use log::{debug, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("display name is empty")]
    EmptyName,
    #[error("no free file name left for {0:?}")]
    NamesExhausted(String),
    #[error("unsupported gallery extension {0:?}")]
    UnsupportedFormat(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl GalleryError {
    fn io(path: &Path, source: io::Error) -> Self {
        GalleryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// `target` appeared between allocation and write
    pub fn is_already_exists(&self, target: &Path) -> bool {
        matches!(self, GalleryError::Io { path, source }
            if path == target && source.kind() == io::ErrorKind::AlreadyExists)
    }
}

/// Normalized extension and the format the gallery will encode with
pub fn writable_format(extension: &str) -> Result<(String, ImageFormat), GalleryError> {
    let extension = extension.trim_start_matches('.').to_ascii_lowercase();
    let format = ImageFormat::from_extension(&extension)
        .filter(|f| f.writing_enabled())
        .ok_or_else(|| GalleryError::UnsupportedFormat(extension.clone()))?;
    Ok((extension, format))
}

/// One enrolled reference image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryEntry {
    pub path: PathBuf,
    pub identity: String,
}

impl GalleryEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Backing storage for enrolled faces.
///
/// Every call reflects the current state of the store; implementations must
/// not cache listings between calls.
pub trait GalleryStore {
    /// All entries, in the order identification will visit them
    fn enumerate(&self) -> Result<Vec<GalleryEntry>, GalleryError>;

    /// A destination for a new enrollment of `display_name` that is not taken yet
    fn allocate_path(&self, display_name: &str) -> Result<PathBuf, GalleryError>;

    fn load(&self, entry: &GalleryEntry) -> Result<FaceImage, GalleryError>;

    /// Write `face` to `path`. Must fail rather than replace an existing entry.
    fn persist(&self, face: &FaceImage, path: &Path) -> Result<(), GalleryError>;

    fn len(&self) -> Result<usize, GalleryError> {
        Ok(self.enumerate()?.len())
    }
}

/// Gallery kept as one flat directory of images, named by [`naming`]
#[derive(Debug, Clone)]
pub struct DirectoryGallery {
    dir: PathBuf,
    extension: String,
    format: ImageFormat,
}

impl DirectoryGallery {
    pub fn new(dir: impl Into<PathBuf>, extension: &str) -> Result<Self, GalleryError> {
        let (extension, format) = writable_format(extension)?;
        Ok(Self {
            dir: dir.into(),
            extension,
            format,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self, GalleryError> {
        Self::new(&cfg.gallery_dir, &cfg.extension)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), GalleryError> {
        if !self.dir.is_dir() {
            debug!("creating gallery directory {}", self.dir.display());
        }
        fs::create_dir_all(&self.dir).map_err(|e| GalleryError::io(&self.dir, e))
    }
}

impl GalleryStore for DirectoryGallery {
    /// Regular files sorted by file name. Dotfiles are never produced by the
    /// naming scheme and are left out.
    fn enumerate(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        self.ensure_dir()?;
        let listing = fs::read_dir(&self.dir).map_err(|e| GalleryError::io(&self.dir, e))?;

        let mut entries = Vec::new();
        for item in listing {
            let item = item.map_err(|e| GalleryError::io(&self.dir, e))?;
            let path = item.path();
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!("skipping non UTF-8 file name {}", path.display());
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            match naming::identity_of(file_name) {
                Some(identity) => entries.push(GalleryEntry {
                    identity,
                    path: path.clone(),
                }),
                None => warn!("skipping {}: no identity in file name", path.display()),
            }
        }
        entries.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
        Ok(entries)
    }

    fn allocate_path(&self, display_name: &str) -> Result<PathBuf, GalleryError> {
        if display_name.is_empty() {
            return Err(GalleryError::EmptyName);
        }
        for index in 0..=u32::MAX {
            let candidate = self
                .dir
                .join(naming::file_name(display_name, index, &self.extension));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
        Err(GalleryError::NamesExhausted(display_name.to_string()))
    }

    fn load(&self, entry: &GalleryEntry) -> Result<FaceImage, GalleryError> {
        let img = image::open(&entry.path).map_err(|source| GalleryError::Image {
            path: entry.path.clone(),
            source,
        })?;
        Ok(FaceImage::new(img))
    }

    fn persist(&self, face: &FaceImage, path: &Path) -> Result<(), GalleryError> {
        self.ensure_dir()?;
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| GalleryError::io(path, e))?;
        let mut writer = BufWriter::new(file);

        let img = face.as_dynamic();
        // JPEG has no alpha channel
        let converted;
        let img = if self.format == ImageFormat::Jpeg && img.color().has_alpha() {
            converted = DynamicImage::ImageRgb8(img.to_rgb8());
            &converted
        } else {
            img
        };

        let written = img
            .write_to(&mut writer, self.format)
            .map_err(|source| GalleryError::Image {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|()| writer.flush().map_err(|e| GalleryError::io(path, e)));
        if written.is_err() {
            // do not leave a truncated image behind for the next identification
            drop(writer);
            if let Err(e) = fs::remove_file(path) {
                warn!("could not remove partial file {}: {}", path.display(), e);
            }
        }
        written
    }
}

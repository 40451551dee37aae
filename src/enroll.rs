use crate::storage::{GalleryError, GalleryStore};
use facerec_vision::FaceImage;
use log::{debug, info, warn};
use std::path::PathBuf;

/// How often a destination is allocated again when another writer took it first
const MAX_ALLOCATION_ATTEMPTS: usize = 8;

/// A request to store one face under a display name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollRequest {
    pub name: String,
}

impl EnrollRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Store `face` as a new gallery entry and return where it went
pub fn try_enroll<S: GalleryStore + ?Sized>(
    store: &S,
    face: &FaceImage,
    request: &EnrollRequest,
) -> Result<PathBuf, GalleryError> {
    if request.name.is_empty() {
        return Err(GalleryError::EmptyName);
    }

    for _ in 0..MAX_ALLOCATION_ATTEMPTS {
        let path = store.allocate_path(&request.name)?;
        match store.persist(face, &path) {
            Ok(()) => {
                info!("enrolled {:?} as {}", request.name, path.display());
                return Ok(path);
            }
            Err(e) if e.is_already_exists(&path) => {
                debug!("{} was taken before it was written, retrying", path.display());
            }
            Err(e) => return Err(e),
        }
    }
    Err(GalleryError::NamesExhausted(request.name.clone()))
}

/// Like [`try_enroll`], but failures are logged and reported as `false`
pub fn enroll<S: GalleryStore + ?Sized>(
    store: &S,
    face: &FaceImage,
    request: &EnrollRequest,
) -> bool {
    match try_enroll(store, face, request) {
        Ok(_) => true,
        Err(e) => {
            warn!("enrollment of {:?} failed: {}", request.name, e);
            false
        }
    }
}

use crate::config::Config;
use crate::enroll::{self, EnrollRequest};
use crate::storage::{GalleryEntry, GalleryError, GalleryStore};
use facerec_vision::{FaceImage, FeatureExtractor, OrbExtractor, OrbParams, Pipeline};
use log::{debug, info, warn};
use serde::Serialize;
use std::fmt;

/// Outcome of an identification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status", content = "name")]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn name(&self) -> Option<&str> {
        match self {
            Identity::Known(name) => Some(name),
            Identity::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Known(name) => f.write_str(name),
            Identity::Unknown => f.write_str("???"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BestMatch {
    pub entry: GalleryEntry,
    pub similarity: u32,
}

/// Scores a face against every gallery entry and keeps the most similar one.
///
/// The gallery is listed afresh on every call. Each scan costs one decode and
/// one extraction per entry, which only suits small galleries.
pub struct Recognizer<S, E = OrbExtractor> {
    store: S,
    pipeline: Pipeline<E>,
    error_threshold: u32,
}

impl<S: GalleryStore> Recognizer<S, OrbExtractor> {
    pub fn from_config(store: S, cfg: &Config) -> Self {
        let pipeline = Pipeline::new(OrbParams::from(&cfg.orb), cfg.match_radius);
        Self::new(store, pipeline, cfg.error_threshold)
    }
}

impl<S: GalleryStore, E: FeatureExtractor> Recognizer<S, E> {
    pub fn new(store: S, pipeline: Pipeline<E>, error_threshold: u32) -> Self {
        Self {
            store,
            pipeline,
            error_threshold,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn pipeline(&self) -> &Pipeline<E> {
        &self.pipeline
    }

    pub fn error_threshold(&self) -> u32 {
        self.error_threshold
    }

    /// Most similar gallery entry, `None` if nothing scored above zero.
    ///
    /// Ties keep the entry visited first; the visiting order is the store's
    /// enumeration order and callers should not rely on it.
    pub fn best_match(&self, face: &FaceImage) -> Result<Option<BestMatch>, GalleryError> {
        let query = self.pipeline.describe(face);
        let entries = self.store.enumerate()?;
        if query.is_empty() {
            debug!("query face has no descriptors, skipping {} entries", entries.len());
            return Ok(None);
        }

        let mut best: Option<BestMatch> = None;
        for entry in entries {
            let reference = match self.store.load(&entry) {
                Ok(reference) => reference,
                Err(e) => {
                    warn!("skipping gallery entry: {}", e);
                    continue;
                }
            };
            let train = self.pipeline.describe(&reference);
            let similarity = self.pipeline.similarity(&query, &train);
            debug!("{} scored {}", entry.file_name(), similarity);

            let most_similar = best.as_ref().map_or(0, |b| b.similarity);
            if similarity > most_similar {
                best = Some(BestMatch { entry, similarity });
            }
        }
        Ok(best)
    }

    /// Identity together with the match it was decided on
    pub fn identify_with_match(
        &self,
        face: &FaceImage,
    ) -> Result<(Identity, Option<BestMatch>), GalleryError> {
        let best = self.best_match(face)?;
        let identity = match &best {
            Some(m) if m.similarity > self.error_threshold => {
                info!(
                    "identified {:?} (similarity {}, threshold {})",
                    m.entry.identity, m.similarity, self.error_threshold
                );
                Identity::Known(m.entry.identity.clone())
            }
            Some(m) => {
                debug!(
                    "best match {} scored {}, not above threshold {}",
                    m.entry.file_name(),
                    m.similarity,
                    self.error_threshold
                );
                Identity::Unknown
            }
            None => Identity::Unknown,
        };
        Ok((identity, best))
    }

    /// Identity of the best match if it clears the error threshold
    pub fn identify(&self, face: &FaceImage) -> Identity {
        match self.identify_with_match(face) {
            Ok((identity, _)) => identity,
            Err(e) => {
                warn!("gallery unavailable: {}", e);
                Identity::Unknown
            }
        }
    }

    pub fn enroll(&self, face: &FaceImage, request: &EnrollRequest) -> bool {
        enroll::enroll(&self.store, face, request)
    }

    pub fn current_gallery_size(&self) -> usize {
        self.store.len().unwrap_or_else(|e| {
            warn!("gallery unavailable: {}", e);
            0
        })
    }
}

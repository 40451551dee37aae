pub mod config;
pub mod enroll;
pub mod matcher;
pub mod naming;
pub mod storage;

// Re-export vision types for convenience
pub use facerec_vision::{
    descriptor, face, hamming, orb, pipeline, DescriptorSet, FaceImage, FeatureExtractor,
    OrbExtractor, Pipeline,
};

pub use enroll::EnrollRequest;
pub use matcher::{BestMatch, Identity, Recognizer};
pub use storage::{DirectoryGallery, GalleryEntry, GalleryError, GalleryStore};

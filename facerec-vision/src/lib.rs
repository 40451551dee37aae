pub mod descriptor;
pub mod face;
pub mod hamming;
pub mod orb;
pub mod pipeline;

// Re-export commonly used types
pub use descriptor::{DescriptorSet, Keypoint};
pub use face::FaceImage;
pub use hamming::{BruteForceMatcher, DescriptorMatch};
pub use orb::{FeatureExtractor, OrbExtractor, OrbParams};
pub use pipeline::Pipeline;

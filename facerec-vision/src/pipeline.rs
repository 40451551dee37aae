use log::debug;

use crate::descriptor::DescriptorSet;
use crate::face::FaceImage;
use crate::hamming::{self, BruteForceMatcher};
use crate::orb::{FeatureExtractor, OrbExtractor, OrbParams};

/// Full comparison: extract → match → score
pub struct Pipeline<E = OrbExtractor> {
    pub extractor: E,
    pub matcher: BruteForceMatcher,
    pub radius: u32,
}

impl Pipeline<OrbExtractor> {
    pub fn new(params: OrbParams, radius: u32) -> Self {
        Self::with_extractor(OrbExtractor::new(params), radius)
    }
}

impl<E: FeatureExtractor> Pipeline<E> {
    pub fn with_extractor(extractor: E, radius: u32) -> Self {
        Self {
            extractor,
            matcher: BruteForceMatcher::new(),
            radius,
        }
    }

    pub fn describe(&self, face: &FaceImage) -> DescriptorSet {
        self.extractor.extract(face)
    }

    /// Similarity of two already-described faces. Incomparable sets score 0.
    pub fn similarity(&self, query: &DescriptorSet, train: &DescriptorSet) -> u32 {
        match self.matcher.match_sets(query, train) {
            Some(matches) => hamming::score(&matches, self.radius),
            None => 0,
        }
    }

    /// Describe both faces and score them (convenience method)
    pub fn compare(&self, a: &FaceImage, b: &FaceImage) -> u32 {
        let query = self.describe(a);
        let train = self.describe(b);
        let similarity = self.similarity(&query, &train);
        debug!(
            "compared {} and {} descriptors: similarity {}",
            query.len(),
            train.len(),
            similarity
        );
        similarity
    }
}

impl Default for Pipeline<OrbExtractor> {
    fn default() -> Self {
        Self::new(OrbParams::default(), hamming::DEFAULT_RADIUS)
    }
}

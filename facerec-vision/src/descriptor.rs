use ndarray::{Array2, ArrayView1};

/// Oriented keypoint, coordinates in level-0 pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub angle: f32, // radians
    pub octave: u32,
    pub size: f32,
    pub response: f32,
}

/// Local descriptors extracted from one face image, one row per keypoint
#[derive(Debug, Clone)]
pub struct DescriptorSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Array2<u8>,
}

impl DescriptorSet {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: Array2<u8>) -> Self {
        debug_assert_eq!(keypoints.len(), descriptors.nrows());
        Self {
            keypoints,
            descriptors,
        }
    }

    pub fn empty() -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Array2::zeros((0, 0)),
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per descriptor. An empty set carries no configuration and reports 0.
    pub fn dim(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.descriptors.ncols()
        }
    }

    pub fn row(&self, idx: usize) -> ArrayView1<'_, u8> {
        self.descriptors.row(idx)
    }

    /// Two sets can only be paired when their descriptors have the same length.
    pub fn is_comparable(&self, other: &DescriptorSet) -> bool {
        self.dim() == other.dim()
    }
}

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView, GrayImage};
use std::path::Path;

/// One cropped face, as handed over by the detection stage
#[derive(Debug, Clone)]
pub struct FaceImage {
    image: DynamicImage,
}

impl FaceImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    /// Decode a face crop from disk
    pub fn open(path: &Path) -> Result<Self> {
        let image = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
        Ok(Self { image })
    }

    /// Crop a region out of a full frame. The region is clamped to the frame bounds.
    pub fn crop(frame: &DynamicImage, x: u32, y: u32, width: u32, height: u32) -> Self {
        let (fw, fh) = frame.dimensions();
        let x = x.min(fw);
        let y = y.min(fh);
        let width = width.min(fw - x);
        let height = height.min(fh - y);
        Self {
            image: frame.crop_imm(x, y, width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Luma view used by the feature extractor
    pub fn to_gray(&self) -> GrayImage {
        self.image.to_luma8()
    }
}

impl From<DynamicImage> for FaceImage {
    fn from(image: DynamicImage) -> Self {
        Self::new(image)
    }
}

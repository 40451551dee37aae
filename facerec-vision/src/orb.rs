//! Oriented FAST and rotated BRIEF feature extraction
//!
//! Per pyramid level:
//! - FAST-9 segment test on a radius-3 circle, 3x3 non-max suppression
//! - Harris response (7x7 block) ranks the corners, best `n` per level survive
//! - orientation from the intensity centroid of a circular patch
//! - 256-bit BRIEF on the smoothed level, sampling pattern rotated by the orientation
//!
//! The sampling pattern comes from a fixed seed, so extraction is deterministic.

use image::{imageops, GrayImage};
use log::{debug, error};
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::descriptor::{DescriptorSet, Keypoint};
use crate::face::FaceImage;

pub const DESCRIPTOR_BYTES: usize = 32;
/// No image reaches more pyramid levels than this at any scale factor worth using
pub const MAX_LEVELS: u32 = 32;
/// Upper bound for `patch_size` and `edge_threshold`
pub const MAX_PATCH_SIZE: u32 = 255;

const PATTERN_SEED: u64 = 0x5eed_0f_b41e;
const BLUR_SIGMA: f32 = 2.0;
const HARRIS_K: f32 = 0.04;
const HARRIS_HALF_BLOCK: i32 = 3;
const FAST_ARC: usize = 9;

/// Bresenham circle of radius 3, clockwise from 12 o'clock
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Turns a face crop into local descriptors.
///
/// Implementations must be deterministic and return an empty set for images
/// with nothing to describe instead of failing.
pub trait FeatureExtractor {
    fn extract(&self, image: &FaceImage) -> DescriptorSet;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrbParams {
    pub n_features: usize,
    pub scale_factor: f32,
    pub n_levels: u32,
    pub edge_threshold: u32,
    pub patch_size: u32,
    pub fast_threshold: u8,
}

impl Default for OrbParams {
    fn default() -> Self {
        Self {
            n_features: 500,
            scale_factor: 1.2,
            n_levels: 8,
            edge_threshold: 31,
            patch_size: 31,
            fast_threshold: 20,
        }
    }
}

type PointPair = [(i32, i32); 2];

pub struct OrbExtractor {
    params: OrbParams,
    half_patch: i32,
    border: u32,
    pattern: Vec<PointPair>,
}

impl OrbExtractor {
    pub fn new(mut params: OrbParams) -> Self {
        // a flat pyramid would only repeat level 0
        if !(params.scale_factor > 1.0) {
            params.n_levels = 1;
        }
        params.n_levels = params.n_levels.clamp(1, MAX_LEVELS);
        params.patch_size = params.patch_size.min(MAX_PATCH_SIZE);
        params.edge_threshold = params.edge_threshold.min(MAX_PATCH_SIZE);

        let half_patch = (params.patch_size as i32 / 2).max(2);
        let border = params.edge_threshold.max(half_patch as u32 + 1);
        let pattern = sampling_pattern(half_patch - 1);
        Self {
            params,
            half_patch,
            border,
            pattern,
        }
    }

    pub fn params(&self) -> &OrbParams {
        &self.params
    }

    /// Split the feature budget geometrically over the pyramid levels
    fn features_per_level(&self) -> Vec<usize> {
        let levels = self.params.n_levels as usize;
        let total = self.params.n_features;
        if levels == 1 {
            return vec![total];
        }

        let factor = 1.0 / self.params.scale_factor;
        let mut desired =
            total as f32 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));
        let mut counts = Vec::with_capacity(levels);
        let mut assigned = 0usize;
        for _ in 0..levels - 1 {
            let n = (desired.round() as usize).min(total - assigned);
            counts.push(n);
            assigned += n;
            desired *= factor;
        }
        counts.push(total - assigned);
        counts
    }

    fn pyramid_level(&self, gray: &GrayImage, scale: f32) -> Option<GrayImage> {
        let width = (gray.width() as f32 / scale).round() as u32;
        let height = (gray.height() as f32 / scale).round() as u32;
        if width <= 2 * self.border || height <= 2 * self.border {
            return None;
        }
        if width == gray.width() && height == gray.height() {
            return Some(gray.clone());
        }
        Some(imageops::resize(
            gray,
            width,
            height,
            imageops::FilterType::Triangle,
        ))
    }

    fn describe_level(
        &self,
        level_img: &GrayImage,
        level: u32,
        scale: f32,
        budget: usize,
        keypoints: &mut Vec<Keypoint>,
        rows: &mut Vec<u8>,
    ) {
        let corners = detect_fast(level_img, self.params.fast_threshold, self.border);
        if corners.is_empty() {
            return;
        }

        let mut ranked: Vec<(u32, u32, f32)> = corners
            .into_iter()
            .map(|(x, y)| (x, y, harris_response(level_img, x, y)))
            .collect();
        ranked.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(budget);

        let smoothed = imageops::blur(level_img, BLUR_SIGMA);
        for (x, y, response) in ranked {
            let angle = intensity_centroid_angle(level_img, x, y, self.half_patch);
            rows.extend_from_slice(&self.brief(&smoothed, x, y, angle));
            keypoints.push(Keypoint {
                x: x as f32 * scale,
                y: y as f32 * scale,
                angle,
                octave: level,
                size: self.params.patch_size as f32 * scale,
                response,
            });
        }
    }

    fn brief(&self, smoothed: &GrayImage, x: u32, y: u32, angle: f32) -> [u8; DESCRIPTOR_BYTES] {
        let (sin, cos) = angle.sin_cos();
        let rotate = |(px, py): (i32, i32)| {
            let (px, py) = (px as f32, py as f32);
            (
                x as i32 + (px * cos - py * sin).round() as i32,
                y as i32 + (px * sin + py * cos).round() as i32,
            )
        };

        let mut out = [0u8; DESCRIPTOR_BYTES];
        for (bit, pair) in self.pattern.iter().enumerate() {
            let (ax, ay) = rotate(pair[0]);
            let (bx, by) = rotate(pair[1]);
            if sample(smoothed, ax, ay) < sample(smoothed, bx, by) {
                out[bit / 8] |= 1 << (bit % 8);
            }
        }
        out
    }
}

impl Default for OrbExtractor {
    fn default() -> Self {
        Self::new(OrbParams::default())
    }
}

impl FeatureExtractor for OrbExtractor {
    fn extract(&self, image: &FaceImage) -> DescriptorSet {
        let gray = image.to_gray();
        let mut keypoints = Vec::new();
        let mut rows = Vec::new();

        for (level, budget) in self.features_per_level().into_iter().enumerate() {
            let scale = self.params.scale_factor.powi(level as i32);
            let Some(level_img) = self.pyramid_level(&gray, scale) else {
                break;
            };
            if budget == 0 {
                continue;
            }
            self.describe_level(
                &level_img,
                level as u32,
                scale,
                budget,
                &mut keypoints,
                &mut rows,
            );
        }

        debug!(
            "extracted {} keypoints from {}x{} face",
            keypoints.len(),
            gray.width(),
            gray.height()
        );

        if keypoints.is_empty() {
            return DescriptorSet::empty();
        }
        match Array2::from_shape_vec((keypoints.len(), DESCRIPTOR_BYTES), rows) {
            Ok(descriptors) => DescriptorSet::new(keypoints, descriptors),
            Err(e) => {
                error!("descriptor buffer has the wrong shape: {}", e);
                DescriptorSet::empty()
            }
        }
    }
}

/// BRIEF point pairs drawn from an isotropic Gaussian, kept inside a disk of `radius`
fn sampling_pattern(radius: i32) -> Vec<PointPair> {
    let radius = radius.max(1);
    let sigma = (2 * radius + 1) as f32 / 5.0;
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    let mut point = move || loop {
        let u1: f32 = rng.gen_range(f32::EPSILON..1.0);
        let u2: f32 = rng.gen();
        let r = (-2.0 * u1.ln()).sqrt() * sigma;
        let theta = std::f32::consts::TAU * u2;
        let x = (r * theta.cos()).round() as i32;
        let y = (r * theta.sin()).round() as i32;
        if x * x + y * y <= radius * radius {
            return (x, y);
        }
    };
    (0..DESCRIPTOR_BYTES * 8)
        .map(|_| [point(), point()])
        .collect()
}

fn sample(img: &GrayImage, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, img.width() as i32 - 1) as u32;
    let y = y.clamp(0, img.height() as i32 - 1) as u32;
    img.get_pixel(x, y)[0]
}

/// FAST-9 corners with 3x3 non-max suppression, excluding `border` pixels on every side
fn detect_fast(img: &GrayImage, threshold: u8, border: u32) -> Vec<(u32, u32)> {
    let (w, h) = img.dimensions();
    let border = border.max(3);
    if w <= 2 * border || h <= 2 * border {
        return Vec::new();
    }

    let width = w as usize;
    let mut scores = vec![0.0f32; width * h as usize];
    for y in border..h - border {
        for x in border..w - border {
            scores[y as usize * width + x as usize] = fast_score(img, x, y, threshold);
        }
    }

    let mut corners = Vec::new();
    for y in border..h - border {
        for x in border..w - border {
            let idx = y as usize * width + x as usize;
            let score = scores[idx];
            if score <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'nms: for dy in -1i32..=1 {
                for dx in -1i32..=1 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let n = (y as i32 + dy) as usize * width + (x as i32 + dx) as usize;
                    // ties go to the first pixel in raster order
                    let earlier = dy < 0 || (dy == 0 && dx < 0);
                    if (earlier && scores[n] >= score) || (!earlier && scores[n] > score) {
                        is_max = false;
                        break 'nms;
                    }
                }
            }
            if is_max {
                corners.push((x, y));
            }
        }
    }
    corners
}

/// Segment test score, 0 when the pixel is not a corner
fn fast_score(img: &GrayImage, x: u32, y: u32, threshold: u8) -> f32 {
    let center = img.get_pixel(x, y)[0] as i16;
    let t = threshold as i16;

    let mut ring = [0i16; 16];
    for (i, (dx, dy)) in CIRCLE.iter().enumerate() {
        ring[i] = img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as i16;
    }

    let brighter = |v: i16| v > center + t;
    let darker = |v: i16| v < center - t;

    let tests: [&dyn Fn(i16) -> bool; 2] = [&brighter, &darker];
    for test in tests {
        let mut run = 0usize;
        let mut longest = 0usize;
        for i in 0..32 {
            if test(ring[i % 16]) {
                run += 1;
                longest = longest.max(run);
            } else {
                run = 0;
            }
        }
        if longest >= FAST_ARC {
            return ring
                .iter()
                .filter(|&&v| test(v))
                .map(|&v| ((v - center).abs() - t) as f32)
                .sum();
        }
    }
    0.0
}

fn harris_response(img: &GrayImage, x: u32, y: u32) -> f32 {
    let px = |x: i32, y: i32| sample(img, x, y) as f32;
    let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
    for dy in -HARRIS_HALF_BLOCK..=HARRIS_HALF_BLOCK {
        for dx in -HARRIS_HALF_BLOCK..=HARRIS_HALF_BLOCK {
            let cx = x as i32 + dx;
            let cy = y as i32 + dy;
            let ix = (px(cx + 1, cy - 1) + 2.0 * px(cx + 1, cy) + px(cx + 1, cy + 1))
                - (px(cx - 1, cy - 1) + 2.0 * px(cx - 1, cy) + px(cx - 1, cy + 1));
            let iy = (px(cx - 1, cy + 1) + 2.0 * px(cx, cy + 1) + px(cx + 1, cy + 1))
                - (px(cx - 1, cy - 1) + 2.0 * px(cx, cy - 1) + px(cx + 1, cy - 1));
            a += ix * ix;
            b += iy * iy;
            c += ix * iy;
        }
    }
    a * b - c * c - HARRIS_K * (a + b) * (a + b)
}

fn intensity_centroid_angle(img: &GrayImage, x: u32, y: u32, radius: i32) -> f32 {
    let (mut m01, mut m10) = (0.0f32, 0.0f32);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let v = sample(img, x as i32 + dx, y as i32 + dy) as f32;
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Luma};

    fn blocks(size: u32, block: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let cells = size.div_ceil(block);
        let shades: Vec<u8> = (0..cells * cells).map(|_| rng.gen()).collect();
        GrayImage::from_fn(size, size, |x, y| {
            Luma([shades[((y / block) * cells + x / block) as usize]])
        })
    }

    #[test]
    fn test_features_per_level_sums_to_budget() {
        let extractor = OrbExtractor::default();
        let counts = extractor.features_per_level();
        assert_eq!(counts.len(), 8);
        assert_eq!(counts.iter().sum::<usize>(), 500);
        assert!(counts[0] > counts[7]);
    }

    #[test]
    fn test_single_level_without_scaling() {
        let extractor = OrbExtractor::new(OrbParams {
            scale_factor: 1.0,
            ..OrbParams::default()
        });
        assert_eq!(extractor.features_per_level(), vec![500]);
    }

    #[test]
    fn test_oversized_params_are_clamped() {
        let extractor = OrbExtractor::new(OrbParams {
            n_levels: 4_000_000_000,
            edge_threshold: u32::MAX,
            patch_size: u32::MAX,
            ..OrbParams::default()
        });
        assert_eq!(extractor.params().n_levels, MAX_LEVELS);
        assert_eq!(extractor.features_per_level().len(), MAX_LEVELS as usize);
        assert_eq!(extractor.params().edge_threshold, MAX_PATCH_SIZE);

        let face = FaceImage::new(DynamicImage::ImageLuma8(blocks(100, 4, 2)));
        assert!(extractor.extract(&face).is_empty());
    }

    #[test]
    fn test_pattern_fits_patch() {
        let pattern = sampling_pattern(14);
        assert_eq!(pattern.len(), 256);
        for pair in &pattern {
            for (x, y) in pair {
                assert!(x * x + y * y <= 14 * 14);
            }
        }
        assert_eq!(pattern, sampling_pattern(14));
    }

    #[test]
    fn test_flat_image_has_no_corners() {
        let flat = GrayImage::from_pixel(64, 64, Luma([128]));
        assert!(detect_fast(&flat, 20, 3).is_empty());
    }

    #[test]
    fn test_fast_finds_isolated_square_corner() {
        let mut img = GrayImage::from_pixel(32, 32, Luma([20]));
        for y in 16..32 {
            for x in 16..32 {
                img.put_pixel(x, y, Luma([220]));
            }
        }
        assert!(fast_score(&img, 16, 16, 20) > 0.0);
        assert_eq!(fast_score(&img, 8, 8, 20), 0.0);
    }

    #[test]
    fn test_orientation_points_to_bright_side() {
        let img = GrayImage::from_fn(41, 41, |x, _| Luma([if x > 20 { 255 } else { 0 }]));
        let angle = intensity_centroid_angle(&img, 20, 20, 15);
        assert!(angle.abs() < 0.01, "angle {}", angle);
    }

    #[test]
    fn test_tiny_image_yields_empty_set() {
        let extractor = OrbExtractor::default();
        let face = FaceImage::new(DynamicImage::ImageLuma8(blocks(40, 4, 1)));
        assert!(extractor.extract(&face).is_empty());
    }

    #[test]
    fn test_textured_image_is_described() {
        let extractor = OrbExtractor::default();
        let face = FaceImage::new(DynamicImage::ImageLuma8(blocks(160, 8, 7)));
        let set = extractor.extract(&face);
        assert!(set.len() > 10, "only {} descriptors", set.len());
        assert!(set.len() <= 500);
        assert_eq!(set.dim(), DESCRIPTOR_BYTES);
        for kp in &set.keypoints {
            assert!(kp.x >= 0.0 && kp.x < 160.0);
            assert!(kp.y >= 0.0 && kp.y < 160.0);
        }
    }
}

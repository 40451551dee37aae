use anyhow::Result;
use facerec_vision::{hamming, FaceImage, FeatureExtractor, OrbExtractor, OrbParams, Pipeline};
use image::{DynamicImage, GrayImage, Luma};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Blocky random texture standing in for a face crop
fn synthetic_face(size: u32, block: u32, seed: u64) -> FaceImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let cells = size.div_ceil(block);
    let shades: Vec<u8> = (0..cells * cells).map(|_| rng.gen()).collect();
    let img = GrayImage::from_fn(size, size, |x, y| {
        Luma([shades[((y / block) * cells + x / block) as usize]])
    });
    FaceImage::new(DynamicImage::ImageLuma8(img))
}

#[test]
fn test_extraction_is_deterministic() -> Result<()> {
    env_logger::try_init().ok();
    let extractor = OrbExtractor::default();
    let face = synthetic_face(160, 8, 11);

    let first = extractor.extract(&face);
    let second = extractor.extract(&face);
    assert!(!first.is_empty());
    assert_eq!(first.descriptors, second.descriptors);
    assert_eq!(first.keypoints, second.keypoints);

    // a fresh extractor draws the same sampling pattern
    let third = OrbExtractor::new(OrbParams::default()).extract(&face);
    assert_eq!(first.descriptors, third.descriptors);
    Ok(())
}

#[test]
fn test_self_comparison_beats_cross_comparison() -> Result<()> {
    env_logger::try_init().ok();
    let pipeline: Pipeline = Pipeline::default();
    let alice = synthetic_face(160, 8, 1);
    let bob = synthetic_face(160, 8, 2);

    let same = pipeline.compare(&alice, &alice);
    let cross = pipeline.compare(&alice, &bob);
    println!("alice <-> alice: {}, alice <-> bob: {}", same, cross);

    assert_eq!(same, pipeline.describe(&alice).len() as u32);
    assert!(same > cross);
    Ok(())
}

#[test]
fn test_shifted_crop_still_matches() -> Result<()> {
    env_logger::try_init().ok();
    let pipeline: Pipeline = Pipeline::default();
    let frame = synthetic_face(180, 8, 5);
    let crop_a = FaceImage::crop(frame.as_dynamic(), 0, 0, 170, 170);
    let crop_b = FaceImage::crop(frame.as_dynamic(), 4, 4, 170, 170);

    let similarity = pipeline.compare(&crop_a, &crop_b);
    println!("shifted crops: {}", similarity);
    assert!(similarity > 3, "shifted crop scored {}", similarity);
    Ok(())
}

#[test]
fn test_radius_monotonicity_on_real_descriptors() -> Result<()> {
    env_logger::try_init().ok();
    let extractor = OrbExtractor::default();
    let query = extractor.extract(&synthetic_face(160, 8, 21));
    let train = extractor.extract(&synthetic_face(160, 6, 22));

    let matches = facerec_vision::BruteForceMatcher::new()
        .match_sets(&query, &train)
        .expect("both sets use 32-byte descriptors");
    assert_eq!(matches.len(), query.len());

    let scores: Vec<u32> = [0, 25, 50, 75, 100, 256]
        .iter()
        .map(|&radius| hamming::score(&matches, radius))
        .collect();
    assert!(scores.windows(2).all(|w| w[0] <= w[1]), "{:?}", scores);
    assert_eq!(*scores.last().unwrap(), query.len() as u32);
    Ok(())
}

#[test]
fn test_degenerate_query_scores_zero() -> Result<()> {
    env_logger::try_init().ok();
    let pipeline: Pipeline = Pipeline::default();
    let flat = FaceImage::new(DynamicImage::ImageLuma8(GrayImage::from_pixel(
        160,
        160,
        Luma([90]),
    )));
    let textured = synthetic_face(160, 8, 3);

    assert!(pipeline.describe(&flat).is_empty());
    assert_eq!(pipeline.compare(&flat, &textured), 0);
    assert_eq!(pipeline.compare(&textured, &flat), 0);
    Ok(())
}

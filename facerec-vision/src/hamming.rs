use log::debug;
use ndarray::ArrayView1;

use crate::descriptor::DescriptorSet;

/// Default acceptance radius for 256-bit BRIEF descriptors
pub const DEFAULT_RADIUS: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: u32,
}

pub fn hamming_distance(a: ArrayView1<'_, u8>, b: ArrayView1<'_, u8>) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// One-way brute-force nearest neighbour matcher under Hamming distance
#[derive(Debug, Clone, Copy, Default)]
pub struct BruteForceMatcher;

impl BruteForceMatcher {
    pub fn new() -> Self {
        Self
    }

    /// Pair every query descriptor with its nearest train descriptor.
    ///
    /// Returns `None` when the sets have different descriptor lengths, which
    /// means they were produced by incompatible extractors and cannot be paired.
    /// Ties go to the lowest train index.
    pub fn match_sets(
        &self,
        query: &DescriptorSet,
        train: &DescriptorSet,
    ) -> Option<Vec<DescriptorMatch>> {
        if !query.is_comparable(train) {
            debug!(
                "skipping incomparable descriptor sets ({} vs {} bytes)",
                query.dim(),
                train.dim()
            );
            return None;
        }

        let matches = query
            .descriptors
            .rows()
            .into_iter()
            .enumerate()
            .filter_map(|(query_idx, q)| {
                train
                    .descriptors
                    .rows()
                    .into_iter()
                    .enumerate()
                    .map(|(train_idx, t)| (train_idx, hamming_distance(q, t)))
                    .min_by_key(|&(train_idx, distance)| (distance, train_idx))
                    .map(|(train_idx, distance)| DescriptorMatch {
                        query_idx,
                        train_idx,
                        distance,
                    })
            })
            .collect();
        Some(matches)
    }
}

/// Count the matches whose distance lies within `radius`
pub fn score(matches: &[DescriptorMatch], radius: u32) -> u32 {
    matches.iter().filter(|m| m.distance <= radius).count() as u32
}

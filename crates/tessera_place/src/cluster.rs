//! Embedding clustering: seeded k-means over the block vectors.
//!
//! Blocks with similar walk neighborhoods embed close together; k-means over
//! the embedding space yields the clusters the global placer packs onto the
//! board. Everything is seeded, so the labeling is reproducible.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use tessera_common::{BlockId, ClusterId};

use crate::data::{Clusters, EmbeddingMap, FixedPositions};
use crate::error::PlaceError;

const MAX_ITER: usize = 300;
const TOLERANCE: f64 = 1e-4;

/// The default cluster-count heuristic: `ceil(n / 40) + 1` for CGRAs,
/// `ceil(n / 300) + 1` for FPGAs.
pub fn default_num_clusters(num_blocks: usize, is_fpga: bool) -> usize {
    let per_cluster = if is_fpga { 300.0 } else { 40.0 };
    (num_blocks as f64 / per_cluster).ceil() as usize + 1
}

fn squared_distance(a: &[f32], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &c)| {
            let d = f64::from(x) - c;
            d * d
        })
        .sum()
}

/// Picks initial centroids with k-means++ seeding.
fn seed_centroids(points: &[&[f32]], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids: Vec<Vec<f64>> = Vec::with_capacity(k);
    let first = rng.gen_range(0..points.len());
    centroids.push(points[first].iter().map(|&v| f64::from(v)).collect());

    while centroids.len() < k {
        let distances: Vec<f64> = points
            .iter()
            .map(|p| {
                centroids
                    .iter()
                    .map(|c| squared_distance(p, c))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = distances.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (i, d) in distances.iter().enumerate() {
                if target < *d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            // all points coincide with a centroid already
            rng.gen_range(0..points.len())
        };
        centroids.push(points[next].iter().map(|&v| f64::from(v)).collect());
    }
    centroids
}

/// Runs Lloyd's algorithm, returning a label per point.
fn lloyd(points: &[&[f32]], k: usize, rng: &mut StdRng) -> Vec<usize> {
    let dim = points[0].len();
    let mut centroids = seed_centroids(points, k, rng);
    let mut labels = vec![0usize; points.len()];

    for _ in 0..MAX_ITER {
        for (i, p) in points.iter().enumerate() {
            let mut best = 0;
            let mut best_dist = f64::INFINITY;
            for (c, centroid) in centroids.iter().enumerate() {
                let d = squared_distance(p, centroid);
                if d < best_dist {
                    best_dist = d;
                    best = c;
                }
            }
            labels[i] = best;
        }

        let mut sums = vec![vec![0.0f64; dim]; k];
        let mut counts = vec![0usize; k];
        for (i, p) in points.iter().enumerate() {
            counts[labels[i]] += 1;
            for (s, &v) in sums[labels[i]].iter_mut().zip(p.iter()) {
                *s += f64::from(v);
            }
        }

        // an empty cluster steals the point farthest from its centroid
        for c in 0..k {
            if counts[c] > 0 {
                continue;
            }
            let farthest = (0..points.len())
                .filter(|&i| counts[labels[i]] > 1)
                .max_by(|&a, &b| {
                    let da = squared_distance(points[a], &centroids[labels[a]]);
                    let db = squared_distance(points[b], &centroids[labels[b]]);
                    da.total_cmp(&db)
                });
            if let Some(i) = farthest {
                counts[labels[i]] -= 1;
                for (s, &v) in sums[labels[i]].iter_mut().zip(points[i].iter()) {
                    *s -= f64::from(v);
                }
                labels[i] = c;
                counts[c] = 1;
                for (s, &v) in sums[c].iter_mut().zip(points[i].iter()) {
                    *s += f64::from(v);
                }
            }
        }

        let mut max_shift = 0.0f64;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            for (d, s) in centroids[c].iter_mut().zip(&sums[c]) {
                let new = s / counts[c] as f64;
                max_shift = max_shift.max((new - *d).abs());
                *d = new;
            }
        }
        if max_shift < TOLERANCE {
            break;
        }
    }
    labels
}

/// Clusters the embedded blocks into at most `k` groups.
///
/// `k` is clamped to the block count. Fixed blocks are labeled like any
/// other but excluded from the resulting clusters — they already have
/// positions. Inconsistent embedding dimensions are rejected.
pub fn cluster_embeddings(
    embeddings: &EmbeddingMap,
    fixed: &FixedPositions,
    k: usize,
    seed: u64,
) -> Result<Clusters, PlaceError> {
    if embeddings.is_empty() {
        return Ok(Clusters::new());
    }
    let blocks: Vec<BlockId> = embeddings.keys().copied().collect();
    let points: Vec<&[f32]> = embeddings.values().map(|v| v.as_slice()).collect();

    let dim = points[0].len();
    if dim == 0 {
        return Err(PlaceError::InvalidInput(format!(
            "embedding for {} is empty",
            blocks[0]
        )));
    }
    for (block, point) in blocks.iter().zip(&points) {
        if point.len() != dim {
            return Err(PlaceError::InvalidInput(format!(
                "embedding for {block} has dimension {}, expected {dim}",
                point.len()
            )));
        }
    }

    let k = k.clamp(1, blocks.len());
    let mut rng = StdRng::seed_from_u64(seed);
    let labels = lloyd(&points, k, &mut rng);

    let mut clusters = Clusters::new();
    for (i, block) in blocks.iter().enumerate() {
        if fixed.contains_key(block) {
            continue;
        }
        clusters
            .entry(ClusterId(labels[i] as u32))
            .or_insert_with(BTreeSet::new)
            .insert(*block);
    }
    clusters.retain(|_, members| !members.is_empty());

    let sizes: Vec<usize> = clusters.values().map(|m| m.len()).collect();
    log::debug!(
        "k-means: {} clusters over {} blocks, sizes {:?}",
        clusters.len(),
        blocks.len(),
        sizes
    );
    Ok(clusters)
}

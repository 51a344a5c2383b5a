//! Palette clustering using k-means.
//!
//! Initial centroids are chosen with k-means++ seeding: the first centroid is a uniformly random pixel,
//! and each subsequent centroid is sampled with probability proportional to the squared
//! [`distance`](crate::distance) between a pixel and its nearest already chosen centroid.
//! This keeps images dominated by one hue from collapsing into a single visual cluster.
//!
//! Seeding is followed by a fixed number of Lloyd iterations. There is no early exit on convergence,
//! which keeps the cost of a call bounded by `pixels * k * iterations` distance computations.
//!
//! A centroid that has no pixels assigned to it keeps its previous value and is never reseeded.
//! Such a centroid may stay "dead" for the remaining iterations. With the small `k` and
//! bounded iteration counts used for palettes, this only shows up as an extra near-duplicate centroid,
//! which the [`vibrancy`](crate::vibrancy) post-processing removes.
//!
//! Since seeding is random, results are not reproducible across runs unless the random number generator
//! is seeded (see [`cluster_with`]).

use crate::distance::distance_squared;
use log::trace;
use palette::Srgb;
use rand::{prelude::Distribution, Rng, SeedableRng};
use rand_distr::{Uniform, WeightedIndex};
use rand_xoshiro::Xoroshiro128PlusPlus;

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// The default number of Lloyd iterations.
pub const DEFAULT_ITERATIONS: u32 = 15;

/// The output of clustering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Clusters {
    /// The final cluster centroids.
    ///
    /// The centroids are not guaranteed to be unique.
    pub centroids: Vec<Srgb<u8>>,
    /// The number of pixels assigned to each centroid in the final iteration.
    ///
    /// Each count is not guaranteed to be non-zero.
    pub counts: Vec<u32>,
}

impl Clusters {
    /// Every pixel becomes its own cluster.
    fn trivial(pixels: &[Srgb<u8>]) -> Self {
        Self {
            centroids: pixels.to_vec(),
            counts: vec![1; pixels.len()],
        }
    }

    /// The total number of pixels across all clusters.
    #[must_use]
    pub fn total_count(&self) -> u64 {
        self.counts.iter().copied().map(u64::from).sum()
    }
}

/// Running channel sums and member counts for each centroid during one assignment pass.
#[derive(Debug, Clone)]
struct Accumulator {
    /// The channel sums of the pixels assigned to each centroid.
    sums: Vec<[u64; 3]>,
    /// The number of pixels assigned to each centroid.
    counts: Vec<u32>,
}

impl Accumulator {
    /// Creates an empty accumulator for `k` centroids.
    fn new(k: usize) -> Self {
        Self { sums: vec![[0; 3]; k], counts: vec![0; k] }
    }

    /// Assigns `color` to the centroid at index `i`.
    #[inline]
    fn add(&mut self, i: usize, color: Srgb<u8>) {
        let sum = &mut self.sums[i];
        sum[0] += u64::from(color.red);
        sum[1] += u64::from(color.green);
        sum[2] += u64::from(color.blue);
        self.counts[i] += 1;
    }

    /// Combines the assignments of two partial passes.
    #[cfg(feature = "threads")]
    fn merge(mut self, other: Self) -> Self {
        for (sum, other) in self.sums.iter_mut().zip(other.sums) {
            for (s, o) in sum.iter_mut().zip(other) {
                *s += o;
            }
        }
        for (count, other) in self.counts.iter_mut().zip(other.counts) {
            *count += other;
        }
        self
    }
}

/// Returns the index of the centroid nearest to `color`, preferring the lowest index on ties.
#[inline]
fn nearest(centroids: &[Srgb<u8>], color: Srgb<u8>) -> usize {
    let mut min_index = 0;
    let mut min_distance = f64::INFINITY;
    for (i, &centroid) in centroids.iter().enumerate() {
        let distance = distance_squared(color, centroid);
        if distance < min_distance {
            min_distance = distance;
            min_index = i;
        }
    }
    min_index
}

/// Rounds `sum / count` to the nearest integer.
#[inline]
#[allow(clippy::cast_possible_truncation)]
fn rounded_mean(sum: u64, count: u32) -> u8 {
    let count = u64::from(count);
    ((sum + count / 2) / count) as u8
}

/// Chooses `k` initial centroids from `pixels` using k-means++ seeding.
///
/// `pixels` must not be empty.
fn plus_plus_seeds<R: Rng>(pixels: &[Srgb<u8>], k: usize, rng: &mut R) -> Vec<Srgb<u8>> {
    let uniform = Uniform::new(0, pixels.len());

    let first = pixels[uniform.sample(rng)];
    let mut centroids = Vec::with_capacity(k);
    centroids.push(first);

    let mut nearest_distance = pixels
        .iter()
        .map(|&pixel| distance_squared(pixel, first))
        .collect::<Vec<_>>();

    while centroids.len() < k {
        // WeightedIndex::new fails if every weight is zero, which happens when every pixel
        // is already a centroid (the image has fewer distinct colors than k).
        let next = match WeightedIndex::<f64>::new(&nearest_distance) {
            Ok(weighted) => pixels[weighted.sample(rng)],
            Err(err) => {
                trace!("k-means++ falling back to uniform seeding: {err}");
                pixels[uniform.sample(rng)]
            }
        };

        centroids.push(next);

        for (d, &pixel) in nearest_distance.iter_mut().zip(pixels) {
            *d = d.min(distance_squared(pixel, next));
        }
    }

    centroids
}

/// The clustering state across Lloyd iterations.
struct State<'a> {
    /// The pixels being clustered.
    pixels: &'a [Srgb<u8>],
    /// The current centroids.
    centroids: Vec<Srgb<u8>>,
    /// The number of pixels assigned to each centroid in the latest pass.
    counts: Vec<u32>,
}

impl<'a> State<'a> {
    /// Creates a new [`State`] with the given initial centroids.
    fn new(pixels: &'a [Srgb<u8>], centroids: Vec<Srgb<u8>>) -> Self {
        Self {
            pixels,
            counts: vec![0; centroids.len()],
            centroids,
        }
    }

    /// Assigns each pixel to its nearest centroid.
    fn assign(&self) -> Accumulator {
        let mut acc = Accumulator::new(self.centroids.len());
        for &pixel in self.pixels {
            acc.add(nearest(&self.centroids, pixel), pixel);
        }
        acc
    }

    /// Assigns each pixel to its nearest centroid in parallel.
    #[cfg(feature = "threads")]
    fn assign_par(&self) -> Accumulator {
        let k = self.centroids.len();
        self.pixels
            .par_iter()
            .fold(
                || Accumulator::new(k),
                |mut acc, &pixel| {
                    acc.add(nearest(&self.centroids, pixel), pixel);
                    acc
                },
            )
            .reduce(|| Accumulator::new(k), Accumulator::merge)
    }

    /// Moves each centroid to the mean of its assigned pixels.
    /// Centroids without any pixels keep their previous value.
    fn update(&mut self, acc: Accumulator) {
        let Accumulator { sums, counts } = acc;

        for ((centroid, sum), &count) in self.centroids.iter_mut().zip(&sums).zip(&counts) {
            if count > 0 {
                *centroid = Srgb::new(
                    rounded_mean(sum[0], count),
                    rounded_mean(sum[1], count),
                    rounded_mean(sum[2], count),
                );
            }
        }

        self.counts = counts;
    }

    /// Consumes the state, returning the centroids and counts.
    fn into_clusters(self) -> Clusters {
        let Self { centroids, counts, .. } = self;
        Clusters { centroids, counts }
    }
}

/// Creates a random number generator seeded from entropy.
pub(crate) fn entropy_rng() -> Xoroshiro128PlusPlus {
    Xoroshiro128PlusPlus::seed_from_u64(rand::random())
}

/// Clusters `pixels` into at most `k` colors using `iterations` Lloyd iterations.
///
/// The random number generator is seeded from entropy,
/// so the output may differ between calls on the same input.
///
/// If `pixels` is empty, the output is empty.
/// If there are at most `k` pixels, the pixels are returned unchanged.
#[must_use]
pub fn cluster(pixels: &[Srgb<u8>], k: usize, iterations: u32) -> Vec<Srgb<u8>> {
    cluster_with(pixels, k, iterations, &mut entropy_rng())
}

/// Clusters `pixels` like [`cluster`], but with the provided random number generator.
///
/// Use a seeded generator for reproducible results.
#[must_use]
pub fn cluster_with<R: Rng>(
    pixels: &[Srgb<u8>],
    k: usize,
    iterations: u32,
    rng: &mut R,
) -> Vec<Srgb<u8>> {
    cluster_with_counts(pixels, k, iterations, rng).centroids
}

/// Clusters `pixels` like [`cluster_with`], also returning the number of pixels in each cluster.
#[must_use]
pub fn cluster_with_counts<R: Rng>(
    pixels: &[Srgb<u8>],
    k: usize,
    iterations: u32,
    rng: &mut R,
) -> Clusters {
    if pixels.is_empty() || k == 0 {
        Clusters::default()
    } else if pixels.len() <= k {
        Clusters::trivial(pixels)
    } else {
        let mut state = State::new(pixels, plus_plus_seeds(pixels, k, rng));
        // one pass is still needed to report counts
        for _ in 0..iterations.max(1) {
            let acc = state.assign();
            if iterations == 0 {
                state.counts = acc.counts;
            } else {
                state.update(acc);
            }
        }
        state.into_clusters()
    }
}

/// Clusters `pixels` like [`cluster_with_counts`], running each assignment step in parallel.
#[cfg(feature = "threads")]
#[must_use]
pub fn cluster_with_counts_par<R: Rng>(
    pixels: &[Srgb<u8>],
    k: usize,
    iterations: u32,
    rng: &mut R,
) -> Clusters {
    if pixels.is_empty() || k == 0 {
        Clusters::default()
    } else if pixels.len() <= k {
        Clusters::trivial(pixels)
    } else {
        let mut state = State::new(pixels, plus_plus_seeds(pixels, k, rng));
        for _ in 0..iterations.max(1) {
            let acc = state.assign_par();
            if iterations == 0 {
                state.counts = acc.counts;
            } else {
                state.update(acc);
            }
        }
        state.into_clusters()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{distance::distance, tests::*};

    #[test]
    fn empty_input() {
        let mut rng = test_rng();
        assert_eq!(cluster_with(&[], 7, DEFAULT_ITERATIONS, &mut rng), Vec::new());
        assert_eq!(
            cluster_with_counts(&[], 7, DEFAULT_ITERATIONS, &mut rng),
            Clusters::default()
        );
    }

    #[test]
    fn not_enough_pixels() {
        let pixels = test_pixels(5);
        let mut rng = test_rng();

        assert_eq!(cluster_with(&pixels, 7, DEFAULT_ITERATIONS, &mut rng), pixels);
        assert_eq!(cluster_with(&pixels, 5, DEFAULT_ITERATIONS, &mut rng), pixels);

        let clusters = cluster_with_counts(&pixels, 7, DEFAULT_ITERATIONS, &mut rng);
        assert_eq!(clusters.counts, vec![1; 5]);
    }

    #[test]
    fn returns_k_centroids() {
        let pixels = test_pixels(1024);
        let mut rng = test_rng();

        for k in [1, 2, 7, 14] {
            let clusters = cluster_with_counts(&pixels, k, DEFAULT_ITERATIONS, &mut rng);
            assert_eq!(clusters.centroids.len(), k);
            assert_eq!(clusters.counts.len(), k);
            assert_eq!(clusters.total_count(), 1024);
        }

        assert_eq!(cluster(&pixels, 7, DEFAULT_ITERATIONS).len(), 7);
    }

    #[test]
    fn zero_iterations_reports_counts() {
        let pixels = test_pixels(100);
        let clusters = cluster_with_counts(&pixels, 7, 0, &mut test_rng());
        assert_eq!(clusters.centroids.len(), 7);
        assert_eq!(clusters.total_count(), 100);
        for centroid in &clusters.centroids {
            assert!(pixels.contains(centroid));
        }
    }

    #[test]
    fn seeding_spreads_over_distinct_colors() {
        let colors = [
            Srgb::new(255, 0, 0),
            Srgb::new(0, 255, 0),
            Srgb::new(0, 0, 255),
            Srgb::new(255, 255, 255),
        ];

        // heavily skewed towards red
        let mut pixels = vec![colors[0]; 1000];
        pixels.extend(colors[1..].iter().flat_map(|&c| [c; 10]));

        for seed in 0..16 {
            let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
            let centroids = plus_plus_seeds(&pixels, 4, &mut rng);
            for color in colors {
                assert!(centroids.contains(&color), "seed {seed}: {centroids:?}");
            }
        }
    }

    #[test]
    fn uniform_input_collapses() {
        let black = Srgb::new(0, 0, 0);
        let pixels = vec![black; 100];
        let clusters = cluster_with_counts(&pixels, 7, DEFAULT_ITERATIONS, &mut test_rng());

        assert_eq!(clusters.centroids, vec![black; 7]);
        // all pixels go to the first of the tied centroids, the rest keep their value
        assert_eq!(clusters.counts, vec![100, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn finds_well_separated_clusters() {
        let colors = [
            Srgb::new(200, 30, 30),
            Srgb::new(30, 200, 30),
            Srgb::new(30, 30, 200),
        ];

        let mut rng = test_rng();
        let pixels = colors
            .iter()
            .flat_map(|&c| jitter(c, 200, 6, &mut rng))
            .collect::<Vec<_>>();

        let centroids = cluster_with(&pixels, 3, DEFAULT_ITERATIONS, &mut rng);
        for color in colors {
            assert!(
                centroids.iter().any(|&c| distance(c, color) < 25.0),
                "{color:?} not in {centroids:?}"
            );
        }
    }

    #[test]
    fn centroid_is_rounded_mean() {
        assert_eq!(rounded_mean(3, 2), 2);
        assert_eq!(rounded_mean(5, 4), 1);
        assert_eq!(rounded_mean(255 * 7, 7), 255);
    }

    #[test]
    fn same_seed_same_output() {
        let pixels = test_pixels(500);
        let a = cluster_with_counts(&pixels, 9, DEFAULT_ITERATIONS, &mut test_rng());
        let b = cluster_with_counts(&pixels, 9, DEFAULT_ITERATIONS, &mut test_rng());
        assert_eq!(a, b);
    }

    #[cfg(feature = "threads")]
    #[test]
    fn parallel_matches_serial() {
        let pixels = test_pixels(2048);
        let serial = cluster_with_counts(&pixels, 11, DEFAULT_ITERATIONS, &mut test_rng());
        let parallel = cluster_with_counts_par(&pixels, 11, DEFAULT_ITERATIONS, &mut test_rng());
        assert_eq!(serial, parallel);
    }
}

//! Turns raw cluster centroids into a ranked palette.
//!
//! Post-processing runs in the following order:
//! 1. Near-duplicate centroids are removed. Candidates are visited in input order and a candidate
//!    is kept only if its [`distance`] to every already kept color exceeds the dedup threshold,
//!    so the first occurrence of a near-duplicate wins.
//! 2. If fewer colors than requested survive, the dropped candidates are added back in input order.
//!    This way, a degenerate image (e.g., a single flat color) still yields the requested number of colors.
//! 3. The colors are sorted by their [`vibrancy`] score, most vibrant first.
//! 4. The list is truncated to the requested number of colors.
//!
//! The [`dominant`] color is then selected from the final list using a separate score,
//! since the most displayable color is not necessarily the dominant one.

use crate::{distance::distance, kmeans::Clusters, names::nearest_name, Color, Hsl};
use bitvec::vec::BitVec;
use log::trace;
use ordered_float::OrderedFloat;
use palette::Srgb;
use std::cmp::Reverse;

/// The default minimum distance between two colors of a palette.
pub const DEFAULT_DEDUP_THRESHOLD: f64 = 25.0;

/// Scores how "vibrant" a color is.
///
/// Saturated colors with a lightness near `50` score highest,
/// while near-black, near-white, and gray colors score lowest.
#[must_use]
pub fn vibrancy(hsl: Hsl) -> f64 {
    let saturation = f64::from(hsl.saturation);
    let lightness = f64::from(hsl.lightness);
    saturation * 0.6 + (50.0 - (lightness - 50.0).abs()) * 0.4
}

/// Scores how suitable a color is as the dominant color.
///
/// This is the saturation, halved for colors that are very dark or very light.
#[must_use]
pub fn dominance(hsl: Hsl) -> f64 {
    let factor = if 20 < hsl.lightness && hsl.lightness < 80 { 1.0 } else { 0.5 };
    f64::from(hsl.saturation) * factor
}

/// Returns a mask of the centroids that survive greedy deduplication.
fn dedup_mask(centroids: &[Srgb<u8>], dedup_threshold: f64) -> BitVec {
    let mut mask: BitVec = BitVec::repeat(false, centroids.len());
    let mut kept = Vec::with_capacity(centroids.len());

    for (i, &color) in centroids.iter().enumerate() {
        if kept.iter().all(|&k| distance(color, k) > dedup_threshold) {
            mask.set(i, true);
            kept.push(color);
        }
    }

    mask
}

/// Selects the indices of the centroids that make up the palette (before ranking).
fn select(centroids: &[Srgb<u8>], target_count: usize, dedup_threshold: f64) -> Vec<usize> {
    let mask = dedup_mask(centroids, dedup_threshold);
    let mut selected = mask.iter_ones().collect::<Vec<_>>();
    trace!(
        "dedup kept {} of {} centroids at threshold {dedup_threshold}",
        selected.len(),
        centroids.len(),
    );

    if selected.len() < target_count {
        let missing = target_count - selected.len();
        selected.extend(mask.iter_zeros().take(missing));
        trace!("backfilled {} near-duplicate centroids", selected.len() - mask.count_ones());
    }

    selected
}

/// Computes each selected color's share of the pixels in percent.
///
/// Pixels of a centroid that was not selected are credited to the nearest selected color.
#[allow(clippy::cast_precision_loss)]
fn percentages(centroids: &[Srgb<u8>], counts: &[u32], selected: &[usize]) -> Vec<f32> {
    let total = counts.iter().copied().map(u64::from).sum::<u64>();
    let mut shares = selected
        .iter()
        .map(|&i| u64::from(counts[i]))
        .collect::<Vec<_>>();

    let mut is_selected: BitVec = BitVec::repeat(false, centroids.len());
    for &i in selected {
        is_selected.set(i, true);
    }

    for i in is_selected.iter_zeros() {
        let nearest = selected
            .iter()
            .enumerate()
            .min_by_key(|&(_, &s)| OrderedFloat(distance(centroids[i], centroids[s])));

        if let Some((j, _)) = nearest {
            shares[j] += u64::from(counts[i]);
        }
    }

    if total == 0 {
        vec![0.0; shares.len()]
    } else {
        shares
            .into_iter()
            .map(|share| (share as f64 * 100.0 / total as f64) as f32)
            .collect()
    }
}

/// Sorts colors by descending [`vibrancy`]. Ties keep their relative order.
pub fn rank(colors: &mut [Color]) {
    colors.sort_by_key(|color| Reverse(OrderedFloat(vibrancy(color.hsl()))));
}

/// Post-processes centroids into a palette of at most `target_count` colors.
///
/// The output only has fewer than `target_count` colors if there were fewer centroids than that.
#[must_use]
pub fn process(centroids: &[Srgb<u8>], target_count: usize, dedup_threshold: f64) -> Vec<Color> {
    let selected = select(centroids, target_count, dedup_threshold);
    finish(centroids, &selected, None, target_count)
}

/// Post-processes clusters like [`process`], also filling in each color's [`Color::percentage`].
#[must_use]
pub fn process_clusters(clusters: &Clusters, target_count: usize, dedup_threshold: f64) -> Vec<Color> {
    let Clusters { centroids, counts } = clusters;
    let selected = select(centroids, target_count, dedup_threshold);
    let percentages = percentages(centroids, counts, &selected);
    finish(centroids, &selected, Some(&percentages), target_count)
}

/// Builds, names, ranks, and truncates the selected colors.
fn finish(
    centroids: &[Srgb<u8>],
    selected: &[usize],
    percentages: Option<&[f32]>,
    target_count: usize,
) -> Vec<Color> {
    let mut colors = selected
        .iter()
        .enumerate()
        .map(|(j, &i)| {
            let rgb = centroids[i];
            let color = Color::from_rgb(rgb).with_name(nearest_name(rgb));
            match percentages {
                Some(percentages) => color.with_percentage(percentages[j]),
                None => color,
            }
        })
        .collect::<Vec<_>>();

    rank(&mut colors);
    colors.truncate(target_count);
    colors
}

/// Returns the color with the highest [`dominance`] score, preferring earlier colors on ties.
#[must_use]
pub fn dominant(colors: &[Color]) -> Option<&Color> {
    colors
        .iter()
        .min_by_key(|color| Reverse(OrderedFloat(dominance(color.hsl()))))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{rgb_to_hsl, tests::*};

    fn rgbs(colors: &[Color]) -> Vec<Srgb<u8>> {
        colors.iter().map(Color::rgb).collect()
    }

    #[test]
    fn empty_input() {
        assert!(process(&[], 5, DEFAULT_DEDUP_THRESHOLD).is_empty());
        assert!(dominant(&[]).is_none());
    }

    #[test]
    fn vibrancy_scores() {
        let red = rgb_to_hsl(Srgb::new(255, 0, 0));
        let white = rgb_to_hsl(Srgb::new(255, 255, 255));
        let gray = rgb_to_hsl(Srgb::new(128, 128, 128));
        assert!((vibrancy(red) - 80.0).abs() < 1e-9);
        assert!(vibrancy(white).abs() < 1e-9);
        assert!(vibrancy(red) > vibrancy(gray));
        assert!(vibrancy(gray) > vibrancy(white));
    }

    #[test]
    fn first_near_duplicate_wins() {
        let centroids = [
            Srgb::new(200, 20, 20),
            Srgb::new(205, 22, 18),
            Srgb::new(20, 20, 200),
            Srgb::new(22, 18, 204),
        ];

        let colors = process(&centroids, 2, DEFAULT_DEDUP_THRESHOLD);
        let mut rgbs = rgbs(&colors);
        rgbs.sort_by_key(|c| c.into_components());
        let mut expected = vec![centroids[0], centroids[2]];
        expected.sort_by_key(|c| c.into_components());
        assert_eq!(rgbs, expected);
    }

    #[test]
    fn kept_colors_are_separated() {
        let centroids = test_pixels(64);
        let colors = process(&centroids, 10, DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(colors.len(), 10);
        for (i, a) in colors.iter().enumerate() {
            for b in &colors[i + 1..] {
                assert!(distance(a.rgb(), b.rgb()) > DEFAULT_DEDUP_THRESHOLD);
            }
        }
    }

    #[test]
    fn sorted_by_vibrancy() {
        let centroids = test_pixels(32);
        let colors = process(&centroids, 8, DEFAULT_DEDUP_THRESHOLD);
        for pair in colors.windows(2) {
            assert!(vibrancy(pair[0].hsl()) >= vibrancy(pair[1].hsl()));
        }
    }

    #[test]
    fn backfills_degenerate_input() {
        let black = Srgb::new(0, 0, 0);
        let colors = process(&[black; 7], 3, DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(rgbs(&colors), vec![black; 3]);
    }

    #[test]
    fn idempotent() {
        let centroids = test_pixels(40);
        for target in [3, 6, 10] {
            let first = process(&centroids, target, DEFAULT_DEDUP_THRESHOLD);
            let second = process(&rgbs(&first), target, DEFAULT_DEDUP_THRESHOLD);
            assert_eq!(rgbs(&first), rgbs(&second));
        }

        let black = [Srgb::new(0, 0, 0); 7];
        let first = process(&black, 3, DEFAULT_DEDUP_THRESHOLD);
        let second = process(&rgbs(&first), 3, DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(rgbs(&first), rgbs(&second));
    }

    #[test]
    fn dominant_differs_from_most_vibrant() {
        // hsl(0, 100, 85): very vibrant but too light to dominate
        let light = Srgb::new(255, 179, 179);
        // hsl(0, 70, 50)
        let deep = Srgb::new(217, 38, 38);

        let colors = process(&[deep, light], 2, DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(rgbs(&colors), vec![light, deep]);
        assert_eq!(dominant(&colors).map(Color::rgb), Some(deep));
    }

    #[test]
    fn percentages_absorb_duplicates() {
        let clusters = Clusters {
            centroids: vec![
                Srgb::new(200, 20, 20),
                Srgb::new(20, 20, 200),
                Srgb::new(202, 20, 20),
                Srgb::new(20, 200, 20),
            ],
            counts: vec![30, 25, 20, 25],
        };

        let colors = process_clusters(&clusters, 3, DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(colors.len(), 3);

        let red = colors
            .iter()
            .find(|c| c.rgb() == Srgb::new(200, 20, 20))
            .unwrap();
        assert_eq!(red.percentage(), Some(50.0));

        let total = colors.iter().filter_map(Color::percentage).sum::<f32>();
        assert!((total - 100.0).abs() < 1e-3);
    }

    #[test]
    fn colors_are_named() {
        let colors = process(&[Srgb::new(250, 5, 5)], 3, DEFAULT_DEDUP_THRESHOLD);
        assert_eq!(colors[0].name(), Some("Red"));
        assert_eq!(colors[0].percentage(), None);
    }
}

use crate::{
    cache::cache_key, kmeans, vibrancy, CancellationToken, ExtractionError, ExtractionOptions,
    ExtractionResult, PixelBuffer, Result, ResultCache,
};
use log::debug;
use std::{sync::Arc, time::Instant};

/// Extracts a palette from a pixel buffer.
///
/// The buffer should already be downsampled to the `options` quality tier.
/// The pixels are clustered into `color_count + 4` clusters, which are then deduplicated,
/// ranked by vibrancy, and truncated to `color_count` colors.
///
/// # Errors
/// Returns [`ExtractionError::InvalidInput`] if the options are out of range,
/// or [`ExtractionError::Failure`] if no palette could be produced.
///
/// # Examples
/// ```
/// # use prismatic::{extract, ExtractionOptions, PixelBuffer};
/// # fn main() -> prismatic::Result<()> {
/// let data = [255u8, 0, 0, 255].repeat(16 * 16);
/// let buffer = PixelBuffer::rgba(data, 16, 16)?;
///
/// let result = extract(&buffer, &ExtractionOptions::new().color_count(3))?;
/// assert_eq!(result.dominant_color.hex(), "#FF0000");
/// # Ok(())
/// # }
/// ```
pub fn extract(buffer: &PixelBuffer, options: &ExtractionOptions) -> Result<ExtractionResult> {
    extract_cancellable(buffer, options, &CancellationToken::new())
}

/// Extracts a palette like [`extract`], polling `token` before and after clustering.
///
/// Clustering itself is not interrupted once started.
///
/// # Errors
/// Returns [`ExtractionError::Cancelled`] if `token` was cancelled at a checkpoint,
/// or any error [`extract`] returns.
pub fn extract_cancellable(
    buffer: &PixelBuffer,
    options: &ExtractionOptions,
    token: &CancellationToken,
) -> Result<ExtractionResult> {
    let start = Instant::now();
    options.validate()?;
    debug!(
        "extracting {} colors from {} pixels at {} quality",
        options.color_count,
        buffer.num_pixels(),
        options.quality,
    );

    let pixels = buffer.pixels().collect::<Vec<_>>();
    token.check()?;

    let clusters = kmeans::cluster_with_counts(
        &pixels,
        options.cluster_count(),
        options.iterations,
        &mut options.rng(),
    );
    token.check()?;

    finish(&clusters, options, start)
}

/// Extracts a palette like [`extract_cancellable`], running the clustering assignment steps in parallel.
///
/// # Errors
/// See [`extract_cancellable`].
#[cfg(feature = "threads")]
pub fn extract_par(
    buffer: &PixelBuffer,
    options: &ExtractionOptions,
    token: &CancellationToken,
) -> Result<ExtractionResult> {
    let start = Instant::now();
    options.validate()?;
    debug!(
        "extracting {} colors from {} pixels at {} quality",
        options.color_count,
        buffer.num_pixels(),
        options.quality,
    );

    let pixels = buffer.pixels().collect::<Vec<_>>();
    token.check()?;

    let clusters = kmeans::cluster_with_counts_par(
        &pixels,
        options.cluster_count(),
        options.iterations,
        &mut options.rng(),
    );
    token.check()?;

    finish(&clusters, options, start)
}

/// Post-processes the clusters and assembles the timed result.
fn finish(
    clusters: &kmeans::Clusters,
    options: &ExtractionOptions,
    start: Instant,
) -> Result<ExtractionResult> {
    let colors = vibrancy::process_clusters(
        clusters,
        usize::from(options.color_count),
        options.dedup_threshold,
    );

    let dominant_color = vibrancy::dominant(&colors)
        .cloned()
        .ok_or_else(|| ExtractionError::failure("clustering produced no colors"))?;

    let processing_time = start.elapsed();
    debug!(
        "extracted {} colors from {} clusters in {processing_time:?}",
        colors.len(),
        clusters.centroids.len(),
    );

    Ok(ExtractionResult { colors, dominant_color, processing_time })
}

/// Extracts palettes with fixed options, memoizing results in a shared [`ResultCache`].
///
/// # Examples
/// ```
/// # use prismatic::{Extractor, ExtractionOptions, PixelBuffer, ResultCache};
/// # use std::sync::Arc;
/// # fn main() -> prismatic::Result<()> {
/// let cache = Arc::new(ResultCache::default());
/// let extractor = Extractor::new(ExtractionOptions::new().color_count(4), Arc::clone(&cache));
///
/// let buffer = PixelBuffer::rgba([0u8, 128, 255, 255].repeat(64), 8, 8)?;
/// let first = extractor.extract_cached("https://example.com/a.jpg", &buffer)?;
/// let second = extractor.extract_cached("https://example.com/a.jpg", &buffer)?;
/// assert_eq!(first, second);
/// assert_eq!(cache.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Extractor {
    /// The options for every extraction.
    options: ExtractionOptions,
    /// The shared result cache.
    cache: Arc<ResultCache>,
}

impl Extractor {
    /// Creates a new [`Extractor`] with the given options and cache.
    #[must_use]
    pub fn new(options: ExtractionOptions, cache: Arc<ResultCache>) -> Self {
        Self { options, cache }
    }

    /// The options used for every extraction.
    #[must_use]
    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    /// The shared result cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// The cache key for an image identity under this extractor's options.
    ///
    /// Every option that affects the palette is part of the key,
    /// so extractors with different options can share a cache.
    #[must_use]
    pub fn key(&self, identity: &str) -> String {
        let ExtractionOptions { color_count, quality, iterations, dedup_threshold, seed } =
            self.options;

        let seed = seed.map_or_else(|| "entropy".to_owned(), |seed| seed.to_string());
        cache_key(&format!(
            "{identity}#{color_count}#{quality}#{iterations}#{dedup_threshold}#{seed}"
        ))
    }

    /// Extracts a palette without consulting the cache.
    ///
    /// # Errors
    /// See [`extract`].
    pub fn extract(&self, buffer: &PixelBuffer) -> Result<ExtractionResult> {
        extract(buffer, &self.options)
    }

    /// Returns the cached palette for the image `identity`, or extracts and caches it.
    ///
    /// # Errors
    /// See [`extract`]. Errors are not cached.
    pub fn extract_cached(&self, identity: &str, buffer: &PixelBuffer) -> Result<ExtractionResult> {
        self.cache
            .try_get_or_compute(&self.key(identity), || extract(buffer, &self.options))
    }

    /// Like [`Extractor::extract_cached`], but cancels `caller`'s previous in-flight request.
    ///
    /// # Errors
    /// Returns [`ExtractionError::Cancelled`] if a newer request from `caller` superseded this one.
    /// See [`extract`] for other errors.
    pub fn extract_cached_for(
        &self,
        caller: &str,
        identity: &str,
        buffer: &PixelBuffer,
    ) -> Result<ExtractionResult> {
        self.cache.get_or_compute_for(caller, &self.key(identity), |token| {
            extract_cancellable(buffer, &self.options, token)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{distance::distance, hex_to_rgb, rgb_to_hsl, tests::*, Quality};
    use palette::Srgb;

    fn rgbs(colors: &[crate::Color]) -> Vec<Srgb<u8>> {
        colors.iter().map(crate::Color::rgb).collect()
    }

    fn assert_consistent(result: &ExtractionResult) {
        for color in result.colors.iter().chain([&result.dominant_color]) {
            assert_eq!(hex_to_rgb(color.hex()).unwrap(), color.rgb());
            assert_eq!(rgb_to_hsl(color.rgb()), color.hsl());
        }
        assert!(result.colors.contains(&result.dominant_color));
    }

    #[test]
    fn uniform_black_still_yields_requested_count() {
        let buffer = uniform_buffer(10, 10, [0, 0, 0]);
        let options = ExtractionOptions::new().color_count(3).seed(1);

        let result = extract(&buffer, &options).unwrap();
        assert_eq!(result.colors.len(), 3);
        for color in &result.colors {
            assert_eq!(color.hex(), "#000000");
        }
        assert_consistent(&result);
    }

    #[test]
    fn quadrants_prefer_vibrant_colors() {
        let buffer = quadrant_buffer(20);
        let expected = [
            Srgb::new(255, 0, 0),
            Srgb::new(0, 255, 0),
            Srgb::new(0, 0, 255),
        ];

        for seed in 0..8 {
            let options = ExtractionOptions::new().color_count(3).seed(seed);
            let result = extract(&buffer, &options).unwrap();
            assert_eq!(result.colors.len(), 3);

            for color in &result.colors {
                assert!(distance(color.rgb(), Srgb::new(255, 255, 255)) > 25.0);
            }
            for expected in expected {
                assert!(
                    result
                        .colors
                        .iter()
                        .any(|c| distance(c.rgb(), expected) <= 25.0),
                    "seed {seed}: {expected:?} missing from {:?}",
                    result.colors
                );
            }
            assert_consistent(&result);
        }
    }

    #[test]
    fn rejects_out_of_range_options() {
        let buffer = quadrant_buffer(4);
        for count in [2, 11] {
            let options = ExtractionOptions::new().color_count(count);
            assert!(matches!(
                extract(&buffer, &options),
                Err(ExtractionError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn tiny_buffer_is_not_clustered() {
        let buffer = PixelBuffer::rgba(vec![255u8, 0, 0, 255, 0, 0, 255, 255], 2, 1).unwrap();
        let result = extract(&buffer, &ExtractionOptions::new().color_count(3)).unwrap();
        assert_eq!(result.colors.len(), 2);
        assert_eq!(result.dominant_color.hsl().saturation, 100);
    }

    #[test]
    fn percentages_cover_all_pixels() {
        let buffer = quadrant_buffer(20);
        let result = extract(&buffer, &ExtractionOptions::new().color_count(4).seed(3)).unwrap();
        let total = result.colors.iter().filter_map(|c| c.percentage()).sum::<f32>();
        assert!((total - 100.0).abs() < 1e-3, "{total}");
    }

    #[test]
    fn seeded_extraction_is_reproducible() {
        let buffer = noise_buffer(40, 30);
        let options = ExtractionOptions::new().color_count(6).seed(7);
        let a = extract(&buffer, &options).unwrap();
        let b = extract(&buffer, &options).unwrap();
        assert_eq!(a.colors, b.colors);
        assert_consistent(&a);
    }

    #[test]
    fn cancellation_is_observed() {
        let buffer = noise_buffer(10, 10);
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            extract_cancellable(&buffer, &ExtractionOptions::new(), &token),
            Err(ExtractionError::Cancelled)
        );
    }

    #[cfg(feature = "threads")]
    #[test]
    fn parallel_matches_serial() {
        let buffer = noise_buffer(64, 64);
        let options = ExtractionOptions::new().color_count(8).seed(11);
        let serial = extract(&buffer, &options).unwrap();
        let parallel = extract_par(&buffer, &options, &CancellationToken::new()).unwrap();
        assert_eq!(serial.colors, parallel.colors);
    }

    #[test]
    fn extractor_caches_by_identity_and_options() {
        let cache = Arc::new(ResultCache::default());
        let buffer = quadrant_buffer(8);

        let low = Extractor::new(
            ExtractionOptions::new().color_count(3).quality(Quality::Low),
            Arc::clone(&cache),
        );
        let high = Extractor::new(
            ExtractionOptions::new().color_count(3).quality(Quality::High),
            Arc::clone(&cache),
        );

        let first = low.extract_cached("img1", &buffer).unwrap();
        let second = low.extract_cached("img1", &buffer).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);

        high.extract_cached("img1", &buffer).unwrap();
        assert_eq!(cache.len(), 2);
        assert_ne!(low.key("img1"), high.key("img1"));

        low.extract_cached_for("feed", "img2", &buffer).unwrap();
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn extractors_differing_in_threshold_do_not_share_entries() {
        let cache = Arc::new(ResultCache::default());
        let buffer = noise_buffer(32, 32);
        let options = ExtractionOptions::new().color_count(6).seed(5);

        let loose = Extractor::new(options, Arc::clone(&cache));
        let strict = Extractor::new(options.dedup_threshold(200.0), Arc::clone(&cache));
        assert_ne!(loose.key("img1"), strict.key("img1"));

        loose.extract_cached("img1", &buffer).unwrap();
        let cached = strict.extract_cached("img1", &buffer).unwrap();
        let fresh = strict.extract(&buffer).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(rgbs(&cached.colors), rgbs(&fresh.colors));
    }

    #[test]
    fn key_covers_every_option() {
        let cache = Arc::new(ResultCache::default());
        let base = ExtractionOptions::new();
        let key = |options| Extractor::new(options, Arc::clone(&cache)).key("img1");

        assert_eq!(key(base), key(ExtractionOptions::new()));
        assert_ne!(key(base), key(base.iterations(3)));
        assert_ne!(key(base), key(base.seed(1)));
        assert_ne!(key(base.seed(1)), key(base.seed(2)));
        assert_ne!(key(base), key(base.dedup_threshold(25.5)));
    }

    #[test]
    fn errors_are_not_cached_by_extractor() {
        let cache = Arc::new(ResultCache::default());
        let extractor = Extractor::new(ExtractionOptions::new().color_count(20), Arc::clone(&cache));
        assert!(extractor.extract_cached("img1", &quadrant_buffer(4)).is_err());
        assert!(cache.is_empty());
    }
}

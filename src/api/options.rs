//! Contains the builder structs for the extraction parameters.

use crate::{
    error::InvalidInput, kmeans::DEFAULT_ITERATIONS, vibrancy::DEFAULT_DEDUP_THRESHOLD, Result,
    MAX_COLORS, MIN_COLORS, OVERPROVISION,
};
use rand::SeedableRng;
use rand_xoshiro::Xoroshiro128PlusPlus;
use std::fmt::Display;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The sampling quality tier.
///
/// Each tier maps to the maximum width and height of the pixel buffer handed to extraction.
/// Downsampling happens before extraction, in the decoder
/// (see [`PixelBuffer::from_dynamic_image`](crate::PixelBuffer::from_dynamic_image) for a helper).
/// Higher tiers sample more pixels and trade speed for accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum Quality {
    /// At most `100x100` pixels.
    Low,
    /// At most `150x150` pixels.
    #[default]
    Medium,
    /// At most `200x200` pixels.
    High,
}

impl Quality {
    /// The maximum width and height of a pixel buffer sampled at this quality.
    #[must_use]
    pub const fn max_dimension(self) -> u32 {
        match self {
            Quality::Low => 100,
            Quality::Medium => 150,
            Quality::High => 200,
        }
    }
}

impl Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Quality::Low => "low",
            Quality::Medium => "medium",
            Quality::High => "high",
        };
        f.write_str(name)
    }
}

/// A builder struct to specify the parameters for palette extraction.
///
/// Values are checked by [`ExtractionOptions::validate`] when extraction runs;
/// out of range values are rejected rather than clamped.
///
/// # Examples
/// ```
/// # use prismatic::{ExtractionOptions, Quality};
/// let options = ExtractionOptions::new()
///     .color_count(6)
///     .quality(Quality::High)
///     .seed(42);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ExtractionOptions {
    /// The number of colors in the palette.
    pub(crate) color_count: u8,
    /// The quality tier the pixel buffer was sampled at.
    pub(crate) quality: Quality,
    /// The number of Lloyd iterations to run.
    pub(crate) iterations: u32,
    /// The minimum distance between two palette colors.
    pub(crate) dedup_threshold: f64,
    /// The seed for the random number generator, or `None` to seed from entropy.
    pub(crate) seed: Option<u64>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionOptions {
    /// Creates a new [`ExtractionOptions`] with default values.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            color_count: 5,
            quality: Quality::Medium,
            iterations: DEFAULT_ITERATIONS,
            dedup_threshold: DEFAULT_DEDUP_THRESHOLD,
            seed: None,
        }
    }

    /// Sets the number of colors in the palette. This must be in `MIN_COLORS..=MAX_COLORS`.
    ///
    /// The default color count is `5`.
    #[must_use]
    pub const fn color_count(mut self, color_count: u8) -> Self {
        self.color_count = color_count;
        self
    }

    /// Sets the quality tier.
    ///
    /// The default quality is [`Quality::Medium`].
    #[must_use]
    pub const fn quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Sets the number of Lloyd iterations for k-means.
    ///
    /// The default is `15`.
    #[must_use]
    pub const fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Sets the minimum distance two palette colors must have to both be kept.
    ///
    /// The default is `25.0`.
    #[must_use]
    pub const fn dedup_threshold(mut self, dedup_threshold: f64) -> Self {
        self.dedup_threshold = dedup_threshold;
        self
    }

    /// Sets the seed for the random number generator, making extraction reproducible.
    ///
    /// By default, each extraction is seeded from entropy.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Returns the configured number of palette colors.
    #[must_use]
    pub const fn get_color_count(&self) -> u8 {
        self.color_count
    }

    /// Returns the configured quality tier.
    #[must_use]
    pub const fn get_quality(&self) -> Quality {
        self.quality
    }

    /// Checks that every option is in range.
    ///
    /// # Errors
    /// Returns [`InvalidInput::ColorCountOutOfRange`] or [`InvalidInput::DedupThreshold`].
    pub fn validate(&self) -> Result<()> {
        if !(MIN_COLORS..=MAX_COLORS).contains(&self.color_count) {
            return Err(InvalidInput::ColorCountOutOfRange(self.color_count).into());
        }

        if !self.dedup_threshold.is_finite() || self.dedup_threshold < 0.0 {
            return Err(InvalidInput::DedupThreshold(self.dedup_threshold).into());
        }

        Ok(())
    }

    /// The number of clusters to request from k-means.
    ///
    /// This is more than the palette size, so that post-processing has material to deduplicate and rank.
    pub(crate) fn cluster_count(&self) -> usize {
        usize::from(self.color_count) + OVERPROVISION
    }

    /// Creates the random number generator for one extraction.
    pub(crate) fn rng(&self) -> Xoroshiro128PlusPlus {
        match self.seed {
            Some(seed) => Xoroshiro128PlusPlus::seed_from_u64(seed),
            None => crate::kmeans::entropy_rng(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ExtractionError;

    #[test]
    fn quality_dimensions() {
        assert_eq!(Quality::Low.max_dimension(), 100);
        assert_eq!(Quality::Medium.max_dimension(), 150);
        assert_eq!(Quality::High.max_dimension(), 200);
    }

    #[test]
    fn color_count_range() {
        for count in MIN_COLORS..=MAX_COLORS {
            assert!(ExtractionOptions::new().color_count(count).validate().is_ok());
        }

        for count in [0, 1, 2, 11, 255] {
            assert_eq!(
                ExtractionOptions::new().color_count(count).validate(),
                Err(ExtractionError::InvalidInput(InvalidInput::ColorCountOutOfRange(count)))
            );
        }
    }

    #[test]
    fn rejects_bad_threshold() {
        for threshold in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(ExtractionOptions::new()
                .dedup_threshold(threshold)
                .validate()
                .is_err());
        }
    }

    #[test]
    fn over_provisions_clusters() {
        assert_eq!(ExtractionOptions::new().color_count(3).cluster_count(), 7);
        assert_eq!(ExtractionOptions::new().color_count(10).cluster_count(), 14);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserializes_with_defaults() {
        let options: ExtractionOptions =
            serde_json::from_str(r#"{ "color_count": 8, "quality": "high" }"#).unwrap();
        assert_eq!(options, ExtractionOptions::new().color_count(8).quality(Quality::High));
    }
}

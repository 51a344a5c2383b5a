//! The color distance metric shared by clustering and deduplication.
//!
//! This is the "redmean" weighted Euclidean approximation of perceptual distance in sRGB.
//! It is far cheaper than CIEDE2000 and good enough to tell palette colors apart.
//! Distances between 8-bit colors range from `0` to roughly `765`.

use palette::Srgb;

/// Returns the squared distance between two colors.
///
/// Comparing squared distances gives the same ordering as [`distance`] without the square root,
/// so this is used in the hot loops of k-means.
#[inline]
#[must_use]
pub fn distance_squared(a: Srgb<u8>, b: Srgb<u8>) -> f64 {
    let r_mean = (f64::from(a.red) + f64::from(b.red)) / 2.0;
    let dr = f64::from(a.red) - f64::from(b.red);
    let dg = f64::from(a.green) - f64::from(b.green);
    let db = f64::from(a.blue) - f64::from(b.blue);

    (2.0 + r_mean / 256.0) * dr * dr + 4.0 * dg * dg + (2.0 + (255.0 - r_mean) / 256.0) * db * db
}

/// Returns the distance between two colors.
///
/// The metric is symmetric, and it is zero if and only if the colors are equal.
#[inline]
#[must_use]
pub fn distance(a: Srgb<u8>, b: Srgb<u8>) -> f64 {
    distance_squared(a, b).sqrt()
}

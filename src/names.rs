//! Human readable names for palette colors.

use crate::distance::distance_squared;
use palette::Srgb;

/// The named reference colors, as `(name, [red, green, blue])`.
const NAMED_COLORS: [(&str, [u8; 3]); 24] = [
    ("Black", [0, 0, 0]),
    ("Charcoal", [54, 69, 79]),
    ("Gray", [128, 128, 128]),
    ("Silver", [192, 192, 192]),
    ("White", [255, 255, 255]),
    ("Maroon", [128, 0, 0]),
    ("Red", [255, 0, 0]),
    ("Coral", [255, 127, 80]),
    ("Orange", [255, 165, 0]),
    ("Brown", [139, 69, 19]),
    ("Beige", [245, 245, 220]),
    ("Gold", [255, 215, 0]),
    ("Yellow", [255, 255, 0]),
    ("Olive", [128, 128, 0]),
    ("Lime", [0, 255, 0]),
    ("Green", [0, 128, 0]),
    ("Teal", [0, 128, 128]),
    ("Cyan", [0, 255, 255]),
    ("Sky Blue", [135, 206, 235]),
    ("Blue", [0, 0, 255]),
    ("Navy", [0, 0, 128]),
    ("Purple", [128, 0, 128]),
    ("Magenta", [255, 0, 255]),
    ("Pink", [255, 192, 203]),
];

/// Returns the name of the reference color nearest to `rgb`.
#[must_use]
pub fn nearest_name(rgb: Srgb<u8>) -> &'static str {
    let mut min_name = NAMED_COLORS[0].0;
    let mut min_distance = f64::INFINITY;
    for &(name, [r, g, b]) in &NAMED_COLORS {
        let distance = distance_squared(rgb, Srgb::new(r, g, b));
        if distance < min_distance {
            min_distance = distance;
            min_name = name;
        }
    }
    min_name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_matches() {
        for &(name, [r, g, b]) in &NAMED_COLORS {
            assert_eq!(nearest_name(Srgb::new(r, g, b)), name);
        }
    }

    #[test]
    fn near_matches() {
        assert_eq!(nearest_name(Srgb::new(250, 10, 5)), "Red");
        assert_eq!(nearest_name(Srgb::new(3, 3, 3)), "Black");
        assert_eq!(nearest_name(Srgb::new(10, 10, 240)), "Blue");
    }
}

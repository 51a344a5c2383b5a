//! Contains the value types shared across the crate.

use crate::{error::InvalidInput, ExtractionError, Result};
use palette::{encoding, FromColor, Srgb};
use std::{borrow::Cow, fmt::Display, time::Duration};
#[cfg(feature = "image")]
use {
    crate::Quality,
    image::{DynamicImage, RgbaImage},
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A color in the HSL color space, derived from an sRGB color.
///
/// Hue is in degrees and lies in `0..360`.
/// Saturation and lightness are percentages in `0..=100`.
/// All components are rounded to the nearest integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hsl {
    /// The hue angle in degrees.
    pub hue: u16,
    /// The saturation percentage.
    pub saturation: u8,
    /// The lightness percentage.
    pub lightness: u8,
}

/// Converts an sRGB color to its rounded [`Hsl`] representation.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rgb_to_hsl(rgb: Srgb<u8>) -> Hsl {
    let hsl: palette::Hsl<encoding::Srgb, f64> = palette::Hsl::from_color(rgb.into_format::<f64>());
    let hue = hsl.hue.into_positive_degrees().round() as u16 % 360;
    let percent = |x: f64| (x * 100.0).round().clamp(0.0, 100.0) as u8;

    Hsl {
        hue,
        saturation: percent(hsl.saturation),
        lightness: percent(hsl.lightness),
    }
}

/// Converts an [`Hsl`] color back to sRGB.
///
/// Because [`Hsl`] components are rounded, this is not an exact inverse of [`rgb_to_hsl`].
#[must_use]
pub fn hsl_to_rgb(hsl: Hsl) -> Srgb<u8> {
    let hsl = palette::Hsl::<encoding::Srgb, f64>::new(
        f64::from(hsl.hue),
        f64::from(hsl.saturation) / 100.0,
        f64::from(hsl.lightness) / 100.0,
    );
    Srgb::<f64>::from_color(hsl).into_format()
}

/// Formats an sRGB color as an uppercase `#RRGGBB` string.
#[must_use]
pub fn rgb_to_hex(rgb: Srgb<u8>) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb.red, rgb.green, rgb.blue)
}

/// Parses a `#RRGGBB`, `RRGGBB`, `#RGB`, or `RGB` hex string.
///
/// # Errors
/// Returns [`InvalidInput::MalformedHex`] if the string is not a valid hex color.
pub fn hex_to_rgb(hex: &str) -> Result<Srgb<u8>> {
    hex.parse::<Srgb<u8>>()
        .map_err(|_| InvalidInput::MalformedHex(hex.to_owned()).into())
}

/// A palette color.
///
/// The `hex` and `hsl` representations are always computed from `rgb`,
/// so the three never disagree. Use [`Color::from_rgb`] or [`Color::from_hex`] to create one.
///
/// Two colors are equal if their `rgb` values are equal, regardless of name or percentage.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(into = "ColorRepr", try_from = "ColorRepr")
)]
pub struct Color {
    /// The canonical uppercase `#RRGGBB` string.
    hex: String,
    /// The authoritative sRGB value.
    rgb: Srgb<u8>,
    /// The derived HSL value.
    hsl: Hsl,
    /// An optional human readable name.
    name: Option<String>,
    /// The optional share of sampled pixels represented by this color, in `0..=100`.
    percentage: Option<f32>,
}

impl PartialEq for Color {
    fn eq(&self, other: &Self) -> bool {
        self.rgb == other.rgb
    }
}

impl Eq for Color {}

impl Color {
    /// Creates a new [`Color`] from an sRGB value.
    #[must_use]
    pub fn from_rgb(rgb: Srgb<u8>) -> Self {
        Self {
            hex: rgb_to_hex(rgb),
            rgb,
            hsl: rgb_to_hsl(rgb),
            name: None,
            percentage: None,
        }
    }

    /// Creates a new [`Color`] from a hex string (see [`hex_to_rgb`]).
    ///
    /// # Errors
    /// Returns [`InvalidInput::MalformedHex`] if the string is not a valid hex color.
    pub fn from_hex(hex: &str) -> Result<Self> {
        hex_to_rgb(hex).map(Self::from_rgb)
    }

    /// Sets the name of this color.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the pixel share of this color.
    #[must_use]
    pub fn with_percentage(mut self, percentage: f32) -> Self {
        self.percentage = Some(percentage);
        self
    }

    /// The canonical uppercase `#RRGGBB` string.
    #[must_use]
    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// The sRGB value.
    #[must_use]
    pub const fn rgb(&self) -> Srgb<u8> {
        self.rgb
    }

    /// The HSL value.
    #[must_use]
    pub const fn hsl(&self) -> Hsl {
        self.hsl
    }

    /// The name of this color, if one was assigned.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The percentage of sampled pixels this color represents, if known.
    #[must_use]
    pub const fn percentage(&self) -> Option<f32> {
        self.percentage
    }
}

impl From<Srgb<u8>> for Color {
    fn from(rgb: Srgb<u8>) -> Self {
        Self::from_rgb(rgb)
    }
}

impl Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({name})", self.hex),
            None => write!(f, "{}", self.hex),
        }
    }
}

/// The serialized form of a [`Color`].
///
/// Deserialization rejects inputs whose `hex` or `hsl` disagree with `rgb`.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
struct ColorRepr {
    hex: String,
    rgb: [u8; 3],
    hsl: Hsl,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    percentage: Option<f32>,
}

#[cfg(feature = "serde")]
impl From<Color> for ColorRepr {
    fn from(color: Color) -> Self {
        let Color { hex, rgb, hsl, name, percentage } = color;
        let (red, green, blue) = rgb.into_components();
        Self {
            hex,
            rgb: [red, green, blue],
            hsl,
            name,
            percentage,
        }
    }
}

#[cfg(feature = "serde")]
impl TryFrom<ColorRepr> for Color {
    type Error = String;

    fn try_from(repr: ColorRepr) -> std::result::Result<Self, Self::Error> {
        let [red, green, blue] = repr.rgb;
        let color = Self::from_rgb(Srgb::new(red, green, blue));
        if !color.hex.eq_ignore_ascii_case(&repr.hex) {
            return Err(format!("hex {} does not match rgb {:?}", repr.hex, repr.rgb));
        }
        if color.hsl != repr.hsl {
            return Err(format!("hsl {:?} does not match rgb {:?}", repr.hsl, repr.rgb));
        }
        Ok(Self {
            name: repr.name,
            percentage: repr.percentage,
            ..color
        })
    }
}

/// A read-only RGB or RGBA pixel buffer, as produced by an image decoder.
///
/// The buffer is expected to already be downsampled to the
/// [`Quality::max_dimension`](crate::Quality::max_dimension) of the requested quality tier.
/// The constructors validate that the data length matches `width * height * channels`,
/// so an inconsistent buffer can never reach extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer<'a> {
    /// The interleaved channel bytes.
    data: Cow<'a, [u8]>,
    /// The width in pixels.
    width: u32,
    /// The height in pixels.
    height: u32,
    /// The number of bytes per pixel (3 or 4).
    channels: u8,
}

impl<'a> PixelBuffer<'a> {
    /// Creates a new [`PixelBuffer`] with the given number of channels per pixel.
    ///
    /// # Errors
    /// Returns [`InvalidInput`] if the width or height is zero, the channel count is not
    /// 3 or 4, or the data length is not `width * height * channels`.
    pub fn new(
        data: impl Into<Cow<'a, [u8]>>,
        width: u32,
        height: u32,
        channels: u8,
    ) -> Result<Self> {
        let data = data.into();

        if width == 0 || height == 0 {
            return Err(InvalidInput::EmptyDimensions { width, height }.into());
        }

        if !matches!(channels, 3 | 4) {
            return Err(InvalidInput::UnsupportedChannels(channels).into());
        }

        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(usize::from(channels)))
            .ok_or(InvalidInput::TooLarge { width, height, channels })?;

        if data.len() != expected {
            return Err(InvalidInput::LengthMismatch { expected, actual: data.len() }.into());
        }

        Ok(Self { data, width, height, channels })
    }

    /// Creates a new RGBA [`PixelBuffer`] (4 bytes per pixel).
    ///
    /// # Errors
    /// See [`PixelBuffer::new`].
    pub fn rgba(data: impl Into<Cow<'a, [u8]>>, width: u32, height: u32) -> Result<Self> {
        Self::new(data, width, height, 4)
    }

    /// Creates a new RGB [`PixelBuffer`] (3 bytes per pixel).
    ///
    /// # Errors
    /// See [`PixelBuffer::new`].
    pub fn rgb(data: impl Into<Cow<'a, [u8]>>, width: u32, height: u32) -> Result<Self> {
        Self::new(data, width, height, 3)
    }

    /// The width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// The height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// The number of bytes per pixel.
    #[must_use]
    pub const fn channels(&self) -> u8 {
        self.channels
    }

    /// The number of pixels in the buffer.
    #[must_use]
    pub fn num_pixels(&self) -> usize {
        self.data.len() / usize::from(self.channels)
    }

    /// The raw channel bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Iterates over the pixels as sRGB colors. Alpha is discarded.
    pub fn pixels(&self) -> impl ExactSizeIterator<Item = Srgb<u8>> + '_ {
        self.data
            .chunks_exact(usize::from(self.channels))
            .map(|pixel| Srgb::new(pixel[0], pixel[1], pixel[2]))
    }

    /// Creates a [`PixelBuffer`] from a decoded image, downsampling it first so that
    /// neither side exceeds the quality tier's [`Quality::max_dimension`].
    ///
    /// Images that are already small enough are not upscaled.
    ///
    /// # Errors
    /// Returns [`InvalidInput::EmptyDimensions`] if the image is empty.
    #[cfg(feature = "image")]
    pub fn from_dynamic_image(image: &DynamicImage, quality: Quality) -> Result<PixelBuffer<'static>> {
        let max = quality.max_dimension();
        let rgba = if image.width() > max || image.height() > max {
            image.thumbnail(max, max).into_rgba8()
        } else {
            image.to_rgba8()
        };

        let (width, height) = rgba.dimensions();
        PixelBuffer::rgba(rgba.into_raw(), width, height)
    }
}

#[cfg(feature = "image")]
impl<'a> TryFrom<&'a RgbaImage> for PixelBuffer<'a> {
    type Error = ExtractionError;

    fn try_from(image: &'a RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::rgba(image.as_raw().as_slice(), width, height)
    }
}

/// The output of a palette extraction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExtractionResult {
    /// The palette in display order, most vibrant first.
    ///
    /// This holds at most the requested number of colors.
    pub colors: Vec<Color>,
    /// The single dominant color, which is one of `colors`.
    pub dominant_color: Color,
    /// The measured wall-clock time of the extraction.
    pub processing_time: Duration,
}

impl ExtractionResult {
    /// The measured processing time in milliseconds.
    #[must_use]
    pub fn processing_time_ms(&self) -> f64 {
        self.processing_time.as_secs_f64() * 1000.0
    }
}

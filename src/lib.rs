//! A library for extracting small, perceptually distinct, and vibrancy-ranked color palettes from photos.
//!
//! Extraction runs in the following stages:
//! 1. The pixels are clustered with k-means (see the [`kmeans`] module),
//!    asking for a few more clusters than the requested palette size.
//! 2. The centroids are deduplicated, ranked by vibrancy, and truncated (see the [`vibrancy`] module).
//! 3. A dominant color is picked from the final palette.
//!
//! Every stage compares colors with the same cheap weighted Euclidean metric (see the [`distance`] module).
//! Results can be memoized per image in a bounded [`ResultCache`].
//!
//! # Features
//! `prismatic` has several `cargo` features that can be turned off or on:
//! - `threads`: exposes parallel versions of clustering and extraction via [`rayon`].
//! - `image`: enables building pixel buffers from the [`image`] crate's types.
//! - `serde`: enables serializing colors, options, and results.
//!
//! # Example
//! ```
//! # use prismatic::{extract, ExtractionOptions, PixelBuffer, Quality};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // a decoder normally provides this buffer, downsampled to the quality tier
//! let mut data: Vec<u8> = Vec::new();
//! for y in 0..32 {
//!     for _ in 0..32 {
//!         data.extend(if y < 16 { [230, 57, 70, 255] } else { [29, 53, 87, 255] });
//!     }
//! }
//! let buffer = PixelBuffer::rgba(data, 32, 32)?;
//!
//! let options = ExtractionOptions::new()
//!     .color_count(3)
//!     .quality(Quality::Low);
//!
//! let result = extract(&buffer, &options)?;
//! println!("dominant color: {}", result.dominant_color);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal,
    clippy::wildcard_imports
)]

mod api;
mod error;
mod types;

pub mod cache;
pub mod distance;
pub mod kmeans;
pub mod names;
pub mod vibrancy;

pub use api::*;
pub use cache::{cache_key, CacheOptions, Clock, ResultCache, SystemClock};
pub use error::*;
pub use types::*;

/// The minimum supported number of palette colors is `3`.
pub const MIN_COLORS: u8 = 3;

/// The maximum supported number of palette colors is `10`.
pub const MAX_COLORS: u8 = 10;

/// How many more clusters than palette colors are requested from k-means.
pub const OVERPROVISION: usize = 4;

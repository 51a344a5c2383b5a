//! Contains the types and functions for the high level extraction API.

mod cancel;
mod extract;
mod options;

pub use cancel::CancellationToken;
pub use extract::*;
pub use options::{ExtractionOptions, Quality};

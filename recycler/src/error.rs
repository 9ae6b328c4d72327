//! Error types for pool construction.

use thiserror::Error;

/// Error type for pool construction.
///
/// The acquire/release hot path is infallible; only sizing can fail.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("stripe count must be non-zero")]
    ZeroStripes,
    #[error("stripe count too large: {0}")]
    StripeOverflow(usize),
}

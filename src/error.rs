//! Error types for matrix construction and the F4 driver.

use thiserror::Error;

/// A fatal condition encountered while constructing a matrix.
///
/// All variants leave the builder in a cleaned, empty state, so the caller can
/// adjust the ring or the inputs and build again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A product monomial exceeded the exponent capacity of the ring.
    #[error("monomial exponent overflow during column creation")]
    MonomialOverflow,

    /// Allocating one more column would exceed the 32-bit column index range.
    #[error("too many matrix columns for a 32-bit column index")]
    TooManyColumns,

    /// The ring characteristic does not fit in a matrix scalar.
    #[error("field characteristic {0} does not fit in a matrix scalar")]
    CharacteristicTooLarge(u64),
}

/// Why an F4 Gröbner basis computation stopped before completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum F4Aborted {
    /// Matrix construction failed.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The next batch of S-pairs exceeds the configured degree limit.
    #[error("S-pair degree {actual} exceeds configured limit {max}")]
    DegreeExceeded {
        /// The configured degree limit.
        max: u32,
        /// The smallest degree among the remaining S-pairs.
        actual: u32,
    },

    /// The round limit was reached before the pair queue drained.
    #[error("round limit {0} reached before the pair queue drained")]
    RoundLimit(usize),
}

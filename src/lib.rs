//! # groebner-f4
//!
//! An F4-style Gröbner basis engine over small prime fields, centered on the
//! concurrent construction of block-partitioned sparse matrices from
//! polynomial reduction tasks.
//!
//! ## What it does
//!
//! F4 batches many polynomial reductions into one sparse linear algebra
//! problem. The hard part is symbolic preprocessing: discovering every
//! monomial that will appear as a matrix column, while spawning a reducer row
//! for every column some basis element can reduce. This crate does that
//! discovery concurrently:
//!
//! - many workers expand row tasks in parallel, sharing a monomial-to-column
//!   map with lock-free readers and a mutex-serialized creation path,
//! - each worker assembles rows into its own thread-local buffer, borrowing
//!   coefficient arrays from the source polynomials where multiplication by a
//!   monomial leaves them unchanged,
//! - a deterministic single-threaded post-pass sorts the columns, partitions
//!   rows into reducers and reducees, normalizes reducers to a monic leading
//!   entry, and emits a [`QuadMatrix`](f4::QuadMatrix).
//!
//! ## Quick start
//!
//! ```
//! use groebner_f4::{f4_simple, FpPolyRing, MonomialOrder};
//!
//! // F_101[x, y] with graded reverse lexicographic order.
//! let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
//! let g0 = ring.poly_from_terms(&[(1, &[2, 0]), (1, &[0, 1])]); // x^2 + y
//! let g1 = ring.poly_from_terms(&[(1, &[1, 1]), (1, &[0, 0])]); // xy + 1
//!
//! let gb = f4_simple(&ring, vec![g0, g1]);
//! assert!(gb.len() >= 2);
//! ```
//!
//! ## Building matrices directly
//!
//! ```
//! use groebner_f4::{FpPolyRing, MonomialOrder, PolyBasis};
//! use groebner_f4::f4::MatrixBuilder;
//!
//! let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
//! let g0 = ring.poly_from_terms(&[(1, &[2, 0]), (1, &[0, 1])]);
//! let g1 = ring.poly_from_terms(&[(1, &[1, 1]), (1, &[0, 0])]);
//! let basis = PolyBasis::with_polys(&ring, vec![g0.clone(), g1.clone()]);
//!
//! let mut builder = MatrixBuilder::new(&basis, 1 << 16).unwrap();
//! builder.add_s_pair(&g0, &g1);
//! let quad = builder.build_and_clear().unwrap();
//! assert_eq!(quad.top_left.row_count(), quad.left_count());
//! ```
//!
//! ## Scope
//!
//! Coefficients are `u32` scalars and the field characteristic must fit in
//! one; cryptographically large fields are out of scope by design, and the
//! builder reports them as
//! [`BuildError::CharacteristicTooLarge`](error::BuildError). The ring and
//! divisor oracle are seams: anything implementing [`PolyRing`] and
//! [`Basis`] plugs into the matrix core, with [`FpPolyRing`] and
//! [`PolyBasis`] as the bundled implementations.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod basis;
pub mod error;
pub mod f4;
pub mod fp_ring;
pub mod poly;
pub mod ring;

pub use basis::{Basis, PolyBasis};
pub use error::{BuildError, F4Aborted};
pub use f4::{f4_configured, f4_simple, F4Config};
pub use fp_ring::{FpPolyRing, MonomialOrder};
pub use poly::Poly;
pub use ring::{modular_inverse, PolyRing, Scalar};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

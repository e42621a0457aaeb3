//! The ring contract consumed by the matrix construction core.
//!
//! The core is generic over a polynomial ring that supplies monomial
//! arithmetic, a total admissible monomial order, structural hashing, and
//! coefficient arithmetic in a small prime field. Monomials are owned by the
//! ring in the sense that every `alloc_mono` must eventually be paired with a
//! `free_mono`; the core upholds that pairing on all of its paths, including
//! failed builds.
//!
//! A key requirement is that the hash of a product can be computed without
//! materializing the product: `hash_of_product(a, b)` must equal
//! `hash(a * b)`. Rings with per-variable hash weights get this for free since
//! multiplication adds exponents. The column map relies on this to look up
//! product columns directly from the factor pair.

use std::cmp::Ordering;

/// A matrix scalar. Field elements and the field characteristic must fit.
pub type Scalar = u32;

/// Monomial and coefficient operations the matrix core consumes.
///
/// All methods take `&self` and must be callable concurrently; multiplication
/// and division write into caller-owned scratch monomials.
pub trait PolyRing: Sync {
    /// An owned exponent vector. The representation is opaque to the core.
    type Monomial: Send + Sync + std::fmt::Debug;

    /// The field characteristic. Must be prime. Returned as `u64` so that a
    /// too-large characteristic can be detected rather than silently
    /// truncated.
    fn charac(&self) -> u64;

    /// Allocates a monomial with unspecified contents.
    fn alloc_mono(&self) -> Self::Monomial;

    /// Releases a monomial obtained from [`PolyRing::alloc_mono`] or
    /// [`PolyRing::clone_mono`].
    fn free_mono(&self, m: Self::Monomial);

    /// Allocates a copy of `m`.
    fn clone_mono(&self, m: &Self::Monomial) -> Self::Monomial;

    /// Sets `out` to the identity monomial.
    fn set_identity(&self, out: &mut Self::Monomial);

    /// `out = a * b`.
    fn mul(&self, a: &Self::Monomial, b: &Self::Monomial, out: &mut Self::Monomial);

    /// `out = num / den`. Requires that `den` divides `num`.
    fn div(&self, num: &Self::Monomial, den: &Self::Monomial, out: &mut Self::Monomial);

    /// The colon cofactors of `a` and `b`: `a_colon_b = a / gcd(a, b)` and
    /// `b_colon_a = b / gcd(a, b)`, so that
    /// `a * b_colon_a == b * a_colon_b == lcm(a, b)`.
    fn colons(
        &self,
        a: &Self::Monomial,
        b: &Self::Monomial,
        a_colon_b: &mut Self::Monomial,
        b_colon_a: &mut Self::Monomial,
    );

    /// Compares `a` and `b` in the ring's admissible monomial order.
    fn compare(&self, a: &Self::Monomial, b: &Self::Monomial) -> Ordering;

    /// The total degree of `m`.
    fn total_degree(&self, m: &Self::Monomial) -> u32;

    /// A structural hash of `m`. Equal monomials hash equally.
    fn hash(&self, m: &Self::Monomial) -> u64;

    /// The hash of `a * b`, computed without materializing the product.
    fn hash_of_product(&self, a: &Self::Monomial, b: &Self::Monomial) -> u64;

    /// Whether `candidate == a * b`, checked without materializing the
    /// product.
    fn is_product_of(
        &self,
        a: &Self::Monomial,
        b: &Self::Monomial,
        candidate: &Self::Monomial,
    ) -> bool;

    /// Whether `m` is far enough from the exponent capacity of the
    /// representation that it is safe to use as a matrix column.
    fn has_ample_capacity(&self, m: &Self::Monomial) -> bool;

    /// `x - y` in the coefficient field.
    fn coef_sub(&self, x: Scalar, y: Scalar) -> Scalar;

    /// `-x` in the coefficient field.
    fn coef_neg(&self, x: Scalar) -> Scalar;

    /// `x * y` in the coefficient field.
    fn coef_mul(&self, x: Scalar, y: Scalar) -> Scalar;
}

/// The inverse of `x` modulo the prime `p`.
///
/// Requires `0 < x < p`. Uses the extended Euclidean algorithm.
pub fn modular_inverse(x: Scalar, p: Scalar) -> Scalar {
    debug_assert!(0 < x && x < p);
    let (mut r0, mut r1) = (i64::from(p), i64::from(x));
    let (mut t0, mut t1) = (0i64, 1i64);
    while r1 != 0 {
        let q = r0 / r1;
        (r0, r1) = (r1, r0 - q * r1);
        (t0, t1) = (t1, t0 - q * t1);
    }
    debug_assert_eq!(r0, 1, "{} is not a unit modulo {}", x, p);
    t0.rem_euclid(i64::from(p)) as Scalar
}

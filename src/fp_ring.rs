//! A concrete polynomial ring over a small prime field.
//!
//! Monomials are exponent vectors with one `u16` slot per variable. The hash
//! is a weighted sum of exponents with fixed pseudo-random per-variable
//! weights, which makes it additive under multiplication: the hash of a
//! product is the wrapping sum of the factor hashes. The column map depends on
//! that property to find product columns without materializing products.

use std::cmp::Ordering;

use crate::poly::Poly;
use crate::ring::{modular_inverse, PolyRing, Scalar};

/// The admissible monomial orders the ring supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonomialOrder {
    /// Lexicographic, earlier variables first.
    Lex,
    /// Graded reverse lexicographic.
    GrevLex,
}

/// A multivariate polynomial ring over the prime field `F_p`.
#[derive(Debug)]
pub struct FpPolyRing {
    charac: u64,
    num_vars: usize,
    order: MonomialOrder,
    hash_weights: Vec<u64>,
    max_exponent: u16,
}

/// Default exponent capacity. Two monomials within capacity always multiply
/// without overflowing the `u16` slots.
const DEFAULT_MAX_EXPONENT: u16 = 0x3fff;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

impl FpPolyRing {
    /// Creates the ring `F_charac[x_0, .., x_{num_vars-1}]` with the given
    /// monomial order. `charac` must be prime.
    pub fn new(charac: u64, num_vars: usize, order: MonomialOrder) -> Self {
        assert!(charac >= 2);
        let hash_weights = (0..num_vars as u64).map(splitmix64).collect();
        FpPolyRing {
            charac,
            num_vars,
            order,
            hash_weights,
            max_exponent: DEFAULT_MAX_EXPONENT,
        }
    }

    /// Lowers the exponent capacity, making `has_ample_capacity` fail earlier.
    pub fn with_max_exponent(mut self, max_exponent: u16) -> Self {
        self.max_exponent = max_exponent;
        self
    }

    /// The number of variables.
    pub fn num_vars(&self) -> usize {
        self.num_vars
    }

    /// Builds a monomial from an exponent slice, padding missing trailing
    /// variables with zero.
    pub fn monomial(&self, exponents: &[u16]) -> Vec<u16> {
        assert!(exponents.len() <= self.num_vars);
        let mut m = vec![0u16; self.num_vars];
        m[..exponents.len()].copy_from_slice(exponents);
        m
    }

    /// Builds a polynomial from `(coefficient, exponents)` terms.
    ///
    /// Coefficients are reduced modulo the characteristic, terms with equal
    /// monomials are combined, zero terms are dropped, and the result is
    /// sorted by strictly descending monomial.
    pub fn poly_from_terms(&self, terms: &[(i64, &[u16])]) -> Poly<Vec<u16>> {
        let p = self.charac as i64;
        let mut combined: Vec<(Vec<u16>, Scalar)> = Vec::with_capacity(terms.len());
        for &(coef, exponents) in terms {
            let mono = self.monomial(exponents);
            let reduced = coef.rem_euclid(p) as Scalar;
            match combined.iter_mut().find(|(m, _)| *m == mono) {
                Some((_, c)) => {
                    *c = ((u64::from(*c) + u64::from(reduced)) % self.charac) as Scalar
                }
                None => combined.push((mono, reduced)),
            }
        }
        combined.retain(|&(_, c)| c != 0);
        combined.sort_by(|(a, _), (b, _)| self.compare(b, a));
        let (monomials, coefficients): (Vec<Vec<u16>>, Vec<Scalar>) =
            combined.into_iter().unzip();
        Poly::from_parts(monomials, coefficients)
    }

    /// Scales the polynomial so its leading coefficient is 1.
    pub fn make_monic(&self, poly: &mut Poly<Vec<u16>>) {
        if poly.is_zero() || poly.is_monic() {
            return;
        }
        let inverse = modular_inverse(poly.lead_coefficient(), self.charac as Scalar);
        poly.map_coefficients(|c| self.coef_mul(c, inverse));
    }

    /// Renders a monomial as `x0^e0*x1^e1*..`, or `1` for the identity.
    pub fn mono_to_string(&self, m: &[u16]) -> String {
        let parts: Vec<String> = m
            .iter()
            .enumerate()
            .filter(|&(_, &e)| e > 0)
            .map(|(i, &e)| {
                if e == 1 {
                    format!("x{}", i)
                } else {
                    format!("x{}^{}", i, e)
                }
            })
            .collect();
        if parts.is_empty() {
            "1".to_string()
        } else {
            parts.join("*")
        }
    }
}

impl PolyRing for FpPolyRing {
    type Monomial = Vec<u16>;

    fn charac(&self) -> u64 {
        self.charac
    }

    fn alloc_mono(&self) -> Vec<u16> {
        vec![0; self.num_vars]
    }

    fn free_mono(&self, m: Vec<u16>) {
        drop(m);
    }

    fn clone_mono(&self, m: &Vec<u16>) -> Vec<u16> {
        m.clone()
    }

    fn set_identity(&self, out: &mut Vec<u16>) {
        out.fill(0);
    }

    fn mul(&self, a: &Vec<u16>, b: &Vec<u16>, out: &mut Vec<u16>) {
        // Saturating on purpose: an over-capacity product must still be a
        // well-formed monomial so the capacity check can reject it.
        for i in 0..self.num_vars {
            out[i] = (u32::from(a[i]) + u32::from(b[i])).min(u32::from(u16::MAX)) as u16;
        }
    }

    fn div(&self, num: &Vec<u16>, den: &Vec<u16>, out: &mut Vec<u16>) {
        for i in 0..self.num_vars {
            debug_assert!(num[i] >= den[i]);
            out[i] = num[i] - den[i];
        }
    }

    fn colons(
        &self,
        a: &Vec<u16>,
        b: &Vec<u16>,
        a_colon_b: &mut Vec<u16>,
        b_colon_a: &mut Vec<u16>,
    ) {
        for i in 0..self.num_vars {
            a_colon_b[i] = a[i].saturating_sub(b[i]);
            b_colon_a[i] = b[i].saturating_sub(a[i]);
        }
    }

    fn compare(&self, a: &Vec<u16>, b: &Vec<u16>) -> Ordering {
        match self.order {
            MonomialOrder::Lex => a.cmp(b),
            MonomialOrder::GrevLex => {
                let deg_a: u32 = a.iter().map(|&e| u32::from(e)).sum();
                let deg_b: u32 = b.iter().map(|&e| u32::from(e)).sum();
                match deg_a.cmp(&deg_b) {
                    Ordering::Equal => {}
                    ord => return ord,
                }
                for i in (0..self.num_vars).rev() {
                    match b[i].cmp(&a[i]) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                Ordering::Equal
            }
        }
    }

    fn total_degree(&self, m: &Vec<u16>) -> u32 {
        m.iter().map(|&e| u32::from(e)).sum()
    }

    fn hash(&self, m: &Vec<u16>) -> u64 {
        m.iter()
            .zip(&self.hash_weights)
            .fold(0u64, |h, (&e, &w)| h.wrapping_add(w.wrapping_mul(u64::from(e))))
    }

    fn hash_of_product(&self, a: &Vec<u16>, b: &Vec<u16>) -> u64 {
        self.hash(a).wrapping_add(self.hash(b))
    }

    fn is_product_of(&self, a: &Vec<u16>, b: &Vec<u16>, candidate: &Vec<u16>) -> bool {
        (0..self.num_vars)
            .all(|i| u32::from(candidate[i]) == u32::from(a[i]) + u32::from(b[i]))
    }

    fn has_ample_capacity(&self, m: &Vec<u16>) -> bool {
        m.iter().all(|&e| e <= self.max_exponent)
    }

    fn coef_sub(&self, x: Scalar, y: Scalar) -> Scalar {
        ((u64::from(x) + self.charac - u64::from(y)) % self.charac) as Scalar
    }

    fn coef_neg(&self, x: Scalar) -> Scalar {
        ((self.charac - u64::from(x)) % self.charac) as Scalar
    }

    fn coef_mul(&self, x: Scalar, y: Scalar) -> Scalar {
        (u64::from(x) * u64::from(y) % self.charac) as Scalar
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grevlex2() -> FpPolyRing {
        FpPolyRing::new(101, 2, MonomialOrder::GrevLex)
    }

    #[test]
    fn test_mul_div_colons() {
        let ring = grevlex2();
        let a = ring.monomial(&[2, 1]);
        let b = ring.monomial(&[0, 3]);
        let mut out = ring.alloc_mono();

        ring.mul(&a, &b, &mut out);
        assert_eq!(out, vec![2, 4]);
        assert!(ring.is_product_of(&a, &b, &out));
        assert_eq!(ring.hash_of_product(&a, &b), ring.hash(&out));

        let mut quotient = ring.alloc_mono();
        let product = ring.monomial(&[2, 4]);
        ring.div(&product, &b, &mut quotient);
        assert_eq!(quotient, a);

        let x2 = ring.monomial(&[2, 0]);
        let xy = ring.monomial(&[1, 1]);
        let mut u = ring.alloc_mono();
        let mut v = ring.alloc_mono();
        ring.colons(&x2, &xy, &mut u, &mut v);
        assert_eq!(u, vec![1, 0]); // x2 : xy
        assert_eq!(v, vec![0, 1]); // xy : x2
        // Both cofactors reach the lcm x^2*y.
        let mut lcm_a = ring.alloc_mono();
        let mut lcm_b = ring.alloc_mono();
        ring.mul(&x2, &v, &mut lcm_a);
        ring.mul(&xy, &u, &mut lcm_b);
        assert_eq!(lcm_a, lcm_b);
    }

    #[test]
    fn test_grevlex_order() {
        let ring = grevlex2();
        let x2 = ring.monomial(&[2, 0]);
        let xy = ring.monomial(&[1, 1]);
        let y2 = ring.monomial(&[0, 2]);
        let x = ring.monomial(&[1, 0]);
        let y = ring.monomial(&[0, 1]);

        assert_eq!(ring.compare(&x2, &xy), Ordering::Greater);
        assert_eq!(ring.compare(&xy, &y2), Ordering::Greater);
        assert_eq!(ring.compare(&y2, &x), Ordering::Greater);
        assert_eq!(ring.compare(&x, &y), Ordering::Greater);
        assert_eq!(ring.compare(&x, &x), Ordering::Equal);
    }

    #[test]
    fn test_lex_order() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::Lex);
        let x = ring.monomial(&[1, 0]);
        let y5 = ring.monomial(&[0, 5]);
        assert_eq!(ring.compare(&x, &y5), Ordering::Greater);
    }

    #[test]
    fn test_poly_from_terms_combines_and_sorts() {
        let ring = grevlex2();
        let p = ring.poly_from_terms(&[(1, &[0, 0]), (3, &[1, 1]), (-1, &[1, 1]), (1, &[2, 0])]);
        assert_eq!(p.term_count(), 3);
        assert_eq!(p.lead_monomial(), &vec![2, 0]);
        assert_eq!(p.coefficients(), &[1, 2, 1]);
    }

    #[test]
    fn test_poly_from_terms_drops_zero() {
        let ring = grevlex2();
        let p = ring.poly_from_terms(&[(101, &[2, 0]), (1, &[0, 1])]);
        assert_eq!(p.term_count(), 1);
        assert_eq!(p.lead_monomial(), &vec![0, 1]);
    }

    #[test]
    fn test_make_monic() {
        let ring = FpPolyRing::new(5, 1, MonomialOrder::Lex);
        let mut p = ring.poly_from_terms(&[(3, &[2]), (4, &[0])]);
        ring.make_monic(&mut p);
        // inverse of 3 mod 5 is 2
        assert_eq!(p.coefficients(), &[1, 3]);
    }

    #[test]
    fn test_capacity() {
        let ring = FpPolyRing::new(2, 1, MonomialOrder::Lex).with_max_exponent(100);
        let small = ring.monomial(&[100]);
        let big = ring.monomial(&[101]);
        assert!(ring.has_ample_capacity(&small));
        assert!(!ring.has_ample_capacity(&big));
    }

    #[test]
    fn test_hash_distinguishes() {
        let ring = grevlex2();
        let a = ring.monomial(&[1, 0]);
        let b = ring.monomial(&[0, 1]);
        assert_ne!(ring.hash(&a), ring.hash(&b));
    }

    #[test]
    fn test_mono_to_string() {
        let ring = grevlex2();
        assert_eq!(ring.mono_to_string(&ring.monomial(&[0, 0])), "1");
        assert_eq!(ring.mono_to_string(&ring.monomial(&[2, 1])), "x0^2*x1");
    }
}

//! The leading-term divisor oracle consumed by the matrix core.
//!
//! Column creation classifies a product monomial as left or right by asking
//! the basis for a polynomial whose leading monomial divides it. That query
//! runs on every column creation, under the creation mutex, so the concrete
//! implementation prefilters candidates with a lightweight divisibility
//! signature before doing per-variable exponent checks.

use crate::fp_ring::FpPolyRing;
use crate::poly::Poly;
use crate::ring::PolyRing;

/// The external basis the matrix core borrows polynomials from.
///
/// Queries must be safe for concurrent readers while no writer is active; the
/// driver quiesces basis mutations for the duration of a matrix build.
pub trait Basis: Sync {
    /// The ring the basis polynomials live in.
    type Ring: PolyRing;

    /// The ring shared by all polynomials of the basis.
    fn ring(&self) -> &Self::Ring;

    /// The index of some basis polynomial whose leading monomial divides `m`,
    /// if one exists.
    fn divisor(&self, m: &<Self::Ring as PolyRing>::Monomial) -> Option<usize>;

    /// The basis polynomial at `index`.
    fn poly(&self, index: usize) -> &Poly<<Self::Ring as PolyRing>::Monomial>;
}

/// A divisibility signature: a conservative summary of a monomial that lets
/// the oracle reject impossible divisors without touching exponents.
///
/// Three tests, each necessary for divisibility:
/// 1. degree bound: `deg(candidate) <= deg(target)`,
/// 2. presence subset: variables of the candidate appear in the target,
/// 3. nibble buckets: per variable, `min(exp, 15)` of the candidate is at
///    most that of the target.
#[derive(Debug, Clone)]
struct DivSig {
    degree: u32,
    presence: u64,
    buckets: Vec<u64>,
}

impl DivSig {
    fn from_exponents(exponents: &[u16]) -> Self {
        let degree = exponents.iter().map(|&e| u32::from(e)).sum();
        let mut presence = 0u64;
        // Variables beyond 64 fold onto the low bits; still conservative.
        for (i, &e) in exponents.iter().enumerate() {
            if e > 0 {
                presence |= 1u64 << (i % 64);
            }
        }
        let mut buckets = vec![0u64; (exponents.len() + 15) / 16];
        for (i, &e) in exponents.iter().enumerate() {
            let capped = u64::from(e.min(15));
            buckets[i / 16] |= capped << ((i % 16) * 4);
        }
        DivSig {
            degree,
            presence,
            buckets,
        }
    }

    /// Whether a monomial with this signature could divide one with `other`.
    fn may_divide(&self, other: &DivSig) -> bool {
        if self.degree > other.degree {
            return false;
        }
        if self.presence & !other.presence != 0 {
            return false;
        }
        for (&a, &b) in self.buckets.iter().zip(&other.buckets) {
            if a == b {
                continue;
            }
            for shift in 0..16 {
                if (a >> (shift * 4)) & 0xf > (b >> (shift * 4)) & 0xf {
                    return false;
                }
            }
        }
        true
    }
}

struct LeadEntry {
    sig: DivSig,
    index: usize,
}

/// A polynomial basis over [`FpPolyRing`] with a signature-prefiltered
/// divisor lookup.
pub struct PolyBasis<'r> {
    ring: &'r FpPolyRing,
    polys: Vec<Poly<Vec<u16>>>,
    leads: Vec<LeadEntry>,
}

impl<'r> PolyBasis<'r> {
    /// Creates an empty basis.
    pub fn new(ring: &'r FpPolyRing) -> Self {
        PolyBasis {
            ring,
            polys: Vec::new(),
            leads: Vec::new(),
        }
    }

    /// Creates a basis from the given nonzero polynomials.
    pub fn with_polys(ring: &'r FpPolyRing, polys: Vec<Poly<Vec<u16>>>) -> Self {
        let mut basis = PolyBasis::new(ring);
        for poly in polys {
            basis.insert(poly);
        }
        basis
    }

    /// Appends a nonzero polynomial to the basis.
    pub fn insert(&mut self, poly: Poly<Vec<u16>>) {
        assert!(!poly.is_zero());
        self.leads.push(LeadEntry {
            sig: DivSig::from_exponents(poly.lead_monomial()),
            index: self.polys.len(),
        });
        self.polys.push(poly);
    }

    /// The number of polynomials in the basis.
    pub fn len(&self) -> usize {
        self.polys.len()
    }

    /// Whether the basis is empty.
    pub fn is_empty(&self) -> bool {
        self.polys.is_empty()
    }

    /// Consumes the basis, returning its polynomials.
    pub fn into_polys(self) -> Vec<Poly<Vec<u16>>> {
        self.polys
    }
}

impl Basis for PolyBasis<'_> {
    type Ring = FpPolyRing;

    fn ring(&self) -> &FpPolyRing {
        self.ring
    }

    fn divisor(&self, m: &Vec<u16>) -> Option<usize> {
        let target = DivSig::from_exponents(m);
        for entry in &self.leads {
            if !entry.sig.may_divide(&target) {
                continue;
            }
            let lead = self.polys[entry.index].lead_monomial();
            if lead.iter().zip(m).all(|(&a, &b)| a <= b) {
                return Some(entry.index);
            }
        }
        None
    }

    fn poly(&self, index: usize) -> &Poly<Vec<u16>> {
        &self.polys[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp_ring::MonomialOrder;

    #[test]
    fn test_div_sig_prefilter() {
        let a = DivSig::from_exponents(&[2, 1, 0]);
        let b = DivSig::from_exponents(&[3, 2, 1]);
        assert!(a.may_divide(&b));
        assert!(!b.may_divide(&a));

        // Presence mismatch rejects even with a smaller degree.
        let c = DivSig::from_exponents(&[0, 0, 1]);
        let d = DivSig::from_exponents(&[5, 5, 0]);
        assert!(!c.may_divide(&d));
    }

    #[test]
    fn test_div_sig_capped_exponents() {
        let small = DivSig::from_exponents(&[1, 2]);
        let capped = DivSig::from_exponents(&[20, 30]);
        assert!(small.may_divide(&capped));
    }

    #[test]
    fn test_divisor_lookup() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        let g0 = ring.poly_from_terms(&[(1, &[2, 0]), (1, &[0, 1])]); // x^2 + y
        let g1 = ring.poly_from_terms(&[(1, &[1, 1]), (1, &[0, 0])]); // xy + 1
        let basis = PolyBasis::with_polys(&ring, vec![g0, g1]);

        assert_eq!(basis.divisor(&ring.monomial(&[2, 1])), Some(0));
        assert_eq!(basis.divisor(&ring.monomial(&[1, 1])), Some(1));
        assert_eq!(basis.divisor(&ring.monomial(&[3, 0])), Some(0));
        assert_eq!(basis.divisor(&ring.monomial(&[0, 2])), None);
        assert_eq!(basis.divisor(&ring.monomial(&[1, 0])), None);
    }

    #[test]
    fn test_divisor_prefers_oldest() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        let g0 = ring.poly_from_terms(&[(1, &[1, 0])]); // x
        let g1 = ring.poly_from_terms(&[(1, &[1, 1])]); // xy
        let basis = PolyBasis::with_polys(&ring, vec![g0, g1]);
        assert_eq!(basis.divisor(&ring.monomial(&[1, 1])), Some(0));
    }
}

//! The F4 algorithm: batched S-pair reduction through sparse linear algebra.
//!
//! Where Buchberger reduces one S-polynomial at a time, F4 collects all
//! S-pairs of the current degree, builds one block-partitioned sparse matrix
//! from them through [`MatrixBuilder`], reduces the bottom block against the
//! monic top block, and reads new basis elements off the surviving rows.
//! Every surviving row leads at a right column, and right columns have no
//! divisor in the basis by construction, so each one contributes a genuinely
//! new leading monomial.
//!
//! The driver here is deliberately plain: degree-by-degree selection with the
//! Buchberger product criterion and no redundancy pruning beyond it. The
//! interesting machinery is the matrix construction in [`builder`] and the
//! elimination in [`gaussian`].

pub mod builder;
pub(crate) mod col_map;
pub mod gaussian;
pub mod matrix;
pub(crate) mod pool;
pub(crate) mod pre_block;

pub use builder::MatrixBuilder;
pub use gaussian::reduce_quad;
pub use matrix::{QuadMatrix, SparseMatrix};

use log::debug;

use crate::basis::{Basis, PolyBasis};
use crate::error::F4Aborted;
use crate::fp_ring::FpPolyRing;
use crate::poly::Poly;
use crate::ring::PolyRing;

/// Configuration for the F4 driver.
#[derive(Debug, Clone)]
pub struct F4Config {
    /// Abort when the smallest remaining S-pair degree exceeds this.
    pub max_degree: Option<u32>,
    /// Abort after this many matrix rounds.
    pub max_rounds: Option<usize>,
    /// Worker threads for symbolic preprocessing. `None` uses all cores.
    pub threads: Option<usize>,
    /// Chunk size in bytes for sparse matrix preallocation.
    pub memory_quantum: usize,
}

impl F4Config {
    /// The default configuration: no limits, all cores.
    pub fn new() -> Self {
        F4Config {
            max_degree: None,
            max_rounds: None,
            threads: None,
            memory_quantum: 1 << 16,
        }
    }

    /// Sets the degree limit.
    pub fn with_max_degree(mut self, max_degree: u32) -> Self {
        self.max_degree = Some(max_degree);
        self
    }

    /// Sets the round limit.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Sets the worker thread count.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Sets the matrix preallocation chunk size.
    pub fn with_memory_quantum(mut self, memory_quantum: usize) -> Self {
        self.memory_quantum = memory_quantum;
        self
    }
}

impl Default for F4Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Computes a Gröbner basis of the ideal generated by `input` with the
/// default configuration. Panics only on internal errors; with no configured
/// limits the computation runs to completion.
pub fn f4_simple(ring: &FpPolyRing, input: Vec<Poly<Vec<u16>>>) -> Vec<Poly<Vec<u16>>> {
    f4_configured(ring, input, F4Config::new()).expect("unlimited f4 run cannot abort")
}

/// Computes a Gröbner basis of the ideal generated by `input`.
///
/// The result contains the (normalized) input generators followed by the new
/// elements in discovery order; it is a Gröbner basis but not reduced or
/// minimal.
pub fn f4_configured(
    ring: &FpPolyRing,
    input: Vec<Poly<Vec<u16>>>,
    config: F4Config,
) -> Result<Vec<Poly<Vec<u16>>>, F4Aborted> {
    let mut generators: Vec<Poly<Vec<u16>>> =
        input.into_iter().filter(|p| !p.is_zero()).collect();
    if generators.is_empty() {
        return Ok(Vec::new());
    }
    for generator in &mut generators {
        ring.make_monic(generator);
    }
    // A nonzero constant generates the whole ring.
    if generators
        .iter()
        .any(|g| ring.total_degree(g.lead_monomial()) == 0)
    {
        return Ok(vec![ring.poly_from_terms(&[(1, &[])])]);
    }

    let mut basis = PolyBasis::with_polys(ring, generators);
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for j in 1..basis.len() {
        for i in 0..j {
            push_pair(&basis, i, j, &mut pairs);
        }
    }

    let mut rounds = 0usize;
    while !pairs.is_empty() {
        rounds += 1;
        if let Some(max) = config.max_rounds {
            if rounds > max {
                return Err(F4Aborted::RoundLimit(max));
            }
        }

        let min_degree = pairs
            .iter()
            .map(|&(i, j)| pair_degree(&basis, i, j))
            .min()
            .expect("pair queue is nonempty");
        if let Some(max) = config.max_degree {
            if min_degree > max {
                return Err(F4Aborted::DegreeExceeded {
                    max,
                    actual: min_degree,
                });
            }
        }
        let (round, rest): (Vec<_>, Vec<_>) = pairs
            .into_iter()
            .partition(|&(i, j)| pair_degree(&basis, i, j) == min_degree);
        pairs = rest;
        debug!(
            "f4 round {}: {} S-pairs at degree {}",
            rounds,
            round.len(),
            min_degree
        );

        let mut matrix_builder = MatrixBuilder::new(&basis, config.memory_quantum)?;
        if let Some(threads) = config.threads {
            matrix_builder = matrix_builder.with_threads(threads);
        }
        for &(i, j) in &round {
            matrix_builder.add_s_pair(basis.poly(i), basis.poly(j));
        }
        let quad = matrix_builder.build_and_clear()?;
        let reduced = gaussian::reduce_quad(&quad, config.memory_quantum);

        let mut new_polys: Vec<Poly<Vec<u16>>> = Vec::new();
        for r in 0..reduced.row_count() {
            let (cols, scalars) = reduced.row(r);
            if cols.is_empty() {
                continue;
            }
            let monomials: Vec<Vec<u16>> = cols
                .iter()
                .map(|&c| ring.clone_mono(&quad.right_column_monomials[c as usize]))
                .collect();
            new_polys.push(Poly::from_parts(monomials, scalars.to_vec()));
        }
        debug!("f4 round {}: {} new basis elements", rounds, new_polys.len());
        // The matrix and builder borrow the basis; release them before
        // growing it.
        drop(quad);
        drop(matrix_builder);

        for poly in new_polys {
            let index = basis.len();
            basis.insert(poly);
            for i in 0..index {
                push_pair(&basis, i, index, &mut pairs);
            }
        }
    }
    Ok(basis.into_polys())
}

/// Queues the pair `(i, j)` unless the product criterion dismisses it:
/// coprime leading monomials make the S-polynomial reduce to zero.
fn push_pair(basis: &PolyBasis<'_>, i: usize, j: usize, pairs: &mut Vec<(usize, usize)>) {
    let a = basis.poly(i).lead_monomial();
    let b = basis.poly(j).lead_monomial();
    if a.iter().zip(b).any(|(&x, &y)| x.min(y) > 0) {
        pairs.push((i, j));
    }
}

/// The total degree of the lcm of the two leading monomials.
fn pair_degree(basis: &PolyBasis<'_>, i: usize, j: usize) -> u32 {
    let a = basis.poly(i).lead_monomial();
    let b = basis.poly(j).lead_monomial();
    a.iter().zip(b).map(|(&x, &y)| u32::from(x.max(y))).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp_ring::MonomialOrder;

    #[test]
    fn test_empty_input() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        assert!(f4_simple(&ring, vec![]).is_empty());
        assert!(f4_simple(&ring, vec![Poly::zero()]).is_empty());
    }

    #[test]
    fn test_constant_generates_everything() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        let constant = ring.poly_from_terms(&[(5, &[])]);
        let gb = f4_simple(&ring, vec![constant]);
        assert_eq!(gb.len(), 1);
        assert_eq!(gb[0].term_count(), 1);
        assert_eq!(gb[0].lead_coefficient(), 1);
    }

    #[test]
    fn test_single_generator_is_its_own_basis() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        let g = ring.poly_from_terms(&[(3, &[2, 1]), (1, &[0, 1])]);
        let gb = f4_simple(&ring, vec![g]);
        assert_eq!(gb.len(), 1);
        assert!(gb[0].is_monic());
    }

    #[test]
    fn test_round_limit() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        let g0 = ring.poly_from_terms(&[(1, &[2, 0]), (1, &[0, 1])]);
        let g1 = ring.poly_from_terms(&[(1, &[1, 1]), (1, &[0, 0])]);
        let config = F4Config::new().with_max_rounds(0);
        match f4_configured(&ring, vec![g0, g1], config) {
            Err(F4Aborted::RoundLimit(0)) => {}
            other => panic!("expected RoundLimit, got {:?}", other.map(|gb| gb.len())),
        }
    }

    #[test]
    fn test_degree_limit() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        let g0 = ring.poly_from_terms(&[(1, &[2, 0]), (1, &[0, 1])]);
        let g1 = ring.poly_from_terms(&[(1, &[1, 1]), (1, &[0, 0])]);
        let config = F4Config::new().with_max_degree(2);
        match f4_configured(&ring, vec![g0, g1], config) {
            Err(F4Aborted::DegreeExceeded { max: 2, actual }) => assert!(actual > 2),
            other => panic!("expected DegreeExceeded, got {:?}", other.map(|gb| gb.len())),
        }
    }
}

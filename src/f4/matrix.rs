//! Sparse matrix storage for F4 matrix construction.
//!
//! `SparseMatrix` is a compressed row store over parallel column and scalar
//! arrays. Rows are built incrementally with `append_entry` and sealed with
//! `row_done`; storage grows in fixed-size chunks so that building many rows
//! does not repeatedly reallocate in small steps.
//!
//! `QuadMatrix` is the block-partitioned output of matrix construction: the
//! top blocks hold one monic reducer row per left column, the bottom blocks
//! hold the rows to be reduced, and the two column monomial vectors give the
//! meaning of left and right column indices.

use crate::ring::{PolyRing, Scalar};

/// A sparse matrix over row-local `(column, scalar)` entries.
#[derive(Debug, Clone, Default)]
pub struct SparseMatrix {
    cols: Vec<u32>,
    scalars: Vec<Scalar>,
    row_ends: Vec<u32>,
    chunk_entries: usize,
}

/// Bytes per stored entry: one column index and one scalar.
const ENTRY_BYTES: usize = 8;

impl SparseMatrix {
    /// Creates an empty matrix that grows its entry storage in chunks of
    /// roughly `memory_quantum` bytes. A quantum of zero picks a small
    /// default.
    pub fn new(memory_quantum: usize) -> Self {
        SparseMatrix {
            cols: Vec::new(),
            scalars: Vec::new(),
            row_ends: Vec::new(),
            chunk_entries: (memory_quantum / ENTRY_BYTES).max(64),
        }
    }

    /// The number of completed rows.
    pub fn row_count(&self) -> usize {
        self.row_ends.len()
    }

    /// The number of entries across all completed rows and the pending row.
    pub fn entry_count(&self) -> usize {
        self.cols.len()
    }

    /// Appends an entry to the pending row.
    pub fn append_entry(&mut self, col: u32, scalar: Scalar) {
        if self.cols.len() == self.cols.capacity() {
            self.cols.reserve(self.chunk_entries);
            self.scalars.reserve(self.chunk_entries);
        }
        self.cols.push(col);
        self.scalars.push(scalar);
    }

    /// Seals the pending row, which may be empty.
    pub fn row_done(&mut self) {
        debug_assert!(self.cols.len() <= u32::MAX as usize);
        self.row_ends.push(self.cols.len() as u32);
    }

    /// Whether row `r` has no entries.
    pub fn empty_row(&self, r: usize) -> bool {
        self.row_range(r).is_empty()
    }

    /// The entries of row `r` as parallel column and scalar slices.
    pub fn row(&self, r: usize) -> (&[u32], &[Scalar]) {
        let range = self.row_range(r);
        (&self.cols[range.clone()], &self.scalars[range])
    }

    /// The column of the first entry of row `r`, if any.
    pub fn lead_col(&self, r: usize) -> Option<u32> {
        self.row(r).0.first().copied()
    }

    /// The scalar of the first entry of row `r`, if any.
    pub fn lead_scalar(&self, r: usize) -> Option<Scalar> {
        self.row(r).1.first().copied()
    }

    /// Multiplies every scalar of row `r` by `factor` modulo `modulus`.
    pub fn multiply_row(&mut self, r: usize, factor: Scalar, modulus: Scalar) {
        let range = self.row_range(r);
        for s in &mut self.scalars[range] {
            *s = (u64::from(*s) * u64::from(factor) % u64::from(modulus)) as Scalar;
        }
    }

    fn row_range(&self, r: usize) -> std::ops::Range<usize> {
        let end = self.row_ends[r] as usize;
        let begin = if r == 0 {
            0
        } else {
            self.row_ends[r - 1] as usize
        };
        begin..end
    }
}

/// The quad-partitioned F4 matrix.
///
/// Column monomial vectors are sorted descending in the ring order. Row `i`
/// of the top blocks is the unique reducer whose leading left column is `i`,
/// normalized so that its leading scalar is 1. The bottom blocks hold the
/// remaining rows, to be reduced against the top.
#[derive(Debug)]
pub struct QuadMatrix<'r, R: PolyRing> {
    /// The ring the column monomials belong to.
    pub ring: &'r R,
    /// Monomials of the left (reducible) columns, descending.
    pub left_column_monomials: Vec<R::Monomial>,
    /// Monomials of the right columns, descending.
    pub right_column_monomials: Vec<R::Monomial>,
    /// Left part of the reducer rows. Square: row `i` leads at column `i`.
    pub top_left: SparseMatrix,
    /// Right part of the reducer rows.
    pub top_right: SparseMatrix,
    /// Left part of the rows to be reduced.
    pub bottom_left: SparseMatrix,
    /// Right part of the rows to be reduced.
    pub bottom_right: SparseMatrix,
}

impl<'r, R: PolyRing> QuadMatrix<'r, R> {
    /// A matrix with no columns and no rows.
    pub fn empty(ring: &'r R, memory_quantum: usize) -> Self {
        QuadMatrix {
            ring,
            left_column_monomials: Vec::new(),
            right_column_monomials: Vec::new(),
            top_left: SparseMatrix::new(memory_quantum),
            top_right: SparseMatrix::new(memory_quantum),
            bottom_left: SparseMatrix::new(memory_quantum),
            bottom_right: SparseMatrix::new(memory_quantum),
        }
    }

    /// The number of left columns.
    pub fn left_count(&self) -> usize {
        self.left_column_monomials.len()
    }

    /// The number of right columns.
    pub fn right_count(&self) -> usize {
        self.right_column_monomials.len()
    }

    /// The number of rows in the bottom blocks.
    pub fn bottom_row_count(&self) -> usize {
        debug_assert_eq!(self.bottom_left.row_count(), self.bottom_right.row_count());
        self.bottom_left.row_count()
    }
}

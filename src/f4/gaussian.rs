//! Reduction of a quad matrix against its monic top block.
//!
//! The top blocks form a triangular system: row `i` of the top is the unique
//! reducer leading at left column `i` with scalar 1. Every bottom row is
//! reduced by back-substitution until its left part vanishes; the surviving
//! right parts are then echelonized among themselves so each nonzero result
//! row has a distinct leading column. Bottom rows are independent during the
//! first phase, so they reduce in parallel.

use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::f4::matrix::{QuadMatrix, SparseMatrix};
use crate::ring::{modular_inverse, PolyRing, Scalar};

/// Reduces the bottom blocks of `quad` against the top blocks and returns the
/// echelonized remainder over the right columns. Each returned row is monic
/// and leads at a column no other row leads at.
pub fn reduce_quad<R: PolyRing>(quad: &QuadMatrix<'_, R>, memory_quantum: usize) -> SparseMatrix {
    let modulus = quad.ring.charac();
    let left_count = quad.left_count();
    let right_count = quad.right_count();

    let reduced: Vec<Vec<(u32, Scalar)>> = (0..quad.bottom_row_count())
        .into_par_iter()
        .map(|r| reduce_bottom_row(quad, r, modulus, left_count, right_count))
        .collect();

    let mut matrix = SparseMatrix::new(memory_quantum);
    for row in echelonize(reduced, modulus) {
        for (col, scalar) in row {
            matrix.append_entry(col, scalar);
        }
        matrix.row_done();
    }
    matrix
}

/// Eliminates the left part of one bottom row by back-substitution with the
/// monic top rows, using dense accumulators with per-operation reduction.
fn reduce_bottom_row<R: PolyRing>(
    quad: &QuadMatrix<'_, R>,
    r: usize,
    modulus: u64,
    left_count: usize,
    right_count: usize,
) -> Vec<(u32, Scalar)> {
    let mut left_acc = vec![0u64; left_count];
    let mut right_acc = vec![0u64; right_count];
    let (cols, scalars) = quad.bottom_left.row(r);
    for (&col, &scalar) in cols.iter().zip(scalars) {
        left_acc[col as usize] = u64::from(scalar);
    }
    let (cols, scalars) = quad.bottom_right.row(r);
    for (&col, &scalar) in cols.iter().zip(scalars) {
        right_acc[col as usize] = u64::from(scalar);
    }

    // Left columns are eliminated in ascending order; a top row only touches
    // columns at or beyond its own lead, so one pass suffices.
    for col in 0..left_count {
        let factor = left_acc[col] % modulus;
        if factor == 0 {
            continue;
        }
        left_acc[col] = 0;
        let (top_cols, top_scalars) = quad.top_left.row(col);
        debug_assert_eq!(top_cols.first().copied(), Some(col as u32));
        debug_assert_eq!(top_scalars.first().copied(), Some(1));
        for (&c, &s) in top_cols.iter().zip(top_scalars).skip(1) {
            let acc = &mut left_acc[c as usize];
            *acc = (*acc + factor * (modulus - u64::from(s))) % modulus;
        }
        let (top_cols, top_scalars) = quad.top_right.row(col);
        for (&c, &s) in top_cols.iter().zip(top_scalars) {
            let acc = &mut right_acc[c as usize];
            *acc = (*acc + factor * (modulus - u64::from(s))) % modulus;
        }
    }
    debug_assert!(left_acc.iter().all(|&v| v % modulus == 0));

    (0..right_count)
        .filter_map(|col| {
            let value = (right_acc[col] % modulus) as Scalar;
            (value != 0).then_some((col as u32, value))
        })
        .collect()
}

/// Brings sparse rows into reduced row echelon form over the prime field.
/// Zero rows vanish; the result is sorted by leading column.
fn echelonize(rows: Vec<Vec<(u32, Scalar)>>, modulus: u64) -> Vec<Vec<(u32, Scalar)>> {
    let mut pivot_of_col: FxHashMap<u32, usize> = FxHashMap::default();
    let mut result: Vec<Vec<(u32, Scalar)>> = Vec::new();
    for mut row in rows {
        loop {
            let Some(&(lead, lead_scalar)) = row.first() else {
                break;
            };
            match pivot_of_col.get(&lead) {
                Some(&pivot) => {
                    row = subtract_scaled(&row, &result[pivot], u64::from(lead_scalar), modulus);
                }
                None => {
                    let inverse = u64::from(modular_inverse(lead_scalar, modulus as Scalar));
                    for entry in &mut row {
                        entry.1 = (u64::from(entry.1) * inverse % modulus) as Scalar;
                    }
                    pivot_of_col.insert(lead, result.len());
                    result.push(row);
                    break;
                }
            }
        }
    }
    result.sort_unstable_by_key(|row| row[0].0);
    result
}

/// `target - multiplier * source` as a sparse merge, dropping zeros. The
/// source must be monic, so the leading entries cancel exactly.
fn subtract_scaled(
    target: &[(u32, Scalar)],
    source: &[(u32, Scalar)],
    multiplier: u64,
    modulus: u64,
) -> Vec<(u32, Scalar)> {
    let mut result = Vec::with_capacity(target.len() + source.len());
    let (mut i, mut j) = (0usize, 0usize);
    while i < target.len() || j < source.len() {
        if j >= source.len() || (i < target.len() && target[i].0 < source[j].0) {
            result.push(target[i]);
            i += 1;
        } else if i >= target.len() || target[i].0 > source[j].0 {
            let (col, s) = source[j];
            let value = (multiplier * (modulus - u64::from(s)) % modulus) as Scalar;
            if value != 0 {
                result.push((col, value));
            }
            j += 1;
        } else {
            let (col, t) = target[i];
            let s = u64::from(source[j].1);
            let value =
                ((u64::from(t) + multiplier * (modulus - s)) % modulus) as Scalar;
            if value != 0 {
                result.push((col, value));
            }
            i += 1;
            j += 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtract_scaled() {
        // Over F17: target - 5 * source.
        let target = vec![(0u32, 5u32), (2, 3), (5, 7)];
        let source = vec![(0u32, 1u32), (3, 2), (5, 1)];
        let result = subtract_scaled(&target, &source, 5, 17);
        // Column 0 cancels, column 3 appears as -10 = 7 mod 17, column 5
        // becomes 7 - 5 = 2.
        assert_eq!(result, vec![(2, 3), (3, 7), (5, 2)]);
    }

    #[test]
    fn test_echelonize_dependent_rows() {
        // Over F17: the second row is 3 times the first.
        let rows = vec![vec![(0u32, 1u32), (2, 2)], vec![(0, 3), (2, 6)]];
        let result = echelonize(rows, 17);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0], vec![(0, 1), (2, 2)]);
    }

    #[test]
    fn test_echelonize_makes_monic_and_sorts() {
        let rows = vec![vec![(4u32, 3u32)], vec![(1, 2), (4, 1)]];
        let result = echelonize(rows, 5);
        assert_eq!(result.len(), 2);
        assert_eq!(result[0][0], (1, 1));
        assert_eq!(result[1], vec![(4, 1)]);
    }

    #[test]
    fn test_echelonize_cascading_reduction() {
        // Row 3 reduces by row 1, then by row 2, then vanishes.
        let rows = vec![
            vec![(0u32, 1u32), (1, 1)],
            vec![(1, 1), (2, 1)],
            vec![(0, 1), (2, 6)],
        ];
        let result = echelonize(rows, 7);
        assert_eq!(result.len(), 2);
    }
}

//! Construction of the quad-partitioned F4 matrix.
//!
//! The builder collects row tasks, expands them in parallel during symbolic
//! preprocessing, and assembles the result single-threaded once the task
//! frontier drains.
//!
//! A task is either a polynomial times a monomial (a single row) or an S-pair
//! of two polynomials whose leading terms are made to cancel. Expanding a row
//! resolves every term against the shared column map; a missed lookup goes
//! through the serialized creation path, and creating a column whose monomial
//! has a divisor in the basis feeds a new task for the divisor polynomial, so
//! the working set closes transitively: by the time the frontier is empty,
//! every left column has at least one row leading at it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use log::debug;

use crate::basis::Basis;
use crate::error::BuildError;
use crate::f4::col_map::{ColReader, ColumnMap, Translated};
use crate::f4::matrix::{QuadMatrix, SparseMatrix};
use crate::f4::pool::{drain_with_feedback, TaskFeeder};
use crate::f4::pre_block::{PreBlock, RowView};
use crate::poly::Poly;
use crate::ring::{modular_inverse, PolyRing, Scalar};

type MonoOf<B> = <<B as Basis>::Ring as PolyRing>::Monomial;

/// One unit of pending row construction work.
enum RowTask<'p, M> {
    /// The row `multiplier * poly`, where the multiplier is the identity if
    /// `desired_lead` is absent and `desired_lead / lead(poly)` otherwise.
    Row {
        poly: &'p Poly<M>,
        desired_lead: Option<M>,
    },
    /// The row `u * poly - v * other` with the colon cofactors `u`, `v`
    /// chosen so the leading terms cancel.
    SPair {
        poly: &'p Poly<M>,
        other: &'p Poly<M>,
    },
}

/// Per-worker construction state: the thread-local row buffer and two scratch
/// monomials.
struct WorkerData<'p, M> {
    block: PreBlock<'p>,
    tmp1: M,
    tmp2: M,
}

/// Builds quad-partitioned sparse matrices from polynomial reduction tasks.
///
/// The builder borrows the basis for its whole lifetime; the driver must not
/// mutate the basis while a build is in progress.
pub struct MatrixBuilder<'a, B: Basis> {
    basis: &'a B,
    map: ColumnMap<B::Ring>,
    todo: Vec<RowTask<'a, MonoOf<B>>>,
    memory_quantum: usize,
    threads: usize,
}

impl<'a, B: Basis> MatrixBuilder<'a, B> {
    /// Creates a builder whose matrices preallocate in chunks of
    /// `memory_quantum` bytes.
    ///
    /// Fails if the ring characteristic does not fit in a matrix scalar; no
    /// matrix state is allocated in that case.
    pub fn new(basis: &'a B, memory_quantum: usize) -> Result<Self, BuildError> {
        let charac = basis.ring().charac();
        if charac > u64::from(Scalar::MAX) {
            return Err(BuildError::CharacteristicTooLarge(charac));
        }
        Ok(MatrixBuilder {
            basis,
            map: ColumnMap::new(basis.ring()),
            todo: Vec::new(),
            memory_quantum,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        })
    }

    /// Overrides the worker count used during symbolic preprocessing.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Schedules the S-pair of `a` and `b`. Both must be monic and nonzero.
    pub fn add_s_pair(&mut self, a: &'a Poly<MonoOf<B>>, b: &'a Poly<MonoOf<B>>) {
        debug_assert!(!a.is_zero() && a.is_monic());
        debug_assert!(!b.is_zero() && b.is_monic());
        self.todo.push(RowTask::SPair { poly: a, other: b });
    }

    /// Schedules the row `poly`. Zero polynomials are ignored.
    pub fn add_poly(&mut self, poly: &'a Poly<MonoOf<B>>) {
        if poly.is_zero() {
            return;
        }
        self.todo.push(RowTask::Row {
            poly,
            desired_lead: None,
        });
    }

    /// Schedules the row `multiple * poly`. Zero polynomials are ignored.
    pub fn add_poly_multiple(&mut self, multiple: &MonoOf<B>, poly: &'a Poly<MonoOf<B>>) {
        if poly.is_zero() {
            return;
        }
        let ring = self.basis.ring();
        let mut desired_lead = ring.alloc_mono();
        ring.mul(poly.lead_monomial(), multiple, &mut desired_lead);
        self.todo.push(RowTask::Row {
            poly,
            desired_lead: Some(desired_lead),
        });
    }

    /// Runs all pending tasks, including the ones they feed, and assembles
    /// the quad matrix. On success and on failure alike the builder ends up
    /// empty and reusable.
    pub fn build_and_clear(&mut self) -> Result<QuadMatrix<'a, B::Ring>, BuildError> {
        let basis = self.basis;
        let ring = basis.ring();
        let todo = std::mem::take(&mut self.todo);
        if todo.is_empty() {
            return Ok(QuadMatrix::empty(ring, self.memory_quantum));
        }

        let symbolic_start = Instant::now();
        let poisoned = AtomicBool::new(false);
        let first_error: Mutex<Option<BuildError>> = Mutex::new(None);
        let this: &Self = &*self;

        let worker_data = drain_with_feedback(
            todo,
            self.threads,
            || WorkerData {
                block: PreBlock::new(),
                tmp1: ring.alloc_mono(),
                tmp2: ring.alloc_mono(),
            },
            |data, task, feeder| {
                if let Err(error) = this.run_task(data, task, feeder, &poisoned) {
                    poisoned.store(true, Ordering::Relaxed);
                    let mut slot = first_error.lock().unwrap_or_else(|e| e.into_inner());
                    slot.get_or_insert(error);
                }
            },
        );

        let mut blocks = Vec::with_capacity(worker_data.len());
        for data in worker_data {
            ring.free_mono(data.tmp1);
            ring.free_mono(data.tmp2);
            blocks.push(data.block);
        }

        let error = first_error
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(error) = error {
            drop(blocks);
            self.map.clear(ring);
            return Err(error);
        }
        let symbolic_time = symbolic_start.elapsed();

        let assembly_start = Instant::now();
        let quad = self.assemble(blocks);
        debug!(
            "built {}x({}+{}) matrix ({} top rows, {} bottom rows): symbolic {:?}, assembly {:?}",
            quad.top_left.row_count() + quad.bottom_row_count(),
            quad.left_count(),
            quad.right_count(),
            quad.top_left.row_count(),
            quad.bottom_row_count(),
            symbolic_time,
            assembly_start.elapsed(),
        );
        Ok(quad)
    }

    fn run_task(
        &self,
        data: &mut WorkerData<'a, MonoOf<B>>,
        task: RowTask<'a, MonoOf<B>>,
        feeder: &TaskFeeder<'_, RowTask<'a, MonoOf<B>>>,
        poisoned: &AtomicBool,
    ) -> Result<(), BuildError> {
        let ring = self.basis.ring();
        let WorkerData { block, tmp1, tmp2 } = data;
        match task {
            RowTask::Row { poly, desired_lead } => {
                match desired_lead {
                    None => ring.set_identity(tmp1),
                    Some(lead) => {
                        ring.div(&lead, poly.lead_monomial(), tmp1);
                        ring.free_mono(lead);
                    }
                }
                if poisoned.load(Ordering::Relaxed) {
                    return Ok(()); // drain the frontier without building more
                }
                self.append_row(tmp1, poly, block, feeder)
            }
            RowTask::SPair { poly, other } => {
                if poisoned.load(Ordering::Relaxed) {
                    return Ok(());
                }
                ring.colons(poly.lead_monomial(), other.lead_monomial(), tmp2, tmp1);
                self.append_row_s_pair(poly, tmp1, other, tmp2, block, feeder)
            }
        }
    }

    /// Appends the row `multiple * poly`, borrowing the polynomial's own
    /// coefficients. Columns are looked up two terms at a time; when a pair
    /// misses, both columns are created before the batch restarts on a fresh
    /// snapshot, since the pair slot needs them together.
    fn append_row(
        &self,
        multiple: &MonoOf<B>,
        poly: &'a Poly<MonoOf<B>>,
        block: &mut PreBlock<'a>,
        feeder: &TaskFeeder<'_, RowTask<'a, MonoOf<B>>>,
    ) -> Result<(), BuildError> {
        let count = poly.term_count();
        let indices = block.make_row_with_these_scalars(poly.coefficients());
        let mut filled = 0usize;
        let mut term = 0usize;

        if count % 2 == 1 {
            let reader = self.map.reader(self.basis.ring());
            let (col, _) = self.find_or_create_column(&reader, poly.monomial(0), multiple, feeder)?;
            indices[filled] = col;
            filled += 1;
            term = 1;
        }

        let mut reader = self.map.reader(self.basis.ring());
        while term < count {
            let mono1 = poly.monomial(term);
            let mono2 = poly.monomial(term + 1);
            match reader.find_two_products(mono1, mono2, multiple) {
                (Some(col1), Some(col2)) => {
                    indices[filled] = col1;
                    indices[filled + 1] = col2;
                    filled += 2;
                    term += 2;
                }
                _ => {
                    self.create_two_columns(mono1, mono2, multiple, feeder)?;
                    reader = self.map.reader(self.basis.ring());
                }
            }
        }
        debug_assert_eq!(filled, count);
        Ok(())
    }

    /// Appends the S-pair row of `poly` and `other` under their colon
    /// cofactors. The leading terms cancel by construction and are skipped;
    /// the remaining terms are merged in descending monomial order with
    /// coefficients combined on equal columns. Scalars are freshly computed,
    /// so the row owns them, over-allocated and trimmed at the end.
    fn append_row_s_pair(
        &self,
        poly: &'a Poly<MonoOf<B>>,
        multiply: &MonoOf<B>,
        other: &'a Poly<MonoOf<B>>,
        other_multiply: &MonoOf<B>,
        block: &mut PreBlock<'a>,
        feeder: &TaskFeeder<'_, RowTask<'a, MonoOf<B>>>,
    ) -> Result<(), BuildError> {
        let ring = self.basis.ring();
        debug_assert!(!poly.is_zero() && !other.is_zero());
        debug_assert_eq!(poly.lead_coefficient(), other.lead_coefficient());

        let count_a = poly.term_count();
        let count_b = other.term_count();
        debug_assert!(count_a + count_b - 2 <= u32::MAX as usize);
        let max_entries = (count_a + count_b - 2) as u32;
        let (indices, scalars) = block.make_row(max_entries);
        let mut filled = 0usize;

        let reader = self.map.reader(ring);
        let (mut ia, mut ib) = (1usize, 1usize);
        while ia < count_a && ib < count_b {
            let (col_a, mono_a) =
                self.find_or_create_column(&reader, poly.monomial(ia), multiply, feeder)?;
            let (col_b, mono_b) =
                self.find_or_create_column(&reader, other.monomial(ib), other_multiply, feeder)?;
            let cmp = ring.compare(mono_a, mono_b);

            let mut coef = 0;
            let mut col = 0;
            if cmp != std::cmp::Ordering::Less {
                coef = poly.coefficient(ia);
                col = col_a;
                ia += 1;
            }
            if cmp != std::cmp::Ordering::Greater {
                coef = ring.coef_sub(coef, other.coefficient(ib));
                col = col_b;
                ib += 1;
            }
            if coef != 0 {
                indices[filled] = col;
                scalars[filled] = coef;
                filled += 1;
            }
        }
        while ia < count_a {
            let (col, _) =
                self.find_or_create_column(&reader, poly.monomial(ia), multiply, feeder)?;
            indices[filled] = col;
            scalars[filled] = poly.coefficient(ia);
            filled += 1;
            ia += 1;
        }
        while ib < count_b {
            let (col, _) =
                self.find_or_create_column(&reader, other.monomial(ib), other_multiply, feeder)?;
            indices[filled] = col;
            scalars[filled] = ring.coef_neg(other.coefficient(ib));
            filled += 1;
            ib += 1;
        }

        let row = block.row_count() - 1;
        block.remove_last_entries(row, max_entries - filled as u32);
        Ok(())
    }

    fn find_or_create_column<'s>(
        &'s self,
        reader: &ColReader<'s, B::Ring>,
        a: &MonoOf<B>,
        b: &MonoOf<B>,
        feeder: &TaskFeeder<'_, RowTask<'a, MonoOf<B>>>,
    ) -> Result<(u32, &'s MonoOf<B>), BuildError> {
        if let Some(found) = reader.find_product(a, b) {
            return Ok(found);
        }
        // The snapshot may predate a racing insertion; look once more at the
        // live table before paying for the creation path.
        if let Some(found) = self.map.reader(self.basis.ring()).find_product(a, b) {
            return Ok(found);
        }
        self.create_column(a, b, feeder)
    }

    fn create_two_columns(
        &self,
        a1: &MonoOf<B>,
        a2: &MonoOf<B>,
        b: &MonoOf<B>,
        feeder: &TaskFeeder<'_, RowTask<'a, MonoOf<B>>>,
    ) -> Result<(), BuildError> {
        self.create_column(a1, b, feeder)?;
        self.create_column(a2, b, feeder)?;
        Ok(())
    }

    /// The serialized creation path. Double-checks under the mutex, forms the
    /// product, classifies the column by the divisor oracle, and feeds a
    /// reducer task for left columns.
    fn create_column<'s>(
        &'s self,
        a: &MonoOf<B>,
        b: &MonoOf<B>,
        feeder: &TaskFeeder<'_, RowTask<'a, MonoOf<B>>>,
    ) -> Result<(u32, &'s MonoOf<B>), BuildError> {
        let basis = self.basis;
        let ring = basis.ring();
        let mut w = self.map.writer();

        // Another worker may have created this column between our failed
        // read and acquiring the mutex.
        if let Some(found) = self.map.reader(ring).find_product(a, b) {
            return Ok(found);
        }

        ring.mul(a, b, &mut w.product);
        if !ring.has_ample_capacity(&w.product) {
            return Err(BuildError::MonomialOverflow);
        }

        let reducer = basis.divisor(&w.product);
        let left = reducer.is_some();

        debug_assert_eq!(
            w.translate.len() as u64,
            u64::from(w.left_count) + u64::from(w.right_count)
        );
        if w.translate.len() >= u32::MAX as usize {
            return Err(BuildError::TooManyColumns);
        }
        let local = if left { w.left_count } else { w.right_count };
        if local == u32::MAX {
            return Err(BuildError::TooManyColumns);
        }

        let index = w.translate.len() as u32;
        let key = ring.clone_mono(&w.product);
        let hash = ring.hash(&w.product);
        let stored = self.map.insert(&mut w, key, hash, index);
        w.translate.push(Translated { index: local, left });
        if left {
            w.left_count += 1;
        } else {
            w.right_count += 1;
        }

        if let Some(reducer_index) = reducer {
            feeder.add(RowTask::Row {
                poly: basis.poly(reducer_index),
                desired_lead: Some(ring.clone_mono(stored)),
            });
        }
        Ok((index, stored))
    }

    /// The single-threaded post-pass: materialize and sort the column
    /// monomials, rewrite the translation table, classify rows, and emit the
    /// split matrices.
    fn assemble(&mut self, blocks: Vec<PreBlock<'a>>) -> QuadMatrix<'a, B::Ring> {
        let basis = self.basis;
        let ring = basis.ring();

        let (mut translate, left_count, right_count) = {
            let mut w = self.map.writer();
            (
                std::mem::take(&mut w.translate),
                w.left_count as usize,
                w.right_count as usize,
            )
        };

        // Copy each column monomial into its side's vector at the pre-sort
        // position. The copies outlive the map, which is cleared below.
        let mut left_slots: Vec<Option<MonoOf<B>>> = (0..left_count).map(|_| None).collect();
        let mut right_slots: Vec<Option<MonoOf<B>>> = (0..right_count).map(|_| None).collect();
        self.map.for_each(|gci, mono| {
            let t = translate[gci as usize];
            let slot = if t.left {
                &mut left_slots[t.index as usize]
            } else {
                &mut right_slots[t.index as usize]
            };
            debug_assert!(slot.is_none());
            *slot = Some(ring.clone_mono(mono));
        });
        let mut left_monomials: Vec<MonoOf<B>> = left_slots
            .into_iter()
            .map(|slot| slot.expect("column without a monomial"))
            .collect();
        let mut right_monomials: Vec<MonoOf<B>> = right_slots
            .into_iter()
            .map(|slot| slot.expect("column without a monomial"))
            .collect();

        let (left_permutation, right_permutation) = rayon::join(
            || sort_columns_descending(ring, &mut left_monomials),
            || sort_columns_descending(ring, &mut right_monomials),
        );

        for t in &mut translate {
            let permutation = if t.left {
                &left_permutation
            } else {
                &right_permutation
            };
            t.index = permutation[t.index as usize];
        }

        // Decide which rows reduce (top) and which get reduced (bottom).
        let mut reducer_rows: Vec<Option<RowView<'_>>> = vec![None; left_count];
        let mut reducee_rows: Vec<RowView<'_>> = Vec::new();
        for block in &blocks {
            for row in block.rows() {
                if row.entry_count() == 0 {
                    continue;
                }
                // Rows are emitted in descending monomial order, so the
                // first left entry is also the minimal post-sort left column.
                let lead = row.indices.iter().find_map(|&gci| {
                    let t = translate[gci as usize];
                    t.left.then_some(t.index)
                });
                let Some(lead) = lead else {
                    reducee_rows.push(row);
                    continue;
                };
                let slot = &mut reducer_rows[lead as usize];
                match slot {
                    None => *slot = Some(row),
                    // The sparser row makes the cheaper reducer; ties keep
                    // the incumbent.
                    Some(current) if current.entry_count() > row.entry_count() => {
                        reducee_rows.push(std::mem::replace(current, row));
                    }
                    Some(_) => reducee_rows.push(row),
                }
            }
        }

        let reducers: Vec<RowView<'_>> = reducer_rows
            .into_iter()
            .map(|slot| slot.expect("left column without a reducer row"))
            .collect();

        let modulus = ring.charac() as Scalar;
        let (top_left, top_right) = split_left_right(
            &reducers,
            true,
            &translate,
            modulus,
            self.memory_quantum,
        );
        let (bottom_left, bottom_right) = split_left_right(
            &reducee_rows,
            false,
            &translate,
            modulus,
            self.memory_quantum,
        );

        #[cfg(debug_assertions)]
        for r in 0..top_left.row_count() {
            debug_assert_eq!(top_left.lead_col(r), Some(r as u32));
            debug_assert_eq!(top_left.lead_scalar(r), Some(1));
        }

        drop(blocks);
        self.map.clear(ring);

        QuadMatrix {
            ring,
            left_column_monomials: left_monomials,
            right_column_monomials: right_monomials,
            top_left,
            top_right,
            bottom_left,
            bottom_right,
        }
    }
}

/// Sorts `monomials` descending in the ring order and returns the inverse
/// permutation: `permutation[old_position] = new_position`.
fn sort_columns_descending<R: PolyRing>(
    ring: &R,
    monomials: &mut Vec<R::Monomial>,
) -> Vec<u32> {
    let count = monomials.len();
    let mut order: Vec<u32> = (0..count as u32).collect();
    order.sort_by(|&x, &y| ring.compare(&monomials[y as usize], &monomials[x as usize]));

    let mut permutation = vec![0u32; count];
    for (new_position, &old_position) in order.iter().enumerate() {
        permutation[old_position as usize] = new_position as u32;
    }

    let mut slots: Vec<Option<R::Monomial>> = monomials.drain(..).map(Some).collect();
    for &old_position in &order {
        monomials.push(
            slots[old_position as usize]
                .take()
                .expect("column permuted twice"),
        );
    }
    permutation
}

/// Routes each entry of each row to the left or right matrix by its
/// translation record. For reducer rows, scales the whole row so its first
/// left scalar is 1.
fn split_left_right(
    rows: &[RowView<'_>],
    make_left_unitary: bool,
    translate: &[Translated],
    modulus: Scalar,
    memory_quantum: usize,
) -> (SparseMatrix, SparseMatrix) {
    let mut left = SparseMatrix::new(memory_quantum);
    let mut right = SparseMatrix::new(memory_quantum);
    for row in rows {
        for (&gci, &scalar) in row.indices.iter().zip(row.scalars) {
            let t = translate[gci as usize];
            if t.left {
                left.append_entry(t.index, scalar);
            } else {
                right.append_entry(t.index, scalar);
            }
        }
        let r = left.row_count();
        left.row_done();
        right.row_done();

        if make_left_unitary && !left.empty_row(r) && left.lead_scalar(r) != Some(1) {
            let lead = left.lead_scalar(r).expect("nonempty row without a lead");
            let inverse = modular_inverse(lead, modulus);
            left.multiply_row(r, inverse, modulus);
            right.multiply_row(r, inverse, modulus);
            debug_assert_eq!(left.lead_scalar(r), Some(1));
        }
    }
    (left, right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basis::PolyBasis;
    use crate::fp_ring::{FpPolyRing, MonomialOrder};

    #[test]
    fn test_empty_build() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        let basis = PolyBasis::new(&ring);
        let mut builder = MatrixBuilder::new(&basis, 0).unwrap();
        let quad = builder.build_and_clear().unwrap();
        assert_eq!(quad.left_count(), 0);
        assert_eq!(quad.right_count(), 0);
        assert_eq!(quad.top_left.row_count(), 0);
        assert_eq!(quad.bottom_row_count(), 0);
    }

    #[test]
    fn test_characteristic_too_large() {
        let ring = FpPolyRing::new(1 << 33, 1, MonomialOrder::Lex);
        let basis = PolyBasis::new(&ring);
        match MatrixBuilder::new(&basis, 0) {
            Err(BuildError::CharacteristicTooLarge(c)) => assert_eq!(c, 1 << 33),
            other => panic!("expected CharacteristicTooLarge, got {:?}", other.err()),
        };
    }

    #[test]
    fn test_identity_multiplier_row() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        let poly = ring.poly_from_terms(&[(1, &[0, 2]), (7, &[1, 0]), (3, &[0, 0])]);
        let basis = PolyBasis::new(&ring);
        let mut builder = MatrixBuilder::new(&basis, 0).unwrap().with_threads(1);
        builder.add_poly(&poly);
        let quad = builder.build_and_clear().unwrap();

        // No divisors exist, so every term becomes a right column, in the
        // polynomial's own order.
        assert_eq!(quad.left_count(), 0);
        assert_eq!(
            quad.right_column_monomials,
            vec![
                ring.monomial(&[0, 2]),
                ring.monomial(&[1, 0]),
                ring.monomial(&[0, 0])
            ]
        );
        assert_eq!(quad.bottom_row_count(), 1);
        assert_eq!(
            quad.bottom_right.row(0),
            (&[0u32, 1, 2][..], &[1u32, 7, 3][..])
        );
    }

    #[test]
    fn test_sort_columns_descending() {
        let ring = FpPolyRing::new(101, 2, MonomialOrder::GrevLex);
        let mut monomials = vec![
            ring.monomial(&[0, 1]),
            ring.monomial(&[2, 0]),
            ring.monomial(&[1, 0]),
        ];
        let permutation = sort_columns_descending(&ring, &mut monomials);
        assert_eq!(
            monomials,
            vec![
                ring.monomial(&[2, 0]),
                ring.monomial(&[1, 0]),
                ring.monomial(&[0, 1])
            ]
        );
        assert_eq!(permutation, vec![2, 0, 1]);
    }
}

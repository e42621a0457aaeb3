//! Concurrent mapping from product monomials to dense column indices.
//!
//! The map is a chained hash table keyed by the hash of a product `a * b`,
//! which the ring computes without materializing the product. Lookups are
//! lock-free: readers load the published table pointer and walk bucket chains
//! whose nodes are immutable once published. All mutation is serialized by a
//! single mutex, which also owns the translation table, the per-side column
//! counts, the key monomials, and a scratch monomial for forming products.
//!
//! A reader holds a snapshot of the table and may therefore miss a column
//! inserted after the snapshot was taken. That is fine: the caller falls back
//! to the creation path, which takes the mutex, looks again against the live
//! table, and only then inserts. Key monomials are boxed so their addresses
//! stay stable across table growth, and superseded tables and nodes are
//! retired rather than freed, so a racing reader never observes a dangling
//! pointer. Everything retired is reclaimed in `clear`, after the parallel
//! phase has quiesced.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::ring::PolyRing;

/// Where a global column index landed: which side, and the index within that
/// side. Before the column sort the index is the insertion order within the
/// side; afterwards it is the final sorted position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Translated {
    pub index: u32,
    pub left: bool,
}

struct Node<R: PolyRing> {
    hash: u64,
    index: u32,
    mono: *const R::Monomial,
    next: *const Node<R>,
}

struct Table<R: PolyRing> {
    mask: u64,
    buckets: Box<[AtomicPtr<Node<R>>]>,
}

impl<R: PolyRing> Table<R> {
    fn with_bucket_count(count: usize) -> Self {
        debug_assert!(count.is_power_of_two());
        let buckets = (0..count)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Table {
            mask: count as u64 - 1,
            buckets,
        }
    }

    fn bucket(&self, hash: u64) -> &AtomicPtr<Node<R>> {
        // Fold the high bits in so additive hashes spread over small tables.
        &self.buckets[((hash ^ (hash >> 32)) & self.mask) as usize]
    }
}

/// Mutable map state, guarded by the creation mutex.
pub(crate) struct MapWriter<R: PolyRing> {
    monomials: Vec<Box<R::Monomial>>,
    nodes: Vec<*mut Node<R>>,
    retired_tables: Vec<*mut Table<R>>,
    /// Per-column side and local index, indexed by global column index.
    pub translate: Vec<Translated>,
    /// Columns created on the left side so far.
    pub left_count: u32,
    /// Columns created on the right side so far.
    pub right_count: u32,
    /// Scratch monomial for forming the product during creation.
    pub product: R::Monomial,
}

/// The concurrent column map.
pub(crate) struct ColumnMap<R: PolyRing> {
    table: AtomicPtr<Table<R>>,
    writer: Mutex<MapWriter<R>>,
}

// The raw pointers all target nodes, tables and boxed monomials owned by the
// map itself, reclaimed only under exclusive access.
unsafe impl<R: PolyRing> Send for ColumnMap<R> {}
unsafe impl<R: PolyRing> Sync for ColumnMap<R> {}

const INITIAL_BUCKETS: usize = 64;

impl<R: PolyRing> ColumnMap<R> {
    pub fn new(ring: &R) -> Self {
        let table = Box::into_raw(Box::new(Table::with_bucket_count(INITIAL_BUCKETS)));
        ColumnMap {
            table: AtomicPtr::new(table),
            writer: Mutex::new(MapWriter {
                monomials: Vec::new(),
                nodes: Vec::new(),
                retired_tables: Vec::new(),
                translate: Vec::new(),
                left_count: 0,
                right_count: 0,
                product: ring.alloc_mono(),
            }),
        }
    }

    /// A lock-free reader over the current table snapshot.
    pub fn reader<'a>(&'a self, ring: &'a R) -> ColReader<'a, R> {
        // SAFETY: the table pointer is never null; tables are freed only
        // under exclusive access in clear or drop.
        let table = unsafe { &*self.table.load(Ordering::Acquire) };
        ColReader { table, ring }
    }

    /// Takes the creation mutex.
    pub fn writer(&self) -> MutexGuard<'_, MapWriter<R>> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts a new column under the creation mutex and returns a reference
    /// to the stored key monomial, stable until `clear`.
    pub fn insert<'s>(
        &'s self,
        w: &mut MapWriter<R>,
        mono: R::Monomial,
        hash: u64,
        index: u32,
    ) -> &'s R::Monomial {
        if (w.monomials.len() + 1) * 4 > self.current_table(w).buckets.len() * 3 {
            self.grow(w);
        }
        let boxed = Box::new(mono);
        let mono_ptr: *const R::Monomial = &*boxed;
        w.monomials.push(boxed);

        let table = self.current_table(w);
        let bucket = table.bucket(hash);
        let node = Box::into_raw(Box::new(Node {
            hash,
            index,
            mono: mono_ptr,
            next: bucket.load(Ordering::Relaxed) as *const Node<R>,
        }));
        w.nodes.push(node);
        // Publishes the fully initialized node to racing readers.
        bucket.store(node, Ordering::Release);

        // SAFETY: the boxed monomial lives until clear(&mut self) or drop.
        unsafe { &*mono_ptr }
    }

    /// Calls `f` once per column with its index and key monomial.
    pub fn for_each(&self, mut f: impl FnMut(u32, &R::Monomial)) {
        // SAFETY: as in reader.
        let table = unsafe { &*self.table.load(Ordering::Acquire) };
        for bucket in table.buckets.iter() {
            let mut node = bucket.load(Ordering::Acquire) as *const Node<R>;
            while !node.is_null() {
                // SAFETY: published nodes are initialized and outlive any
                // shared borrow of the map.
                let n = unsafe { &*node };
                f(n.index, unsafe { &*n.mono });
                node = n.next;
            }
        }
    }

    /// Releases every key monomial back to the ring, reclaims retired tables
    /// and nodes, and resets the translation state. The bucket table keeps
    /// its capacity.
    pub fn clear(&mut self, ring: &R) {
        let w = self.writer.get_mut().unwrap_or_else(|e| e.into_inner());
        for node in w.nodes.drain(..) {
            // SAFETY: exclusive access; nodes came from Box::into_raw.
            drop(unsafe { Box::from_raw(node) });
        }
        for table in w.retired_tables.drain(..) {
            // SAFETY: as above.
            drop(unsafe { Box::from_raw(table) });
        }
        for boxed in w.monomials.drain(..) {
            ring.free_mono(*boxed);
        }
        w.translate.clear();
        w.left_count = 0;
        w.right_count = 0;
        // SAFETY: exclusive access; the current table is valid.
        let table = unsafe { &*self.table.load(Ordering::Relaxed) };
        for bucket in table.buckets.iter() {
            bucket.store(ptr::null_mut(), Ordering::Relaxed);
        }
    }

    fn current_table<'s>(&'s self, _w: &MapWriter<R>) -> &'s Table<R> {
        // SAFETY: holding the writer guard means no concurrent table swap.
        unsafe { &*self.table.load(Ordering::Relaxed) }
    }

    /// Doubles the bucket count. The old table and its nodes stay alive for
    /// racing readers and are reclaimed in `clear`.
    fn grow(&self, w: &mut MapWriter<R>) {
        let old_ptr = self.table.load(Ordering::Relaxed);
        // SAFETY: writer-exclusive.
        let old = unsafe { &*old_ptr };
        let new = Box::new(Table::with_bucket_count(old.buckets.len() * 2));
        for bucket in old.buckets.iter() {
            let mut node = bucket.load(Ordering::Relaxed) as *const Node<R>;
            while !node.is_null() {
                // SAFETY: nodes in the current table are initialized.
                let n = unsafe { &*node };
                let target = new.bucket(n.hash);
                let copy = Box::into_raw(Box::new(Node {
                    hash: n.hash,
                    index: n.index,
                    mono: n.mono,
                    next: target.load(Ordering::Relaxed) as *const Node<R>,
                }));
                w.nodes.push(copy);
                target.store(copy, Ordering::Relaxed);
                node = n.next;
            }
        }
        let new_ptr = Box::into_raw(new);
        // Publishes the rehashed table; readers on the old snapshot may miss
        // later insertions and recover through the creation path.
        self.table.store(new_ptr, Ordering::Release);
        w.retired_tables.push(old_ptr);
    }
}

impl<R: PolyRing> Drop for ColumnMap<R> {
    fn drop(&mut self) {
        let w = self.writer.get_mut().unwrap_or_else(|e| e.into_inner());
        for node in w.nodes.drain(..) {
            // SAFETY: exclusive access in drop.
            drop(unsafe { Box::from_raw(node) });
        }
        for table in w.retired_tables.drain(..) {
            // SAFETY: as above.
            drop(unsafe { Box::from_raw(table) });
        }
        // SAFETY: the current table was never retired.
        drop(unsafe { Box::from_raw(self.table.load(Ordering::Relaxed)) });
        // Key monomials are plain owned values here; dropping the boxes is
        // their release.
    }
}

/// A lock-free view of the column map at one instant.
pub(crate) struct ColReader<'a, R: PolyRing> {
    table: &'a Table<R>,
    ring: &'a R,
}

impl<'a, R: PolyRing> ColReader<'a, R> {
    /// Looks up the column of the product `a * b`. Returns the column index
    /// and the stored product monomial.
    pub fn find_product(
        &self,
        a: &R::Monomial,
        b: &R::Monomial,
    ) -> Option<(u32, &'a R::Monomial)> {
        let hash = self.ring.hash_of_product(a, b);
        let mut node = self.table.bucket(hash).load(Ordering::Acquire) as *const Node<R>;
        while !node.is_null() {
            // SAFETY: published nodes are initialized and live for 'a.
            let n = unsafe { &*node };
            if n.hash == hash {
                let mono = unsafe { &*n.mono };
                if self.ring.is_product_of(a, b, mono) {
                    return Some((n.index, mono));
                }
            }
            node = n.next;
        }
        None
    }

    /// Looks up the columns of `a1 * b` and `a2 * b` in one pass.
    pub fn find_two_products(
        &self,
        a1: &R::Monomial,
        a2: &R::Monomial,
        b: &R::Monomial,
    ) -> (Option<u32>, Option<u32>) {
        (
            self.find_product(a1, b).map(|(col, _)| col),
            self.find_product(a2, b).map(|(col, _)| col),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp_ring::{FpPolyRing, MonomialOrder};

    fn ring() -> FpPolyRing {
        FpPolyRing::new(101, 3, MonomialOrder::GrevLex)
    }

    fn insert_product(map: &ColumnMap<FpPolyRing>, ring: &FpPolyRing, a: &Vec<u16>, b: &Vec<u16>) -> u32 {
        let mut w = map.writer();
        if let Some((col, _)) = map.reader(ring).find_product(a, b) {
            return col;
        }
        let index = w.translate.len() as u32;
        let mut product = ring.alloc_mono();
        ring.mul(a, b, &mut product);
        let hash = ring.hash(&product);
        map.insert(&mut w, product, hash, index);
        w.translate.push(Translated { index, left: false });
        index
    }

    #[test]
    fn test_insert_then_find() {
        let ring = ring();
        let map = ColumnMap::new(&ring);
        let a = ring.monomial(&[1, 0, 2]);
        let b = ring.monomial(&[0, 3, 0]);

        assert!(map.reader(&ring).find_product(&a, &b).is_none());
        let col = insert_product(&map, &ring, &a, &b);
        let (found, mono) = map.reader(&ring).find_product(&a, &b).unwrap();
        assert_eq!(found, col);
        assert_eq!(mono, &vec![1, 3, 2]);

        // The same product through a different factorization hits the same
        // column.
        let c = ring.monomial(&[1, 3, 0]);
        let d = ring.monomial(&[0, 0, 2]);
        let (again, _) = map.reader(&ring).find_product(&c, &d).unwrap();
        assert_eq!(again, col);
    }

    #[test]
    fn test_duplicate_insert_recovers() {
        let ring = ring();
        let map = ColumnMap::new(&ring);
        let a = ring.monomial(&[2, 0, 0]);
        let b = ring.monomial(&[0, 1, 0]);
        let first = insert_product(&map, &ring, &a, &b);
        let second = insert_product(&map, &ring, &a, &b);
        assert_eq!(first, second);
        assert_eq!(map.writer().translate.len(), 1);
    }

    #[test]
    fn test_growth_preserves_entries() {
        let ring = ring();
        let map = ColumnMap::new(&ring);
        let identity = ring.monomial(&[0, 0, 0]);
        let monos: Vec<Vec<u16>> = (0..200u16).map(|i| ring.monomial(&[i, i / 3, 0])).collect();
        let cols: Vec<u32> = monos
            .iter()
            .map(|m| insert_product(&map, &ring, m, &identity))
            .collect();

        let reader = map.reader(&ring);
        for (m, &col) in monos.iter().zip(&cols) {
            let (found, _) = reader.find_product(m, &identity).unwrap();
            assert_eq!(found, col);
        }

        let mut seen = 0;
        map.for_each(|_, _| seen += 1);
        assert_eq!(seen, 200);
    }

    #[test]
    fn test_stale_reader_misses_then_live_reader_finds() {
        let ring = ring();
        let map = ColumnMap::new(&ring);
        let identity = ring.monomial(&[0, 0, 0]);

        // Force a table swap while holding a pre-growth snapshot.
        let stale = map.reader(&ring);
        let pre_growth = ring.monomial(&[1, 1, 1]);
        insert_product(&map, &ring, &pre_growth, &identity);
        for i in 0..100u16 {
            insert_product(&map, &ring, &ring.monomial(&[0, 0, i]), &identity);
        }
        let late = ring.monomial(&[9, 9, 9]);
        let col = insert_product(&map, &ring, &late, &identity);

        // The stale snapshot still resolves what it saw and misses the rest.
        assert!(stale.find_product(&pre_growth, &identity).is_some());
        assert!(stale.find_product(&late, &identity).is_none());
        let (found, _) = map.reader(&ring).find_product(&late, &identity).unwrap();
        assert_eq!(found, col);
    }

    #[test]
    fn test_clear_resets() {
        let ring = ring();
        let mut map = ColumnMap::new(&ring);
        let identity = ring.monomial(&[0, 0, 0]);
        for i in 0..100u16 {
            insert_product(&map, &ring, &ring.monomial(&[i, 0, 0]), &identity);
        }
        map.clear(&ring);
        assert!(map
            .reader(&ring)
            .find_product(&ring.monomial(&[1, 0, 0]), &identity)
            .is_none());
        assert_eq!(map.writer().translate.len(), 0);

        // Reusable after clearing.
        let col = insert_product(&map, &ring, &ring.monomial(&[5, 0, 0]), &identity);
        assert_eq!(col, 0);
    }

    #[test]
    fn test_concurrent_readers_during_inserts() {
        let ring = ring();
        let map = ColumnMap::new(&ring);
        let identity = ring.monomial(&[0, 0, 0]);

        std::thread::scope(|scope| {
            let map = &map;
            let ring2 = &ring;
            let identity2 = &identity;
            let reader_thread = scope.spawn(move || {
                // Readers must always see consistent snapshots, never torn
                // state, while the writer inserts and grows the table.
                let probe = ring2.monomial(&[3, 1, 4]);
                let mut hits = 0usize;
                for _ in 0..10_000 {
                    if let Some((_, mono)) = map.reader(ring2).find_product(&probe, identity2) {
                        assert_eq!(mono, &vec![3, 1, 4]);
                        hits += 1;
                    }
                }
                hits
            });

            for i in 0..400u16 {
                insert_product(map, ring2, &ring2.monomial(&[i % 20, i / 20, 1]), identity2);
            }
            insert_product(map, ring2, &ring2.monomial(&[3, 1, 4]), identity2);
            let _ = reader_thread.join().unwrap();
        });

        let (_, mono) = map
            .reader(&ring)
            .find_product(&ring.monomial(&[3, 1, 4]), &identity)
            .unwrap();
        assert_eq!(mono, &vec![3, 1, 4]);
    }
}

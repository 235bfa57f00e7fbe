//! Node location index: point-entity id to quantized grid cell.
//!
//! Cells are stored with reduced width, either 16 bit for low-resolution
//! grids or 32 bit, chosen once at construction. The storage strategy is
//! likewise chosen once from [`IndexBackend`]; `get`/`set` semantics are
//! backend-independent.

use std::marker::PhantomData;

use memmap2::MmapMut;
use rustc_hash::FxHashMap;

use crate::config::IndexBackend;
use crate::error::Result;
use crate::grid::SENTINEL_CELL;

/// Reduced-width cell representation stored in the index.
trait CellRepr: Copy + Eq + 'static {
    const EMPTY: Self;
    const BYTES: usize;
    fn pack(cell: u32) -> Self;
    fn unpack(self) -> u32;
    fn write(self, buf: &mut [u8]);
    fn read(buf: &[u8]) -> Self;
}

impl CellRepr for u16 {
    const EMPTY: Self = u16::MAX;
    const BYTES: usize = 2;

    fn pack(cell: u32) -> Self {
        debug_assert!(cell < u32::from(u16::MAX));
        cell as u16
    }

    fn unpack(self) -> u32 {
        u32::from(self)
    }

    fn write(self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_ne_bytes());
    }

    fn read(buf: &[u8]) -> Self {
        u16::from_ne_bytes([buf[0], buf[1]])
    }
}

impl CellRepr for u32 {
    const EMPTY: Self = u32::MAX;
    const BYTES: usize = 4;

    fn pack(cell: u32) -> Self {
        cell
    }

    fn unpack(self) -> u32 {
        self
    }

    fn write(self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.to_ne_bytes());
    }

    fn read(buf: &[u8]) -> Self {
        u32::from_ne_bytes([buf[0], buf[1], buf[2], buf[3]])
    }
}

/// Storage backend behind [`LocationIndex`].
trait CellStore {
    fn set(&mut self, id: u64, cell: u32) -> Result<()>;
    fn get(&self, id: u64) -> Option<u32>;
    /// Called once when no further writes will happen; lookups are only
    /// guaranteed after this point.
    fn freeze(&mut self) -> Result<()> {
        Ok(())
    }
    fn size(&self) -> usize;
    fn used_memory(&self) -> usize;
}

/// Dense in-memory array indexed directly by entity id.
struct DenseStore<W> {
    slots: Vec<W>,
}

impl<W: CellRepr> DenseStore<W> {
    fn new() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<W: CellRepr> CellStore for DenseStore<W> {
    fn set(&mut self, id: u64, cell: u32) -> Result<()> {
        let idx = id as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, W::EMPTY);
        }
        self.slots[idx] = W::pack(cell);
        Ok(())
    }

    fn get(&self, id: u64) -> Option<u32> {
        self.slots
            .get(id as usize)
            .copied()
            .filter(|&slot| slot != W::EMPTY)
            .map(W::unpack)
    }

    fn size(&self) -> usize {
        self.slots.len()
    }

    fn used_memory(&self) -> usize {
        self.slots.capacity() * W::BYTES
    }
}

/// Hash-map store for sparse id spaces.
struct SparseStore<W> {
    map: FxHashMap<u64, W>,
}

impl<W: CellRepr> SparseStore<W> {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }
}

impl<W: CellRepr> CellStore for SparseStore<W> {
    fn set(&mut self, id: u64, cell: u32) -> Result<()> {
        self.map.insert(id, W::pack(cell));
        Ok(())
    }

    fn get(&self, id: u64) -> Option<u32> {
        self.map.get(&id).copied().map(W::unpack)
    }

    fn size(&self) -> usize {
        self.map.len()
    }

    fn used_memory(&self) -> usize {
        self.map.capacity() * (std::mem::size_of::<u64>() + W::BYTES + 1)
    }
}

/// Dense array in anonymous memory-mapped pages. Trades startup cost for
/// keeping very large, mostly-contiguous id spaces out of the heap.
struct MmapDenseStore<W> {
    mmap: MmapMut,
    slots: usize,
    _repr: PhantomData<W>,
}

impl<W: CellRepr> MmapDenseStore<W> {
    const INITIAL_SLOTS: usize = 1 << 16;

    fn new() -> Result<Self> {
        let mut mmap = MmapMut::map_anon(Self::INITIAL_SLOTS * W::BYTES)?;
        Self::fill_empty(&mut mmap);
        Ok(Self {
            mmap,
            slots: Self::INITIAL_SLOTS,
            _repr: PhantomData,
        })
    }

    fn fill_empty(buf: &mut [u8]) {
        for chunk in buf.chunks_exact_mut(W::BYTES) {
            W::EMPTY.write(chunk);
        }
    }

    fn grow(&mut self, needed: usize) -> Result<()> {
        let mut slots = self.slots;
        while slots <= needed {
            slots *= 2;
        }
        let mut mmap = MmapMut::map_anon(slots * W::BYTES)?;
        let used = self.slots * W::BYTES;
        mmap[..used].copy_from_slice(&self.mmap[..used]);
        Self::fill_empty(&mut mmap[used..]);
        self.mmap = mmap;
        self.slots = slots;
        Ok(())
    }
}

impl<W: CellRepr> CellStore for MmapDenseStore<W> {
    fn set(&mut self, id: u64, cell: u32) -> Result<()> {
        let idx = id as usize;
        if idx >= self.slots {
            self.grow(idx)?;
        }
        let offset = idx * W::BYTES;
        W::pack(cell).write(&mut self.mmap[offset..offset + W::BYTES]);
        Ok(())
    }

    fn get(&self, id: u64) -> Option<u32> {
        let idx = id as usize;
        if idx >= self.slots {
            return None;
        }
        let offset = idx * W::BYTES;
        let slot = W::read(&self.mmap[offset..offset + W::BYTES]);
        (slot != W::EMPTY).then(|| slot.unpack())
    }

    fn size(&self) -> usize {
        self.slots
    }

    fn used_memory(&self) -> usize {
        self.slots * W::BYTES
    }
}

/// Append-only (id, cell) pairs in memory-mapped pages, sorted once at
/// freeze time and binary-searched afterwards. Best memory per entry for
/// very sparse id spaces.
struct MmapSparseStore<W> {
    mmap: MmapMut,
    len: usize,
    capacity: usize,
    sorted: bool,
    _repr: PhantomData<W>,
}

impl<W: CellRepr> MmapSparseStore<W> {
    const RECORD_BYTES: usize = 8 + W::BYTES;
    const INITIAL_RECORDS: usize = 1 << 12;

    fn new() -> Result<Self> {
        let mmap = MmapMut::map_anon(Self::INITIAL_RECORDS * Self::RECORD_BYTES)?;
        Ok(Self {
            mmap,
            len: 0,
            capacity: Self::INITIAL_RECORDS,
            sorted: true,
            _repr: PhantomData,
        })
    }

    fn record(&self, index: usize) -> (u64, W) {
        let offset = index * Self::RECORD_BYTES;
        let buf = &self.mmap[offset..offset + Self::RECORD_BYTES];
        let id = u64::from_ne_bytes([
            buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
        ]);
        (id, W::read(&buf[8..]))
    }

    fn write_record(&mut self, index: usize, id: u64, cell: W) {
        let offset = index * Self::RECORD_BYTES;
        let buf = &mut self.mmap[offset..offset + Self::RECORD_BYTES];
        buf[..8].copy_from_slice(&id.to_ne_bytes());
        cell.write(&mut buf[8..]);
    }
}

impl<W: CellRepr> CellStore for MmapSparseStore<W> {
    fn set(&mut self, id: u64, cell: u32) -> Result<()> {
        if self.len == self.capacity {
            let capacity = self.capacity * 2;
            let mut mmap = MmapMut::map_anon(capacity * Self::RECORD_BYTES)?;
            let used = self.len * Self::RECORD_BYTES;
            mmap[..used].copy_from_slice(&self.mmap[..used]);
            self.mmap = mmap;
            self.capacity = capacity;
        }
        self.write_record(self.len, id, W::pack(cell));
        self.len += 1;
        self.sorted = false;
        Ok(())
    }

    fn get(&self, id: u64) -> Option<u32> {
        if self.sorted {
            let mut lo = 0;
            let mut hi = self.len;
            while lo < hi {
                let mid = lo + (hi - lo) / 2;
                let (mid_id, cell) = self.record(mid);
                match mid_id.cmp(&id) {
                    std::cmp::Ordering::Less => lo = mid + 1,
                    std::cmp::Ordering::Greater => hi = mid,
                    std::cmp::Ordering::Equal => return Some(cell.unpack()),
                }
            }
            None
        } else {
            // Writes still in progress; scan backwards so the latest write
            // for an id wins.
            (0..self.len)
                .rev()
                .map(|i| self.record(i))
                .find(|&(record_id, _)| record_id == id)
                .map(|(_, cell)| cell.unpack())
        }
    }

    fn freeze(&mut self) -> Result<()> {
        if self.sorted {
            return Ok(());
        }
        let mut records: Vec<(u64, W)> = (0..self.len).map(|i| self.record(i)).collect();
        records.sort_by_key(|&(id, _)| id);
        // Stable sort keeps insertion order for equal ids; retain the latest.
        records.dedup_by(|a, b| {
            if a.0 == b.0 {
                *b = *a;
                true
            } else {
                false
            }
        });
        self.len = records.len();
        for (i, (id, cell)) in records.into_iter().enumerate() {
            self.write_record(i, id, cell);
        }
        self.sorted = true;
        Ok(())
    }

    fn size(&self) -> usize {
        self.len
    }

    fn used_memory(&self) -> usize {
        self.capacity * Self::RECORD_BYTES
    }
}

/// Key-value store mapping point-entity id to quantized grid cell id.
pub struct LocationIndex {
    store: Box<dyn CellStore>,
}

impl LocationIndex {
    /// Create an index for a grid of the given total cell count.
    ///
    /// Grids that fit 16-bit cell ids get the narrow representation, halving
    /// memory per entry; larger grids use 32 bits.
    pub fn new(backend: IndexBackend, grid_size: u32) -> Result<Self> {
        let wide = grid_size >= (1 << 16);
        let store: Box<dyn CellStore> = match (backend, wide) {
            (IndexBackend::DenseMem, false) => Box::new(DenseStore::<u16>::new()),
            (IndexBackend::DenseMem, true) => Box::new(DenseStore::<u32>::new()),
            (IndexBackend::SparseMem, false) => Box::new(SparseStore::<u16>::new()),
            (IndexBackend::SparseMem, true) => Box::new(SparseStore::<u32>::new()),
            (IndexBackend::DenseMapped, false) => Box::new(MmapDenseStore::<u16>::new()?),
            (IndexBackend::DenseMapped, true) => Box::new(MmapDenseStore::<u32>::new()?),
            (IndexBackend::SparseMapped, false) => Box::new(MmapSparseStore::<u16>::new()?),
            (IndexBackend::SparseMapped, true) => Box::new(MmapSparseStore::<u32>::new()?),
        };
        Ok(Self { store })
    }

    /// Record the cell for a point-entity id. Sentinel cells are dropped.
    pub fn set(&mut self, id: u64, cell: u32) -> Result<()> {
        if cell == SENTINEL_CELL {
            return Ok(());
        }
        self.store.set(id, cell)
    }

    /// Look up a previously stored cell. `None` for ids never set.
    pub fn get(&self, id: u64) -> Option<u32> {
        self.store.get(id)
    }

    /// Signal that no further writes will happen.
    pub fn freeze(&mut self) -> Result<()> {
        self.store.freeze()
    }

    /// Number of addressable entries.
    pub fn size(&self) -> usize {
        self.store.size()
    }

    /// Approximate memory held by the store, for capacity diagnostics.
    pub fn used_memory(&self) -> usize {
        self.store.used_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backends() -> [IndexBackend; 4] {
        [
            IndexBackend::DenseMem,
            IndexBackend::SparseMem,
            IndexBackend::DenseMapped,
            IndexBackend::SparseMapped,
        ]
    }

    #[test]
    fn test_set_get_all_backends_narrow() {
        for backend in backends() {
            let mut index = LocationIndex::new(backend, 64800).unwrap();
            index.set(10, 123).unwrap();
            index.set(99, 64799).unwrap();
            index.set(1_000_000, 0).unwrap();
            index.freeze().unwrap();

            assert_eq!(index.get(10), Some(123), "{backend:?}");
            assert_eq!(index.get(99), Some(64799), "{backend:?}");
            assert_eq!(index.get(1_000_000), Some(0), "{backend:?}");
            assert_eq!(index.get(11), None, "{backend:?}");
            assert!(index.used_memory() > 0, "{backend:?}");
        }
    }

    #[test]
    fn test_set_get_all_backends_wide() {
        let grid_size = 3600 * 1800;
        for backend in backends() {
            let mut index = LocationIndex::new(backend, grid_size).unwrap();
            index.set(7, grid_size - 1).unwrap();
            index.freeze().unwrap();
            assert_eq!(index.get(7), Some(grid_size - 1), "{backend:?}");
        }
    }

    #[test]
    fn test_sentinel_is_dropped() {
        for backend in backends() {
            let mut index = LocationIndex::new(backend, 64800).unwrap();
            index.set(42, SENTINEL_CELL).unwrap();
            index.freeze().unwrap();
            assert_eq!(index.get(42), None, "{backend:?}");
        }
    }

    #[test]
    fn test_overwrite_last_wins() {
        for backend in backends() {
            let mut index = LocationIndex::new(backend, 64800).unwrap();
            index.set(5, 100).unwrap();
            index.set(5, 200).unwrap();
            index.freeze().unwrap();
            assert_eq!(index.get(5), Some(200), "{backend:?}");
        }
    }

    #[test]
    fn test_sparse_mapped_lookup_before_freeze() {
        let mut index = LocationIndex::new(IndexBackend::SparseMapped, 64800).unwrap();
        index.set(1, 10).unwrap();
        index.set(1, 20).unwrap();
        assert_eq!(index.get(1), Some(20));
    }

    #[test]
    fn test_mmap_stores_grow() {
        let mut index = LocationIndex::new(IndexBackend::DenseMapped, 64800).unwrap();
        let before = index.used_memory();
        index.set(1 << 20, 7).unwrap();
        assert!(index.used_memory() > before);
        assert_eq!(index.get(1 << 20), Some(7));

        let mut index = LocationIndex::new(IndexBackend::SparseMapped, 64800).unwrap();
        for id in 0..10_000u64 {
            index.set(id * 3, (id % 64000) as u32).unwrap();
        }
        index.freeze().unwrap();
        assert_eq!(index.get(3 * 9_999), Some(9_999 % 64000));
        assert_eq!(index.size(), 10_000);
    }
}

//! Destination buffers for gather operations.
//!
//! A gather can fill either a caller-owned rectangular slice or a sparse
//! map keyed by vertex coordinate. Both expose load-back of values stored
//! earlier in the same gather; the border interpolation passes rely on it.

use std::collections::HashMap;

use terrain_model::{Sample, TileKey};

pub trait SampleStore<V: Sample> {
    fn store(&mut self, x: i32, y: i32, value: V);

    /// Reads back a value stored earlier in the same gather. Sparse stores
    /// return zero for vertices never stored.
    fn load(&self, x: i32, y: i32) -> V;

    /// Records a vertex with no data at all. Dense stores write zero so the
    /// caller's buffer is fully initialized; sparse stores skip the vertex.
    fn store_default(&mut self, x: i32, y: i32);
}

/// Row-major slice destination anchored at `(x1, y1)`.
pub struct DenseStore<'a, V> {
    x1: i32,
    y1: i32,
    stride: i32,
    data: &'a mut [V],
}

impl<'a, V: Sample> DenseStore<'a, V> {
    pub fn new(x1: i32, y1: i32, stride: i32, data: &'a mut [V]) -> Self {
        assert!(stride > 0, "dense store stride must be positive");
        Self { x1, y1, stride, data }
    }

    fn index(&self, x: i32, y: i32) -> usize {
        let dx = x - self.x1;
        let dy = y - self.y1;
        debug_assert!(dx >= 0 && dx < self.stride, "x {x} outside stored rows");
        debug_assert!(dy >= 0, "y {y} above stored rows");
        (dy * self.stride + dx) as usize
    }
}

impl<V: Sample> SampleStore<V> for DenseStore<'_, V> {
    fn store(&mut self, x: i32, y: i32, value: V) {
        let index = self.index(x, y);
        self.data[index] = value;
    }

    fn load(&self, x: i32, y: i32) -> V {
        self.data[self.index(x, y)]
    }

    fn store_default(&mut self, x: i32, y: i32) {
        self.store(x, y, V::ZERO);
    }
}

/// Sparse destination keyed by the packed vertex coordinate.
pub struct SparseStore<'a, V> {
    data: &'a mut HashMap<TileKey, V>,
}

impl<'a, V: Sample> SparseStore<'a, V> {
    pub fn new(data: &'a mut HashMap<TileKey, V>) -> Self {
        Self { data }
    }
}

impl<V: Sample> SampleStore<V> for SparseStore<'_, V> {
    fn store(&mut self, x: i32, y: i32, value: V) {
        self.data.insert(TileKey::new(x, y), value);
    }

    fn load(&self, x: i32, y: i32) -> V {
        self.data.get(&TileKey::new(x, y)).copied().unwrap_or(V::ZERO)
    }

    fn store_default(&mut self, _x: i32, _y: i32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_store_is_anchored() {
        let mut buffer = vec![0u16; 9];
        let mut store = DenseStore::new(10, 20, 3, &mut buffer);
        store.store(10, 20, 7);
        store.store(12, 22, 9);
        assert_eq!(store.load(10, 20), 7);
        assert_eq!(store.load(12, 22), 9);
        drop(store);
        assert_eq!(buffer[0], 7);
        assert_eq!(buffer[8], 9);
    }

    #[test]
    fn dense_default_writes_zero() {
        let mut buffer = vec![42u8; 4];
        let mut store = DenseStore::new(0, 0, 2, &mut buffer);
        store.store_default(1, 1);
        assert_eq!(buffer, vec![42, 42, 42, 0]);
    }

    #[test]
    fn sparse_default_skips_vertex() {
        let mut map = HashMap::new();
        let mut store = SparseStore::new(&mut map);
        store.store(-3, 5, 100u8);
        store.store_default(0, 0);
        assert_eq!(store.load(-3, 5), 100);
        assert_eq!(store.load(0, 0), 0);
        drop(store);
        assert_eq!(map.len(), 1);
    }
}

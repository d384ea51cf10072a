//! Editing operations over a tiled terrain: rectangle reads and writes of
//! heights, layer weights, and selection masks, expressed in terrain grid
//! coordinates and mapped onto the per-tile bitmaps underneath.
//!
//! All edits go through an [`EditSession`], which tracks the bitmap locks
//! and renderer update regions the edits accumulate and settles both when
//! the session is flushed or dropped.

use std::collections::HashMap;

use terrain_model::coords::{
    subsection_for_tile_local, texel_for_subsection, tile_index_range_exclusive,
};
use terrain_model::{GridRect, TileKey};
use terrain_tiles::Terrain;
use terrain_tiles::layers::LayerName;

mod cache;
mod channels;
mod gather;
mod mips;
mod scatter;
mod select;
mod store;
mod texel;
mod weights;

pub use cache::TextureEditCache;
pub use store::{DenseStore, SampleStore, SparseStore};
pub use weights::WeightAdjustMode;

use gather::{HeightSource, PackedNormalSource, WeightSource};

/// One editing pass over a terrain. Operations may be freely mixed; closing
/// the session (via [`flush`](EditSession::flush) or drop) unlocks every
/// touched bitmap and commits the accumulated renderer update regions.
pub struct EditSession<'t> {
    terrain: &'t mut Terrain,
    cache: TextureEditCache,
}

impl<'t> EditSession<'t> {
    pub fn new(terrain: &'t mut Terrain) -> Self {
        EditSession {
            terrain,
            cache: TextureEditCache::new(),
        }
    }

    /// Reads heights over `rect` into `data`, interpolating across missing
    /// tiles. Returns the region real data (as opposed to synthesized fill)
    /// came from, or `None` when nothing near the rectangle exists.
    /// A `stride` of zero means rows are exactly the rectangle's width.
    pub fn get_height_data(
        &mut self,
        rect: GridRect,
        data: &mut [u16],
        stride: i32,
    ) -> Option<GridRect> {
        let stride = if stride == 0 { rect.width() } else { stride };
        let mut parts = self.terrain.parts_mut();
        let mut store = DenseStore::new(rect.x1, rect.y1, stride, data);
        gather::gather_interpolated(&mut parts, &mut self.cache, &HeightSource, rect, &mut store)
    }

    /// Reads one vertex's height from the tile that exclusively owns it
    /// (a seam vertex belongs to the higher-indexed tile). `None` when that
    /// tile is missing, even if a neighbor stores a border copy.
    pub fn height_at(&mut self, x: i32, y: i32) -> Option<u16> {
        let parts = self.terrain.parts_mut();
        let ts = parts.layout.tile_size_quads();
        let ssq = parts.layout.subsection_size_quads();
        let (ix, iy, _, _) = tile_index_range_exclusive(x, y, x, y, ts);
        let key = TileKey::new(ix * ts, iy * ts);
        let tile = parts.tiles.get(&key)?;
        self.cache
            .ensure_locked(parts.resources, parts.locker, tile.heightmap, 0);
        let sub = subsection_for_tile_local(
            x - ix * ts,
            y - iy * ts,
            ssq,
            parts.layout.num_subsections(),
        );
        Some(texel::read_height(
            parts.resources,
            tile,
            texel_for_subsection(0, ssq, sub.sub_x, sub.local_x),
            texel_for_subsection(0, ssq, sub.sub_y, sub.local_y),
        ))
    }

    /// Interpolating height read into a sparse map keyed by vertex
    /// coordinates; vertices no tile could account for are left out.
    pub fn get_height_data_sparse(
        &mut self,
        rect: GridRect,
        out: &mut HashMap<TileKey, u16>,
    ) -> Option<GridRect> {
        let mut parts = self.terrain.parts_mut();
        let mut store = SparseStore::new(out);
        gather::gather_interpolated(&mut parts, &mut self.cache, &HeightSource, rect, &mut store)
    }

    /// Reads heights over `rect`, skipping missing tiles entirely: their
    /// vertices keep whatever `data` already holds.
    pub fn get_height_data_fast(&mut self, rect: GridRect, data: &mut [u16], stride: i32) {
        let stride = if stride == 0 { rect.width() } else { stride };
        let mut parts = self.terrain.parts_mut();
        let mut store = DenseStore::new(rect.x1, rect.y1, stride, data);
        gather::gather_fast(&mut parts, &mut self.cache, &HeightSource, rect, &mut store);
    }

    /// Reads packed two-byte normals over `rect`, skipping missing tiles.
    pub fn get_normal_data_fast(&mut self, rect: GridRect, data: &mut [u16], stride: i32) {
        let stride = if stride == 0 { rect.width() } else { stride };
        let mut parts = self.terrain.parts_mut();
        let mut store = DenseStore::new(rect.x1, rect.y1, stride, data);
        gather::gather_fast(
            &mut parts,
            &mut self.cache,
            &PackedNormalSource,
            rect,
            &mut store,
        );
    }

    /// Writes heights over `rect` into every tile storing those vertices,
    /// then rebuilds the affected mips. With `calc_normals` the normals of
    /// strictly interior vertices are recomputed; otherwise `normal_data`,
    /// when given, supplies packed normals for every written vertex.
    pub fn set_height_data(
        &mut self,
        rect: GridRect,
        data: &[u16],
        stride: i32,
        calc_normals: bool,
        normal_data: Option<&[u16]>,
    ) {
        let mut parts = self.terrain.parts_mut();
        scatter::set_height_data(
            &mut parts,
            &mut self.cache,
            rect,
            data,
            stride,
            calc_normals,
            normal_data,
        );
    }

    /// Recomputes every tile's normals from current heights, border
    /// vertices included.
    pub fn recalculate_normals(&mut self) {
        let mut parts = self.terrain.parts_mut();
        scatter::recalculate_normals(&mut parts, &mut self.cache);
    }

    /// Reads one layer's weights over `rect`, interpolating across missing
    /// tiles. Tiles without an allocation for the layer read zero but still
    /// count as real data for the returned region.
    pub fn get_weight_data(
        &mut self,
        layer: &LayerName,
        rect: GridRect,
        data: &mut [u8],
        stride: i32,
    ) -> Option<GridRect> {
        let stride = if stride == 0 { rect.width() } else { stride };
        let mut parts = self.terrain.parts_mut();
        let mut store = DenseStore::new(rect.x1, rect.y1, stride, data);
        gather::gather_interpolated(
            &mut parts,
            &mut self.cache,
            &WeightSource { layer },
            rect,
            &mut store,
        )
    }

    /// Reads one layer's weights over `rect`, skipping missing tiles.
    pub fn get_weight_data_fast(
        &mut self,
        layer: &LayerName,
        rect: GridRect,
        data: &mut [u8],
        stride: i32,
    ) {
        let stride = if stride == 0 { rect.width() } else { stride };
        let mut parts = self.terrain.parts_mut();
        let mut store = DenseStore::new(rect.x1, rect.y1, stride, data);
        gather::gather_fast(
            &mut parts,
            &mut self.cache,
            &WeightSource { layer },
            rect,
            &mut store,
        );
    }

    /// Writes one layer's weights over `rect`, allocating weightmap
    /// channels where needed and rebalancing the other layers per `mode`.
    pub fn set_weight_data(
        &mut self,
        layer: &LayerName,
        rect: GridRect,
        data: &[u8],
        stride: i32,
        mode: WeightAdjustMode,
    ) {
        let mut parts = self.terrain.parts_mut();
        weights::set_weight_data(&mut parts, &mut self.cache, layer, rect, data, stride, mode);
    }

    /// Removes a layer from every tile, rescaling the remaining blended
    /// layers to keep each vertex's weights summing to 255.
    pub fn delete_layer(&mut self, layer: &LayerName) {
        let mut parts = self.terrain.parts_mut();
        weights::delete_layer(&mut parts, &mut self.cache, layer);
    }

    /// Reads selection strengths over `rect`; unselected and missing
    /// vertices read zero.
    pub fn get_select_data(&mut self, rect: GridRect, data: &mut [u8], stride: i32) {
        let stride = if stride == 0 { rect.width() } else { stride };
        let mut parts = self.terrain.parts_mut();
        let mut store = DenseStore::new(rect.x1, rect.y1, stride, data);
        select::get_select_data(&mut parts, &mut self.cache, rect, &mut store);
    }

    /// Writes selection strengths over `rect`, creating tile masks lazily.
    pub fn set_select_data(&mut self, rect: GridRect, data: &[u8], stride: i32) {
        let mut parts = self.terrain.parts_mut();
        select::set_select_data(&mut parts, &mut self.cache, rect, data, stride);
    }

    /// Unlocks all touched bitmaps and commits pending update regions.
    /// Returns whether any renderer-shared bitmap now has updates to sync.
    pub fn flush(&mut self) -> bool {
        let parts = self.terrain.parts_mut();
        self.cache.flush(parts.resources, parts.locker)
    }
}

impl Drop for EditSession<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests;

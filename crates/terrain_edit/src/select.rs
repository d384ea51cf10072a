//! Region-selection masks: one lazily created single-channel texture per
//! tile holding per-vertex selection strength.

use terrain_model::coords::{
    subsection_index_range, subsection_vertex_span, tile_index_range_exclusive,
    tile_index_range_overlap, tile_quad_box,
};
use terrain_model::{GridRect, TileKey};
use terrain_tiles::TerrainPartsMut;

use crate::cache::TextureEditCache;
use crate::mips;
use crate::store::SampleStore;
use crate::texel;

/// Reads selection strengths over a rectangle. Vertices of tiles without a
/// mask, and of missing tiles, read zero.
pub(crate) fn get_select_data<D: SampleStore<u8>>(
    parts: &mut TerrainPartsMut<'_>,
    cache: &mut TextureEditCache,
    rect: GridRect,
    store: &mut D,
) {
    let GridRect { x1, y1, x2, y2 } = rect;
    let ts = parts.layout.tile_size_quads();
    let ssq = parts.layout.subsection_size_quads();
    let num_sub = parts.layout.num_subsections();
    let size = parts.layout.texture_size();

    let (ix1, iy1, ix2, iy2) = tile_index_range_exclusive(x1, y1, x2, y2, ts);
    for iy in iy1..=iy2 {
        for ix in ix1..=ix2 {
            let key = TileKey::new(ix * ts, iy * ts);
            let mask = parts.tiles.get(&key).and_then(|tile| tile.select_mask);
            if let Some(mask) = mask {
                cache.ensure_locked(parts.resources, parts.locker, mask, 0);
            }

            let (tile_x1, tile_y1, tile_x2, tile_y2) = tile_quad_box(ix, iy, ts, x1, y1, x2, y2);
            let (sub_x1, sub_x2) = subsection_index_range(tile_x1, tile_x2, ssq, num_sub);
            let (sub_y1, sub_y2) = subsection_index_range(tile_y1, tile_y2, ssq, num_sub);

            for sub_y in sub_y1..=sub_y2 {
                for sub_x in sub_x1..=sub_x2 {
                    let (span_x1, span_x2) = subsection_vertex_span(tile_x1, tile_x2, sub_x, ssq);
                    let (span_y1, span_y2) = subsection_vertex_span(tile_y1, tile_y2, sub_y, ssq);
                    for sy in span_y1..=span_y2 {
                        for sx in span_x1..=span_x2 {
                            let gx = sub_x * ssq + ix * ts + sx;
                            let gy = sub_y * ssq + iy * ts + sy;
                            let value = match mask {
                                Some(mask) => {
                                    let tex_x = (ssq + 1) * sub_x + sx;
                                    let tex_y = (ssq + 1) * sub_y + sy;
                                    parts.resources.get(mask).mip_data(0)
                                        [texel::gray_base(size, tex_x, tex_y)]
                                }
                                None => 0,
                            };
                            store.store(gx, gy, value);
                        }
                    }
                }
            }
        }
    }
}

/// Writes selection strengths over a rectangle, creating the mask texture
/// of any touched tile that lacks one. Missing tiles are skipped.
pub(crate) fn set_select_data(
    parts: &mut TerrainPartsMut<'_>,
    cache: &mut TextureEditCache,
    rect: GridRect,
    data: &[u8],
    stride: i32,
) {
    let GridRect { x1, y1, x2, y2 } = rect;
    let stride = if stride == 0 { 1 + x2 - x1 } else { stride };
    let ts = parts.layout.tile_size_quads();
    let ssq = parts.layout.subsection_size_quads();
    let num_sub = parts.layout.num_subsections();
    let size = parts.layout.texture_size();

    let (ix1, iy1, ix2, iy2) = tile_index_range_overlap(x1, y1, x2, y2, ts);
    for iy in iy1..=iy2 {
        for ix in ix1..=ix2 {
            let key = TileKey::new(ix * ts, iy * ts);
            if !parts.tiles.contains_key(&key) {
                continue;
            }
            let mask = parts.ensure_select_mask(key);
            cache.ensure_locked(parts.resources, parts.locker, mask, 0);

            let (tile_x1, tile_y1, tile_x2, tile_y2) = tile_quad_box(ix, iy, ts, x1, y1, x2, y2);
            let (sub_x1, sub_x2) = subsection_index_range(tile_x1, tile_x2, ssq, num_sub);
            let (sub_y1, sub_y2) = subsection_index_range(tile_y1, tile_y2, ssq, num_sub);

            for sub_y in sub_y1..=sub_y2 {
                for sub_x in sub_x1..=sub_x2 {
                    let (span_x1, span_x2) = subsection_vertex_span(tile_x1, tile_x2, sub_x, ssq);
                    let (span_y1, span_y2) = subsection_vertex_span(tile_y1, tile_y2, sub_y, ssq);
                    for sy in span_y1..=span_y2 {
                        for sx in span_x1..=span_x2 {
                            let gx = sub_x * ssq + ix * ts + sx;
                            let gy = sub_y * ssq + iy * ts + sy;
                            let value = data[((gx - x1) + stride * (gy - y1)) as usize];
                            let tex_x = (ssq + 1) * sub_x + sx;
                            let tex_y = (ssq + 1) * sub_y + sy;
                            parts.resources.get_mut(mask).mip_data_mut(0)
                                [texel::gray_base(size, tex_x, tex_y)] = value;
                        }
                    }
                    cache.add_mip_update_region(
                        mask,
                        0,
                        (ssq + 1) * sub_x + span_x1,
                        (ssq + 1) * sub_y + span_y1,
                        (ssq + 1) * sub_x + span_x2,
                        (ssq + 1) * sub_y + span_y2,
                    );
                }
            }

            let layout = parts.layout;
            mips::update_data_mips(
                &layout,
                parts.resources,
                parts.locker,
                cache,
                mask,
                Some(GridRect::new(tile_x1, tile_y1, tile_x2, tile_y2)),
            );
        }
    }
}

//! Region gathers: copying a rectangle of vertex data out of the tiles it
//! spans, synthesizing values over gaps where tiles are missing.
//!
//! The interpolating gather runs in two passes. The first pass copies data
//! from present tiles and fills gap cells that have at least one present
//! neighbor in the sweep, blending from the nearest tile edges and corners.
//! The second pass revisits cells still empty after that and interpolates
//! purely from values the first pass stored, so arbitrarily large holes
//! converge to a smooth fill. The fast gather skips all of this and copies
//! only what exists.

use terrain_model::coords::{
    subsection_index_range, subsection_vertex_span, tile_index_range_exclusive,
    tile_index_range_overlap, tile_quad_box,
};
use terrain_model::{GridRect, OccupancyGrid, Sample, TerrainLayout, TileKey};
use terrain_tiles::TerrainPartsMut;
use terrain_tiles::layers::LayerName;

use crate::cache::TextureEditCache;
use crate::store::SampleStore;
use crate::texel;

/// One kind of per-vertex data a gather can read out of a tile.
pub(crate) trait TexelSource {
    type Value: Sample;

    /// Locks the tile's backing bitmap in the session cache, when the tile
    /// has one for this source.
    fn open(&self, parts: &mut TerrainPartsMut<'_>, cache: &mut TextureEditCache, key: TileKey);

    /// Mip-0 read at subsection texel coordinates. Tiles without backing
    /// data for this source read zero.
    fn load(&self, parts: &TerrainPartsMut<'_>, key: TileKey, tex_x: i32, tex_y: i32)
    -> Self::Value;
}

pub(crate) struct HeightSource;

impl TexelSource for HeightSource {
    type Value = u16;

    fn open(&self, parts: &mut TerrainPartsMut<'_>, cache: &mut TextureEditCache, key: TileKey) {
        let heightmap = parts.tiles[&key].heightmap;
        cache.ensure_locked(parts.resources, parts.locker, heightmap, 0);
    }

    fn load(&self, parts: &TerrainPartsMut<'_>, key: TileKey, tex_x: i32, tex_y: i32) -> u16 {
        texel::read_height(parts.resources, &parts.tiles[&key], tex_x, tex_y)
    }
}

/// Packed normal bytes of the heightmap, readable only through the fast
/// gather: interpolating normals through gaps is meaningless.
pub(crate) struct PackedNormalSource;

impl TexelSource for PackedNormalSource {
    type Value = u16;

    fn open(&self, parts: &mut TerrainPartsMut<'_>, cache: &mut TextureEditCache, key: TileKey) {
        let heightmap = parts.tiles[&key].heightmap;
        cache.ensure_locked(parts.resources, parts.locker, heightmap, 0);
    }

    fn load(&self, parts: &TerrainPartsMut<'_>, key: TileKey, tex_x: i32, tex_y: i32) -> u16 {
        texel::read_packed_normal(parts.resources, &parts.tiles[&key], tex_x, tex_y)
    }
}

pub(crate) struct WeightSource<'n> {
    pub layer: &'n LayerName,
}

impl TexelSource for WeightSource<'_> {
    type Value = u8;

    fn open(&self, parts: &mut TerrainPartsMut<'_>, cache: &mut TextureEditCache, key: TileKey) {
        let tile = &parts.tiles[&key];
        let backing = tile
            .allocation_for(self.layer)
            .filter(|a| a.is_allocated())
            .map(|a| tile.weightmaps[a.resource_index as usize]);
        if let Some(resource) = backing {
            cache.ensure_locked(parts.resources, parts.locker, resource, 0);
        }
    }

    fn load(&self, parts: &TerrainPartsMut<'_>, key: TileKey, tex_x: i32, tex_y: i32) -> u8 {
        texel::read_weight(parts.resources, &parts.tiles[&key], self.layer, tex_x, tex_y)
    }
}

/// Axis interpolation between up to two existing values. Distances pair
/// with existence flags: a flagged entry always carries a real distance.
fn calc_interp_value<V: Sample>(dist: &[i32; 4], exist: &[bool; 4], value: &[V; 4]) -> (f32, f32) {
    let mut value_x = 0.0f32;
    let mut value_y = 0.0f32;
    if exist[0] && exist[1] {
        value_x = ((dist[1] as f64 * value[0].to_f32() as f64
            + dist[0] as f64 * value[1].to_f32() as f64)
            / (dist[0] + dist[1]) as f64) as f32;
    } else if exist[0] {
        value_x = value[0].to_f32();
    } else if exist[1] {
        value_x = value[1].to_f32();
    }
    if exist[2] && exist[3] {
        value_y = ((dist[3] as f64 * value[2].to_f32() as f64
            + dist[2] as f64 * value[3].to_f32() as f64)
            / (dist[2] + dist[3]) as f64) as f32;
    } else if exist[2] {
        value_y = value[2].to_f32();
    } else if exist[3] {
        value_y = value[3].to_f32();
    }
    (value_x, value_y)
}

/// Combines the two axis values, weighting each by the other axis's
/// distance so the nearer axis dominates. On the degenerate zero-distance
/// case the matching known corner wins.
fn combine_axes<V: Sample>(
    dist: &[i32; 4],
    value_x: f32,
    value_y: f32,
    corner_set: u8,
    corner_values: &[V; 4],
) -> V {
    let value_x = V::from_f32_truncated(value_x);
    let value_y = V::from_f32_truncated(value_y);
    let dist_x = dist[0].min(dist[1]);
    let dist_y = dist[2].min(dist[3]);
    if dist_x + dist_y > 0 {
        V::from_f32_truncated(
            ((value_x.to_f32() as f64 * dist_y as f64 + value_y.to_f32() as f64 * dist_x as f64)
                / (dist_x + dist_y) as f64) as f32,
        )
    } else if corner_set & 1 != 0 && dist[0] == 0 && dist[2] == 0 {
        corner_values[0]
    } else if corner_set & (1 << 1) != 0 && dist[1] == 0 && dist[2] == 0 {
        corner_values[1]
    } else if corner_set & (1 << 2) != 0 && dist[0] == 0 && dist[3] == 0 {
        corner_values[2]
    } else if corner_set & (1 << 3) != 0 && dist[1] == 0 && dist[3] == 0 {
        corner_values[3]
    } else {
        value_x
    }
}

/// Linear blend of two corner values along one tile edge, truncated to the
/// sample type.
fn corner_blend<V: Sample>(near: V, far: V, dist_near: i32, dist_far: i32) -> V {
    V::from_f32_truncated(
        ((dist_far as f64 * near.to_f32() as f64 + dist_near as f64 * far.to_f32() as f64)
            / (dist_near + dist_far) as f64) as f32,
    )
}

/// Propagates known corner values to unknown corners of a gap cell until
/// all four are set. Corner bits: 0 top-left, 1 top-right, 2 bottom-left,
/// 3 bottom-right; each known corner seeds its two adjacent corners first.
pub(crate) fn fill_corner_values<V: Sample>(corner_set: &mut u8, values: &mut [V; 4]) {
    let mut original = *corner_set;
    if original == 0 {
        return;
    }
    while *corner_set != 15 {
        if original & 1 != 0 {
            if *corner_set & (1 << 1) == 0 {
                values[1] = values[0];
                *corner_set |= 1 << 1;
            }
            if *corner_set & (1 << 2) == 0 {
                values[2] = values[0];
                *corner_set |= 1 << 2;
            }
        }
        if *corner_set != 15 && original & (1 << 1) != 0 {
            if *corner_set & 1 == 0 {
                values[0] = values[1];
                *corner_set |= 1;
            }
            if *corner_set & (1 << 3) == 0 {
                values[3] = values[1];
                *corner_set |= 1 << 3;
            }
        }
        if *corner_set != 15 && original & (1 << 2) != 0 {
            if *corner_set & 1 == 0 {
                values[0] = values[2];
                *corner_set |= 1;
            }
            if *corner_set & (1 << 3) == 0 {
                values[3] = values[2];
                *corner_set |= 1 << 3;
            }
        }
        if *corner_set != 15 && original & (1 << 3) != 0 {
            if *corner_set & (1 << 1) == 0 {
                values[1] = values[3];
                *corner_set |= 1 << 1;
            }
            if *corner_set & (1 << 2) == 0 {
                values[2] = values[3];
                *corner_set |= 1 << 2;
            }
        }
        original = *corner_set;
    }
}

/// Interpolating gather. Returns the region actually covered by data:
/// the requested rectangle when every tile was present, the intersection
/// of the request with the reachable extent when gaps were filled, `None`
/// when no data exists anywhere near the request.
pub(crate) fn gather_interpolated<S, D>(
    parts: &mut TerrainPartsMut<'_>,
    cache: &mut TextureEditCache,
    source: &S,
    rect: GridRect,
    store: &mut D,
) -> Option<GridRect>
where
    S: TexelSource,
    D: SampleStore<S::Value>,
{
    let GridRect { x1, y1, x2, y2 } = rect;
    let ts = parts.layout.tile_size_quads();
    let ssq = parts.layout.subsection_size_quads();
    let num_sub = parts.layout.num_subsections();
    let edge = parts.layout.edge_texel();

    let (ix1, iy1, ix2, iy2) = tile_index_range_overlap(x1, y1, x2, y2, ts);
    let size_x = ix2 - ix1 + 1;

    let mut valid_x1 = i32::MAX;
    let mut valid_y1 = i32::MAX;
    let mut valid_x2 = i32::MIN;
    let mut valid_y2 = i32::MIN;

    let mut exists = OccupancyGrid::new(size_x, iy2 - iy1 + 1);
    let mut has_missing = false;

    // Nearest-neighbor caches for gap cells: left/right are refreshed per
    // row, up/down are kept per column across rows.
    let mut border: [Option<TileKey>; 4] = [None; 4];
    let mut no_border_y1: Vec<bool> = Vec::new();
    let mut no_border_y2: Vec<bool> = Vec::new();
    let mut border_y1: Vec<Option<TileKey>> = Vec::new();
    let mut border_y2: Vec<Option<TileKey>> = Vec::new();
    let mut corner_values = [S::Value::ZERO; 4];

    for iy in iy1..=iy2 {
        let mut no_border_x1 = false;
        let mut no_border_x2 = false;
        border[0] = None;
        border[1] = None;
        for ix in ix1..=ix2 {
            border[2] = None;
            border[3] = None;
            let cx = ix - ix1;
            let cy = iy - iy1;
            let cxu = cx as usize;
            let key = TileKey::new(ix * ts, iy * ts);
            let tile_present = parts.tiles.contains_key(&key);
            let exist_left = cx > 0 && exists.get(cx - 1, cy);
            let exist_up = cy > 0 && exists.get(cx, cy - 1);
            let mut corner_set: u8 = 0;

            if tile_present {
                source.open(parts, cache, key);
                exists.set(cx, cy);
                valid_x1 = valid_x1.min(ix * ts);
                valid_x2 = valid_x2.max(ix * ts + ts);
                valid_y1 = valid_y1.min(iy * ts);
                valid_y2 = valid_y2.max(iy * ts + ts);
            } else {
                if !has_missing {
                    no_border_y1 = vec![false; size_x as usize];
                    no_border_y2 = vec![false; size_x as usize];
                    border_y1 = vec![None; size_x as usize];
                    border_y2 = vec![None; size_x as usize];
                    has_missing = true;
                }

                // A cached neighbor behind the sweep position is stale.
                let search_x = border[1].is_some_and(|k| k.origin_x() / ts <= ix);
                let search_y = border_y2[cxu].is_some_and(|k| k.origin_y() / ts <= iy);

                if search_x || (!no_border_x1 && border[0].is_none()) {
                    no_border_x1 = true;
                    for x in (ix1..ix).rev() {
                        let candidate = TileKey::new(x * ts, iy * ts);
                        border[0] = parts.tiles.contains_key(&candidate).then_some(candidate);
                        if border[0].is_some() {
                            no_border_x1 = false;
                            source.open(parts, cache, candidate);
                            break;
                        }
                    }
                }
                if search_x || (!no_border_x2 && border[1].is_none()) {
                    no_border_x2 = true;
                    for x in ix + 1..=ix2 {
                        let candidate = TileKey::new(x * ts, iy * ts);
                        border[1] = parts.tiles.contains_key(&candidate).then_some(candidate);
                        if border[1].is_some() {
                            no_border_x2 = false;
                            source.open(parts, cache, candidate);
                            break;
                        }
                    }
                }
                if search_y || (!no_border_y1[cxu] && border_y1[cxu].is_none()) {
                    no_border_y1[cxu] = true;
                    for y in (iy1..iy).rev() {
                        let candidate = TileKey::new(ix * ts, y * ts);
                        let found = parts.tiles.contains_key(&candidate).then_some(candidate);
                        border_y1[cxu] = found;
                        border[2] = found;
                        if found.is_some() {
                            no_border_y1[cxu] = false;
                            source.open(parts, cache, candidate);
                            break;
                        }
                    }
                } else {
                    border[2] = border_y1[cxu];
                    if let Some(k) = border[2] {
                        source.open(parts, cache, k);
                    }
                }
                if search_y || (!no_border_y2[cxu] && border_y2[cxu].is_none()) {
                    no_border_y2[cxu] = true;
                    for y in iy + 1..=iy2 {
                        let candidate = TileKey::new(ix * ts, y * ts);
                        let found = parts.tiles.contains_key(&candidate).then_some(candidate);
                        border_y2[cxu] = found;
                        border[3] = found;
                        if found.is_some() {
                            no_border_y2[cxu] = false;
                            source.open(parts, cache, candidate);
                            break;
                        }
                    }
                } else {
                    border[3] = border_y2[cxu];
                    if let Some(k) = border[3] {
                        source.open(parts, cache, k);
                    }
                }

                let corner: [Option<TileKey>; 4] = [
                    TileKey::new((ix - 1) * ts, (iy - 1) * ts),
                    TileKey::new((ix + 1) * ts, (iy - 1) * ts),
                    TileKey::new((ix - 1) * ts, (iy + 1) * ts),
                    TileKey::new((ix + 1) * ts, (iy + 1) * ts),
                ]
                .map(|k| parts.tiles.contains_key(&k).then_some(k));

                if let Some(k) = corner[0] {
                    corner_set |= 1;
                    source.open(parts, cache, k);
                    corner_values[0] = source.load(parts, k, edge, edge);
                } else if (exist_left || exist_up) && x1 <= ix * ts && y1 <= iy * ts {
                    corner_set |= 1;
                    corner_values[0] = store.load(ix * ts, iy * ts);
                } else if let Some(k) = border[0] {
                    corner_set |= 1;
                    corner_values[0] = source.load(parts, k, edge, 0);
                } else if let Some(k) = border[2] {
                    corner_set |= 1;
                    corner_values[0] = source.load(parts, k, 0, edge);
                }

                if let Some(k) = corner[1] {
                    corner_set |= 1 << 1;
                    source.open(parts, cache, k);
                    corner_values[1] = source.load(parts, k, 0, edge);
                } else if exist_up && x2 >= (ix + 1) * ts {
                    corner_set |= 1 << 1;
                    corner_values[1] = store.load((ix + 1) * ts, iy * ts);
                } else if let Some(k) = border[1] {
                    corner_set |= 1 << 1;
                    corner_values[1] = source.load(parts, k, 0, 0);
                } else if let Some(k) = border[2] {
                    corner_set |= 1 << 1;
                    corner_values[1] = source.load(parts, k, edge, edge);
                }

                if let Some(k) = corner[2] {
                    corner_set |= 1 << 2;
                    source.open(parts, cache, k);
                    corner_values[2] = source.load(parts, k, edge, 0);
                } else if exist_left && y2 >= (iy + 1) * ts {
                    corner_set |= 1 << 2;
                    corner_values[2] = store.load(ix * ts, (iy + 1) * ts);
                } else if let Some(k) = border[0] {
                    corner_set |= 1 << 2;
                    corner_values[2] = source.load(parts, k, edge, edge);
                } else if let Some(k) = border[3] {
                    corner_set |= 1 << 2;
                    corner_values[2] = source.load(parts, k, 0, 0);
                }

                if let Some(k) = corner[3] {
                    corner_set |= 1 << 3;
                    source.open(parts, cache, k);
                    corner_values[3] = source.load(parts, k, 0, 0);
                } else if let Some(k) = border[1] {
                    corner_set |= 1 << 3;
                    corner_values[3] = source.load(parts, k, 0, edge);
                } else if let Some(k) = border[3] {
                    corner_set |= 1 << 3;
                    corner_values[3] = source.load(parts, k, edge, 0);
                }

                fill_corner_values(&mut corner_set, &mut corner_values);
                if exist_left || exist_up || border.iter().any(Option::is_some) || corner_set != 0
                {
                    exists.set(cx, cy);
                }
            }

            if !exists.get(cx, cy) {
                continue;
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

                            if tile_present {
                                let v = source.load(
                                    parts,
                                    key,
                                    (ssq + 1) * sub_x + sx,
                                    (ssq + 1) * sub_y + sy,
                                );
                                store.store(gx, gy, v);
                                continue;
                            }

                            let mut value = [S::Value::ZERO; 4];
                            let mut dist = [i32::MAX; 4];
                            let mut exist = [false; 4];

                            if exist_left {
                                value[0] = store.load(ix * ts, gy);
                                dist[0] = gx - ix * ts;
                                exist[0] = true;
                            } else if let Some(k) = border[0] {
                                value[0] = source.load(parts, k, edge, (ssq + 1) * sub_y + sy);
                                dist[0] = gx - (k.origin_x() + ts);
                                exist[0] = true;
                            } else if corner_set & 1 != 0 && corner_set & (1 << 2) != 0 {
                                let d1 = gy - iy * ts;
                                let d2 = (iy + 1) * ts - gy;
                                value[0] = corner_blend(corner_values[0], corner_values[2], d1, d2);
                                dist[0] = gx - ix * ts;
                                exist[0] = true;
                            }

                            if let Some(k) = border[1] {
                                value[1] = source.load(parts, k, 0, (ssq + 1) * sub_y + sy);
                                dist[1] = k.origin_x() - gx;
                                exist[1] = true;
                            } else if corner_set & (1 << 1) != 0 && corner_set & (1 << 3) != 0 {
                                let d1 = gy - iy * ts;
                                let d2 = (iy + 1) * ts - gy;
                                value[1] = corner_blend(corner_values[1], corner_values[3], d1, d2);
                                dist[1] = (ix + 1) * ts - gx;
                                exist[1] = true;
                            }

                            if exist_up {
                                value[2] = store.load(gx, iy * ts);
                                dist[2] = gy - iy * ts;
                                exist[2] = true;
                            } else if let Some(k) = border[2] {
                                value[2] = source.load(parts, k, (ssq + 1) * sub_x + sx, edge);
                                dist[2] = gy - (k.origin_y() + ts);
                                exist[2] = true;
                            } else if corner_set & 1 != 0 && corner_set & (1 << 1) != 0 {
                                let d1 = gx - ix * ts;
                                let d2 = (ix + 1) * ts - gx;
                                value[2] = corner_blend(corner_values[0], corner_values[1], d1, d2);
                                dist[2] = gy - iy * ts;
                                exist[2] = true;
                            }

                            if let Some(k) = border[3] {
                                value[3] = source.load(parts, k, (ssq + 1) * sub_x + sx, 0);
                                dist[3] = k.origin_y() - gy;
                                exist[3] = true;
                            } else if corner_set & (1 << 2) != 0 && corner_set & (1 << 3) != 0 {
                                let d1 = gx - ix * ts;
                                let d2 = (ix + 1) * ts - gx;
                                value[3] = corner_blend(corner_values[2], corner_values[3], d1, d2);
                                dist[3] = (iy + 1) * ts - gy;
                                exist[3] = true;
                            }

                            let (value_x, value_y) = calc_interp_value(&dist, &exist, &value);

                            let final_value = if (exist[0] || exist[1]) && (exist[2] || exist[3]) {
                                combine_axes(&dist, value_x, value_y, corner_set, &corner_values)
                            } else if border[0].is_some() || border[1].is_some() {
                                S::Value::from_f32_truncated(value_x)
                            } else if border[2].is_some() || border[3].is_some() {
                                S::Value::from_f32_truncated(value_y)
                            } else if exist[0] || exist[1] {
                                S::Value::from_f32_truncated(value_x)
                            } else if exist[2] || exist[3] {
                                S::Value::from_f32_truncated(value_y)
                            } else {
                                S::Value::ZERO
                            };
                            store.store(gx, gy, final_value);
                        }
                    }
                }
            }
        }
    }

    if has_missing {
        fill_missing_cells(
            parts.layout,
            rect,
            (ix1, iy1, ix2, iy2),
            &exists,
            &mut corner_values,
            &mut no_border_y1,
            &mut no_border_y2,
            store,
        );
        valid_x1 = valid_x1.max(x1);
        valid_x2 = valid_x2.min(x2);
        valid_y1 = valid_y1.max(y1);
        valid_y2 = valid_y2.min(y2);
        if valid_x1 > valid_x2 || valid_y1 > valid_y2 {
            return None;
        }
        Some(GridRect::new(valid_x1, valid_y1, valid_x2, valid_y2))
    } else {
        Some(rect)
    }
}

/// Second gather pass: fills cells the first pass could not reach from any
/// tile, interpolating between first-pass values already in the store.
#[allow(clippy::too_many_arguments)]
fn fill_missing_cells<V, D>(
    layout: TerrainLayout,
    rect: GridRect,
    range: (i32, i32, i32, i32),
    exists: &OccupancyGrid,
    corner_values: &mut [V; 4],
    no_border_y1: &mut [bool],
    no_border_y2: &mut [bool],
    store: &mut D,
) where
    V: Sample,
    D: SampleStore<V>,
{
    let GridRect { x1, y1, x2, y2 } = rect;
    let (ix1, iy1, ix2, iy2) = range;
    let ts = layout.tile_size_quads();
    let ssq = layout.subsection_size_quads();
    let num_sub = layout.num_subsections();
    let size_x = (ix2 - ix1 + 1) as usize;

    no_border_y1.fill(false);
    no_border_y2.fill(false);
    // Tile-index positions of the nearest filled cells, per column.
    let mut border_y1 = vec![i32::MAX; size_x];
    let mut border_y2 = vec![i32::MIN; size_x];

    for iy in iy1..=iy2 {
        let mut no_border_x1 = false;
        let mut no_border_x2 = false;
        let mut border_x1 = i32::MAX;
        let mut border_x2 = i32::MIN;
        for ix in ix1..=ix2 {
            let cx = ix - ix1;
            let cy = iy - iy1;
            let cxu = cx as usize;
            if exists.get(cx, cy) {
                continue;
            }

            let mut corner_set: u8 = 0;
            let exist_left = cx > 0 && exists.get(cx - 1, cy);
            let exist_up = cy > 0 && exists.get(cx, cy - 1);

            let search_x = border_x2 <= ix;
            let search_y = border_y2[cxu] <= iy;
            if search_x || (!no_border_x1 && border_x1 == i32::MAX) {
                no_border_x1 = true;
                border_x1 = i32::MAX;
                for x in (ix1..ix).rev() {
                    if exists.get(x - ix1, cy) {
                        no_border_x1 = false;
                        border_x1 = x;
                        break;
                    }
                }
            }
            if search_x || (!no_border_x2 && border_x2 == i32::MIN) {
                no_border_x2 = true;
                border_x2 = i32::MIN;
                for x in ix + 1..=ix2 {
                    if exists.get(x - ix1, cy) {
                        no_border_x2 = false;
                        border_x2 = x;
                        break;
                    }
                }
            }
            if search_y || (!no_border_y1[cxu] && border_y1[cxu] == i32::MAX) {
                no_border_y1[cxu] = true;
                border_y1[cxu] = i32::MAX;
                for y in (iy1..iy).rev() {
                    if exists.get(cx, y - iy1) {
                        no_border_y1[cxu] = false;
                        border_y1[cxu] = y;
                        break;
                    }
                }
            }
            if search_y || (!no_border_y2[cxu] && border_y2[cxu] == i32::MIN) {
                no_border_y2[cxu] = true;
                border_y2[cxu] = i32::MIN;
                for y in iy + 1..=iy2 {
                    if exists.get(cx, y - iy1) {
                        no_border_y2[cxu] = false;
                        border_y2[cxu] = y;
                        break;
                    }
                }
            }

            if exists.get(cx - 1, cy - 1) {
                corner_set |= 1;
                corner_values[0] = store.load(ix * ts, iy * ts);
            }
            if exists.get(cx + 1, cy - 1) {
                corner_set |= 1 << 1;
                corner_values[1] = store.load((ix + 1) * ts, iy * ts);
            }
            if exists.get(cx - 1, cy + 1) {
                corner_set |= 1 << 2;
                corner_values[2] = store.load(ix * ts, (iy + 1) * ts);
            }
            if exists.get(cx + 1, cy + 1) {
                corner_set |= 1 << 3;
                corner_values[3] = store.load((ix + 1) * ts, (iy + 1) * ts);
            }

            fill_corner_values(&mut corner_set, corner_values);

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

                            let mut value = [V::ZERO; 4];
                            let mut dist = [i32::MAX; 4];
                            let mut exist = [false; 4];

                            if exist_left {
                                value[0] = store.load(ix * ts, gy);
                                dist[0] = gx - ix * ts;
                                exist[0] = true;
                            } else if border_x1 != i32::MAX {
                                let border_idx = (border_x1 + 1) * ts;
                                value[0] = store.load(border_idx, gy);
                                dist[0] = gx - (border_idx - 1);
                                exist[0] = true;
                            } else if corner_set & 1 != 0 && corner_set & (1 << 2) != 0 {
                                let d1 = gy - iy * ts;
                                let d2 = (iy + 1) * ts - gy;
                                value[0] = corner_blend(corner_values[0], corner_values[2], d1, d2);
                                dist[0] = gx - ix * ts;
                                exist[0] = true;
                            }

                            if border_x2 != i32::MIN {
                                let border_idx = border_x2 * ts;
                                value[1] = store.load(border_idx, gy);
                                dist[1] = (border_idx + 1) - gx;
                                exist[1] = true;
                            } else if corner_set & (1 << 1) != 0 && corner_set & (1 << 3) != 0 {
                                let d1 = gy - iy * ts;
                                let d2 = (iy + 1) * ts - gy;
                                value[1] = corner_blend(corner_values[1], corner_values[3], d1, d2);
                                dist[1] = (ix + 1) * ts - gx;
                                exist[1] = true;
                            }

                            if exist_up {
                                value[2] = store.load(gx, iy * ts);
                                dist[2] = gy - iy * ts;
                                exist[2] = true;
                            } else if border_y1[cxu] != i32::MAX {
                                let border_idx = (border_y1[cxu] + 1) * ts;
                                value[2] = store.load(gx, border_idx);
                                dist[2] = gy - border_idx;
                                exist[2] = true;
                            } else if corner_set & 1 != 0 && corner_set & (1 << 1) != 0 {
                                let d1 = gx - ix * ts;
                                let d2 = (ix + 1) * ts - gx;
                                value[2] = corner_blend(corner_values[0], corner_values[1], d1, d2);
                                dist[2] = gy - iy * ts;
                                exist[2] = true;
                            }

                            if border_y2[cxu] != i32::MIN {
                                let border_idx = border_y2[cxu] * ts;
                                value[3] = store.load(gx, border_idx);
                                dist[3] = border_idx - gy;
                                exist[3] = true;
                            } else if corner_set & (1 << 2) != 0 && corner_set & (1 << 3) != 0 {
                                let d1 = gx - ix * ts;
                                let d2 = (ix + 1) * ts - gx;
                                value[3] = corner_blend(corner_values[2], corner_values[3], d1, d2);
                                dist[3] = (iy + 1) * ts - gy;
                                exist[3] = true;
                            }

                            let (value_x, value_y) = calc_interp_value(&dist, &exist, &value);

                            let final_value = if (exist[0] || exist[1]) && (exist[2] || exist[3]) {
                                combine_axes(&dist, value_x, value_y, corner_set, corner_values)
                            } else if exist[0] || exist[1] {
                                V::from_f32_truncated(value_x)
                            } else if exist[2] || exist[3] {
                                V::from_f32_truncated(value_y)
                            } else {
                                V::ZERO
                            };
                            store.store(gx, gy, final_value);
                        }
                    }
                }
            }
        }
    }
}

/// Non-interpolating gather: copies data from present tiles and leaves
/// vertices of missing tiles untouched (dense stores keep their zeros).
pub(crate) fn gather_fast<S, D>(
    parts: &mut TerrainPartsMut<'_>,
    cache: &mut TextureEditCache,
    source: &S,
    rect: GridRect,
    store: &mut D,
) where
    S: TexelSource,
    D: SampleStore<S::Value>,
{
    let GridRect { x1, y1, x2, y2 } = rect;
    let ts = parts.layout.tile_size_quads();
    let ssq = parts.layout.subsection_size_quads();
    let num_sub = parts.layout.num_subsections();

    let (ix1, iy1, ix2, iy2) = tile_index_range_exclusive(x1, y1, x2, y2, ts);
    for iy in iy1..=iy2 {
        for ix in ix1..=ix2 {
            let key = TileKey::new(ix * ts, iy * ts);
            if !parts.tiles.contains_key(&key) {
                continue;
            }
            source.open(parts, cache, key);

            let (tile_x1, tile_y1, tile_x2, tile_y2) = tile_quad_box(ix, iy, ts, x1, y1, x2, y2);
            let (sub_x1, sub_x2) = subsection_index_range(tile_x1, tile_x2, ssq, num_sub);
            let (sub_y1, sub_y2) = subsection_index_range(tile_y1, tile_y2, ssq, num_sub);

            for sub_y in sub_y1..=sub_y2 {
                for sub_x in sub_x1..=sub_x2 {
                    let (span_x1, span_x2) = subsection_vertex_span(tile_x1, tile_x2, sub_x, ssq);
                    let (span_y1, span_y2) = subsection_vertex_span(tile_y1, tile_y2, sub_y, ssq);
                    for sy in span_y1..=span_y2 {
                        for sx in span_x1..=span_x2 {
                            let v = source.load(
                                parts,
                                key,
                                (ssq + 1) * sub_x + sx,
                                (ssq + 1) * sub_y + sy,
                            );
                            store.store(sub_x * ssq + ix * ts + sx, sub_y * ssq + iy * ts + sy, v);
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corner_fill_reaches_all_corners_from_any_seed() {
        for seed in 1u8..16 {
            let mut set = seed;
            let mut values = [0u16; 4];
            for bit in 0..4 {
                if seed & (1 << bit) != 0 {
                    values[bit] = 100 + bit as u16;
                }
            }
            fill_corner_values(&mut set, &mut values);
            assert_eq!(set, 15, "seed {seed:#06b} did not converge");
            for value in values {
                assert!(value >= 100, "seed {seed:#06b} left a corner unset");
            }
        }
    }

    #[test]
    fn corner_fill_propagates_adjacent_first() {
        // Only the top-left corner known: every corner takes its value.
        let mut set = 1u8;
        let mut values = [7u16, 0, 0, 0];
        fill_corner_values(&mut set, &mut values);
        assert_eq!(values, [7, 7, 7, 7]);

        // Top-left and bottom-right known: each fills its two neighbors,
        // the top-left first.
        let mut set = 0b1001u8;
        let mut values = [10u16, 0, 0, 30];
        fill_corner_values(&mut set, &mut values);
        assert_eq!(values, [10, 10, 10, 30]);
    }

    #[test]
    fn empty_corner_set_stays_empty() {
        let mut set = 0u8;
        let mut values = [1u16, 2, 3, 4];
        fill_corner_values(&mut set, &mut values);
        assert_eq!(set, 0);
        assert_eq!(values, [1, 2, 3, 4]);
    }

    #[test]
    fn axis_interpolation_weights_by_distance() {
        let dist = [1, 3, i32::MAX, i32::MAX];
        let exist = [true, true, false, false];
        let value = [100u16, 200, 0, 0];
        let (vx, vy) = calc_interp_value(&dist, &exist, &value);
        // Closer to value[0]: (3*100 + 1*200) / 4.
        assert_eq!(vx, 125.0);
        assert_eq!(vy, 0.0);
    }

    #[test]
    fn single_existing_value_passes_through() {
        let dist = [5, i32::MAX, i32::MAX, 2];
        let exist = [true, false, false, true];
        let value = [42u8, 0, 0, 99];
        let (vx, vy) = calc_interp_value(&dist, &exist, &value);
        assert_eq!(vx, 42.0);
        assert_eq!(vy, 99.0);
    }

    #[test]
    fn combined_axes_favor_the_nearer_axis() {
        // X axis distance 1, Y axis distance 3: X dominates 3:1.
        let dist = [1, 9, 3, 9];
        let v: u16 = combine_axes(&dist, 100.0, 200.0, 0, &[0u16; 4]);
        assert_eq!(v, 125);
    }

    #[test]
    fn zero_distance_tie_break_uses_matching_corner() {
        let dist = [0, 9, 0, 9];
        let corner_values = [77u16, 1, 2, 3];
        let v = combine_axes(&dist, 10.0, 20.0, 0b0001, &corner_values);
        assert_eq!(v, 77);
        // Without the corner bit the X value wins.
        let v = combine_axes(&dist, 10.0, 20.0, 0, &corner_values);
        assert_eq!(v, 10);
    }
}

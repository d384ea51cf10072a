//! Height scatters: writing a rectangle of vertex heights back into every
//! tile that stores a copy of those vertices, refreshing packed normals,
//! height bounds, and the mip chain as it goes.

use terrain_model::coords::{
    subsection_index_range, subsection_vertex_span, texel_offset_for_mip,
    tile_index_range_overlap, tile_quad_box,
};
use terrain_model::{GridRect, TileKey, height_to_texel_bytes, pack_normal_byte};
use terrain_tiles::TerrainPartsMut;

use crate::cache::TextureEditCache;
use crate::gather::{self, HeightSource};
use crate::mips;
use crate::store::DenseStore;

type Vec3 = [f32; 3];

fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Normalizes, or returns the zero vector when the input is degenerate.
fn safe_normal(v: Vec3) -> Vec3 {
    let len_sq = v[0] * v[0] + v[1] * v[1] + v[2] * v[2];
    if len_sq < 1.0e-8 {
        return [0.0; 3];
    }
    let inv = len_sq.sqrt().recip();
    [v[0] * inv, v[1] * inv, v[2] * inv]
}

/// Accumulates the two per-quad face normals of a height grid into
/// per-vertex normal sums. `height` maps local vertex coordinates to world
/// heights; the grid spans `0..width x 0..height_len` vertices.
fn accumulate_vertex_normals(
    width: i32,
    rows: i32,
    height_at: impl Fn(i32, i32) -> f32,
) -> Vec<Vec3> {
    let mut normals = vec![[0.0f32; 3]; (width * rows) as usize];
    for y in 0..rows - 1 {
        for x in 0..width - 1 {
            let v00 = [0.0, 0.0, height_at(x, y)];
            let v01 = [0.0, 1.0, height_at(x, y + 1)];
            let v10 = [1.0, 0.0, height_at(x + 1, y)];
            let v11 = [1.0, 1.0, height_at(x + 1, y + 1)];

            let face1 = safe_normal(cross(sub(v00, v10), sub(v10, v11)));
            let face2 = safe_normal(cross(sub(v11, v01), sub(v01, v00)));
            let both = add(face1, face2);

            let at = |vx: i32, vy: i32| (vx + width * vy) as usize;
            normals[at(x + 1, y)] = add(normals[at(x + 1, y)], face1);
            normals[at(x, y + 1)] = add(normals[at(x, y + 1)], face2);
            normals[at(x, y)] = add(normals[at(x, y)], both);
            normals[at(x + 1, y + 1)] = add(normals[at(x + 1, y + 1)], both);
        }
    }
    normals
}

fn normal_texel_bytes(n: Vec3) -> (u8, u8) {
    let n = safe_normal(n);
    (pack_normal_byte(n[0]), pack_normal_byte(n[1]))
}

/// Writes a rectangle of heights into the tiles it overlaps. Missing tiles
/// are skipped. With `calc_normals` the packed normals of strictly interior
/// vertices are recomputed from the incoming data; otherwise `normal_data`,
/// when given, supplies packed normals directly. `stride` of zero means the
/// data is exactly as wide as the rectangle.
pub(crate) fn set_height_data(
    parts: &mut TerrainPartsMut<'_>,
    cache: &mut TextureEditCache,
    rect: GridRect,
    data: &[u16],
    stride: i32,
    calc_normals: bool,
    normal_data: Option<&[u16]>,
) {
    let GridRect { x1, y1, x2, y2 } = rect;
    let stride = if stride == 0 { 1 + x2 - x1 } else { stride };
    let ts = parts.layout.tile_size_quads();
    let ssq = parts.layout.subsection_size_quads();
    let num_sub = parts.layout.num_subsections();

    let num_verts_x = 1 + x2 - x1;
    let num_verts_y = 1 + y2 - y1;
    let vertex_normals = calc_normals.then(|| {
        accumulate_vertex_normals(num_verts_x, num_verts_y, |vx, vy| {
            parts
                .layout
                .world_height(data[(vx + stride * vy) as usize])
        })
    });

    let (ix1, iy1, ix2, iy2) = tile_index_range_overlap(x1, y1, x2, y2, ts);
    for iy in iy1..=iy2 {
        for ix in ix1..=ix2 {
            let key = TileKey::new(ix * ts, iy * ts);
            if !parts.tiles.contains_key(&key) {
                continue;
            }
            let heightmap = parts.tiles[&key].heightmap;
            cache.ensure_locked(parts.resources, parts.locker, heightmap, 0);

            let size = parts.resources.get(heightmap).size();
            let tile = &parts.tiles[&key];
            let (offset_x, offset_y) =
                texel_offset_for_mip(tile.heightmap_fraction_x, tile.heightmap_fraction_y, size, 0);

            let (tile_x1, tile_y1, tile_x2, tile_y2) = tile_quad_box(ix, iy, ts, x1, y1, x2, y2);
            let (sub_x1, sub_x2) = subsection_index_range(tile_x1, tile_x2, ssq, num_sub);
            let (sub_y1, sub_y2) = subsection_index_range(tile_y1, tile_y2, ssq, num_sub);

            let mut min_height = u16::MAX;
            let mut max_height = 0u16;

            for sub_y in sub_y1..=sub_y2 {
                for sub_x in sub_x1..=sub_x2 {
                    let (span_x1, span_x2) = subsection_vertex_span(tile_x1, tile_x2, sub_x, ssq);
                    let (span_y1, span_y2) = subsection_vertex_span(tile_y1, tile_y2, sub_y, ssq);

                    for sy in span_y1..=span_y2 {
                        for sx in span_x1..=span_x2 {
                            let gx = sub_x * ssq + ix * ts + sx;
                            let gy = sub_y * ssq + iy * ts + sy;
                            let data_index = ((gx - x1) + stride * (gy - y1)) as usize;
                            let height = data[data_index];

                            min_height = min_height.min(height);
                            max_height = max_height.max(height);

                            let tex_x = offset_x + (ssq + 1) * sub_x + sx;
                            let tex_y = offset_y + (ssq + 1) * sub_y + sy;
                            let base = ((tex_y * size + tex_x) * 4) as usize;
                            let (hi, lo) = height_to_texel_bytes(height);
                            let texels = parts.resources.get_mut(heightmap).mip_data_mut(0);
                            texels[base] = hi;
                            texels[base + 1] = lo;

                            // Rectangle-edge vertices keep their old normals:
                            // triangles outside the incoming data contribute to
                            // them and are not available here.
                            if let Some(normals) = &vertex_normals {
                                if gx > x1 && gx < x2 && gy > y1 && gy < y2 {
                                    let n = normals
                                        [((gx - x1) + num_verts_x * (gy - y1)) as usize];
                                    let (b, a) = normal_texel_bytes(n);
                                    texels[base + 2] = b;
                                    texels[base + 3] = a;
                                }
                            } else if let Some(normal_data) = normal_data {
                                let packed = normal_data[data_index];
                                texels[base + 2] = (packed >> 8) as u8;
                                texels[base + 3] = (packed & 255) as u8;
                            }
                        }
                    }

                    cache.add_mip_update_region(
                        heightmap,
                        0,
                        offset_x + (ssq + 1) * sub_x + span_x1,
                        offset_y + (ssq + 1) * sub_y + span_y1,
                        offset_x + (ssq + 1) * sub_x + span_x2,
                        offset_y + (ssq + 1) * sub_y + span_y2,
                    );
                }
            }

            {
                let tile = parts.tiles.get_mut(&key).expect("tile vanished mid-write");
                tile.widen_height_bounds(min_height);
                tile.widen_height_bounds(max_height);
            }

            let layout = parts.layout;
            let tile = &parts.tiles[&key];
            mips::generate_heightmap_mips(
                &layout,
                parts.resources,
                parts.locker,
                cache,
                tile,
                Some(GridRect::new(tile_x1, tile_y1, tile_x2, tile_y2)),
            );
        }
    }
}

/// Recomputes the packed normals of every tile from current heights,
/// including tile-border vertices, by gathering one extra vertex ring
/// around each tile. Used after a change to the world height scale.
pub(crate) fn recalculate_normals(parts: &mut TerrainPartsMut<'_>, cache: &mut TextureEditCache) {
    let ts = parts.layout.tile_size_quads();
    let ssq = parts.layout.subsection_size_quads();
    let num_sub = parts.layout.num_subsections();
    let stride = ts + 3;

    let keys: Vec<TileKey> = parts.tiles.keys().copied().collect();
    for key in keys {
        let base_x = key.origin_x();
        let base_y = key.origin_y();
        let rect = GridRect::new(base_x - 1, base_y - 1, base_x + ts + 1, base_y + ts + 1);

        let mut heights = vec![0u16; (stride * stride) as usize];
        {
            let mut store = DenseStore::new(rect.x1, rect.y1, stride, &mut heights);
            gather::gather_interpolated(parts, cache, &HeightSource, rect, &mut store);
        }

        let layout = parts.layout;
        let normals = accumulate_vertex_normals(stride, stride, |vx, vy| {
            layout.world_height(heights[(vx + stride * vy) as usize])
        });

        let tile = &parts.tiles[&key];
        let heightmap = tile.heightmap;
        let size = parts.resources.get(heightmap).size();
        let (offset_x, offset_y) =
            texel_offset_for_mip(tile.heightmap_fraction_x, tile.heightmap_fraction_y, size, 0);

        cache.ensure_locked(parts.resources, parts.locker, heightmap, 0);
        for sub_y in 0..num_sub {
            for sub_x in 0..num_sub {
                for sy in 0..=ssq {
                    for sx in 0..=ssq {
                        let local_x = sub_x * ssq + sx;
                        let local_y = sub_y * ssq + sy;
                        let n = normals[((local_x + 1) + (local_y + 1) * stride) as usize];
                        let (b, a) = normal_texel_bytes(n);

                        let tex_x = offset_x + (ssq + 1) * sub_x + sx;
                        let tex_y = offset_y + (ssq + 1) * sub_y + sy;
                        let base = ((tex_y * size + tex_x) * 4) as usize;
                        let texels = parts.resources.get_mut(heightmap).mip_data_mut(0);
                        texels[base + 2] = b;
                        texels[base + 3] = a;
                    }
                }
            }
        }

        cache.add_mip_update_region(
            heightmap,
            0,
            offset_x,
            offset_y,
            offset_x + (ssq + 1) * num_sub - 1,
            offset_y + (ssq + 1) * num_sub - 1,
        );

        let tile = &parts.tiles[&key];
        mips::generate_heightmap_mips(&layout, parts.resources, parts.locker, cache, tile, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_grid_normals_point_up() {
        let normals = accumulate_vertex_normals(4, 4, |_, _| 0.0);
        for n in normals {
            let n = safe_normal(n);
            assert!(n[2] > 0.999, "expected +Z normal, got {n:?}");
        }
    }

    #[test]
    fn slope_tilts_normals_against_the_gradient() {
        // Height rises with x, so normals lean toward -x.
        let normals = accumulate_vertex_normals(4, 4, |x, _| x as f32);
        let n = safe_normal(normals[(1 + 4) as usize]);
        assert!(n[0] < 0.0);
        assert!(n[2] > 0.0);
        assert!(n[1].abs() < 1.0e-6);
    }

    #[test]
    fn degenerate_cross_product_normalizes_to_zero() {
        assert_eq!(safe_normal([0.0, 0.0, 0.0]), [0.0; 3]);
    }

    #[test]
    fn packed_normal_midpoint_is_flat() {
        let (b, a) = normal_texel_bytes([0.0, 0.0, 1.0]);
        assert_eq!((b, a), (128, 128));
    }
}

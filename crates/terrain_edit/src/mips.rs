//! Mip regeneration after mip-0 edits.
//!
//! Subsection mips are rebuilt by bilinear resampling from the previous mip,
//! restricted to the texel footprint of the edited vertex box so a small
//! brush stroke touches a small part of each mip. Below the last mip that
//! still holds a whole subsection the chain degenerates to 2x2 box
//! averaging over the full mip.

use terrain_model::coords::texel_offset_for_mip;
use terrain_model::{GridRect, TerrainLayout, height_from_texel_bytes, height_to_texel_bytes};
use terrain_tiles::resource::{ResourceKey, ResourceStore};
use terrain_tiles::{Tile, TileLocker};

use crate::cache::TextureEditCache;

fn round_lerp_byte(a: u8, b: u8, frac: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * frac).round() as u8
}

fn mip_box(
    mip_ssq: i32,
    prev_ssq: i32,
    prev: (i32, i32, i32, i32),
) -> (i32, i32, i32, i32) {
    let x1 = ((mip_ssq as f32 * prev.0 as f32) / prev_ssq as f32).floor() as i32;
    let y1 = ((mip_ssq as f32 * prev.1 as f32) / prev_ssq as f32).floor() as i32;
    let x2 = ((mip_ssq as f32 * prev.2 as f32) / prev_ssq as f32).ceil() as i32;
    let y2 = ((mip_ssq as f32 * prev.3 as f32) / prev_ssq as f32).ceil() as i32;
    (x1, y1, x2, y2)
}

/// Rebuilds heightmap mips 1.. for one tile from its edited mip 0.
/// `quad_box` is the edited box in tile-local quad coordinates; `None`
/// rebuilds the whole tile. Heights interpolate on unpacked 16-bit values,
/// the normal bytes on their own channels, and each touched mip gets an
/// update region recorded in the cache.
pub(crate) fn generate_heightmap_mips(
    layout: &TerrainLayout,
    resources: &mut ResourceStore,
    locker: &mut TileLocker,
    cache: &mut TextureEditCache,
    tile: &Tile,
    quad_box: Option<GridRect>,
) {
    let ts = layout.tile_size_quads();
    let box_ = quad_box.unwrap_or(GridRect::new(0, 0, ts, ts));
    let ssq = layout.subsection_size_quads();
    let num_sub = layout.num_subsections();
    let size = resources.get(tile.heightmap).size();
    let (offset_x, offset_y) = texel_offset_for_mip(
        tile.heightmap_fraction_x,
        tile.heightmap_fraction_y,
        size,
        0,
    );
    let mip_count = layout.mip_count();
    for mip in 0..mip_count {
        cache.ensure_locked(resources, locker, tile.heightmap, mip);
    }

    for sub_y in 0..num_sub {
        for sub_x in 0..num_sub {
            if box_.x2 < ssq * sub_x
                || box_.x1 > ssq * (sub_x + 1)
                || box_.y2 < ssq * sub_y
                || box_.y1 > ssq * (sub_y + 1)
            {
                continue;
            }
            // Box in previous-mip subsection vertex coordinates; deliberately
            // left unclamped so the derived boxes stay conservative.
            let mut prev_box = (
                box_.x1 - ssq * sub_x,
                box_.y1 - ssq * sub_y,
                box_.x2 - ssq * sub_x,
                box_.y2 - ssq * sub_y,
            );
            let mut prev_ssq = ssq;
            let mut prev_size = size;
            let mut prev_offset = (offset_x, offset_y);

            for mip in 1..layout.base_num_mips() {
                let mip_ssq = layout.mip_subsection_size_quads(mip);
                let mip_size = resources.get(tile.heightmap).mip_size(mip);
                let mip_offset = (offset_x >> mip, offset_y >> mip);

                let sub_box = mip_box(mip_ssq, prev_ssq, prev_box);
                let vx1 = sub_box.0.clamp(0, mip_ssq);
                let vy1 = sub_box.1.clamp(0, mip_ssq);
                let vx2 = sub_box.2.clamp(0, mip_ssq);
                let vy2 = sub_box.3.clamp(0, mip_ssq);

                for vy in vy1..=vy2 {
                    for vx in vx1..=vx2 {
                        let prev_vert_x = prev_ssq as f32 * vx as f32 / mip_ssq as f32;
                        let prev_vert_y = prev_ssq as f32 * vy as f32 / mip_ssq as f32;

                        let tex_x = mip_offset.0 + (mip_ssq + 1) * sub_x + vx;
                        let tex_y = mip_offset.1 + (mip_ssq + 1) * sub_y + vy;

                        let f_prev_x =
                            prev_offset.0 as f32 + ((prev_ssq + 1) * sub_x) as f32 + prev_vert_x;
                        let f_prev_y =
                            prev_offset.1 as f32 + ((prev_ssq + 1) * sub_y) as f32 + prev_vert_y;
                        let px = f_prev_x.floor() as i32;
                        let py = f_prev_y.floor() as i32;
                        let fx = f_prev_x - px as f32;
                        let fy = f_prev_y - py as f32;
                        let px1 = (px + 1).min(prev_size - 1);
                        let py1 = (py + 1).min(prev_size - 1);

                        let read = |x: i32, y: i32| -> (u16, u8, u8) {
                            let data = resources.get(tile.heightmap).mip_data(mip - 1);
                            let base = ((y * prev_size + x) * 4) as usize;
                            (
                                height_from_texel_bytes(data[base], data[base + 1]),
                                data[base + 2],
                                data[base + 3],
                            )
                        };
                        let (h00, b00, a00) = read(px, py);
                        let (h10, b10, a10) = read(px1, py);
                        let (h01, b01, a01) = read(px, py1);
                        let (h11, b11, a11) = read(px1, py1);

                        let top = h00 as f32 + (h10 as f32 - h00 as f32) * fx;
                        let bottom = h01 as f32 + (h11 as f32 - h01 as f32) * fx;
                        let height = (top + (bottom - top) * fy).round() as u16;
                        let b = round_lerp_byte(
                            round_lerp_byte(b00, b10, fx),
                            round_lerp_byte(b01, b11, fx),
                            fy,
                        );
                        let a = round_lerp_byte(
                            round_lerp_byte(a00, a10, fx),
                            round_lerp_byte(a01, a11, fx),
                            fy,
                        );

                        let (hi, lo) = height_to_texel_bytes(height);
                        let data = resources.get_mut(tile.heightmap).mip_data_mut(mip);
                        let base = ((tex_y * mip_size + tex_x) * 4) as usize;
                        data[base] = hi;
                        data[base + 1] = lo;
                        data[base + 2] = b;
                        data[base + 3] = a;
                    }
                }

                cache.add_mip_update_region(
                    tile.heightmap,
                    mip,
                    mip_offset.0 + (mip_ssq + 1) * sub_x + vx1,
                    mip_offset.1 + (mip_ssq + 1) * sub_y + vy1,
                    mip_offset.0 + (mip_ssq + 1) * sub_x + vx2,
                    mip_offset.1 + (mip_ssq + 1) * sub_y + vy2,
                );

                prev_ssq = mip_ssq;
                prev_size = mip_size;
                prev_offset = mip_offset;
                prev_box = sub_box;
            }
        }
    }

    average_tail_mips(layout, resources, cache, tile.heightmap);
}

/// Rebuilds all mips of an RGBA data texture (weightmaps) from mip 0,
/// restricted per subsection to `quad_box` in tile-local quad coordinates.
pub(crate) fn update_data_mips(
    layout: &TerrainLayout,
    resources: &mut ResourceStore,
    locker: &mut TileLocker,
    cache: &mut TextureEditCache,
    resource: ResourceKey,
    quad_box: Option<GridRect>,
) {
    let ts = layout.tile_size_quads();
    let box_ = quad_box.unwrap_or(GridRect::new(0, 0, ts, ts));
    let ssq = layout.subsection_size_quads();
    let num_sub = layout.num_subsections();
    let size = resources.get(resource).size();
    let channels = resources.get(resource).format().bytes_per_texel() as i32;
    let mip_count = resources.get(resource).mip_count();
    for mip in 0..mip_count {
        cache.ensure_locked(resources, locker, resource, mip);
    }

    for sub_y in 0..num_sub {
        for sub_x in 0..num_sub {
            if box_.x2 < ssq * sub_x
                || box_.x1 > ssq * (sub_x + 1)
                || box_.y2 < ssq * sub_y
                || box_.y1 > ssq * (sub_y + 1)
            {
                continue;
            }
            let mut prev_box = (
                box_.x1 - ssq * sub_x,
                box_.y1 - ssq * sub_y,
                box_.x2 - ssq * sub_x,
                box_.y2 - ssq * sub_y,
            );
            let mut prev_ssq = ssq;
            let mut prev_size = size;

            for mip in 1..layout.base_num_mips() {
                let mip_ssq = layout.mip_subsection_size_quads(mip);
                let mip_size = resources.get(resource).mip_size(mip);

                let sub_box = mip_box(mip_ssq, prev_ssq, prev_box);
                let vx1 = sub_box.0.clamp(0, mip_ssq);
                let vy1 = sub_box.1.clamp(0, mip_ssq);
                let vx2 = sub_box.2.clamp(0, mip_ssq);
                let vy2 = sub_box.3.clamp(0, mip_ssq);

                for vy in vy1..=vy2 {
                    for vx in vx1..=vx2 {
                        let prev_vert_x = prev_ssq as f32 * vx as f32 / mip_ssq as f32;
                        let prev_vert_y = prev_ssq as f32 * vy as f32 / mip_ssq as f32;
                        let f_prev_x = ((prev_ssq + 1) * sub_x) as f32 + prev_vert_x;
                        let f_prev_y = ((prev_ssq + 1) * sub_y) as f32 + prev_vert_y;
                        let px = f_prev_x.floor() as i32;
                        let py = f_prev_y.floor() as i32;
                        let fx = f_prev_x - px as f32;
                        let fy = f_prev_y - py as f32;
                        let px1 = (px + 1).min(prev_size - 1);
                        let py1 = (py + 1).min(prev_size - 1);

                        let tex_x = (mip_ssq + 1) * sub_x + vx;
                        let tex_y = (mip_ssq + 1) * sub_y + vy;

                        for channel in 0..channels {
                            let sample = |x: i32, y: i32| -> u8 {
                                let data = resources.get(resource).mip_data(mip - 1);
                                data[((y * prev_size + x) * channels + channel) as usize]
                            };
                            let value = round_lerp_byte(
                                round_lerp_byte(sample(px, py), sample(px1, py), fx),
                                round_lerp_byte(sample(px, py1), sample(px1, py1), fx),
                                fy,
                            );
                            let data = resources.get_mut(resource).mip_data_mut(mip);
                            data[((tex_y * mip_size + tex_x) * channels + channel) as usize] =
                                value;
                        }
                    }
                }

                cache.add_mip_update_region(
                    resource,
                    mip,
                    (mip_ssq + 1) * sub_x + vx1,
                    (mip_ssq + 1) * sub_y + vy1,
                    (mip_ssq + 1) * sub_x + vx2,
                    (mip_ssq + 1) * sub_y + vy2,
                );

                prev_ssq = mip_ssq;
                prev_size = mip_size;
                prev_box = sub_box;
            }
        }
    }

    average_tail_mips(layout, resources, cache, resource);
}

/// 2x2 box-average pass for the mips smaller than one subsection, down to
/// 1x1. Every tail mip is rebuilt in full.
fn average_tail_mips(
    layout: &TerrainLayout,
    resources: &mut ResourceStore,
    cache: &mut TextureEditCache,
    resource: ResourceKey,
) {
    let channels = resources.get(resource).format().bytes_per_texel() as i32;
    for mip in layout.base_num_mips()..resources.get(resource).mip_count() {
        let mip_size = resources.get(resource).mip_size(mip);
        let prev_size = resources.get(resource).mip_size(mip - 1);
        for y in 0..mip_size {
            for x in 0..mip_size {
                for channel in 0..channels {
                    let sample = |sx: i32, sy: i32| -> u32 {
                        let data = resources.get(resource).mip_data(mip - 1);
                        data[((sy * prev_size + sx) * channels + channel) as usize] as u32
                    };
                    let sum = sample(x * 2, y * 2)
                        + sample(x * 2 + 1, y * 2)
                        + sample(x * 2, y * 2 + 1)
                        + sample(x * 2 + 1, y * 2 + 1);
                    let data = resources.get_mut(resource).mip_data_mut(mip);
                    data[((y * mip_size + x) * channels + channel) as usize] = (sum >> 2) as u8;
                }
            }
        }
        cache.add_mip_update_region(resource, mip, 0, 0, mip_size - 1, mip_size - 1);
        if mip_size == 1 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_lerp_rounds_to_nearest() {
        assert_eq!(round_lerp_byte(0, 10, 0.0), 0);
        assert_eq!(round_lerp_byte(0, 10, 1.0), 10);
        assert_eq!(round_lerp_byte(0, 10, 0.05), 1);
        assert_eq!(round_lerp_byte(200, 100, 0.5), 150);
    }

    #[test]
    fn mip_box_covers_the_source_box() {
        // Halving a 0..=8 span of a 16-quad subsection.
        assert_eq!(mip_box(7, 15, (0, 0, 8, 8)), (0, 0, 4, 4));
        // An odd box widens outward.
        assert_eq!(mip_box(7, 15, (3, 3, 5, 5)), (1, 1, 3, 3));
    }
}

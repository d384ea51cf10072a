//! Texel addressing into locked tile bitmaps.

use terrain_model::coords::texel_offset_for_mip;
use terrain_model::height_from_texel_bytes;
use terrain_tiles::Tile;
use terrain_tiles::layers::LayerName;
use terrain_tiles::resource::ResourceStore;

#[inline]
pub(crate) fn rgba_base(size: i32, x: i32, y: i32) -> usize {
    debug_assert!(x >= 0 && x < size && y >= 0 && y < size, "texel ({x}, {y}) outside {size}");
    ((y * size + x) * 4) as usize
}

#[inline]
pub(crate) fn gray_base(size: i32, x: i32, y: i32) -> usize {
    debug_assert!(x >= 0 && x < size && y >= 0 && y < size, "texel ({x}, {y}) outside {size}");
    (y * size + x) as usize
}

/// Mip-0 texel origin of a tile inside its heightmap bitmap.
pub(crate) fn heightmap_origin(resources: &ResourceStore, tile: &Tile) -> (i32, i32) {
    let size = resources.get(tile.heightmap).size();
    texel_offset_for_mip(tile.heightmap_fraction_x, tile.heightmap_fraction_y, size, 0)
}

/// Reads a height at subsection texel coordinates from a tile's locked
/// heightmap, mip 0.
pub(crate) fn read_height(resources: &ResourceStore, tile: &Tile, tex_x: i32, tex_y: i32) -> u16 {
    let resource = resources.get(tile.heightmap);
    let size = resource.size();
    let (offset_x, offset_y) = heightmap_origin(resources, tile);
    let data = resource.mip_data(0);
    let base = rgba_base(size, offset_x + tex_x, offset_y + tex_y);
    height_from_texel_bytes(data[base], data[base + 1])
}

/// Reads the packed two-byte normal at subsection texel coordinates from a
/// tile's locked heightmap, mip 0.
pub(crate) fn read_packed_normal(
    resources: &ResourceStore,
    tile: &Tile,
    tex_x: i32,
    tex_y: i32,
) -> u16 {
    let resource = resources.get(tile.heightmap);
    let size = resource.size();
    let (offset_x, offset_y) = heightmap_origin(resources, tile);
    let data = resource.mip_data(0);
    let base = rgba_base(size, offset_x + tex_x, offset_y + tex_y);
    ((data[base + 2] as u16) << 8) | data[base + 3] as u16
}

/// Reads one layer's weight at subsection texel coordinates from a tile's
/// locked weight bitmap, mip 0. Tiles without an allocation read zero.
pub(crate) fn read_weight(
    resources: &ResourceStore,
    tile: &Tile,
    layer: &LayerName,
    tex_x: i32,
    tex_y: i32,
) -> u8 {
    match tile.allocation_for(layer) {
        Some(allocation) if allocation.is_allocated() => {
            let resource = resources.get(tile.weightmaps[allocation.resource_index as usize]);
            let data = resource.mip_data(0);
            data[rgba_base(resource.size(), tex_x, tex_y) + allocation.channel as usize]
        }
        _ => 0,
    }
}

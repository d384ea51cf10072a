//! Fixtures for tests in dependent crates: registering pre-filled tiles and
//! reading texels back without going through an edit session.

use terrain_model::{TileKey, height_from_texel_bytes, height_to_texel_bytes};

use crate::layers::{LayerAllocation, LayerName, UNALLOCATED};
use crate::resource::PixelFormat;
use crate::Terrain;

/// Registers a tile and fills every heightmap mip with one height and a
/// straight-up normal.
pub fn add_tile_with_height(
    terrain: &mut Terrain,
    index_x: i32,
    index_y: i32,
    height: u16,
) -> TileKey {
    let key = terrain
        .add_tile(index_x, index_y)
        .unwrap_or_else(|e| panic!("fixture tile: {e}"));
    fill_height_constant(terrain, index_x, index_y, height);
    key
}

/// Overwrites every heightmap mip of an existing tile with one height.
pub fn fill_height_constant(terrain: &mut Terrain, index_x: i32, index_y: i32, height: u16) {
    let heightmap = terrain
        .tile_at(index_x, index_y)
        .expect("fixture tile not registered")
        .heightmap;
    let (high, low) = height_to_texel_bytes(height);
    let mut parts = terrain.parts_mut();
    let resource = parts.resources.get_mut(heightmap);
    for mip in 0..resource.mip_count() {
        for texel in resource.raw_mip_data_mut(mip).chunks_exact_mut(4) {
            texel.copy_from_slice(&[high, low, 128, 128]);
        }
    }
}

/// Assigns a weight channel to a layer the way a fixture needs it: first
/// free channel of an existing resource, else a fresh resource.
pub fn allocate_layer_channel(
    terrain: &mut Terrain,
    index_x: i32,
    index_y: i32,
    name: &LayerName,
) -> (u8, u8) {
    let tile_key = terrain.tile_key(index_x, index_y);
    let mut parts = terrain.parts_mut();
    let weightmaps = parts.tiles[&tile_key].weightmaps.clone();

    let mut slot = None;
    for (resource_index, &resource_key) in weightmaps.iter().enumerate() {
        let usage = &parts.weightmap_usage[&resource_key];
        if let Some(channel) = usage.channels.iter().position(|c| c.is_none()) {
            slot = Some((resource_index as u8, channel as u8, resource_key));
            break;
        }
    }
    let (resource_index, channel, resource_key) = slot.unwrap_or_else(|| {
        let resource_key = parts.create_weight_resource();
        let tile = parts.tiles.get_mut(&tile_key).unwrap();
        tile.weightmaps.push(resource_key);
        ((tile.weightmaps.len() - 1) as u8, 0, resource_key)
    });

    parts.usage_mut(resource_key).channels[channel as usize] = Some(tile_key);
    let tile = parts.tiles.get_mut(&tile_key).unwrap();
    tile.layer_allocations.push(LayerAllocation {
        name: name.clone(),
        resource_index,
        channel,
    });
    tile.assert_slot_invariant();
    (resource_index, channel)
}

/// Fills one layer's channel with a constant weight across every mip,
/// allocating the layer first if needed.
pub fn fill_weight_constant(
    terrain: &mut Terrain,
    index_x: i32,
    index_y: i32,
    name: &LayerName,
    weight: u8,
) {
    let allocated = terrain
        .tile_at(index_x, index_y)
        .expect("fixture tile not registered")
        .allocation_for(name)
        .map(|a| (a.resource_index, a.channel));
    let (resource_index, channel) = match allocated {
        Some((resource_index, channel)) => {
            assert!(resource_index != UNALLOCATED, "fixture layer left pending");
            (resource_index, channel)
        }
        None => allocate_layer_channel(terrain, index_x, index_y, name),
    };

    let resource_key =
        terrain.tile_at(index_x, index_y).unwrap().weightmaps[resource_index as usize];
    let mut parts = terrain.parts_mut();
    let resource = parts.resources.get_mut(resource_key);
    assert_eq!(resource.format(), PixelFormat::Rgba8);
    for mip in 0..resource.mip_count() {
        for texel in resource.raw_mip_data_mut(mip).chunks_exact_mut(4) {
            texel[channel as usize] = weight;
        }
    }
}

/// Reads a heightmap texel of one tile directly.
pub fn height_texel(
    terrain: &Terrain,
    index_x: i32,
    index_y: i32,
    mip: u32,
    tex_x: i32,
    tex_y: i32,
) -> u16 {
    let (high, low, _, _) = height_texel_bytes(terrain, index_x, index_y, mip, tex_x, tex_y);
    height_from_texel_bytes(high, low)
}

/// Reads a full heightmap texel (height bytes plus packed normal).
pub fn height_texel_bytes(
    terrain: &Terrain,
    index_x: i32,
    index_y: i32,
    mip: u32,
    tex_x: i32,
    tex_y: i32,
) -> (u8, u8, u8, u8) {
    let tile = terrain.tile_at(index_x, index_y).expect("fixture tile not registered");
    let resource = terrain.resources().get(tile.heightmap);
    let mip_size = resource.mip_size(mip);
    assert!(tex_x >= 0 && tex_x < mip_size && tex_y >= 0 && tex_y < mip_size);
    let data = resource.raw_mip_data(mip);
    let base = ((tex_y * mip_size + tex_x) * 4) as usize;
    (data[base], data[base + 1], data[base + 2], data[base + 3])
}

/// Reads one layer's weight texel of one tile directly.
pub fn weight_texel(
    terrain: &Terrain,
    index_x: i32,
    index_y: i32,
    name: &LayerName,
    mip: u32,
    tex_x: i32,
    tex_y: i32,
) -> u8 {
    let tile = terrain.tile_at(index_x, index_y).expect("fixture tile not registered");
    let allocation = tile.allocation_for(name).expect("layer not allocated");
    let resource = terrain
        .resources()
        .get(tile.weightmaps[allocation.resource_index as usize]);
    let mip_size = resource.mip_size(mip);
    assert!(tex_x >= 0 && tex_x < mip_size && tex_y >= 0 && tex_y < mip_size);
    let data = resource.raw_mip_data(mip);
    data[((tex_y * mip_size + tex_x) * 4) as usize + allocation.channel as usize]
}

//! Weight-layer scatters: painting layer weights into tiles, keeping the
//! blended layers normalized to a 255 sum per vertex, allocating weightmap
//! channels on demand, and retiring layers that get painted away.

use terrain_model::coords::{
    subsection_index_range, subsection_vertex_span, tile_index_range_overlap, tile_quad_box,
};
use terrain_model::{GridRect, TileKey};
use terrain_tiles::TerrainPartsMut;
use terrain_tiles::layers::{LayerAllocation, LayerName, UNALLOCATED};
use terrain_tiles::resource::{ResourceKey, ResourceStore};

use crate::cache::TextureEditCache;
use crate::channels;
use crate::mips;

/// How a weight write treats the other blended layers at each vertex.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WeightAdjustMode {
    /// Write the layer as-is; other layers keep their weights.
    None,
    /// Scale the other blended layers so the vertex sum stays at 255.
    Rebalance,
    /// Renormalize every blended layer, the painted one included, back to
    /// a 255 sum, giving any rounding remainder to the heaviest layer.
    RebalanceTotal,
}

fn weight_at(resources: &ResourceStore, resource: ResourceKey, channel: u8, index: i32) -> u8 {
    resources.get(resource).mip_data(0)[(index * 4 + channel as i32) as usize]
}

fn set_weight_at(
    resources: &mut ResourceStore,
    resource: ResourceKey,
    channel: u8,
    index: i32,
    value: u8,
) {
    resources.get_mut(resource).mip_data_mut(0)[(index * 4 + channel as i32) as usize] = value;
}

/// Per-layer bookkeeping for one tile during a weight edit.
struct LayerEditState {
    resource: ResourceKey,
    channel: u8,
    no_blend: bool,
    edit_all_zero: bool,
    prev_nonzero: bool,
}

fn layer_edit_states(parts: &TerrainPartsMut<'_>, key: TileKey) -> Vec<LayerEditState> {
    let tile = &parts.tiles[&key];
    tile.layer_allocations
        .iter()
        .map(|alloc| LayerEditState {
            resource: tile.weightmaps[alloc.resource_index as usize],
            channel: alloc.channel,
            no_blend: parts.no_weight_blend(&alloc.name),
            edit_all_zero: true,
            prev_nonzero: false,
        })
        .collect()
}

/// Writes a rectangle of weights for one layer into the tiles it overlaps,
/// allocating a weightmap channel in any tile that lacks one. Missing tiles
/// are skipped. A layer whose weights end up zero across a whole tile loses
/// its allocation there.
pub(crate) fn set_weight_data(
    parts: &mut TerrainPartsMut<'_>,
    cache: &mut TextureEditCache,
    layer: &LayerName,
    rect: GridRect,
    data: &[u8],
    stride: i32,
    mode: WeightAdjustMode,
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

            if parts.tiles[&key].allocation_index_for(layer).is_none() {
                parts
                    .tiles
                    .get_mut(&key)
                    .expect("tile vanished mid-write")
                    .layer_allocations
                    .push(LayerAllocation::pending(layer.clone()));
                reallocate_weightmaps(parts, cache, key);
            }

            for idx in 0..parts.tiles[&key].weightmaps.len() {
                let resource = parts.tiles[&key].weightmaps[idx];
                cache.ensure_locked(parts.resources, parts.locker, resource, 0);
            }

            let mut states = layer_edit_states(parts, key);
            let update_idx = parts.tiles[&key]
                .allocation_index_for(layer)
                .expect("allocation missing after reallocate");

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
                            let new_weight = data[((gx - x1) + stride * (gy - y1)) as usize];

                            let tex_x = (ssq + 1) * sub_x + sx;
                            let tex_y = (ssq + 1) * sub_y + sy;
                            let texel = tex_x + tex_y * size;

                            match mode {
                                WeightAdjustMode::RebalanceTotal => rebalance_total_vertex(
                                    parts.resources,
                                    &mut states,
                                    update_idx,
                                    texel,
                                    new_weight,
                                ),
                                WeightAdjustMode::Rebalance => rebalance_vertex(
                                    parts.resources,
                                    &mut states,
                                    update_idx,
                                    texel,
                                    new_weight,
                                ),
                                WeightAdjustMode::None => {
                                    let state = &mut states[update_idx];
                                    if weight_at(parts.resources, state.resource, state.channel, texel)
                                        != 0
                                    {
                                        state.prev_nonzero = true;
                                    }
                                    set_weight_at(
                                        parts.resources,
                                        state.resource,
                                        state.channel,
                                        texel,
                                        new_weight,
                                    );
                                    if new_weight != 0 {
                                        state.edit_all_zero = false;
                                    }
                                }
                            }
                        }
                    }

                    for idx in 0..parts.tiles[&key].weightmaps.len() {
                        cache.add_mip_update_region(
                            parts.tiles[&key].weightmaps[idx],
                            0,
                            (ssq + 1) * sub_x + span_x1,
                            (ssq + 1) * sub_y + span_y1,
                            (ssq + 1) * sub_x + span_x2,
                            (ssq + 1) * sub_y + span_y2,
                        );
                    }
                }
            }

            let layout = parts.layout;
            for idx in 0..parts.tiles[&key].weightmaps.len() {
                let resource = parts.tiles[&key].weightmaps[idx];
                mips::update_data_mips(
                    &layout,
                    parts.resources,
                    parts.locker,
                    cache,
                    resource,
                    Some(GridRect::new(tile_x1, tile_y1, tile_x2, tile_y2)),
                );
            }

            remove_painted_away_layers(parts, cache, key, &states);
        }
    }
}

/// Renormalization that includes the painted layer: after the write, every
/// blended layer is scaled so the vertex sums to 255 again, with the
/// truncation remainder granted to the heaviest layer.
fn rebalance_total_vertex(
    resources: &mut ResourceStore,
    states: &mut [LayerEditState],
    update_idx: usize,
    texel: i32,
    new_weight: u8,
) {
    let mut max_idx: Option<usize> = None;
    let mut max_weight = i32::MIN;
    let mut sum: i32 = 0;

    for (idx, state) in states.iter_mut().enumerate() {
        let mut weight = weight_at(resources, state.resource, state.channel, texel);
        if weight != 0 {
            state.prev_nonzero = true;
        }
        if idx == update_idx {
            weight = new_weight;
            set_weight_at(resources, state.resource, state.channel, texel, weight);
        }
        if !state.no_blend {
            sum += weight as i32;
            if max_weight < weight as i32 {
                max_weight = weight as i32;
                max_idx = Some(idx);
            }
        }
    }

    if sum != 255 {
        let factor = 255.0f32 / sum as f32;
        sum = 0;
        for state in states.iter_mut() {
            let mut weight = weight_at(resources, state.resource, state.channel, texel);
            if !state.no_blend {
                weight = (factor * weight as f32) as u8;
                set_weight_at(resources, state.resource, state.channel, texel, weight);
                sum += weight as i32;
            }
            if weight != 0 {
                state.edit_all_zero = false;
            }
        }
        let remainder = 255 - sum;
        if remainder != 0 {
            if let Some(idx) = max_idx {
                let state = &states[idx];
                let weight = weight_at(resources, state.resource, state.channel, texel)
                    .wrapping_add(remainder as u8);
                set_weight_at(resources, state.resource, state.channel, texel, weight);
            }
        }
    }
}

/// Renormalization that preserves the painted value: the other blended
/// layers share the remaining 255 - new_weight in proportion to their
/// previous weights.
fn rebalance_vertex(
    resources: &mut ResourceStore,
    states: &mut [LayerEditState],
    update_idx: usize,
    texel: i32,
    new_weight: u8,
) {
    let mut other_sum: i32 = 0;
    for (idx, state) in states.iter().enumerate() {
        if idx != update_idx && !state.no_blend {
            other_sum += weight_at(resources, state.resource, state.channel, texel) as i32;
        }
    }

    let mut new_weight = new_weight;
    if other_sum == 0 {
        new_weight = 255;
        other_sum = 1;
    }

    for (idx, state) in states.iter_mut().enumerate() {
        let mut weight = weight_at(resources, state.resource, state.channel, texel);
        if weight != 0 {
            state.prev_nonzero = true;
        }
        if idx == update_idx {
            weight = new_weight;
        } else if !state.no_blend {
            weight = (((255 - new_weight as i32) as f32 * weight as f32 / other_sum as f32)
                .round() as i32)
                .clamp(0, 255) as u8;
        }
        set_weight_at(resources, state.resource, state.channel, texel, weight);
        if weight != 0 {
            state.edit_all_zero = false;
        }
    }
}

/// Drops the allocations of layers whose weights this edit left at zero
/// across the whole tile, freeing their channels and any weightmap texture
/// no remaining layer uses.
fn remove_painted_away_layers(
    parts: &mut TerrainPartsMut<'_>,
    cache: &mut TextureEditCache,
    key: TileKey,
    states: &[LayerEditState],
) {
    let size = parts.layout.texture_size();

    // Edits only see a box of the tile, so confirm against every texel
    // before concluding a layer is gone.
    let mut doomed: Vec<ResourceKey> = Vec::new();
    let mut doomed_channels: Vec<(ResourceKey, u8)> = Vec::new();
    for state in states {
        if !(state.edit_all_zero && state.prev_nonzero) {
            continue;
        }
        let data = parts.resources.get(state.resource).mip_data(0);
        let all_zero = (0..size * size)
            .all(|texel| data[(texel * 4 + state.channel as i32) as usize] == 0);
        if all_zero {
            doomed_channels.push((state.resource, state.channel));
        }
    }

    for (resource, channel) in doomed_channels {
        let alloc_idx = {
            let tile = &parts.tiles[&key];
            tile.layer_allocations.iter().position(|alloc| {
                tile.weightmaps[alloc.resource_index as usize] == resource
                    && alloc.channel == channel
            })
        };
        let Some(alloc_idx) = alloc_idx else { continue };

        parts.usage_mut(resource).channels[channel as usize] = None;

        let tile = parts.tiles.get_mut(&key).expect("tile vanished mid-write");
        let removed = tile.layer_allocations.remove(alloc_idx);
        let texture_index = removed.resource_index;
        let shared = tile
            .layer_allocations
            .iter()
            .any(|alloc| alloc.resource_index == texture_index);
        if !shared {
            tile.weightmaps.remove(texture_index as usize);
            for alloc in tile.layer_allocations.iter_mut() {
                if alloc.resource_index > texture_index {
                    alloc.resource_index -= 1;
                }
            }
            doomed.push(resource);
        }
    }

    for resource in doomed {
        if parts.weightmap_usage[&resource].is_unused() {
            cache.release_resource(parts.resources, parts.locker, resource);
            parts.remove_weight_resource(resource);
        }
    }
}

/// Gives every pending layer allocation of a tile a real weightmap channel.
/// Free channels in the tile's existing textures are used first; otherwise
/// the tile's layers are repacked, reusing a texture with enough spare
/// channels when one exists and creating textures for the rest.
pub(crate) fn reallocate_weightmaps(
    parts: &mut TerrainPartsMut<'_>,
    cache: &mut TextureEditCache,
    key: TileKey,
) {
    let mut needed = parts.tiles[&key]
        .layer_allocations
        .iter()
        .filter(|alloc| !alloc.is_allocated())
        .count();
    if needed == 0 {
        return;
    }

    let mut available = 0;
    for &resource in parts.tiles[&key].weightmaps.iter() {
        available += parts.weightmap_usage[&resource].free_channel_count();
        if available >= needed {
            break;
        }
    }

    if available >= needed {
        for tex_idx in 0..parts.tiles[&key].weightmaps.len() {
            let resource = parts.tiles[&key].weightmaps[tex_idx];
            for channel in 0..4u8 {
                if parts.weightmap_usage[&resource].channels[channel as usize].is_some() {
                    continue;
                }
                let pending = parts.tiles[&key]
                    .layer_allocations
                    .iter()
                    .position(|alloc| !alloc.is_allocated());
                let Some(alloc_idx) = pending else { continue };

                channels::zero_texture_channel(
                    parts.resources,
                    parts.locker,
                    cache,
                    resource,
                    channel,
                );
                let tile = parts.tiles.get_mut(&key).expect("tile vanished mid-write");
                tile.layer_allocations[alloc_idx].resource_index = tex_idx as u8;
                tile.layer_allocations[alloc_idx].channel = channel;
                parts.usage_mut(resource).channels[channel as usize] = Some(key);
                needed -= 1;
                if needed == 0 {
                    return;
                }
            }
        }
        unreachable!("counted free channels were not found");
    }

    // Not enough spare channels: repack every layer of this tile.
    let old_weightmaps: Vec<ResourceKey> = parts.tiles[&key].weightmaps.iter().copied().collect();
    let mut total = parts.tiles[&key].layer_allocations.len();
    let mut current_layer = 0usize;
    let mut new_weightmaps: Vec<ResourceKey> = Vec::new();

    while total > 0 {
        let mut current: Option<ResourceKey> = None;

        if total < 4 {
            // Prefer a partly used texture whose occupants are nearby.
            let mut best_distance = i64::MAX;
            for (&resource, usage) in parts.weightmap_usage.iter() {
                if usage.free_channel_count() < total {
                    continue;
                }
                for occupant in usage.channels.iter().flatten() {
                    let dx = (occupant.origin_x() - key.origin_x()) as i64;
                    let dy = (occupant.origin_y() - key.origin_y()) as i64;
                    let distance = dx * dx + dy * dy;
                    if distance < best_distance {
                        best_distance = distance;
                        current = Some(resource);
                    }
                }
            }
        }

        let current = match current {
            Some(resource) => resource,
            None => parts.create_weight_resource(),
        };
        new_weightmaps.push(current);

        for channel in 0..4u8 {
            if total == 0 {
                break;
            }
            if parts.weightmap_usage[&current].channels[channel as usize].is_some() {
                continue;
            }

            let alloc = parts.tiles[&key].layer_allocations[current_layer].clone();
            if alloc.resource_index == UNALLOCATED {
                channels::zero_texture_channel(parts.resources, parts.locker, cache, current, channel);
            } else {
                let old = old_weightmaps[alloc.resource_index as usize];
                channels::copy_texture_channel(
                    parts.resources,
                    parts.locker,
                    cache,
                    current,
                    channel,
                    old,
                    alloc.channel,
                );
                channels::zero_texture_channel(
                    parts.resources,
                    parts.locker,
                    cache,
                    old,
                    alloc.channel,
                );
                parts.usage_mut(old).channels[alloc.channel as usize] = None;
            }

            parts.usage_mut(current).channels[channel as usize] = Some(key);
            let tile = parts.tiles.get_mut(&key).expect("tile vanished mid-write");
            tile.layer_allocations[current_layer].resource_index = (new_weightmaps.len() - 1) as u8;
            tile.layer_allocations[current_layer].channel = channel;
            current_layer += 1;
            total -= 1;
        }
    }

    {
        let tile = parts.tiles.get_mut(&key).expect("tile vanished mid-write");
        tile.weightmaps = new_weightmaps.iter().copied().collect();
    }

    // Old textures this tile vacated entirely can go away.
    for old in old_weightmaps {
        if !new_weightmaps.contains(&old) && parts.weightmap_usage[&old].is_unused() {
            cache.release_resource(parts.resources, parts.locker, old);
            parts.remove_weight_resource(old);
        }
    }

    let layout = parts.layout;
    for resource in new_weightmaps {
        mips::update_data_mips(&layout, parts.resources, parts.locker, cache, resource, None);
    }
}

/// Removes a layer from every tile. Unless the layer is a no-blend layer,
/// the remaining blended layers of each tile are rescaled to preserve the
/// 255 vertex sum.
pub(crate) fn delete_layer(
    parts: &mut TerrainPartsMut<'_>,
    cache: &mut TextureEditCache,
    layer: &LayerName,
) {
    let size = parts.layout.texture_size();
    let no_blend_delete = parts.no_weight_blend(layer);

    let keys: Vec<TileKey> = parts.tiles.keys().copied().collect();
    for key in keys {
        let Some(delete_idx) = parts.tiles[&key].allocation_index_for(layer) else {
            continue;
        };
        let delete_alloc = parts.tiles[&key].layer_allocations[delete_idx].clone();
        let delete_texture_index = delete_alloc.resource_index;
        let delete_resource = parts.tiles[&key].weightmaps[delete_texture_index as usize];

        let can_remove_texture = !parts.tiles[&key]
            .layer_allocations
            .iter()
            .enumerate()
            .any(|(idx, alloc)| idx != delete_idx && alloc.resource_index == delete_texture_index);

        if !no_blend_delete {
            for idx in 0..parts.tiles[&key].weightmaps.len() {
                let resource = parts.tiles[&key].weightmaps[idx];
                cache.ensure_locked(parts.resources, parts.locker, resource, 0);
            }
            let states = layer_edit_states(parts, key);

            for texel in 0..size * size {
                let mut other_sum: i32 = 0;
                for (idx, state) in states.iter().enumerate() {
                    if idx != delete_idx && !state.no_blend {
                        other_sum +=
                            weight_at(parts.resources, state.resource, state.channel, texel) as i32;
                    }
                }
                if other_sum == 0 {
                    other_sum = 255;
                }
                for (idx, state) in states.iter().enumerate() {
                    if idx != delete_idx && !state.no_blend {
                        let weight =
                            weight_at(parts.resources, state.resource, state.channel, texel);
                        let scaled = ((255.0f32 * weight as f32 / other_sum as f32).round()
                            as i32)
                            .clamp(0, 255) as u8;
                        set_weight_at(parts.resources, state.resource, state.channel, texel, scaled);
                    }
                }
            }

            let layout = parts.layout;
            for idx in 0..parts.tiles[&key].weightmaps.len() {
                let resource = parts.tiles[&key].weightmaps[idx];
                if can_remove_texture && idx == delete_texture_index as usize {
                    continue;
                }
                mips::update_data_mips(&layout, parts.resources, parts.locker, cache, resource, None);
                cache.add_mip_update_region(resource, 0, 0, 0, size - 1, size - 1);
            }
        }

        parts.usage_mut(delete_resource).channels[delete_alloc.channel as usize] = None;

        {
            let tile = parts.tiles.get_mut(&key).expect("tile vanished mid-delete");
            tile.layer_allocations.remove(delete_idx);
            if can_remove_texture {
                tile.weightmaps.remove(delete_texture_index as usize);
                for alloc in tile.layer_allocations.iter_mut() {
                    if alloc.resource_index > delete_texture_index {
                        alloc.resource_index -= 1;
                    }
                }
            }
        }

        if can_remove_texture && parts.weightmap_usage[&delete_resource].is_unused() {
            cache.release_resource(parts.resources, parts.locker, delete_resource);
            parts.remove_weight_resource(delete_resource);
        }
    }
}

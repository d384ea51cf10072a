//! End-to-end scenarios: whole edit operations against small terrains,
//! checked through the raw texel accessors.

use terrain_model::{GridRect, TerrainLayout};
use terrain_tiles::helpers::{
    add_tile_with_height, fill_weight_constant, height_texel, height_texel_bytes, weight_texel,
};
use terrain_tiles::layers::LayerName;
use terrain_tiles::Terrain;

use crate::{EditSession, WeightAdjustMode};

fn small_terrain() -> Terrain {
    // One 7-quad subsection per tile: 8x8 texel bitmaps.
    Terrain::new(TerrainLayout::new(1, 7))
}

#[test]
fn height_write_reaches_both_tiles_at_a_seam() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);
    add_tile_with_height(&mut terrain, 1, 0, 100);

    let rect = GridRect::new(5, 1, 9, 3);
    let data: Vec<u16> = (0..rect.width() * rect.height())
        .map(|i| 2000 + i as u16)
        .collect();

    let mut session = EditSession::new(&mut terrain);
    session.set_height_data(rect, &data, 0, false, None);

    let mut read_back = vec![0u16; data.len()];
    let valid = session.get_height_data(rect, &mut read_back, 0);
    assert_eq!(valid, Some(rect));
    assert_eq!(read_back, data);
    drop(session);

    // The seam column lives in both tiles' bitmaps.
    let seam_value = data[(7 - 5) + 5 * (2 - 1)];
    assert_eq!(height_texel(&terrain, 0, 0, 0, 7, 2), seam_value);
    assert_eq!(height_texel(&terrain, 1, 0, 0, 0, 2), seam_value);
}

#[test]
fn height_write_regenerates_the_mip_chain() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);

    let rect = GridRect::new(0, 0, 7, 7);
    let data = vec![40000u16; (rect.width() * rect.height()) as usize];
    EditSession::new(&mut terrain).set_height_data(rect, &data, 0, false, None);

    // A constant surface survives both resampling stages unchanged.
    assert_eq!(height_texel(&terrain, 0, 0, 1, 2, 2), 40000);
    assert_eq!(height_texel(&terrain, 0, 0, 2, 1, 1), 40000);
    assert_eq!(height_texel(&terrain, 0, 0, 3, 0, 0), 40000);
}

#[test]
fn height_write_recomputes_interior_normals() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 32768);

    // A 45 degree slope along x: one world unit of height per quad.
    let rect = GridRect::new(0, 0, 7, 7);
    let data: Vec<u16> = (0..rect.height())
        .flat_map(|_| (0..rect.width()).map(|x| 32768 + x as u16 * 128))
        .collect();
    EditSession::new(&mut terrain).set_height_data(rect, &data, 0, true, None);

    let (_, _, b, a) = height_texel_bytes(&terrain, 0, 0, 0, 3, 3);
    assert_eq!(b, 37, "normal x for a 45 degree x-slope");
    assert_eq!(a, 128, "normal y stays flat");

    // Edge vertices keep their previous normals.
    let (_, _, b, a) = height_texel_bytes(&terrain, 0, 0, 0, 0, 3);
    assert_eq!((b, a), (128, 128));
}

#[test]
fn interpolated_gather_bridges_a_missing_tile() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 1000);
    add_tile_with_height(&mut terrain, 2, 0, 3000);

    let rect = GridRect::new(0, 0, 21, 7);
    let mut data = vec![0u16; (rect.width() * rect.height()) as usize];
    let valid = EditSession::new(&mut terrain).get_height_data(rect, &mut data, 0);
    assert_eq!(valid, Some(rect));

    let at = |x: i32, y: i32| data[(x + rect.width() * y) as usize];
    assert_eq!(at(7, 3), 1000, "left tile edge");
    assert_eq!(at(14, 3), 3000, "right tile edge");
    // 3 quads from the left edge, 4 from the right:
    // (4 * 1000 + 3 * 3000) / 7, truncated.
    assert_eq!(at(10, 3), 1857);
}

#[test]
fn single_vertex_read_uses_the_exclusive_owner() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 1200);
    add_tile_with_height(&mut terrain, 1, 0, 3400);

    let mut session = EditSession::new(&mut terrain);
    assert_eq!(session.height_at(3, 3), Some(1200));
    // The seam vertex belongs to the higher-indexed tile.
    assert_eq!(session.height_at(7, 3), Some(3400));
    assert_eq!(session.height_at(20, 3), None);
}

#[test]
fn gather_far_from_any_tile_reports_no_data() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 1000);

    let rect = GridRect::new(100, 100, 110, 110);
    let mut data = vec![0u16; (rect.width() * rect.height()) as usize];
    let valid = EditSession::new(&mut terrain).get_height_data(rect, &mut data, 0);
    assert_eq!(valid, None);
}

#[test]
fn fast_gather_leaves_missing_tiles_untouched() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 500);

    let rect = GridRect::new(0, 0, 14, 7);
    let mut data = vec![0xAAAA_u16; (rect.width() * rect.height()) as usize];
    EditSession::new(&mut terrain).get_height_data_fast(rect, &mut data, 0);

    let at = |x: i32, y: i32| data[(x + rect.width() * y) as usize];
    assert_eq!(at(3, 3), 500);
    assert_eq!(at(7, 3), 500);
    assert_eq!(at(8, 3), 0xAAAA, "vertex of the missing tile");
}

#[test]
fn fast_normal_gather_reads_packed_bytes() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 500);

    let rect = GridRect::new(0, 0, 7, 7);
    let mut data = vec![0u16; (rect.width() * rect.height()) as usize];
    EditSession::new(&mut terrain).get_normal_data_fast(rect, &mut data, 0);
    // Fixture tiles carry flat normals: 128 in each byte.
    assert!(data.iter().all(|&n| n == (128 << 8) | 128));
}

#[test]
fn weight_paint_allocates_a_channel_and_rebalances() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);
    let grass = LayerName::new("grass");
    let dirt = LayerName::new("dirt");
    terrain.register_layer(grass.clone(), false).unwrap();
    terrain.register_layer(dirt.clone(), false).unwrap();
    fill_weight_constant(&mut terrain, 0, 0, &grass, 255);

    let rect = GridRect::new(0, 0, 7, 7);
    let data = vec![128u8; (rect.width() * rect.height()) as usize];
    EditSession::new(&mut terrain).set_weight_data(
        &dirt,
        rect,
        &data,
        0,
        WeightAdjustMode::Rebalance,
    );

    assert_eq!(weight_texel(&terrain, 0, 0, &dirt, 0, 3, 3), 128);
    assert_eq!(weight_texel(&terrain, 0, 0, &grass, 0, 3, 3), 127);
    // The new layer reused a spare channel of the existing texture.
    let tile = terrain.tile_at(0, 0).unwrap();
    assert_eq!(tile.weightmaps.len(), 1);
    assert!(tile.allocation_for(&dirt).unwrap().is_allocated());
}

#[test]
fn total_rebalance_restores_the_255_sum() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);
    let grass = LayerName::new("grass");
    let dirt = LayerName::new("dirt");
    terrain.register_layer(grass.clone(), false).unwrap();
    terrain.register_layer(dirt.clone(), false).unwrap();
    fill_weight_constant(&mut terrain, 0, 0, &grass, 100);
    fill_weight_constant(&mut terrain, 0, 0, &dirt, 100);

    let rect = GridRect::new(0, 0, 7, 7);
    let data = vec![50u8; (rect.width() * rect.height()) as usize];
    EditSession::new(&mut terrain).set_weight_data(
        &dirt,
        rect,
        &data,
        0,
        WeightAdjustMode::RebalanceTotal,
    );

    // 100 + 50 scaled by 255/150.
    assert_eq!(weight_texel(&terrain, 0, 0, &grass, 0, 3, 3), 170);
    assert_eq!(weight_texel(&terrain, 0, 0, &dirt, 0, 3, 3), 85);
}

#[test]
fn painting_a_layer_away_frees_its_allocation() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);
    let grass = LayerName::new("grass");
    terrain.register_layer(grass.clone(), false).unwrap();
    fill_weight_constant(&mut terrain, 0, 0, &grass, 255);

    let rect = GridRect::new(0, 0, 7, 7);
    let data = vec![0u8; (rect.width() * rect.height()) as usize];
    EditSession::new(&mut terrain).set_weight_data(
        &grass,
        rect,
        &data,
        0,
        WeightAdjustMode::None,
    );

    let tile = terrain.tile_at(0, 0).unwrap();
    assert!(tile.allocation_for(&grass).is_none());
    assert!(tile.weightmaps.is_empty());
    assert!(terrain.weightmap_usage().is_empty());
}

#[test]
fn fifth_layer_repacks_into_a_second_texture() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);
    let names: Vec<LayerName> = (0..5).map(|i| LayerName::new(format!("layer{i}"))).collect();
    for name in &names {
        terrain.register_layer(name.clone(), false).unwrap();
    }
    for name in &names[..4] {
        fill_weight_constant(&mut terrain, 0, 0, name, 60);
    }

    let rect = GridRect::new(0, 0, 7, 7);
    let data = vec![40u8; (rect.width() * rect.height()) as usize];
    EditSession::new(&mut terrain).set_weight_data(
        &names[4],
        rect,
        &data,
        0,
        WeightAdjustMode::None,
    );

    let tile = terrain.tile_at(0, 0).unwrap();
    assert_eq!(tile.weightmaps.len(), 2);
    for name in &names {
        assert!(tile.allocation_for(name).unwrap().is_allocated());
    }
    // Repacking moved the data, not just the bookkeeping.
    assert_eq!(weight_texel(&terrain, 0, 0, &names[0], 0, 3, 3), 60);
    assert_eq!(weight_texel(&terrain, 0, 0, &names[4], 0, 3, 3), 40);
    assert_eq!(terrain.weightmap_usage().len(), 2);
}

#[test]
fn deleting_a_layer_rescales_the_survivors() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);
    let grass = LayerName::new("grass");
    let dirt = LayerName::new("dirt");
    terrain.register_layer(grass.clone(), false).unwrap();
    terrain.register_layer(dirt.clone(), false).unwrap();
    fill_weight_constant(&mut terrain, 0, 0, &grass, 200);
    fill_weight_constant(&mut terrain, 0, 0, &dirt, 55);

    EditSession::new(&mut terrain).delete_layer(&dirt);

    let tile = terrain.tile_at(0, 0).unwrap();
    assert!(tile.allocation_for(&dirt).is_none());
    assert_eq!(weight_texel(&terrain, 0, 0, &grass, 0, 3, 3), 255);
}

#[test]
fn weight_gather_reads_zero_for_unallocated_tiles() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);
    add_tile_with_height(&mut terrain, 1, 0, 100);
    let grass = LayerName::new("grass");
    terrain.register_layer(grass.clone(), false).unwrap();
    fill_weight_constant(&mut terrain, 0, 0, &grass, 90);

    let rect = GridRect::new(0, 0, 14, 7);
    let mut data = vec![0xFFu8; (rect.width() * rect.height()) as usize];
    let valid = EditSession::new(&mut terrain).get_weight_data(&grass, rect, &mut data, 0);
    // The unallocated tile still counts as present data.
    assert_eq!(valid, Some(rect));

    let at = |x: i32, y: i32| data[(x + rect.width() * y) as usize];
    assert_eq!(at(3, 3), 90);
    assert_eq!(at(10, 3), 0);
}

#[test]
fn select_mask_round_trips_and_missing_tiles_read_zero() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);

    let write_rect = GridRect::new(2, 2, 5, 5);
    let written: Vec<u8> = (0..write_rect.width() * write_rect.height())
        .map(|i| 10 + i as u8)
        .collect();
    let mut session = EditSession::new(&mut terrain);
    session.set_select_data(write_rect, &written, 0);

    let rect = GridRect::new(0, 0, 14, 7);
    let mut data = vec![0xFFu8; (rect.width() * rect.height()) as usize];
    session.get_select_data(rect, &mut data, 0);
    drop(session);

    let at = |x: i32, y: i32| data[(x + rect.width() * y) as usize];
    assert_eq!(at(3, 3), written[((3 - 2) + write_rect.width() * (3 - 2)) as usize]);
    assert_eq!(at(0, 0), 0, "unselected vertex");
    assert_eq!(at(10, 3), 0, "vertex of a missing tile");
    assert!(terrain.tile_at(0, 0).unwrap().select_mask.is_some());
}

#[test]
fn recalculate_normals_covers_tile_borders() {
    let mut terrain = small_terrain();
    // Two flat tiles at different heights make a cliff at the seam.
    add_tile_with_height(&mut terrain, 0, 0, 32768);
    add_tile_with_height(&mut terrain, 1, 0, 32768);

    EditSession::new(&mut terrain).recalculate_normals();

    // Flat terrain: every vertex, borders included, reads straight up.
    for tx in 0..8 {
        let (_, _, b, a) = height_texel_bytes(&terrain, 0, 0, 0, tx, 4);
        assert_eq!((b, a), (128, 128));
    }
}

#[test]
fn session_drop_releases_every_lock() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);
    let heightmap = terrain.tile_at(0, 0).unwrap().heightmap;

    {
        let mut session = EditSession::new(&mut terrain);
        let rect = GridRect::new(0, 0, 7, 7);
        let data = vec![12345u16; (rect.width() * rect.height()) as usize];
        session.set_height_data(rect, &data, 0, false, None);
    }

    let parts = terrain.parts_mut();
    for mip in 0..parts.resources.get(heightmap).mip_count() {
        assert_eq!(parts.locker.lock_count(heightmap, mip), 0, "mip {mip} still locked");
    }
}

#[test]
fn flush_reports_sync_only_for_shared_resources() {
    let mut terrain = small_terrain();
    add_tile_with_height(&mut terrain, 0, 0, 100);
    let heightmap = terrain.tile_at(0, 0).unwrap().heightmap;

    let rect = GridRect::new(0, 0, 7, 7);
    let data = vec![777u16; (rect.width() * rect.height()) as usize];

    let mut session = EditSession::new(&mut terrain);
    session.set_height_data(rect, &data, 0, false, None);
    assert!(!session.flush(), "nothing is shared with the renderer yet");
    drop(session);

    terrain
        .parts_mut()
        .resources
        .get_mut(heightmap)
        .set_shared_with_renderer(true);

    let mut session = EditSession::new(&mut terrain);
    session.set_height_data(rect, &data, 0, false, None);
    assert!(session.flush());
}

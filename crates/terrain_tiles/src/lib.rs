//! Tile objects, the tile registry, and the resources backing them.

use std::collections::HashMap;
use std::fmt;

use smallvec::SmallVec;
use terrain_model::{TerrainLayout, TileKey};

pub mod layers;
pub mod locker;
pub mod resource;

#[cfg(feature = "test-helpers")]
pub mod helpers;

use layers::{ChannelUsage, LayerAllocation, LayerName, LayerSettings};
use resource::{PixelFormat, PixelResource, ResourceKey, ResourceStore};

pub use locker::TileLocker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerrainError {
    TileAlreadyExists { index_x: i32, index_y: i32 },
    LayerAlreadyRegistered { name: LayerName },
}

impl fmt::Display for TerrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerrainError::TileAlreadyExists { index_x, index_y } => {
                write!(f, "tile already registered at index ({index_x}, {index_y})")
            }
            TerrainError::LayerAlreadyRegistered { name } => {
                write!(f, "layer '{name}' already registered")
            }
        }
    }
}

impl std::error::Error for TerrainError {}

/// One terrain patch and its bitmap resources.
pub struct Tile {
    origin_x: i32,
    origin_y: i32,
    pub heightmap: ResourceKey,
    /// Tile origin as a fraction of the heightmap's mip-0 extent, for
    /// heightmaps larger than one tile.
    pub heightmap_fraction_x: f32,
    pub heightmap_fraction_y: f32,
    pub weightmaps: SmallVec<[ResourceKey; 2]>,
    pub layer_allocations: SmallVec<[LayerAllocation; 4]>,
    pub select_mask: Option<ResourceKey>,
    height_bounds: Option<(u16, u16)>,
}

impl Tile {
    pub fn origin_x(&self) -> i32 {
        self.origin_x
    }

    pub fn origin_y(&self) -> i32 {
        self.origin_y
    }

    pub fn key(&self) -> TileKey {
        TileKey::new(self.origin_x, self.origin_y)
    }

    pub fn allocation_for(&self, name: &LayerName) -> Option<&LayerAllocation> {
        self.layer_allocations.iter().find(|a| &a.name == name)
    }

    pub fn allocation_index_for(&self, name: &LayerName) -> Option<usize> {
        self.layer_allocations.iter().position(|a| &a.name == name)
    }

    /// Height edits only ever widen the cached bounds.
    pub fn widen_height_bounds(&mut self, value: u16) {
        self.height_bounds = Some(match self.height_bounds {
            None => (value, value),
            Some((min, max)) => (min.min(value), max.max(value)),
        });
    }

    pub fn height_bounds(&self) -> Option<(u16, u16)> {
        self.height_bounds
    }

    /// No two layers of one tile may claim the same resource channel.
    pub fn assert_slot_invariant(&self) {
        for (i, a) in self.layer_allocations.iter().enumerate() {
            if !a.is_allocated() {
                continue;
            }
            for b in &self.layer_allocations[i + 1..] {
                assert!(
                    !b.is_allocated()
                        || a.resource_index != b.resource_index
                        || a.channel != b.channel,
                    "layers '{}' and '{}' share weight channel {}.{}",
                    a.name,
                    b.name,
                    a.resource_index,
                    a.channel
                );
            }
        }
    }
}

/// Mutable split-borrow view over a terrain's parts, so edit code can hold
/// the resource store, the locker, and tile records at the same time.
pub struct TerrainPartsMut<'a> {
    pub layout: TerrainLayout,
    pub resources: &'a mut ResourceStore,
    pub locker: &'a mut TileLocker,
    pub tiles: &'a mut HashMap<TileKey, Tile>,
    pub weightmap_usage: &'a mut HashMap<ResourceKey, ChannelUsage>,
    pub layer_settings: &'a [LayerSettings],
}

/// The tile registry plus everything the tiles reference.
pub struct Terrain {
    layout: TerrainLayout,
    resources: ResourceStore,
    locker: TileLocker,
    tiles: HashMap<TileKey, Tile>,
    weightmap_usage: HashMap<ResourceKey, ChannelUsage>,
    layer_settings: Vec<LayerSettings>,
}

impl Terrain {
    pub fn new(layout: TerrainLayout) -> Self {
        Self {
            layout,
            resources: ResourceStore::new(),
            locker: TileLocker::new(),
            tiles: HashMap::new(),
            weightmap_usage: HashMap::new(),
            layer_settings: Vec::new(),
        }
    }

    pub fn layout(&self) -> TerrainLayout {
        self.layout
    }

    pub fn tile_key(&self, index_x: i32, index_y: i32) -> TileKey {
        let size = self.layout.tile_size_quads();
        TileKey::new(index_x * size, index_y * size)
    }

    /// Registers an empty tile with a fresh heightmap resource.
    pub fn add_tile(&mut self, index_x: i32, index_y: i32) -> Result<TileKey, TerrainError> {
        let key = self.tile_key(index_x, index_y);
        if self.tiles.contains_key(&key) {
            return Err(TerrainError::TileAlreadyExists { index_x, index_y });
        }
        let heightmap = self
            .resources
            .insert(PixelResource::new(self.layout.texture_size(), PixelFormat::Rgba8));
        self.tiles.insert(
            key,
            Tile {
                origin_x: key.origin_x(),
                origin_y: key.origin_y(),
                heightmap,
                heightmap_fraction_x: 0.0,
                heightmap_fraction_y: 0.0,
                weightmaps: SmallVec::new(),
                layer_allocations: SmallVec::new(),
                select_mask: None,
                height_bounds: None,
            },
        );
        Ok(key)
    }

    pub fn tile_at(&self, index_x: i32, index_y: i32) -> Option<&Tile> {
        self.tiles.get(&self.tile_key(index_x, index_y))
    }

    pub fn tile_at_mut(&mut self, index_x: i32, index_y: i32) -> Option<&mut Tile> {
        let key = self.tile_key(index_x, index_y);
        self.tiles.get_mut(&key)
    }

    pub fn tile(&self, key: TileKey) -> Option<&Tile> {
        self.tiles.get(&key)
    }

    pub fn tile_mut(&mut self, key: TileKey) -> Option<&mut Tile> {
        self.tiles.get_mut(&key)
    }

    /// All tile keys in row-major order of their origins.
    pub fn tile_keys_row_major(&self) -> Vec<TileKey> {
        let mut keys: Vec<TileKey> = self.tiles.keys().copied().collect();
        keys.sort_by_key(|k| (k.origin_y(), k.origin_x()));
        keys
    }

    pub fn resources(&self) -> &ResourceStore {
        &self.resources
    }

    pub fn parts_mut(&mut self) -> TerrainPartsMut<'_> {
        TerrainPartsMut {
            layout: self.layout,
            resources: &mut self.resources,
            locker: &mut self.locker,
            tiles: &mut self.tiles,
            weightmap_usage: &mut self.weightmap_usage,
            layer_settings: &self.layer_settings,
        }
    }

    pub fn register_layer(
        &mut self,
        name: LayerName,
        no_weight_blend: bool,
    ) -> Result<(), TerrainError> {
        if self.layer_settings.iter().any(|s| s.name == name) {
            return Err(TerrainError::LayerAlreadyRegistered { name });
        }
        self.layer_settings.push(LayerSettings { name, no_weight_blend });
        Ok(())
    }

    pub fn no_weight_blend(&self, name: &LayerName) -> bool {
        self.layer_settings
            .iter()
            .find(|s| &s.name == name)
            .is_some_and(|s| s.no_weight_blend)
    }

    pub fn weightmap_usage(&self) -> &HashMap<ResourceKey, ChannelUsage> {
        &self.weightmap_usage
    }
}

impl TerrainPartsMut<'_> {
    /// Creates a fresh 4-channel weight resource with an empty usage record.
    pub fn create_weight_resource(&mut self) -> ResourceKey {
        let key = self
            .resources
            .insert(PixelResource::new(self.layout.texture_size(), PixelFormat::Rgba8));
        self.weightmap_usage.insert(key, ChannelUsage::default());
        key
    }

    /// Removes a weight resource with no remaining channel users.
    pub fn remove_weight_resource(&mut self, key: ResourceKey) {
        let usage = self
            .weightmap_usage
            .remove(&key)
            .unwrap_or_else(|| panic!("removing weight resource {key:?} with no usage record"));
        assert!(usage.is_unused(), "weight resource removed while channels are in use");
        self.locker.forget_resource(key);
        self.resources.remove(key);
    }

    pub fn usage_mut(&mut self, key: ResourceKey) -> &mut ChannelUsage {
        self.weightmap_usage
            .get_mut(&key)
            .unwrap_or_else(|| panic!("weight resource {key:?} has no usage record"))
    }

    pub fn no_weight_blend(&self, name: &LayerName) -> bool {
        self.layer_settings
            .iter()
            .find(|s| &s.name == name)
            .is_some_and(|s| s.no_weight_blend)
    }

    /// Lazily creates the tile's 1-channel select mask resource.
    pub fn ensure_select_mask(&mut self, tile_key: TileKey) -> ResourceKey {
        let texture_size = self.layout.texture_size();
        let tile = self
            .tiles
            .get_mut(&tile_key)
            .unwrap_or_else(|| panic!("select mask requested for unregistered tile"));
        match tile.select_mask {
            Some(key) => key,
            None => {
                let key = self
                    .resources
                    .insert(PixelResource::new(texture_size, PixelFormat::Gray8));
                tile.select_mask = Some(key);
                key
            }
        }
    }
}

//! Session-scoped cache of locked bitmaps and their dirty regions.
//!
//! Every bitmap an edit session touches is locked here exactly once, no
//! matter how many operations hit it. Dirty texel rectangles accumulate
//! next to the lock and are committed to the resource's pending-upload
//! queue when the session flushes, after which all locks are released.

use std::collections::HashMap;

use terrain_tiles::locker::TileLocker;
use terrain_tiles::resource::{MipUpdateRegion, ResourceKey, ResourceStore};

#[derive(Default)]
struct CacheEntry {
    locked_mips: Vec<u32>,
    regions: Vec<MipUpdateRegion>,
}

#[derive(Default)]
pub struct TextureEditCache {
    entries: HashMap<ResourceKey, CacheEntry>,
}

impl TextureEditCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks one mip of a resource for the rest of the session. Repeated
    /// calls for the same mip are free.
    pub fn ensure_locked(
        &mut self,
        resources: &mut ResourceStore,
        locker: &mut TileLocker,
        key: ResourceKey,
        mip: u32,
    ) {
        let entry = self.entries.entry(key).or_default();
        if !entry.locked_mips.contains(&mip) {
            locker.lock_mip(resources, key, mip);
            entry.locked_mips.push(mip);
        }
    }

    /// Records a texel rectangle to upload at flush time. Does not lock.
    pub fn add_mip_update_region(
        &mut self,
        key: ResourceKey,
        mip: u32,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
    ) {
        self.entries
            .entry(key)
            .or_default()
            .regions
            .push(MipUpdateRegion { mip, x1, y1, x2, y2 });
    }

    pub fn is_locked(&self, key: ResourceKey, mip: u32) -> bool {
        self.entries
            .get(&key)
            .is_some_and(|e| e.locked_mips.contains(&mip))
    }

    /// Releases one resource early and drops its dirty regions. Used when
    /// the resource is about to be destroyed mid-session.
    pub fn release_resource(
        &mut self,
        resources: &mut ResourceStore,
        locker: &mut TileLocker,
        key: ResourceKey,
    ) {
        if let Some(entry) = self.entries.remove(&key) {
            for mip in entry.locked_mips {
                locker.unlock_mip(resources, key, mip);
            }
        }
    }

    /// Commits every dirty region and releases all locks. Returns whether a
    /// touched resource is shared with a renderer and needs a sync before
    /// its data may be read back.
    pub fn flush(&mut self, resources: &mut ResourceStore, locker: &mut TileLocker) -> bool {
        let mut needs_sync = false;
        for (key, entry) in self.entries.drain() {
            needs_sync |= resources.get_mut(key).push_update_regions(&entry.regions);
            for mip in entry.locked_mips {
                locker.unlock_mip(resources, key, mip);
            }
        }
        needs_sync
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

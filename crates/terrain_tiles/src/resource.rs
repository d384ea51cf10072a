//! CPU-side pixel resources backing tile bitmaps.
//!
//! A resource owns one square byte buffer per mip level down to 1x1. The
//! GPU handoff is modeled by the pending-update queue: committed region
//! updates accumulate there for an external uploader to drain, and a
//! resource marked as shared with a renderer reports that committing an
//! update requires synchronization before the data may be read back.

use slotmap::{SlotMap, new_key_type};
use static_assertions::const_assert_eq;

new_key_type! {
    /// Stable handle to a [`PixelResource`] inside a [`ResourceStore`].
    pub struct ResourceKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Four channels per texel: height high/low bytes plus packed normal,
    /// or four weight layers.
    Rgba8,
    /// One channel per texel, used by the select mask.
    Gray8,
}

impl PixelFormat {
    pub const fn bytes_per_texel(self) -> usize {
        match self {
            PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

const_assert_eq!(PixelFormat::Rgba8.bytes_per_texel(), 4);
const_assert_eq!(PixelFormat::Gray8.bytes_per_texel(), 1);

/// Inclusive texel rectangle of one mip level scheduled for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipUpdateRegion {
    pub mip: u32,
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

pub struct PixelResource {
    size: i32,
    format: PixelFormat,
    mips: Vec<Vec<u8>>,
    locked: Vec<bool>,
    pending_updates: Vec<MipUpdateRegion>,
    shared_with_renderer: bool,
}

impl PixelResource {
    /// Allocates the full mip chain for a `size`x`size` bitmap.
    pub fn new(size: i32, format: PixelFormat) -> Self {
        assert!(
            size > 0 && (size as u32).is_power_of_two(),
            "resource size must be a positive power of two, got {size}"
        );
        let mip_count = (size as u32).trailing_zeros() as usize + 1;
        let mut mips = Vec::with_capacity(mip_count);
        for mip in 0..mip_count {
            let mip_size = (size >> mip) as usize;
            mips.push(vec![0u8; mip_size * mip_size * format.bytes_per_texel()]);
        }
        Self {
            size,
            format,
            mips,
            locked: vec![false; mip_count],
            pending_updates: Vec::new(),
            shared_with_renderer: false,
        }
    }

    pub fn size(&self) -> i32 {
        self.size
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn mip_count(&self) -> u32 {
        self.mips.len() as u32
    }

    pub fn mip_size(&self, mip: u32) -> i32 {
        assert!(mip < self.mip_count(), "mip {mip} beyond chain");
        self.size >> mip
    }

    pub fn lock_mip(&mut self, mip: u32) {
        assert!(mip < self.mip_count(), "mip {mip} beyond chain");
        assert!(!self.locked[mip as usize], "mip {mip} already locked");
        self.locked[mip as usize] = true;
    }

    pub fn unlock_mip(&mut self, mip: u32) {
        assert!(mip < self.mip_count(), "mip {mip} beyond chain");
        assert!(self.locked[mip as usize], "mip {mip} not locked");
        self.locked[mip as usize] = false;
    }

    pub fn is_mip_locked(&self, mip: u32) -> bool {
        self.locked[mip as usize]
    }

    pub fn mip_data(&self, mip: u32) -> &[u8] {
        assert!(
            self.locked[mip as usize],
            "mip {mip} read while unlocked"
        );
        &self.mips[mip as usize]
    }

    pub fn mip_data_mut(&mut self, mip: u32) -> &mut [u8] {
        assert!(
            self.locked[mip as usize],
            "mip {mip} written while unlocked"
        );
        &mut self.mips[mip as usize]
    }

    /// Queues committed regions for upload. Returns whether the caller must
    /// synchronize with the renderer before relying on the updated data.
    pub fn push_update_regions(&mut self, regions: &[MipUpdateRegion]) -> bool {
        self.pending_updates.extend_from_slice(regions);
        self.shared_with_renderer && !regions.is_empty()
    }

    pub fn take_pending_updates(&mut self) -> Vec<MipUpdateRegion> {
        std::mem::take(&mut self.pending_updates)
    }

    pub fn set_shared_with_renderer(&mut self, shared: bool) {
        self.shared_with_renderer = shared;
    }

    /// Direct read access for fixtures, bypassing the lock discipline.
    #[cfg(feature = "test-helpers")]
    pub fn raw_mip_data(&self, mip: u32) -> &[u8] {
        &self.mips[mip as usize]
    }

    #[cfg(feature = "test-helpers")]
    pub fn raw_mip_data_mut(&mut self, mip: u32) -> &mut [u8] {
        &mut self.mips[mip as usize]
    }
}

#[derive(Default)]
pub struct ResourceStore {
    resources: SlotMap<ResourceKey, PixelResource>,
}

impl ResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, resource: PixelResource) -> ResourceKey {
        self.resources.insert(resource)
    }

    pub fn remove(&mut self, key: ResourceKey) -> Option<PixelResource> {
        self.resources.remove(key)
    }

    pub fn get(&self, key: ResourceKey) -> &PixelResource {
        self.resources
            .get(key)
            .unwrap_or_else(|| panic!("stale resource key {key:?}"))
    }

    pub fn get_mut(&mut self, key: ResourceKey) -> &mut PixelResource {
        self.resources
            .get_mut(key)
            .unwrap_or_else(|| panic!("stale resource key {key:?}"))
    }

    pub fn contains(&self, key: ResourceKey) -> bool {
        self.resources.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mip_chain_is_allocated() {
        let resource = PixelResource::new(8, PixelFormat::Rgba8);
        assert_eq!(resource.mip_count(), 4);
        assert_eq!(resource.mip_size(0), 8);
        assert_eq!(resource.mip_size(3), 1);
    }

    #[test]
    #[should_panic(expected = "read while unlocked")]
    fn unlocked_read_panics() {
        let resource = PixelResource::new(4, PixelFormat::Gray8);
        let _ = resource.mip_data(0);
    }

    #[test]
    #[should_panic(expected = "already locked")]
    fn double_underlying_lock_panics() {
        let mut resource = PixelResource::new(4, PixelFormat::Rgba8);
        resource.lock_mip(1);
        resource.lock_mip(1);
    }

    #[test]
    fn update_regions_report_sync_only_when_shared() {
        let mut resource = PixelResource::new(4, PixelFormat::Rgba8);
        let region = MipUpdateRegion { mip: 0, x1: 0, y1: 0, x2: 3, y2: 3 };
        assert!(!resource.push_update_regions(&[region]));
        resource.set_shared_with_renderer(true);
        assert!(resource.push_update_regions(&[region]));
        assert!(!resource.push_update_regions(&[]));
        assert_eq!(resource.take_pending_updates().len(), 2);
        assert!(resource.take_pending_updates().is_empty());
    }
}

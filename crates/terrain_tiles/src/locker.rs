//! Reference-counted mip locks.
//!
//! Overlapping edit steps lock the same resource mip freely; the underlying
//! resource lock happens once when the count leaves zero and the unlock once
//! when it returns there. Callers never touch the resource lock directly.

use std::collections::HashMap;

use crate::resource::{ResourceKey, ResourceStore};

#[derive(Default)]
pub struct TileLocker {
    counts: HashMap<(ResourceKey, u32), u32>,
}

impl TileLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks a resource mip, stacking on any lock already held.
    pub fn lock_mip(&mut self, store: &mut ResourceStore, key: ResourceKey, mip: u32) {
        let count = self.counts.entry((key, mip)).or_insert(0);
        if *count == 0 {
            store.get_mut(key).lock_mip(mip);
        }
        *count += 1;
    }

    /// Balances one [`lock_mip`](Self::lock_mip) call. Extra calls after the
    /// count reaches zero are tolerated; unlocking a resource mip this
    /// locker never saw is a programmer error.
    pub fn unlock_mip(&mut self, store: &mut ResourceStore, key: ResourceKey, mip: u32) {
        let count = self
            .counts
            .get_mut(&(key, mip))
            .unwrap_or_else(|| panic!("unlock of never-locked resource mip {mip}"));
        if *count == 0 {
            return;
        }
        *count -= 1;
        if *count == 0 {
            store.get_mut(key).unlock_mip(mip);
        }
    }

    pub fn lock_count(&self, key: ResourceKey, mip: u32) -> u32 {
        self.counts.get(&(key, mip)).copied().unwrap_or(0)
    }

    /// Drops bookkeeping for a resource about to be removed. All counts must
    /// already be balanced.
    pub fn forget_resource(&mut self, key: ResourceKey) {
        self.counts.retain(|&(record_key, mip), &mut count| {
            assert!(
                record_key != key || count == 0,
                "resource removed with mip {mip} still locked"
            );
            record_key != key
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{PixelFormat, PixelResource};

    fn store_with_resource() -> (ResourceStore, ResourceKey) {
        let mut store = ResourceStore::new();
        let key = store.insert(PixelResource::new(4, PixelFormat::Rgba8));
        (store, key)
    }

    #[test]
    fn nested_locks_hit_the_resource_once() {
        let (mut store, key) = store_with_resource();
        let mut locker = TileLocker::new();

        locker.lock_mip(&mut store, key, 0);
        locker.lock_mip(&mut store, key, 0);
        assert_eq!(locker.lock_count(key, 0), 2);
        assert!(store.get(key).is_mip_locked(0));

        locker.unlock_mip(&mut store, key, 0);
        assert!(store.get(key).is_mip_locked(0));
        locker.unlock_mip(&mut store, key, 0);
        assert!(!store.get(key).is_mip_locked(0));
    }

    #[test]
    fn mips_are_counted_independently() {
        let (mut store, key) = store_with_resource();
        let mut locker = TileLocker::new();

        locker.lock_mip(&mut store, key, 0);
        locker.lock_mip(&mut store, key, 2);
        locker.unlock_mip(&mut store, key, 0);
        assert!(!store.get(key).is_mip_locked(0));
        assert!(store.get(key).is_mip_locked(2));
        locker.unlock_mip(&mut store, key, 2);
    }

    #[test]
    fn extra_unlock_after_zero_is_a_no_op() {
        let (mut store, key) = store_with_resource();
        let mut locker = TileLocker::new();

        locker.lock_mip(&mut store, key, 1);
        locker.unlock_mip(&mut store, key, 1);
        locker.unlock_mip(&mut store, key, 1);
        assert_eq!(locker.lock_count(key, 1), 0);
        assert!(!store.get(key).is_mip_locked(1));
    }

    #[test]
    #[should_panic(expected = "unlock of never-locked resource mip")]
    fn unlock_without_any_lock_panics() {
        let (mut store, key) = store_with_resource();
        let mut locker = TileLocker::new();
        locker.unlock_mip(&mut store, key, 0);
    }

    #[test]
    #[should_panic(expected = "still locked")]
    fn forgetting_a_locked_resource_panics() {
        let (mut store, key) = store_with_resource();
        let mut locker = TileLocker::new();
        locker.lock_mip(&mut store, key, 0);
        locker.forget_resource(key);
    }
}

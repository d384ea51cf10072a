//! Whole-channel operations on weightmap textures, applied across every
//! mip so the chain never needs a rebuild afterwards.

use terrain_tiles::TileLocker;
use terrain_tiles::resource::{ResourceKey, ResourceStore};

use crate::cache::TextureEditCache;

/// Copies one channel of `src` into one channel of `dest` across all mips.
/// Both textures must have the same size and format.
pub(crate) fn copy_texture_channel(
    resources: &mut ResourceStore,
    locker: &mut TileLocker,
    cache: &mut TextureEditCache,
    dest: ResourceKey,
    dest_channel: u8,
    src: ResourceKey,
    src_channel: u8,
) {
    let mip_count = resources.get(dest).mip_count();
    assert_eq!(
        mip_count,
        resources.get(src).mip_count(),
        "channel copy between differently sized textures"
    );
    let channels = resources.get(dest).format().bytes_per_texel();

    for mip in 0..mip_count {
        cache.ensure_locked(resources, locker, dest, mip);
        cache.ensure_locked(resources, locker, src, mip);
        let mip_size = resources.get(dest).mip_size(mip);
        let texel_count = (mip_size * mip_size) as usize;

        let mut column = vec![0u8; texel_count];
        {
            let src_data = resources.get(src).mip_data(mip);
            for (i, value) in column.iter_mut().enumerate() {
                *value = src_data[i * channels + src_channel as usize];
            }
        }
        let dest_data = resources.get_mut(dest).mip_data_mut(mip);
        for (i, value) in column.iter().enumerate() {
            dest_data[i * channels + dest_channel as usize] = *value;
        }

        cache.add_mip_update_region(dest, mip, 0, 0, mip_size - 1, mip_size - 1);
    }
}

/// Zeroes one channel of a texture across all mips.
pub(crate) fn zero_texture_channel(
    resources: &mut ResourceStore,
    locker: &mut TileLocker,
    cache: &mut TextureEditCache,
    resource: ResourceKey,
    channel: u8,
) {
    let channels = resources.get(resource).format().bytes_per_texel();
    for mip in 0..resources.get(resource).mip_count() {
        cache.ensure_locked(resources, locker, resource, mip);
        let mip_size = resources.get(resource).mip_size(mip);
        let data = resources.get_mut(resource).mip_data_mut(mip);
        for i in 0..(mip_size * mip_size) as usize {
            data[i * channels + channel as usize] = 0;
        }
        cache.add_mip_update_region(resource, mip, 0, 0, mip_size - 1, mip_size - 1);
    }
}

/// Zeroes every byte of a texture across all mips.
pub(crate) fn zero_texture(
    resources: &mut ResourceStore,
    locker: &mut TileLocker,
    cache: &mut TextureEditCache,
    resource: ResourceKey,
) {
    for mip in 0..resources.get(resource).mip_count() {
        cache.ensure_locked(resources, locker, resource, mip);
        let mip_size = resources.get(resource).mip_size(mip);
        resources.get_mut(resource).mip_data_mut(mip).fill(0);
        cache.add_mip_update_region(resource, mip, 0, 0, mip_size - 1, mip_size - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrain_tiles::resource::{PixelFormat, PixelResource};

    fn rgba_fixture() -> (ResourceStore, TileLocker, TextureEditCache, ResourceKey) {
        let mut resources = ResourceStore::new();
        let key = resources.insert(PixelResource::new(4, PixelFormat::Rgba8));
        (resources, TileLocker::new(), TextureEditCache::new(), key)
    }

    #[test]
    fn channel_copy_moves_only_the_named_channel() {
        let (mut resources, mut locker, mut cache, dest) = rgba_fixture();
        let src = resources.insert(PixelResource::new(4, PixelFormat::Rgba8));
        {
            let data = resources.get_mut(src).raw_mip_data_mut(0);
            for texel in data.chunks_exact_mut(4) {
                texel[1] = 200;
                texel[2] = 50;
            }
        }
        copy_texture_channel(&mut resources, &mut locker, &mut cache, dest, 3, src, 1);
        cache.flush(&mut resources, &mut locker);

        let data = resources.get(dest).raw_mip_data(0);
        for texel in data.chunks_exact(4) {
            assert_eq!(texel[3], 200);
            assert_eq!(texel[0], 0);
            assert_eq!(texel[2], 0);
        }
    }

    #[test]
    fn channel_zero_leaves_other_channels_alone() {
        let (mut resources, mut locker, mut cache, key) = rgba_fixture();
        {
            let data = resources.get_mut(key).raw_mip_data_mut(0);
            data.fill(7);
        }
        zero_texture_channel(&mut resources, &mut locker, &mut cache, key, 2);
        cache.flush(&mut resources, &mut locker);

        let data = resources.get(key).raw_mip_data(0);
        for texel in data.chunks_exact(4) {
            assert_eq!(texel, [7, 7, 0, 7]);
        }
    }

    #[test]
    fn zero_texture_clears_every_mip() {
        let (mut resources, mut locker, mut cache, key) = rgba_fixture();
        for mip in 0..resources.get(key).mip_count() {
            resources.get_mut(key).raw_mip_data_mut(mip).fill(255);
        }
        zero_texture(&mut resources, &mut locker, &mut cache, key);
        cache.flush(&mut resources, &mut locker);

        for mip in 0..resources.get(key).mip_count() {
            assert!(resources.get(key).raw_mip_data(mip).iter().all(|&b| b == 0));
        }
    }
}

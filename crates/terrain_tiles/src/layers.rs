//! Paint-layer bookkeeping: per-tile allocation records and the
//! terrain-wide channel usage map.

use terrain_model::TileKey;

/// Name of a paintable weight layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerName(String);

impl LayerName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LayerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sentinel resource index for a layer awaiting channel assignment.
pub const UNALLOCATED: u8 = 255;

/// One layer's slot inside a tile's weight resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerAllocation {
    pub name: LayerName,
    /// Index into the tile's weight resource list, or [`UNALLOCATED`].
    pub resource_index: u8,
    /// Channel 0..4 within that resource.
    pub channel: u8,
}

impl LayerAllocation {
    pub fn pending(name: LayerName) -> Self {
        Self { name, resource_index: UNALLOCATED, channel: 0 }
    }

    pub fn is_allocated(&self) -> bool {
        self.resource_index != UNALLOCATED
    }
}

/// Terrain-level layer registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSettings {
    pub name: LayerName,
    /// Excluded from weight renormalization (reserved data/visibility
    /// layers).
    pub no_weight_blend: bool,
}

/// Which tile claims each of a weight resource's four channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelUsage {
    pub channels: [Option<TileKey>; 4],
}

impl ChannelUsage {
    pub fn free_channel_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_none()).count()
    }

    pub fn is_unused(&self) -> bool {
        self.channels.iter().all(|c| c.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_usage_counts_free_slots() {
        let mut usage = ChannelUsage::default();
        assert_eq!(usage.free_channel_count(), 4);
        assert!(usage.is_unused());
        usage.channels[2] = Some(TileKey::new(0, 0));
        assert_eq!(usage.free_channel_count(), 3);
        assert!(!usage.is_unused());
    }

    #[test]
    fn pending_allocation_reports_unallocated() {
        let allocation = LayerAllocation::pending(LayerName::new("grass"));
        assert!(!allocation.is_allocated());
        assert_eq!(allocation.resource_index, UNALLOCATED);
    }
}

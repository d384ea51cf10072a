use bitvec::prelude::{BitVec, Lsb0};

pub mod coords;
mod key;

pub use key::TileKey;

/// Height value representing zero elevation.
pub const HEIGHT_MIDPOINT: u16 = 32768;
/// World units per height count at unit draw scale.
pub const HEIGHT_WORLD_SCALE: f32 = 1.0 / 128.0;

/// Grid geometry shared by every tile of one terrain.
///
/// A tile covers `tile_size_quads()` quads per axis, split into
/// `num_subsections` subsections of `subsection_size_quads` quads each.
/// Adjacent subsections share their border vertex row/column, so a tile
/// stores `num_subsections * (subsection_size_quads + 1)` texels per axis.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TerrainLayout {
    num_subsections: i32,
    subsection_size_quads: i32,
}

impl TerrainLayout {
    pub fn new(num_subsections: i32, subsection_size_quads: i32) -> Self {
        assert!(
            num_subsections >= 1 && (num_subsections as u32).is_power_of_two(),
            "num_subsections must be a power of two, got {num_subsections}"
        );
        assert!(
            subsection_size_quads >= 1
                && (subsection_size_quads as u32 + 1).is_power_of_two(),
            "subsection_size_quads + 1 must be a power of two, got {subsection_size_quads}"
        );
        Self {
            num_subsections,
            subsection_size_quads,
        }
    }

    pub fn num_subsections(&self) -> i32 {
        self.num_subsections
    }

    pub fn subsection_size_quads(&self) -> i32 {
        self.subsection_size_quads
    }

    pub fn tile_size_quads(&self) -> i32 {
        self.num_subsections * self.subsection_size_quads
    }

    /// Texels per axis of a tile's mip-0 bitmap.
    pub fn texture_size(&self) -> i32 {
        self.num_subsections * (self.subsection_size_quads + 1)
    }

    /// Number of mip levels whose texels still carry per-subsection quad
    /// semantics. Levels at and beyond this index are plain box averages.
    pub fn base_num_mips(&self) -> u32 {
        (self.subsection_size_quads as u32 + 1).trailing_zeros()
    }

    /// Total mip chain length for a tile bitmap, down to 1x1.
    pub fn mip_count(&self) -> u32 {
        (self.texture_size() as u32).trailing_zeros() + 1
    }

    /// Subsection edge length in quads at a given mip, 0 once collapsed.
    pub fn mip_subsection_size_quads(&self, mip: u32) -> i32 {
        ((self.subsection_size_quads + 1) >> mip) - 1
    }

    /// Texel coordinate of the last vertex along one tile axis.
    pub fn edge_texel(&self) -> i32 {
        (self.subsection_size_quads + 1) * self.num_subsections - 1
    }

    pub fn world_height(&self, value: u16) -> f32 {
        (value as f32 - HEIGHT_MIDPOINT as f32) * HEIGHT_WORLD_SCALE
    }
}

/// Splits a height into the two texel bytes it occupies.
#[inline]
pub fn height_to_texel_bytes(value: u16) -> (u8, u8) {
    ((value >> 8) as u8, (value & 255) as u8)
}

#[inline]
pub fn height_from_texel_bytes(high: u8, low: u8) -> u16 {
    (high as u16) << 8 | low as u16
}

/// Packs one normal component from [-1, 1] into a byte, rounded.
#[inline]
pub fn pack_normal_byte(component: f32) -> u8 {
    let scaled = 127.5 * (component + 1.0) + 0.5;
    scaled.clamp(0.0, 255.0) as u8
}

/// Inverse of [`pack_normal_byte`], `2 * b / 255 - 1`.
#[inline]
pub fn unpack_normal_byte(byte: u8) -> f32 {
    2.0 * byte as f32 / 255.0 - 1.0
}

/// Inclusive rectangle in terrain grid coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GridRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl GridRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1 + 1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1 + 1
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    pub fn intersect(&self, other: &GridRect) -> Option<GridRect> {
        let r = GridRect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        (r.x1 <= r.x2 && r.y1 <= r.y2).then_some(r)
    }
}

/// One stored value of a terrain bitmap: `u16` heights, `u8` weights.
pub trait Sample: Copy + Default + PartialEq + std::fmt::Debug {
    const ZERO: Self;
    fn to_f32(self) -> f32;
    /// Rounds half away from zero (add 0.5, truncate) and clamps to range.
    fn from_f32_rounded(value: f32) -> Self;
    /// Truncates toward zero and clamps to range, the narrowing used by
    /// interpolated border fills.
    fn from_f32_truncated(value: f32) -> Self;
}

impl Sample for u16 {
    const ZERO: Self = 0;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32_rounded(value: f32) -> Self {
        (value.clamp(0.0, u16::MAX as f32) + 0.5) as u16
    }

    #[inline]
    fn from_f32_truncated(value: f32) -> Self {
        value.clamp(0.0, u16::MAX as f32) as u16
    }
}

impl Sample for u8 {
    const ZERO: Self = 0;

    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32_rounded(value: f32) -> Self {
        (value.clamp(0.0, u8::MAX as f32) + 0.5) as u8
    }

    #[inline]
    fn from_f32_truncated(value: f32) -> Self {
        value.clamp(0.0, u8::MAX as f32) as u8
    }
}

/// Presence bits for a rectangular sweep of tile indices.
pub struct OccupancyGrid {
    width: i32,
    height: i32,
    bits: BitVec<usize, Lsb0>,
}

impl OccupancyGrid {
    pub fn new(width: i32, height: i32) -> Self {
        assert!(width >= 0 && height >= 0, "negative occupancy grid extent");
        Self {
            width,
            height,
            bits: BitVec::repeat(false, width as usize * height as usize),
        }
    }

    pub fn set(&mut self, x: i32, y: i32) {
        assert!(
            x >= 0 && x < self.width && y >= 0 && y < self.height,
            "occupancy cell ({x}, {y}) outside {}x{} grid",
            self.width,
            self.height
        );
        self.bits.set((y * self.width + x) as usize, true);
    }

    /// Out-of-range cells read as absent.
    pub fn get(&self, x: i32, y: i32) -> bool {
        if x < 0 || x >= self.width || y < 0 || y >= self.height {
            return false;
        }
        self.bits[(y * self.width + x) as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_derived_quantities() {
        let layout = TerrainLayout::new(2, 63);
        assert_eq!(layout.tile_size_quads(), 126);
        assert_eq!(layout.texture_size(), 128);
        assert_eq!(layout.base_num_mips(), 6);
        assert_eq!(layout.mip_count(), 8);
        assert_eq!(layout.edge_texel(), 127);
        assert_eq!(layout.mip_subsection_size_quads(0), 63);
        assert_eq!(layout.mip_subsection_size_quads(5), 1);
        assert_eq!(layout.mip_subsection_size_quads(6), 0);
    }

    #[test]
    #[should_panic(expected = "num_subsections must be a power of two")]
    fn layout_rejects_three_subsections() {
        TerrainLayout::new(3, 63);
    }

    #[test]
    #[should_panic(expected = "subsection_size_quads + 1 must be a power of two")]
    fn layout_rejects_odd_subsection_size() {
        TerrainLayout::new(1, 10);
    }

    #[test]
    fn height_texel_bytes_round_trip() {
        for value in [0u16, 1, 255, 256, 32768, 65535] {
            let (high, low) = height_to_texel_bytes(value);
            assert_eq!(height_from_texel_bytes(high, low), value);
        }
    }

    #[test]
    fn normal_byte_endpoints() {
        assert_eq!(pack_normal_byte(-1.0), 0);
        assert_eq!(pack_normal_byte(1.0), 255);
        assert_eq!(pack_normal_byte(0.0), 128);
        assert!((unpack_normal_byte(pack_normal_byte(0.0))).abs() < 1.0 / 127.5);
    }

    #[test]
    fn sample_rounding_is_half_away_from_zero() {
        assert_eq!(u16::from_f32_rounded(10.4), 10);
        assert_eq!(u16::from_f32_rounded(10.5), 11);
        assert_eq!(u8::from_f32_rounded(254.6), 255);
        assert_eq!(u8::from_f32_rounded(300.0), 255);
        assert_eq!(u16::from_f32_rounded(-5.0), 0);
    }

    #[test]
    fn occupancy_grid_out_of_range_reads_absent() {
        let mut grid = OccupancyGrid::new(3, 2);
        grid.set(2, 1);
        assert!(grid.get(2, 1));
        assert!(!grid.get(0, 0));
        assert!(!grid.get(-1, 0));
        assert!(!grid.get(3, 0));
        assert!(!grid.get(0, 2));
    }
}

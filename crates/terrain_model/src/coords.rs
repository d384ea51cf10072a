//! Coordinate algebra between the terrain grid, tile-local quads,
//! subsection-local vertices, and bitmap texels.
//!
//! Tiles share their border vertex row/column with neighbors, which makes
//! two different index-range computations necessary: reads must visit every
//! tile that stores a copy of a requested vertex (the overlap range), while
//! writes must visit each unique tile once (the exclusive range).

/// Tile index range for a read over `[x1, x2] x [y1, y2]`, picking up every
/// tile whose stored border vertices fall inside the rectangle.
pub fn tile_index_range_overlap(
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    tile_size_quads: i32,
) -> (i32, i32, i32, i32) {
    debug_assert!(x2 >= x1 && y2 >= y1, "inverted coordinate range");
    let ix1 = if x1 - 1 >= 0 {
        (x1 - 1) / tile_size_quads
    } else {
        x1 / tile_size_quads - 1
    };
    let iy1 = if y1 - 1 >= 0 {
        (y1 - 1) / tile_size_quads
    } else {
        y1 / tile_size_quads - 1
    };
    let ix2 = if x2 >= 0 {
        x2 / tile_size_quads
    } else {
        (x2 + 1) / tile_size_quads - 1
    };
    let iy2 = if y2 >= 0 {
        y2 / tile_size_quads
    } else {
        (y2 + 1) / tile_size_quads - 1
    };
    (ix1, iy1, ix2, iy2)
}

/// Tile index range for a write: each tile containing part of the rectangle
/// appears exactly once despite shared borders.
pub fn tile_index_range_exclusive(
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
    tile_size_quads: i32,
) -> (i32, i32, i32, i32) {
    debug_assert!(x2 >= x1 && y2 >= y1, "inverted coordinate range");
    let ix1 = if x1 >= 0 {
        x1 / tile_size_quads
    } else {
        (x1 + 1) / tile_size_quads - 1
    };
    let iy1 = if y1 >= 0 {
        y1 / tile_size_quads
    } else {
        (y1 + 1) / tile_size_quads - 1
    };
    let mut ix2 = if x2 - 1 >= 0 {
        (x2 - 1) / tile_size_quads
    } else {
        x2 / tile_size_quads - 1
    };
    let mut iy2 = if y2 - 1 >= 0 {
        (y2 - 1) / tile_size_quads
    } else {
        y2 / tile_size_quads - 1
    };
    // A degenerate one-vertex rectangle still covers its own tile.
    ix2 = ix2.max(ix1);
    iy2 = iy2.max(iy1);
    (ix1, iy1, ix2, iy2)
}

/// Subsection owning one tile-local vertex, with the vertex rebased into
/// that subsection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SubsectionCoord {
    pub sub_x: i32,
    pub sub_y: i32,
    pub local_x: i32,
    pub local_y: i32,
}

/// Attributes a tile-local vertex to a subsection. A vertex on the seam
/// between two subsections belongs to the lower-indexed one.
pub fn subsection_for_tile_local(
    local_x: i32,
    local_y: i32,
    subsection_size_quads: i32,
    num_subsections: i32,
) -> SubsectionCoord {
    let sub_x = ((local_x - 1) / subsection_size_quads).clamp(0, num_subsections - 1);
    let sub_y = ((local_y - 1) / subsection_size_quads).clamp(0, num_subsections - 1);
    SubsectionCoord {
        sub_x,
        sub_y,
        local_x: local_x - sub_x * subsection_size_quads,
        local_y: local_y - sub_y * subsection_size_quads,
    }
}

/// Texel offset of a tile inside its bitmap at a given mip, from the tile's
/// normalized origin fraction of the mip-0 bitmap.
pub fn texel_offset_for_mip(
    fraction_x: f32,
    fraction_y: f32,
    bitmap_size_mip0: i32,
    mip: u32,
) -> (i32, i32) {
    let size = bitmap_size_mip0 >> mip;
    (
        (fraction_x * size as f32 + 0.5) as i32,
        (fraction_y * size as f32 + 0.5) as i32,
    )
}

/// Requested rectangle clamped into one tile's local quad space.
pub fn tile_quad_box(
    tile_index_x: i32,
    tile_index_y: i32,
    tile_size_quads: i32,
    x1: i32,
    y1: i32,
    x2: i32,
    y2: i32,
) -> (i32, i32, i32, i32) {
    let base_x = tile_index_x * tile_size_quads;
    let base_y = tile_index_y * tile_size_quads;
    (
        (x1 - base_x).clamp(0, tile_size_quads),
        (y1 - base_y).clamp(0, tile_size_quads),
        (x2 - base_x).clamp(0, tile_size_quads),
        (y2 - base_y).clamp(0, tile_size_quads),
    )
}

/// Subsections covered by a tile-local vertex span `[c1, c2]`. The low end
/// uses previous-vertex attribution so a span starting on a seam still
/// includes the lower subsection that stores the seam vertex.
pub fn subsection_index_range(
    c1: i32,
    c2: i32,
    subsection_size_quads: i32,
    num_subsections: i32,
) -> (i32, i32) {
    (
        ((c1 - 1) / subsection_size_quads).clamp(0, num_subsections - 1),
        (c2 / subsection_size_quads).clamp(0, num_subsections - 1),
    )
}

/// Vertex span of `[c1, c2]` inside one subsection, clamped to the
/// subsection's own `0..=subsection_size_quads` vertices.
pub fn subsection_vertex_span(
    c1: i32,
    c2: i32,
    sub_index: i32,
    subsection_size_quads: i32,
) -> (i32, i32) {
    (
        (c1 - subsection_size_quads * sub_index).max(0),
        (c2 - subsection_size_quads * sub_index).min(subsection_size_quads),
    )
}

/// Texel coordinate of a subsection-local vertex along one axis.
#[inline]
pub fn texel_for_subsection(
    offset: i32,
    mip_subsection_size_quads: i32,
    sub_index: i32,
    local: i32,
) -> i32 {
    offset + (mip_subsection_size_quads + 1) * sub_index + local
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_range_includes_border_owner() {
        // Vertex 4 is stored both by tile 0 (as its right border) and tile 1.
        assert_eq!(tile_index_range_overlap(4, 4, 4, 4, 4), (0, 0, 1, 1));
        assert_eq!(tile_index_range_overlap(0, 0, 8, 8, 4), (-1, -1, 2, 2));
        assert_eq!(tile_index_range_overlap(1, 1, 3, 3, 4), (0, 0, 0, 0));
    }

    #[test]
    fn overlap_range_negative_coords() {
        assert_eq!(tile_index_range_overlap(-4, -4, -1, -1, 4), (-2, -2, -1, -1));
        assert_eq!(tile_index_range_overlap(-1, -1, 0, 0, 4), (-1, -1, 0, 0));
    }

    #[test]
    fn exclusive_range_visits_each_tile_once() {
        assert_eq!(tile_index_range_exclusive(0, 0, 8, 8, 4), (0, 0, 1, 1));
        assert_eq!(tile_index_range_exclusive(4, 4, 4, 4, 4), (1, 1, 1, 1));
        assert_eq!(tile_index_range_exclusive(-4, -4, 0, 0, 4), (-1, -1, -1, -1));
        assert_eq!(tile_index_range_exclusive(-5, -5, -1, -1, 4), (-2, -2, -1, -1));
    }

    #[test]
    fn seam_vertex_belongs_to_lower_subsection() {
        // Two subsections of 63 quads: local vertex 63 is the shared seam.
        let c = subsection_for_tile_local(63, 63, 63, 2);
        assert_eq!((c.sub_x, c.sub_y), (0, 0));
        assert_eq!((c.local_x, c.local_y), (63, 63));

        let c = subsection_for_tile_local(64, 0, 63, 2);
        assert_eq!((c.sub_x, c.sub_y), (1, 0));
        assert_eq!((c.local_x, c.local_y), (1, 0));

        let c = subsection_for_tile_local(0, 0, 63, 2);
        assert_eq!((c.sub_x, c.sub_y), (0, 0));
        assert_eq!((c.local_x, c.local_y), (0, 0));
    }

    #[test]
    fn texel_offset_scales_with_mip() {
        assert_eq!(texel_offset_for_mip(0.5, 0.0, 256, 0), (128, 0));
        assert_eq!(texel_offset_for_mip(0.5, 0.0, 256, 2), (32, 0));
        assert_eq!(texel_offset_for_mip(0.0, 0.0, 256, 3), (0, 0));
    }

    #[test]
    fn quad_box_clamps_into_tile() {
        assert_eq!(tile_quad_box(1, 0, 4, 2, 0, 10, 3), (0, 0, 4, 3));
        assert_eq!(tile_quad_box(-1, -1, 4, -3, -3, 5, 5), (1, 1, 4, 4));
    }

    #[test]
    fn subsection_range_covers_seam_span() {
        assert_eq!(subsection_index_range(63, 63, 63, 2), (0, 1));
        assert_eq!(subsection_index_range(0, 62, 63, 2), (0, 0));
        assert_eq!(subsection_index_range(64, 126, 63, 2), (1, 1));
        assert_eq!(subsection_vertex_span(60, 70, 0, 63), (60, 63));
        assert_eq!(subsection_vertex_span(60, 70, 1, 63), (0, 7));
    }

    #[test]
    fn mip_texel_round_trip_matches_direct_arithmetic() {
        // Addressing a vertex via full-resolution subsection attribution then
        // downsampling the subsection-local index must land on the same texel
        // as direct per-mip arithmetic, for every subsection-consistent mip.
        let ssq = 63;
        let num_subsections = 2;
        for mip in 0..6 {
            let mip_ssq = ((ssq + 1) >> mip) - 1;
            for sub in 0..num_subsections {
                for local in 0..=mip_ssq {
                    let direct = texel_for_subsection(0, mip_ssq, sub, local);
                    let full = texel_for_subsection(0, ssq, sub, local << mip);
                    let rebased_local = (full - sub * (ssq + 1)) >> mip;
                    assert_eq!(
                        direct,
                        texel_for_subsection(0, mip_ssq, sub, rebased_local)
                    );
                }
            }
        }
    }
}

use glam::Vec3;

use crate::builders::primref::{BuildPrimRef, PrimRef, PrimRefMb};
use crate::builders::primref_gen::SubGridBuildData;
use crate::common::scene::Scene;
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::time_range::TimeRange;

use super::primitive::{fill_slots, LeafBlock, PrimIds};

/// Most sub-grids a block can hold, matching the widest branching factor.
pub const MAX_SUB_GRIDS: usize = 8;

/// Leaf block of up to eight sub-grids, each with bounds quantized to bytes relative to the
/// bounds of the whole block. Works like a small inner node whose children are sub-grids.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SubGridQbvh {
    /// Geometry id and grid index of each sub-grid.
    pub ids: PrimIds<MAX_SUB_GRIDS>,
    /// First quad of each sub-grid inside its grid.
    pub x: [u16; MAX_SUB_GRIDS],
    pub y: [u16; MAX_SUB_GRIDS],
    /// Bounds of the block at both ends of its time range.
    pub origin: LinearBounds,
    /// Quantized sub-grid corners, indexed by range end, slot and axis.
    pub lower: [[[u8; 3]; MAX_SUB_GRIDS]; 2],
    pub upper: [[[u8; 3]; MAX_SUB_GRIDS]; 2],
}

#[inline]
fn quantization_scale(bounds: &BoundingBox) -> Vec3 {
    let extent = bounds.size();
    Vec3::select(extent.cmpgt(Vec3::ZERO), Vec3::splat(255.0) / extent, Vec3::ZERO)
}

#[inline]
fn quantize(value: Vec3, origin: Vec3, scale: Vec3, round: fn(Vec3) -> Vec3) -> [u8; 3] {
    let q = round((value - origin) * scale).clamp(Vec3::ZERO, Vec3::splat(255.0));
    [q.x as u8, q.y as u8, q.z as u8]
}

#[inline]
fn dequantize(q: [u8; 3], bounds: &BoundingBox) -> Vec3 {
    let q = Vec3::new(q[0] as f32, q[1] as f32, q[2] as f32);
    bounds.min + q * (bounds.size() / 255.0)
}

impl SubGridQbvh {
    /// Blocks needed for `count` sub-grids with `max_per_block` sub-grids per block.
    #[inline]
    pub fn blocks(count: usize, max_per_block: usize) -> usize {
        count.div_ceil(max_per_block)
    }

    /// Dequantized bounds of the sub-grid in `slot`. Never smaller than the exact bounds.
    pub fn quantized_bounds(&self, slot: usize) -> LinearBounds {
        let ends = [self.origin.bounds0, self.origin.bounds1];
        let [b0, b1] = [0, 1].map(|end| {
            let bounds = &ends[end];
            BoundingBox::new(
                dequantize(self.lower[end][slot], bounds),
                dequantize(self.upper[end][slot], bounds),
            )
        });
        LinearBounds::new(b0, b1)
    }

    fn quantize_slots(&mut self, items: &[LinearBounds]) {
        let ends = [self.origin.bounds0, self.origin.bounds1];
        for (end, block) in ends.iter().enumerate() {
            let scale = quantization_scale(block);
            for (slot, item) in items.iter().enumerate() {
                let item = if end == 0 { &item.bounds0 } else { &item.bounds1 };
                self.lower[end][slot] = quantize(item.min, block.min, scale, Vec3::floor);
                self.upper[end][slot] = quantize(item.max, block.min, scale, Vec3::ceil);
            }
        }
    }

    fn fill<R: BuildPrimRef>(
        prims: &[R],
        begin: &mut usize,
        sgrids: &[SubGridBuildData],
        max_per_block: usize,
        bounds: impl Fn(&R, &SubGridBuildData) -> LinearBounds,
    ) -> (Self, LinearBounds) {
        debug_assert!(max_per_block <= MAX_SUB_GRIDS);
        let mut block = Self::default();
        let mut items = [LinearBounds::empty(); MAX_SUB_GRIDS];
        let mut count = 0;
        let union = fill_slots(prims, begin, max_per_block, |slot, prim| {
            let data = &sgrids[prim.prim_id() as usize];
            block.ids.set(slot, prim.geom_id(), data.prim_id);
            block.x[slot] = data.x;
            block.y[slot] = data.y;
            items[slot] = bounds(prim, data);
            count = slot + 1;
            items[slot]
        });
        block.origin = union;
        block.quantize_slots(&items[..count]);
        (block, union)
    }

    /// Fills one block from sub-grid references bounded over the segment starting at `itime`.
    pub fn fill_mb(
        prims: &[PrimRef],
        begin: &mut usize,
        scene: &Scene,
        sgrids: &[SubGridBuildData],
        itime: usize,
        max_per_block: usize,
    ) -> (Self, LinearBounds) {
        Self::fill(prims, begin, sgrids, max_per_block, |prim, data| {
            scene.grid_mesh(prim.geom_id).sub_grid_linear_bounds(
                data.prim_id as usize,
                data.x as usize,
                data.y as usize,
                itime,
            )
        })
    }

    /// Fills one block from sub-grid references bounded over `time_range`.
    pub fn fill_mb_range(
        prims: &[PrimRefMb],
        begin: &mut usize,
        scene: &Scene,
        sgrids: &[SubGridBuildData],
        time_range: &TimeRange,
        max_per_block: usize,
    ) -> (Self, LinearBounds) {
        Self::fill(prims, begin, sgrids, max_per_block, |prim, data| {
            scene.grid_mesh(prim.geom_id).sub_grid_linear_bounds_range(
                data.prim_id as usize,
                data.x as usize,
                data.y as usize,
                time_range,
            )
        })
    }
}

impl LeafBlock for SubGridQbvh {
    #[inline]
    fn size(&self) -> usize {
        self.ids.size()
    }

    #[inline]
    fn geom_prim_id(&self, slot: usize) -> (u32, u32) {
        self.ids.get(slot)
    }

    fn item_key(&self, slot: usize) -> (u32, u32, u32) {
        let (geom_id, grid) = self.ids.get(slot);
        (geom_id, grid, (self.x[slot] as u32) << 16 | self.y[slot] as u32)
    }

    fn item_bounds(&self, slot: usize, scene: &Scene, itime: usize) -> BoundingBox {
        let (geom_id, grid) = self.ids.get(slot);
        scene.grid_mesh(geom_id).sub_grid_bounds(
            grid as usize,
            self.x[slot] as usize,
            self.y[slot] as usize,
            itime,
        )
    }
}

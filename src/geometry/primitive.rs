use crate::builders::primref::{BuildPrimRef, PrimRef, PrimRefMb};
use crate::common::scene::Scene;
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::time_range::TimeRange;

use super::motion_geometry::GeometryType;

/// Slot id marking an unused entry of a leaf block.
pub const INVALID_ID: u32 = u32::MAX;

/// Fixed capacity record stored in the leaf arena of a hierarchy.
pub trait LeafBlock: Copy + Send + Sync + 'static {
    /// Number of used slots. Used slots always come first.
    fn size(&self) -> usize;

    /// Geometry and primitive id of a used slot.
    fn geom_prim_id(&self, slot: usize) -> (u32, u32);

    /// Identity of the item in `slot`, unique within a scene.
    fn item_key(&self, slot: usize) -> (u32, u32, u32) {
        let (geom_id, prim_id) = self.geom_prim_id(slot);
        (geom_id, prim_id, 0)
    }

    /// Bounds of the item in `slot` at time step `itime`.
    fn item_bounds(&self, slot: usize, scene: &Scene, itime: usize) -> BoundingBox {
        let (geom_id, prim_id) = self.geom_prim_id(slot);
        scene.geometry(geom_id).bounds(prim_id as usize, itime)
    }
}

/// Leaf representation of one geometry family, filled from consecutive references.
pub trait Primitive: LeafBlock + Default {
    const NAME: &'static str;
    /// Items per block.
    const MAX_SIZE: usize;
    /// Whether every item of a block must stay within one time segment of its geometry.
    const SINGLE_TIME_SEGMENT: bool = false;
    const GEOMETRY_TYPE: GeometryType;

    /// Writes primitive `prim_id` of geometry `geom_id` into `slot`. Time dependent data is
    /// sampled from the segment starting at step `itime`.
    fn set_slot(&mut self, slot: usize, scene: &Scene, geom_id: u32, prim_id: u32, itime: usize);

    /// Blocks needed to store `count` items.
    #[inline]
    fn blocks(count: usize) -> usize {
        count.div_ceil(Self::MAX_SIZE)
    }

    /// Fills one block from `prims[*begin..]` and advances `begin` past the consumed
    /// references. Returns the block and its bounds over the segment starting at `itime`.
    fn fill_mb(prims: &[PrimRef], begin: &mut usize, scene: &Scene, itime: usize) -> (Self, LinearBounds) {
        let mut block = Self::default();
        let bounds = fill_slots(prims, begin, Self::MAX_SIZE, |slot, prim| {
            block.set_slot(slot, scene, prim.geom_id, prim.prim_id, itime);
            scene.geometry(prim.geom_id).linear_bounds(prim.prim_id as usize, itime)
        });
        (block, bounds)
    }

    /// Time range variant of [`Primitive::fill_mb`]. Returns bounds over `time_range`.
    fn fill_mb_range(
        prims: &[PrimRefMb],
        begin: &mut usize,
        scene: &Scene,
        time_range: &TimeRange,
    ) -> (Self, LinearBounds) {
        let mut block = Self::default();
        let bounds = fill_slots(prims, begin, Self::MAX_SIZE, |slot, prim| {
            let geometry = scene.geometry(prim.geom_id);
            let itime = geometry.time_segment_range(time_range).start;
            block.set_slot(slot, scene, prim.geom_id, prim.prim_id, itime);
            geometry.linear_bounds_range(prim.prim_id as usize, time_range)
        });
        (block, bounds)
    }
}

/// Feeds up to `max` references starting at `*begin` to `fill`, which stores one reference in
/// a slot and returns its bounds. Returns the union of those bounds.
pub(crate) fn fill_slots<R: BuildPrimRef>(
    prims: &[R],
    begin: &mut usize,
    max: usize,
    mut fill: impl FnMut(usize, &R) -> LinearBounds,
) -> LinearBounds {
    let end = (*begin + max).min(prims.len());
    let mut bounds = LinearBounds::empty();
    for (slot, prim) in prims[*begin..end].iter().enumerate() {
        bounds.extend(&fill(slot, prim));
    }
    *begin = end;
    bounds
}

/// Geometry and primitive ids of a block holding up to `M` items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PrimIds<const M: usize> {
    pub geom_ids: [u32; M],
    pub prim_ids: [u32; M],
}

impl<const M: usize> Default for PrimIds<M> {
    fn default() -> Self {
        Self {
            geom_ids: [INVALID_ID; M],
            prim_ids: [INVALID_ID; M],
        }
    }
}

impl<const M: usize> PrimIds<M> {
    #[inline]
    pub fn set(&mut self, slot: usize, geom_id: u32, prim_id: u32) {
        self.geom_ids[slot] = geom_id;
        self.prim_ids[slot] = prim_id;
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.prim_ids.iter().take_while(|&&id| id != INVALID_ID).count()
    }

    #[inline]
    pub fn get(&self, slot: usize) -> (u32, u32) {
        (self.geom_ids[slot], self.prim_ids[slot])
    }
}

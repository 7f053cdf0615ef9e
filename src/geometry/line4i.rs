use crate::common::scene::Scene;

use super::motion_geometry::GeometryType;
use super::primitive::{LeafBlock, PrimIds, Primitive};

/// Four line segments stored by the index of their first vertex.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Line4i {
    pub ids: PrimIds<4>,
    pub v0: [u32; 4],
}

impl LeafBlock for Line4i {
    #[inline]
    fn size(&self) -> usize {
        self.ids.size()
    }

    #[inline]
    fn geom_prim_id(&self, slot: usize) -> (u32, u32) {
        self.ids.get(slot)
    }
}

impl Primitive for Line4i {
    const NAME: &'static str = "line4i";
    const MAX_SIZE: usize = 4;
    const GEOMETRY_TYPE: GeometryType = GeometryType::Curves;

    fn set_slot(&mut self, slot: usize, scene: &Scene, geom_id: u32, prim_id: u32, _itime: usize) {
        self.ids.set(slot, geom_id, prim_id);
        self.v0[slot] = scene.line_segments(geom_id).segments[prim_id as usize];
    }
}

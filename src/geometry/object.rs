use crate::common::scene::Scene;

use super::motion_geometry::GeometryType;
use super::primitive::{LeafBlock, PrimIds, Primitive};

/// Single user geometry primitive, intersected through its geometry's callbacks.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Object {
    pub ids: PrimIds<1>,
}

impl LeafBlock for Object {
    #[inline]
    fn size(&self) -> usize {
        self.ids.size()
    }

    #[inline]
    fn geom_prim_id(&self, slot: usize) -> (u32, u32) {
        self.ids.get(slot)
    }
}

impl Primitive for Object {
    const NAME: &'static str = "object";
    const MAX_SIZE: usize = 1;
    const GEOMETRY_TYPE: GeometryType = GeometryType::User;

    fn set_slot(&mut self, slot: usize, _scene: &Scene, geom_id: u32, prim_id: u32, _itime: usize) {
        self.ids.set(slot, geom_id, prim_id);
    }
}

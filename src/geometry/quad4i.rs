use crate::common::scene::Scene;

use super::motion_geometry::GeometryType;
use super::primitive::{LeafBlock, PrimIds, Primitive};

/// Four quads stored by vertex indices.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Quad4i {
    pub ids: PrimIds<4>,
    pub vertices: [[u32; 4]; 4],
}

impl LeafBlock for Quad4i {
    #[inline]
    fn size(&self) -> usize {
        self.ids.size()
    }

    #[inline]
    fn geom_prim_id(&self, slot: usize) -> (u32, u32) {
        self.ids.get(slot)
    }
}

impl Primitive for Quad4i {
    const NAME: &'static str = "quad4i";
    const MAX_SIZE: usize = 4;
    const GEOMETRY_TYPE: GeometryType = GeometryType::Quads;

    fn set_slot(&mut self, slot: usize, scene: &Scene, geom_id: u32, prim_id: u32, _itime: usize) {
        self.ids.set(slot, geom_id, prim_id);
        self.vertices[slot] = scene.quad_mesh(geom_id).quads[prim_id as usize];
    }
}

use crate::common::scene::Scene;

use super::motion_geometry::GeometryType;
use super::primitive::{LeafBlock, PrimIds, Primitive};

/// Four triangles stored by vertex indices. Vertex positions are fetched from the mesh at
/// intersection time, so one block serves every time step.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Triangle4i {
    pub ids: PrimIds<4>,
    pub vertices: [[u32; 3]; 4],
}

impl LeafBlock for Triangle4i {
    #[inline]
    fn size(&self) -> usize {
        self.ids.size()
    }

    #[inline]
    fn geom_prim_id(&self, slot: usize) -> (u32, u32) {
        self.ids.get(slot)
    }
}

impl Primitive for Triangle4i {
    const NAME: &'static str = "triangle4i";
    const MAX_SIZE: usize = 4;
    const GEOMETRY_TYPE: GeometryType = GeometryType::Triangles;

    fn set_slot(&mut self, slot: usize, scene: &Scene, geom_id: u32, prim_id: u32, _itime: usize) {
        self.ids.set(slot, geom_id, prim_id);
        self.vertices[slot] = scene.triangle_mesh(geom_id).triangles[prim_id as usize];
    }
}

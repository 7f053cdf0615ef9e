use std::ops::Range;

use glam::Vec3;

use crate::utilities::bounding_box::BoundingBox;

use super::motion_geometry::{vertices_valid, GeometryType, MotionGeometry};

/// Indexed quad mesh with one vertex buffer per time step.
#[derive(Clone, Debug)]
pub struct QuadMesh {
    pub quads: Vec<[u32; 4]>,
    pub vertices: Vec<Vec<Vec3>>,
}

impl QuadMesh {
    pub fn new(quads: Vec<[u32; 4]>, vertices: Vec<Vec<Vec3>>) -> Self {
        assert!(!vertices.is_empty(), "A mesh needs at least one time step.");
        Self { quads, vertices }
    }

    #[inline]
    pub fn quad_vertices(&self, prim: usize, itime: usize) -> [Vec3; 4] {
        let step = &self.vertices[itime];
        self.quads[prim].map(|index| step[index as usize])
    }
}

impl MotionGeometry for QuadMesh {
    fn geometry_type(&self) -> GeometryType {
        GeometryType::Quads
    }

    fn num_primitives(&self) -> usize {
        self.quads.len()
    }

    fn num_time_steps(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    fn bounds(&self, prim: usize, itime: usize) -> BoundingBox {
        BoundingBox::from_points(&self.quad_vertices(prim, itime))
    }

    fn is_valid(&self, prim: usize, itime_range: Range<usize>) -> bool {
        vertices_valid(&self.vertices, &self.quads[prim], itime_range, |v: Vec3| v.is_finite())
    }
}

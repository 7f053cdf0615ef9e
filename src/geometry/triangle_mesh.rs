use std::ops::Range;

use glam::Vec3;

use crate::utilities::bounding_box::BoundingBox;

use super::motion_geometry::{vertices_valid, GeometryType, MotionGeometry};

/// Indexed triangle mesh with one vertex buffer per time step.
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    pub triangles: Vec<[u32; 3]>,
    /// `vertices[itime][index]`. All time steps share the index buffer.
    pub vertices: Vec<Vec<Vec3>>,
}

impl TriangleMesh {
    pub fn new(triangles: Vec<[u32; 3]>, vertices: Vec<Vec<Vec3>>) -> Self {
        assert!(!vertices.is_empty(), "A mesh needs at least one time step.");
        Self {
            triangles,
            vertices,
        }
    }

    /// Vertices of triangle `prim` at time step `itime`.
    #[inline]
    pub fn triangle_vertices(&self, prim: usize, itime: usize) -> [Vec3; 3] {
        let step = &self.vertices[itime];
        self.triangles[prim].map(|index| step[index as usize])
    }
}

impl MotionGeometry for TriangleMesh {
    fn geometry_type(&self) -> GeometryType {
        GeometryType::Triangles
    }

    fn num_primitives(&self) -> usize {
        self.triangles.len()
    }

    fn num_time_steps(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    fn bounds(&self, prim: usize, itime: usize) -> BoundingBox {
        BoundingBox::from_points(&self.triangle_vertices(prim, itime))
    }

    fn is_valid(&self, prim: usize, itime_range: Range<usize>) -> bool {
        vertices_valid(&self.vertices, &self.triangles[prim], itime_range, |v: Vec3| {
            v.is_finite()
        })
    }
}

use std::ops::Range;

use glam::{Vec3, Vec4};

use crate::utilities::bounding_box::BoundingBox;

use super::motion_geometry::{vertices_valid, GeometryType, MotionGeometry};

/// Flat curve segments. Segment `i` connects vertex `segments[i]` with the vertex after it.
#[derive(Clone, Debug)]
pub struct LineSegments {
    pub segments: Vec<u32>,
    /// Position in `xyz`, radius in `w`.
    pub vertices: Vec<Vec<Vec4>>,
}

impl LineSegments {
    pub fn new(segments: Vec<u32>, vertices: Vec<Vec<Vec4>>) -> Self {
        assert!(!vertices.is_empty(), "Curves need at least one time step.");
        Self { segments, vertices }
    }

    #[inline]
    pub fn segment_vertices(&self, prim: usize, itime: usize) -> [Vec4; 2] {
        let first = self.segments[prim] as usize;
        let step = &self.vertices[itime];
        [step[first], step[first + 1]]
    }
}

impl MotionGeometry for LineSegments {
    fn geometry_type(&self) -> GeometryType {
        GeometryType::Curves
    }

    fn num_primitives(&self) -> usize {
        self.segments.len()
    }

    fn num_time_steps(&self) -> usize {
        self.vertices.len()
    }

    fn bounds(&self, prim: usize, itime: usize) -> BoundingBox {
        let [v0, v1] = self.segment_vertices(prim, itime);
        let radius = Vec3::splat(v0.w.max(v1.w));
        let mut bounds = BoundingBox::from_points(&[v0.truncate(), v1.truncate()]);
        bounds.min -= radius;
        bounds.max += radius;
        bounds
    }

    fn is_valid(&self, prim: usize, itime_range: Range<usize>) -> bool {
        let first = self.segments[prim];
        let Some(second) = first.checked_add(1) else {
            return false;
        };
        vertices_valid(&self.vertices, &[first, second], itime_range, |v: Vec4| {
            v.is_finite() && v.w >= 0.0
        })
    }
}

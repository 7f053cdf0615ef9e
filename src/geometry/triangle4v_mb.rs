use glam::Vec3;

use crate::common::scene::Scene;

use super::motion_geometry::GeometryType;
use super::primitive::{LeafBlock, PrimIds, Primitive};

/// Four triangles with vertex positions at the start of one time segment and their motion
/// over that segment. Items never span more than one segment.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Triangle4vMb {
    pub ids: PrimIds<4>,
    /// Time step the positions were taken from.
    pub itime: [u32; 4],
    pub v0: [Vec3; 4],
    pub v1: [Vec3; 4],
    pub v2: [Vec3; 4],
    pub dv0: [Vec3; 4],
    pub dv1: [Vec3; 4],
    pub dv2: [Vec3; 4],
}

impl Triangle4vMb {
    /// Vertices of `slot` at local time `t` of its segment.
    pub fn vertices_at(&self, slot: usize, t: f32) -> [Vec3; 3] {
        [
            self.v0[slot] + t * self.dv0[slot],
            self.v1[slot] + t * self.dv1[slot],
            self.v2[slot] + t * self.dv2[slot],
        ]
    }
}

impl LeafBlock for Triangle4vMb {
    #[inline]
    fn size(&self) -> usize {
        self.ids.size()
    }

    #[inline]
    fn geom_prim_id(&self, slot: usize) -> (u32, u32) {
        self.ids.get(slot)
    }
}

impl Primitive for Triangle4vMb {
    const NAME: &'static str = "triangle4vmb";
    const MAX_SIZE: usize = 4;
    const SINGLE_TIME_SEGMENT: bool = true;
    const GEOMETRY_TYPE: GeometryType = GeometryType::Triangles;

    fn set_slot(&mut self, slot: usize, scene: &Scene, geom_id: u32, prim_id: u32, itime: usize) {
        let mesh = scene.triangle_mesh(geom_id);
        let [a0, b0, c0] = mesh.triangle_vertices(prim_id as usize, itime);
        let [a1, b1, c1] = mesh.triangle_vertices(prim_id as usize, itime + 1);
        self.ids.set(slot, geom_id, prim_id);
        self.itime[slot] = itime as u32;
        self.v0[slot] = a0;
        self.v1[slot] = b0;
        self.v2[slot] = c0;
        self.dv0[slot] = a1 - a0;
        self.dv1[slot] = b1 - b0;
        self.dv2[slot] = c1 - c0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::primref::PrimRefMb;
    use crate::geometry::triangle_mesh::TriangleMesh;
    use crate::utilities::linear_bounds::LinearBounds;
    use crate::utilities::time_range::TimeRange;

    #[test]
    fn test_range_fill_samples_the_covered_segment() {
        let mut scene = Scene::new();
        let steps = (0..3)
            .map(|s| vec![Vec3::ZERO, Vec3::X, Vec3::Y].into_iter().map(|v| v + Vec3::Z * s as f32).collect())
            .collect();
        let geom_id = scene.add_geometry(TriangleMesh::new(vec![[0, 1, 2]], steps));
        let range = TimeRange::new(0.5, 1.0);
        let prim = PrimRefMb::new(LinearBounds::empty(), 1, TimeRange::GLOBAL, 2, geom_id, 0);

        let mut begin = 0;
        let (block, bounds) = Triangle4vMb::fill_mb_range(&[prim], &mut begin, &scene, &range);
        assert_eq!(block.size(), 1);
        assert_eq!(block.itime[0], 1);
        assert_eq!(block.vertices_at(0, 1.0)[0], Vec3::new(0.0, 0.0, 2.0));
        assert_eq!(bounds.bounds0.min.z, 1.0);
        assert_eq!(bounds.bounds1.max.z, 2.0);
    }
}

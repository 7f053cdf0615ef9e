use crate::geometry::grid_mesh::GridMesh;
use crate::geometry::instance::Instance;
use crate::geometry::line_segments::LineSegments;
use crate::geometry::motion_geometry::{Geometry, GeometryType, MotionGeometry};
use crate::geometry::quad_mesh::QuadMesh;
use crate::geometry::triangle_mesh::TriangleMesh;
use crate::geometry::user_geometry::UserGeometry;

use super::progress_monitor::{ProgressFunction, ProgressMonitor};

/// Collection of geometries a hierarchy is built over. The geometry id is the index in the
/// scene.
#[derive(Default)]
pub struct Scene {
    geometries: Vec<Geometry>,
    dynamic: bool,
    progress_monitor: ProgressMonitor,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a geometry and returns its id.
    pub fn add_geometry(&mut self, geometry: impl Into<Geometry>) -> u32 {
        let id = self.geometries.len() as u32;
        self.geometries.push(geometry.into());
        id
    }

    #[inline]
    pub fn geometry(&self, geom_id: u32) -> &dyn MotionGeometry {
        self.geometries[geom_id as usize].as_motion_geometry()
    }

    #[inline]
    pub fn get(&self, geom_id: u32) -> Option<&Geometry> {
        self.geometries.get(geom_id as usize)
    }

    pub fn geometries(&self) -> impl Iterator<Item = (u32, &Geometry)> {
        self.geometries.iter().enumerate().map(|(id, g)| (id as u32, g))
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Geometries of `geometry_type`, optionally restricted to those with more than one time step.
    pub fn geometries_of(
        &self,
        geometry_type: GeometryType,
        motion_blur_only: bool,
    ) -> impl Iterator<Item = (u32, &dyn MotionGeometry)> {
        self.geometries().filter_map(move |(id, geometry)| {
            let geometry = geometry.as_motion_geometry();
            let matches = geometry.geometry_type() == geometry_type
                && (!motion_blur_only || geometry.is_motion_blurred());
            matches.then_some((id, geometry))
        })
    }

    /// Total primitive count of the selected geometries.
    pub fn num_primitives(&self, geometry_type: GeometryType, motion_blur_only: bool) -> usize {
        self.geometries_of(geometry_type, motion_blur_only)
            .map(|(_, g)| g.num_primitives())
            .sum()
    }

    /// Largest time step count among the selected geometries, or 1 if none are selected.
    pub fn num_time_steps(&self, geometry_type: GeometryType, motion_blur_only: bool) -> usize {
        self.geometries_of(geometry_type, motion_blur_only)
            .map(|(_, g)| g.num_time_steps())
            .max()
            .unwrap_or(1)
    }

    /// Marks the scene as frequently rebuilt. Static scenes release spare arena capacity after
    /// building.
    pub fn set_dynamic(&mut self, dynamic: bool) {
        self.dynamic = dynamic;
    }

    #[inline]
    pub fn is_static_accel(&self) -> bool {
        !self.dynamic
    }

    #[inline]
    pub fn progress_monitor(&self) -> &ProgressMonitor {
        &self.progress_monitor
    }

    pub fn set_progress_monitor_function(&self, function: Option<ProgressFunction>) {
        self.progress_monitor.set_function(function);
    }

    pub fn triangle_mesh(&self, geom_id: u32) -> &TriangleMesh {
        match self.get(geom_id) {
            Some(Geometry::Triangles(mesh)) => mesh,
            _ => panic!("Geometry {geom_id} is not a triangle mesh."),
        }
    }

    pub fn quad_mesh(&self, geom_id: u32) -> &QuadMesh {
        match self.get(geom_id) {
            Some(Geometry::Quads(mesh)) => mesh,
            _ => panic!("Geometry {geom_id} is not a quad mesh."),
        }
    }

    pub fn line_segments(&self, geom_id: u32) -> &LineSegments {
        match self.get(geom_id) {
            Some(Geometry::Curves(curves)) => curves,
            _ => panic!("Geometry {geom_id} is not a line segment geometry."),
        }
    }

    pub fn user_geometry(&self, geom_id: u32) -> &UserGeometry {
        match self.get(geom_id) {
            Some(Geometry::User(user)) => user,
            _ => panic!("Geometry {geom_id} is not a user geometry."),
        }
    }

    pub fn instance(&self, geom_id: u32) -> &Instance {
        match self.get(geom_id) {
            Some(Geometry::Instance(instance)) => instance,
            _ => panic!("Geometry {geom_id} is not an instance."),
        }
    }

    pub fn grid_mesh(&self, geom_id: u32) -> &GridMesh {
        match self.get(geom_id) {
            Some(Geometry::Grid(grid)) => grid,
            _ => panic!("Geometry {geom_id} is not a grid mesh."),
        }
    }
}

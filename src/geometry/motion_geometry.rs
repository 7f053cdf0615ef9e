use std::ops::Range;

use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::time_range::TimeRange;

use super::grid_mesh::GridMesh;
use super::instance::Instance;
use super::line_segments::LineSegments;
use super::quad_mesh::QuadMesh;
use super::triangle_mesh::TriangleMesh;
use super::user_geometry::UserGeometry;

/// Family of a geometry. Every hierarchy is built over exactly one family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Triangles,
    Quads,
    Curves,
    User,
    Instance,
    Grid,
}

impl std::fmt::Display for GeometryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            GeometryType::Triangles => "triangles",
            GeometryType::Quads => "quads",
            GeometryType::Curves => "curves",
            GeometryType::User => "user",
            GeometryType::Instance => "instance",
            GeometryType::Grid => "grid",
        };
        f.write_str(name)
    }
}

/// Geometry sampled at `num_time_steps` uniformly spaced times over `[0,1]`.
///
/// Primitives move linearly between consecutive time steps.
pub trait MotionGeometry: Send + Sync {
    fn geometry_type(&self) -> GeometryType;

    fn num_primitives(&self) -> usize;

    fn num_time_steps(&self) -> usize;

    /// Bounds of `prim` at time step `itime`.
    fn bounds(&self, prim: usize, itime: usize) -> BoundingBox;

    /// Whether `prim` is well formed at every time step in `itime_range`.
    fn is_valid(&self, prim: usize, itime_range: Range<usize>) -> bool;

    #[inline]
    fn num_time_segments(&self) -> usize {
        self.num_time_steps().saturating_sub(1)
    }

    #[inline]
    fn is_motion_blurred(&self) -> bool {
        self.num_time_steps() > 1
    }

    /// Linear bounds of `prim` over the time segment starting at step `itime`.
    #[inline]
    fn linear_bounds(&self, prim: usize, itime: usize) -> LinearBounds {
        LinearBounds::new(self.bounds(prim, itime), self.bounds(prim, itime + 1))
    }

    /// Conservative linear bounds of `prim` over an arbitrary `time_range`.
    #[inline]
    fn linear_bounds_range(&self, prim: usize, time_range: &TimeRange) -> LinearBounds {
        LinearBounds::from_time_steps(
            |itime| self.bounds(prim, itime),
            time_range,
            self.num_time_segments(),
        )
    }

    /// Segments of this geometry that overlap `time_range`.
    #[inline]
    fn time_segment_range(&self, time_range: &TimeRange) -> Range<usize> {
        time_range.segment_range(self.num_time_segments())
    }

    /// Linear bounds of `prim` over `time_range`, or `None` when any time step involved is
    /// malformed.
    fn valid_linear_bounds(&self, prim: usize, time_range: &TimeRange) -> Option<LinearBounds> {
        let segments = self.time_segment_range(time_range);
        if !self.is_valid(prim, segments.start..segments.end + 1) {
            return None;
        }
        Some(self.linear_bounds_range(prim, time_range))
    }
}

/// A geometry stored in a scene.
pub enum Geometry {
    Triangles(TriangleMesh),
    Quads(QuadMesh),
    Curves(LineSegments),
    User(UserGeometry),
    Instance(Instance),
    Grid(GridMesh),
}

impl Geometry {
    #[inline]
    pub fn as_motion_geometry(&self) -> &dyn MotionGeometry {
        match self {
            Geometry::Triangles(mesh) => mesh,
            Geometry::Quads(mesh) => mesh,
            Geometry::Curves(curves) => curves,
            Geometry::User(user) => user,
            Geometry::Instance(instance) => instance,
            Geometry::Grid(grid) => grid,
        }
    }

    #[inline]
    pub fn geometry_type(&self) -> GeometryType {
        self.as_motion_geometry().geometry_type()
    }
}

impl From<TriangleMesh> for Geometry {
    fn from(mesh: TriangleMesh) -> Self {
        Geometry::Triangles(mesh)
    }
}

impl From<QuadMesh> for Geometry {
    fn from(mesh: QuadMesh) -> Self {
        Geometry::Quads(mesh)
    }
}

impl From<LineSegments> for Geometry {
    fn from(curves: LineSegments) -> Self {
        Geometry::Curves(curves)
    }
}

impl From<UserGeometry> for Geometry {
    fn from(user: UserGeometry) -> Self {
        Geometry::User(user)
    }
}

impl From<Instance> for Geometry {
    fn from(instance: Instance) -> Self {
        Geometry::Instance(instance)
    }
}

impl From<GridMesh> for Geometry {
    fn from(grid: GridMesh) -> Self {
        Geometry::Grid(grid)
    }
}

/// Checks that every vertex of a primitive exists and is finite at each time step in `itime_range`.
pub(crate) fn vertices_valid<V: Copy>(
    vertices: &[Vec<V>],
    indices: &[u32],
    itime_range: Range<usize>,
    is_finite: impl Fn(V) -> bool,
) -> bool {
    if itime_range.end > vertices.len() {
        return false;
    }
    vertices[itime_range].iter().all(|step| {
        indices.iter().all(|&index| {
            step.get(index as usize)
                .map_or(false, |&vertex| is_finite(vertex))
        })
    })
}

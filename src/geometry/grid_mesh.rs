use std::ops::Range;

use glam::Vec3;

use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::time_range::TimeRange;

use super::motion_geometry::{GeometryType, MotionGeometry};

/// Regular `width` x `height` vertex grid inside a grid mesh vertex buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grid {
    pub start_vertex_index: u32,
    /// Distance in vertices between two consecutive rows.
    pub stride: u32,
    pub width: u16,
    pub height: u16,
}

impl Grid {
    /// Number of sub-grids of at most 2x2 quads covering the grid.
    #[inline]
    pub fn num_sub_grids(&self) -> (usize, usize) {
        let quads_x = (self.width as usize).saturating_sub(1);
        let quads_y = (self.height as usize).saturating_sub(1);
        (quads_x.div_ceil(2), quads_y.div_ceil(2))
    }

    #[inline]
    fn vertex_index(&self, x: usize, y: usize) -> usize {
        self.start_vertex_index as usize + y * self.stride as usize + x
    }
}

/// Mesh made of regular vertex grids. Each grid is one primitive; builders subdivide grids
/// into sub-grids of up to 2x2 quads.
#[derive(Clone, Debug)]
pub struct GridMesh {
    pub grids: Vec<Grid>,
    pub vertices: Vec<Vec<Vec3>>,
}

impl GridMesh {
    /// Largest sub-grid extent in quads along either axis.
    pub const SUB_GRID_QUADS: usize = 2;

    pub fn new(grids: Vec<Grid>, vertices: Vec<Vec<Vec3>>) -> Self {
        assert!(!vertices.is_empty(), "A mesh needs at least one time step.");
        Self { grids, vertices }
    }

    /// Vertex coordinates of the sub-grid whose first quad is `(x, y)`, clamped to the grid.
    fn sub_grid_vertex_range(grid: &Grid, x: usize, y: usize) -> (Range<usize>, Range<usize>) {
        let x_end = (x + Self::SUB_GRID_QUADS).min(grid.width as usize - 1);
        let y_end = (y + Self::SUB_GRID_QUADS).min(grid.height as usize - 1);
        (x..x_end + 1, y..y_end + 1)
    }

    /// Bounds of the sub-grid starting at quad `(x, y)` of grid `prim` at time step `itime`.
    pub fn sub_grid_bounds(&self, prim: usize, x: usize, y: usize, itime: usize) -> BoundingBox {
        let grid = &self.grids[prim];
        let step = &self.vertices[itime];
        let (xs, ys) = Self::sub_grid_vertex_range(grid, x, y);
        let mut bounds = BoundingBox::empty();
        for vy in ys {
            for vx in xs.clone() {
                bounds.extend_point(step[grid.vertex_index(vx, vy)]);
            }
        }
        bounds
    }

    pub fn sub_grid_linear_bounds(&self, prim: usize, x: usize, y: usize, itime: usize) -> LinearBounds {
        LinearBounds::new(
            self.sub_grid_bounds(prim, x, y, itime),
            self.sub_grid_bounds(prim, x, y, itime + 1),
        )
    }

    pub fn sub_grid_linear_bounds_range(
        &self,
        prim: usize,
        x: usize,
        y: usize,
        time_range: &TimeRange,
    ) -> LinearBounds {
        LinearBounds::from_time_steps(
            |itime| self.sub_grid_bounds(prim, x, y, itime),
            time_range,
            self.num_time_segments(),
        )
    }

    /// Whether every vertex of the sub-grid exists and is finite at the given time steps.
    pub fn sub_grid_valid(&self, prim: usize, x: usize, y: usize, itime_range: Range<usize>) -> bool {
        let grid = &self.grids[prim];
        if itime_range.end > self.vertices.len() {
            return false;
        }
        let (xs, ys) = Self::sub_grid_vertex_range(grid, x, y);
        self.vertices[itime_range].iter().all(|step| {
            ys.clone().all(|vy| {
                xs.clone().all(|vx| {
                    step.get(grid.vertex_index(vx, vy))
                        .map_or(false, |v| v.is_finite())
                })
            })
        })
    }
}

impl MotionGeometry for GridMesh {
    fn geometry_type(&self) -> GeometryType {
        GeometryType::Grid
    }

    fn num_primitives(&self) -> usize {
        self.grids.len()
    }

    fn num_time_steps(&self) -> usize {
        self.vertices.len()
    }

    fn bounds(&self, prim: usize, itime: usize) -> BoundingBox {
        let grid = &self.grids[prim];
        let step = &self.vertices[itime];
        let mut bounds = BoundingBox::empty();
        for y in 0..grid.height as usize {
            for x in 0..grid.width as usize {
                bounds.extend_point(step[grid.vertex_index(x, y)]);
            }
        }
        bounds
    }

    fn is_valid(&self, prim: usize, itime_range: Range<usize>) -> bool {
        let grid = &self.grids[prim];
        if grid.width < 2 || grid.height < 2 || (grid.stride as usize) < grid.width as usize {
            return false;
        }
        let (sx, sy) = grid.num_sub_grids();
        (0..sy).all(|j| {
            (0..sx).all(|i| {
                self.sub_grid_valid(
                    prim,
                    i * Self::SUB_GRID_QUADS,
                    j * Self::SUB_GRID_QUADS,
                    itime_range.clone(),
                )
            })
        })
    }
}

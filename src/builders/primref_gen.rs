use rayon::prelude::*;

use crate::common::build_error::BuildError;
use crate::common::progress_monitor::ProgressMonitor;
use crate::common::scene::Scene;
use crate::geometry::motion_geometry::{GeometryType, MotionGeometry};
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::time_range::TimeRange;

use super::bvh_builder_msmblur::Recalculate;
use super::primref::{BuildPrimRef, PrimInfo, PrimInfoMb, PrimRef, PrimRefMb};

/// Primitives handled per parallel task and per progress report.
pub const PRIMREF_BLOCK_SIZE: usize = 1024;

/// Location of a sub-grid inside its grid. Grid references index into a table of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SubGridBuildData {
    /// First quad of the sub-grid.
    pub x: u16,
    pub y: u16,
    /// Index of the grid inside its mesh.
    pub prim_id: u32,
}

/// Runs `generate` over every primitive of the selected geometries in parallel blocks, keeping
/// scene order and reporting progress per block.
fn generate_blocks<T, F>(
    scene: &Scene,
    geometry_type: GeometryType,
    monitor: &ProgressMonitor,
    generate: F,
) -> Result<Vec<T>, BuildError>
where
    T: Send,
    F: Fn(u32, &dyn MotionGeometry, usize, &mut Vec<T>) + Sync,
{
    let mut output = Vec::with_capacity(scene.num_primitives(geometry_type, true));
    for (geom_id, geometry) in scene.geometries_of(geometry_type, true) {
        let num_primitives = geometry.num_primitives();
        let blocks = num_primitives.div_ceil(PRIMREF_BLOCK_SIZE);
        let generated: Vec<Vec<T>> = (0..blocks)
            .into_par_iter()
            .map(|block| -> Result<Vec<T>, BuildError> {
                let begin = block * PRIMREF_BLOCK_SIZE;
                let end = (begin + PRIMREF_BLOCK_SIZE).min(num_primitives);
                monitor.progress(end - begin)?;
                let mut items = Vec::with_capacity(end - begin);
                for prim in begin..end {
                    generate(geom_id, geometry, prim, &mut items);
                }
                Ok(items)
            })
            .collect::<Result<_, BuildError>>()?;
        for items in generated {
            output.extend(items);
        }
    }
    Ok(output)
}

fn reduce_info<R: BuildPrimRef>(prims: &[R]) -> R::Info {
    prims
        .par_iter()
        .with_min_len(PRIMREF_BLOCK_SIZE)
        .fold(R::Info::default, |mut info, prim| {
            prim.extend_info(&mut info);
            info
        })
        .reduce(R::Info::default, |mut a, b| {
            R::merge_info(&mut a, &b);
            a
        })
}

/// Creates one reference per valid primitive, bounded over the time segment starting at
/// `itime`. Only motion blurred geometries of `geometry_type` are considered.
pub fn create_prim_ref_array_mblur(
    scene: &Scene,
    geometry_type: GeometryType,
    monitor: &ProgressMonitor,
    itime: usize,
) -> Result<(Vec<PrimRef>, PrimInfo), BuildError> {
    let prims = generate_blocks(scene, geometry_type, monitor, |geom_id, geometry, prim, out| {
        if itime + 1 >= geometry.num_time_steps() || !geometry.is_valid(prim, itime..itime + 2) {
            return;
        }
        let bounds = geometry.linear_bounds(prim, itime).bounds();
        out.push(PrimRef::new(bounds, geom_id, prim as u32));
    })?;
    let info = reduce_info(&prims);
    Ok((prims, info))
}

/// Creates one reference per valid primitive, bounded over `time_range`.
pub fn create_prim_ref_array_msmblur(
    scene: &Scene,
    geometry_type: GeometryType,
    monitor: &ProgressMonitor,
    time_range: &TimeRange,
) -> Result<(Vec<PrimRefMb>, PrimInfoMb), BuildError> {
    let prims = generate_blocks(scene, geometry_type, monitor, |geom_id, geometry, prim, out| {
        let Some(lbounds) = geometry.valid_linear_bounds(prim, time_range) else {
            return;
        };
        let segments = geometry.num_time_segments() as u32;
        let active = geometry.time_segment_range(time_range).len() as u32;
        out.push(PrimRefMb::new(
            lbounds,
            active,
            TimeRange::GLOBAL,
            segments,
            geom_id,
            prim as u32,
        ));
    })?;
    let info = reduce_info(&prims);
    Ok((prims, info))
}

/// Sub-grids of a grid that are valid over the given time steps, as
/// `(x, y)` quad coordinates.
fn valid_sub_grids(
    scene: &Scene,
    geom_id: u32,
    prim: usize,
    itime_range: std::ops::Range<usize>,
) -> impl Iterator<Item = (usize, usize)> + '_ {
    let mesh = scene.grid_mesh(geom_id);
    let grid = mesh.grids[prim];
    let (sx, sy) = grid.num_sub_grids();
    let step = crate::geometry::grid_mesh::GridMesh::SUB_GRID_QUADS;
    (0..sy)
        .flat_map(move |j| (0..sx).map(move |i| (i * step, j * step)))
        .filter(move |&(x, y)| mesh.sub_grid_valid(prim, x, y, itime_range.clone()))
}

/// Splits generated sub-grid references from their table entries, pointing each reference at
/// its entry.
fn number_sub_grids<R>(
    items: Vec<(SubGridBuildData, R)>,
    set_index: impl Fn(&mut R, u32),
) -> (Vec<R>, Vec<SubGridBuildData>) {
    let mut prims = Vec::with_capacity(items.len());
    let mut sgrids = Vec::with_capacity(items.len());
    for (data, mut prim) in items {
        set_index(&mut prim, sgrids.len() as u32);
        prims.push(prim);
        sgrids.push(data);
    }
    (prims, sgrids)
}

/// Grid variant of [`create_prim_ref_array_mblur`]. Produces one reference per sub-grid; the
/// reference's primitive id indexes the returned sub-grid table.
pub fn create_prim_ref_array_mblur_grid(
    scene: &Scene,
    monitor: &ProgressMonitor,
    itime: usize,
) -> Result<(Vec<PrimRef>, Vec<SubGridBuildData>, PrimInfo), BuildError> {
    let items = generate_blocks(scene, GeometryType::Grid, monitor, |geom_id, geometry, prim, out| {
        if itime + 1 >= geometry.num_time_steps() {
            return;
        }
        let mesh = scene.grid_mesh(geom_id);
        for (x, y) in valid_sub_grids(scene, geom_id, prim, itime..itime + 2) {
            let bounds = mesh.sub_grid_linear_bounds(prim, x, y, itime).bounds();
            let data = SubGridBuildData {
                x: x as u16,
                y: y as u16,
                prim_id: prim as u32,
            };
            out.push((data, PrimRef::new(bounds, geom_id, 0)));
        }
    })?;
    let (prims, sgrids) = number_sub_grids(items, |prim: &mut PrimRef, index| prim.prim_id = index);
    let info = reduce_info(&prims);
    Ok((prims, sgrids, info))
}

/// Grid variant of [`create_prim_ref_array_msmblur`].
pub fn create_prim_ref_array_msmblur_grid(
    scene: &Scene,
    monitor: &ProgressMonitor,
    time_range: &TimeRange,
) -> Result<(Vec<PrimRefMb>, Vec<SubGridBuildData>, PrimInfoMb), BuildError> {
    let items = generate_blocks(scene, GeometryType::Grid, monitor, |geom_id, geometry, prim, out| {
        let mesh = scene.grid_mesh(geom_id);
        let segments = geometry.time_segment_range(time_range);
        let active = segments.len() as u32;
        let total = geometry.num_time_segments() as u32;
        for (x, y) in valid_sub_grids(scene, geom_id, prim, segments.start..segments.end + 1) {
            let lbounds = mesh.sub_grid_linear_bounds_range(prim, x, y, time_range);
            let data = SubGridBuildData {
                x: x as u16,
                y: y as u16,
                prim_id: prim as u32,
            };
            let primref = PrimRefMb::new(lbounds, active, TimeRange::GLOBAL, total, geom_id, 0);
            out.push((data, primref));
        }
    })?;
    let (prims, sgrids) = number_sub_grids(items, |prim: &mut PrimRefMb, index| prim.prim_id = index);
    let info = reduce_info(&prims);
    Ok((prims, sgrids, info))
}

/// Re-bounds references of scene geometries for a narrower time range.
#[derive(Clone, Copy)]
pub struct RecalculatePrimRef<'s> {
    pub scene: &'s Scene,
}

impl<'s> RecalculatePrimRef<'s> {
    pub fn new(scene: &'s Scene) -> Self {
        Self { scene }
    }
}

impl Recalculate for RecalculatePrimRef<'_> {
    fn recalculate(&self, prim: &PrimRefMb, time_range: &TimeRange) -> PrimRefMb {
        let geometry = self.scene.geometry(prim.geom_id);
        let lbounds = geometry.linear_bounds_range(prim.prim_id as usize, time_range);
        let active = geometry.time_segment_range(time_range).len() as u32;
        PrimRefMb::new(
            lbounds,
            active,
            prim.time_range,
            geometry.num_time_segments() as u32,
            prim.geom_id,
            prim.prim_id,
        )
    }

    fn linear_bounds(&self, prim: &PrimRefMb, time_range: &TimeRange) -> LinearBounds {
        self.scene
            .geometry(prim.geom_id)
            .linear_bounds_range(prim.prim_id as usize, time_range)
    }
}

/// Re-bounds sub-grid references through the sub-grid table.
#[derive(Clone, Copy)]
pub struct RecalculateSubGridPrimRef<'s> {
    pub scene: &'s Scene,
    pub sgrids: &'s [SubGridBuildData],
}

impl Recalculate for RecalculateSubGridPrimRef<'_> {
    fn recalculate(&self, prim: &PrimRefMb, time_range: &TimeRange) -> PrimRefMb {
        let geometry = self.scene.geometry(prim.geom_id);
        let active = geometry.time_segment_range(time_range).len() as u32;
        PrimRefMb::new(
            self.linear_bounds(prim, time_range),
            active,
            prim.time_range,
            geometry.num_time_segments() as u32,
            prim.geom_id,
            prim.prim_id,
        )
    }

    fn linear_bounds(&self, prim: &PrimRefMb, time_range: &TimeRange) -> LinearBounds {
        let data = &self.sgrids[prim.prim_id as usize];
        self.scene.grid_mesh(prim.geom_id).sub_grid_linear_bounds_range(
            data.prim_id as usize,
            data.x as usize,
            data.y as usize,
            time_range,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::grid_mesh::{Grid, GridMesh};
    use crate::geometry::triangle_mesh::TriangleMesh;
    use glam::Vec3;

    fn scene_with_invalid_triangle() -> Scene {
        let mut scene = Scene::new();
        let vertices0 = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(f32::NAN, 0.0, 0.0)];
        let vertices1 = vertices0.iter().map(|v| *v + Vec3::X).collect();
        let vertices2 = vertices0.iter().map(|v| *v + Vec3::X * 2.0).collect();
        scene.add_geometry(TriangleMesh::new(
            vec![[0, 1, 2], [0, 1, 3], [2, 1, 0]],
            vec![vertices0, vertices1, vertices2],
        ));
        scene
    }

    #[test]
    fn test_invalid_primitives_are_skipped() {
        let scene = scene_with_invalid_triangle();
        let (prims, info) =
            create_prim_ref_array_mblur(&scene, GeometryType::Triangles, scene.progress_monitor(), 0).unwrap();
        assert_eq!(prims.len(), 2);
        assert_eq!(info.size(), 2);
        assert_eq!(prims[1].prim_id, 2);
        assert_eq!(prims[0].bounds.max, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_msmblur_refs_span_all_segments() {
        let scene = scene_with_invalid_triangle();
        let (prims, info) = create_prim_ref_array_msmblur(
            &scene,
            GeometryType::Triangles,
            scene.progress_monitor(),
            &TimeRange::GLOBAL,
        )
        .unwrap();
        assert_eq!(prims.len(), 2);
        assert_eq!(info.num_time_segments, 4);
        assert_eq!(info.max_num_time_segments, 2);
        assert_eq!(prims[0].lbounds.bounds1.min, Vec3::new(2.0, 0.0, 0.0));

        let recalc = RecalculatePrimRef::new(&scene);
        let half = recalc.recalculate(&prims[0], &TimeRange::new(0.0, 0.5));
        assert_eq!(half.active_time_segments, 1);
        assert_eq!(half.lbounds.bounds1.min, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_grid_refs_index_sub_grid_table() {
        let mut scene = Scene::new();
        let vertices: Vec<Vec3> = (0..5)
            .flat_map(|y| (0..5).map(move |x| Vec3::new(x as f32, y as f32, 0.0)))
            .collect();
        let moved = vertices.iter().map(|v| *v + Vec3::Z).collect();
        scene.add_geometry(GridMesh::new(
            vec![Grid {
                start_vertex_index: 0,
                stride: 5,
                width: 5,
                height: 5,
            }],
            vec![vertices, moved],
        ));
        let (prims, sgrids, info) =
            create_prim_ref_array_mblur_grid(&scene, scene.progress_monitor(), 0).unwrap();
        assert_eq!(prims.len(), 4);
        assert_eq!(info.size(), 4);
        for (index, prim) in prims.iter().enumerate() {
            assert_eq!(prim.prim_id as usize, index);
        }
        assert_eq!(sgrids[3], SubGridBuildData { x: 2, y: 2, prim_id: 0 });
        assert_eq!(prims[3].bounds.max, Vec3::new(4.0, 4.0, 1.0));
    }
}

//! Motion blur builder for leaf blocks of a [`Primitive`] representation.
//!
//! Scenes whose motion blurred geometry has two time steps are built with linear bounds over
//! the whole time domain. More time steps switch to the multi segment engine, which may split
//! the time domain and produce 4D nodes.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, warn};
use rayon::ThreadPool;

use crate::builders::bvh_builder_msmblur::{self, MsmBlurSettings};
use crate::builders::bvh_builder_sah::{self, BuildSettings, DEFAULT_SINGLE_THREAD_THRESHOLD};
use crate::builders::primref_gen::{create_prim_ref_array_mblur, create_prim_ref_array_msmblur, RecalculatePrimRef};
use crate::common::build_error::BuildError;
use crate::common::build_profiler::{BuildProfiler, BuildStage};
use crate::common::scene::Scene;
use crate::geometry::motion_geometry::GeometryType;
use crate::geometry::primitive::Primitive;
use crate::utilities::memory::FastAllocator;
use crate::utilities::time_range::TimeRange;

use super::builder::Builder;
use super::create_leaf::{CreateMbLeaf, CreateMsmBlurLeaf};
use super::hierarchy::{BuiltHierarchy, Bvh, MAX_BUILD_DEPTH_LEAF, MAX_DEPTH};
use super::node::{create_aligned_node_mb, create_aligned_node_mb4d, Node, NodeRef};
use super::size_estimate::SizeEstimate;

/// Cost model and leaf limits of a motion blur builder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuilderConfig {
    pub branching_factor: usize,
    /// Items per leaf block assumed by the cost model.
    pub sah_block_size: usize,
    pub int_cost: f32,
    pub min_leaf_size: usize,
    pub max_leaf_size: usize,
}

impl BuilderConfig {
    pub fn new(
        branching_factor: usize,
        sah_block_size: usize,
        int_cost: f32,
        min_leaf_size: usize,
        max_leaf_size: usize,
    ) -> Self {
        assert!(sah_block_size > 0, "SAH block size must be positive.");
        Self {
            branching_factor,
            sah_block_size,
            int_cost,
            min_leaf_size,
            max_leaf_size,
        }
    }

    /// Engine settings. `max_leaf_items` caps the leaf size at what one leaf reference can
    /// address.
    pub(crate) fn settings(&self, max_depth: usize, max_leaf_items: usize, single_thread_threshold: usize) -> BuildSettings {
        let max_leaf_size = self.max_leaf_size.min(max_leaf_items);
        BuildSettings {
            branching_factor: self.branching_factor,
            max_depth,
            log_block_size: self.sah_block_size.ilog2() as usize,
            min_leaf_size: self.min_leaf_size.min(max_leaf_size),
            max_leaf_size,
            trav_cost: 1.0,
            int_cost: self.int_cost,
            single_thread_threshold,
        }
    }
}

/// Runs `build` on the dedicated pool if there is one.
fn run_on<T: Send>(pool: Option<&ThreadPool>, build: impl FnOnce() -> T + Send) -> T {
    match pool {
        Some(pool) => pool.install(build),
        None => build(),
    }
}

/// One build of `bvh` over the motion blurred geometry of `geometry_type`.
///
/// Two time steps take `single_segment`, more take `multi_segment` with the step count. The
/// hierarchy is cleared when there is nothing to build and only replaced when the chosen path
/// succeeds.
pub(crate) fn run_build<L: Send>(
    bvh: &mut Bvh<L>,
    scene: &Scene,
    geometry_type: GeometryType,
    name: &str,
    pool: Option<&ThreadPool>,
    single_segment: impl FnOnce(&mut BuildProfiler) -> Result<BuiltHierarchy<L>, BuildError> + Send,
    multi_segment: impl FnOnce(usize, &mut BuildProfiler) -> Result<BuiltHierarchy<L>, BuildError> + Send,
) -> Result<(), BuildError> {
    let num_primitives = scene.num_primitives(geometry_type, true);
    if num_primitives == 0 {
        bvh.clear();
        return Ok(());
    }

    let start = bvh.pre_build(name);
    let num_time_steps = scene.num_time_steps(geometry_type, true);
    assert!(
        num_time_steps > 1,
        "Motion blurred {geometry_type:?} geometry needs at least two time steps, got {num_time_steps}."
    );
    scene.progress_monitor().start(2 * num_primitives);

    let profiler = &mut bvh.profiler;
    let built = run_on(pool, || {
        if num_time_steps == 2 {
            single_segment(profiler)
        } else {
            multi_segment(num_time_steps, profiler)
        }
    });
    match built {
        Ok(built) => {
            bvh.finalize(built, scene.is_static_accel());
            bvh.post_build(start);
            bvh.cleanup();
            Ok(())
        }
        Err(error) => {
            warn!("{name}: build aborted, keeping the previous hierarchy: {error}");
            bvh.cleanup();
            Err(error)
        }
    }
}

/// Builds a [`Bvh`] over the motion blurred geometries of `P::GEOMETRY_TYPE`.
pub struct BvhBuilderMbSah<P: Primitive> {
    scene: Arc<Scene>,
    bvh: Bvh<P>,
    name: String,
    config: BuilderConfig,
    pool: Option<Arc<ThreadPool>>,
    _marker: PhantomData<fn() -> P>,
}

impl<P: Primitive> BvhBuilderMbSah<P> {
    pub fn new(scene: Arc<Scene>, config: BuilderConfig) -> Self {
        Self {
            name: format!("BVH{}<{}>MBlurBuilderSAH", config.branching_factor, P::NAME),
            bvh: Bvh::new(config.branching_factor),
            scene,
            config,
            pool: None,
            _marker: PhantomData,
        }
    }

    /// Runs builds on `pool` instead of rayon's global pool.
    pub fn with_thread_pool(mut self, pool: Option<Arc<ThreadPool>>) -> Self {
        self.pool = pool;
        self
    }

    #[inline]
    pub fn bvh(&self) -> &Bvh<P> {
        &self.bvh
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    fn build_single_segment(
        scene: &Scene,
        config: &BuilderConfig,
        name: &str,
        profiler: &mut BuildProfiler,
    ) -> Result<BuiltHierarchy<P>, BuildError> {
        let monitor = scene.progress_monitor();
        let (mut prims, info) = profiler.time(BuildStage::PrimRefs, || {
            create_prim_ref_array_mblur(scene, P::GEOMETRY_TYPE, monitor, 0)
        })?;

        let estimate = SizeEstimate::mblur::<P>(&info, config.branching_factor);
        debug!(
            "{name}: {} primitives over one time segment, estimated {} bytes",
            info.size(),
            estimate.total()
        );
        let allocator = profiler.time(BuildStage::Allocate, || {
            let mut allocator: FastAllocator<Node, P> = FastAllocator::new();
            allocator.init_estimate(estimate.total());
            allocator
        });
        let settings = config.settings(
            MAX_BUILD_DEPTH_LEAF,
            P::MAX_SIZE * NodeRef::MAX_LEAF_BLOCKS,
            allocator.fix_single_thread_threshold(
                config.branching_factor,
                DEFAULT_SINGLE_THREAD_THRESHOLD,
                info.size(),
                estimate.total(),
            ),
        );
        let create_leaf = CreateMbLeaf::<P>::new(scene, 0);

        let root = profiler.time(BuildStage::Build, || {
            bvh_builder_sah::build(
                &mut prims,
                info,
                &settings,
                monitor,
                || allocator.cached(),
                |children, alloc| create_aligned_node_mb(children, alloc),
                |prims, alloc| create_leaf.create(prims, alloc),
            )
        })?;

        let (nodes, leaves, allocator) = allocator.into_arenas();
        Ok(BuiltHierarchy {
            nodes,
            leaves,
            allocator,
            root: root.node,
            bounds: root.lbounds,
            num_primitives: info.size(),
            time_range: TimeRange::GLOBAL,
            num_time_segments: 1,
        })
    }

    fn build_multi_segment(
        scene: &Scene,
        config: &BuilderConfig,
        name: &str,
        num_time_steps: usize,
        profiler: &mut BuildProfiler,
    ) -> Result<BuiltHierarchy<P>, BuildError> {
        let monitor = scene.progress_monitor();
        let (mut prims, info) = profiler.time(BuildStage::PrimRefs, || {
            create_prim_ref_array_msmblur(scene, P::GEOMETRY_TYPE, monitor, &TimeRange::GLOBAL)
        })?;

        let estimate = SizeEstimate::msmblur::<P>(&info, config.branching_factor);
        debug!(
            "{name}: {} primitives over {} time segments, estimated {} bytes",
            info.size(),
            num_time_steps - 1,
            estimate.total()
        );
        let allocator = profiler.time(BuildStage::Allocate, || {
            let mut allocator: FastAllocator<Node, P> = FastAllocator::new();
            allocator.init_estimate(estimate.total());
            allocator
        });
        let settings = MsmBlurSettings {
            build: config.settings(
                MAX_DEPTH,
                P::MAX_SIZE * NodeRef::MAX_LEAF_BLOCKS,
                allocator.fix_single_thread_threshold(
                    config.branching_factor,
                    DEFAULT_SINGLE_THREAD_THRESHOLD,
                    info.size(),
                    estimate.total(),
                ),
            ),
            single_leaf_time_segment: P::SINGLE_TIME_SEGMENT,
        };
        let recalculate = RecalculatePrimRef::new(scene);
        let create_leaf = CreateMsmBlurLeaf::<P>::new(scene);

        let root = profiler.time(BuildStage::Build, || {
            bvh_builder_msmblur::build(
                &mut prims,
                info,
                &settings,
                monitor,
                &recalculate,
                || allocator.cached(),
                |children, timesplit, alloc| create_aligned_node_mb4d(children, timesplit, alloc),
                |prims, time_range, alloc| create_leaf.create(prims, time_range, alloc),
            )
        })?;

        let (nodes, leaves, allocator) = allocator.into_arenas();
        Ok(BuiltHierarchy {
            nodes,
            leaves,
            allocator,
            root: root.node,
            bounds: root.lbounds.global(&root.time_range),
            num_primitives: info.size(),
            time_range: root.time_range,
            num_time_segments: num_time_steps - 1,
        })
    }
}

impl<P: Primitive> Builder for BvhBuilderMbSah<P> {
    fn build(&mut self) -> Result<(), BuildError> {
        let (scene, config, name) = (&*self.scene, &self.config, self.name.as_str());
        run_build(
            &mut self.bvh,
            scene,
            P::GEOMETRY_TYPE,
            name,
            self.pool.as_deref(),
            |profiler| Self::build_single_segment(scene, config, name, profiler),
            |num_time_steps, profiler| Self::build_multi_segment(scene, config, name, num_time_steps, profiler),
        )
    }

    fn info(&self) -> String {
        format!(
            "{}: {} primitives, {} time segments",
            self.name,
            self.bvh.num_primitives(),
            self.bvh.num_time_segments()
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::triangle4i::Triangle4i;
    use crate::geometry::triangle4v_mb::Triangle4vMb;
    use crate::geometry::triangle_mesh::TriangleMesh;
    use glam::Vec3;

    /// A row of `count` triangles translating along z over `steps` time steps.
    fn sliding_triangles(count: u32, steps: usize) -> Arc<Scene> {
        let mut scene = Scene::new();
        let base: Vec<Vec3> = (0..count)
            .flat_map(|i| {
                let x = i as f32 * 2.0;
                [Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 0.0, 0.0), Vec3::new(x, 1.0, 0.0)]
            })
            .collect();
        let vertices = (0..steps)
            .map(|step| base.iter().map(|v| *v + Vec3::Z * (step as f32 * 0.5)).collect())
            .collect();
        let triangles = (0..count).map(|i| [3 * i, 3 * i + 1, 3 * i + 2]).collect();
        scene.add_geometry(TriangleMesh::new(triangles, vertices));
        Arc::new(scene)
    }

    fn config(branching_factor: usize) -> BuilderConfig {
        BuilderConfig::new(branching_factor, 4, 1.0, 4, usize::MAX)
    }

    #[test]
    fn test_settings_clamp_leaf_size() {
        let settings = config(4).settings(MAX_BUILD_DEPTH_LEAF, 4 * NodeRef::MAX_LEAF_BLOCKS, 1024);
        assert_eq!(settings.log_block_size, 2);
        assert_eq!(settings.max_leaf_size, 28);
        assert_eq!(settings.min_leaf_size, 4);
        let settings = BuilderConfig::new(8, 8, 1.0, 1, 1).settings(MAX_DEPTH, 8, 1024);
        assert_eq!(settings.log_block_size, 3);
        assert_eq!((settings.min_leaf_size, settings.max_leaf_size), (1, 1));
    }

    #[test]
    fn test_two_steps_build_single_segment() {
        let mut builder = BvhBuilderMbSah::<Triangle4i>::new(sliding_triangles(100, 2), config(4));
        builder.build().unwrap();
        let bvh = builder.bvh();
        assert_eq!(bvh.num_primitives(), 100);
        assert_eq!(bvh.num_time_segments(), 1);
        assert_eq!(bvh.time_range(), TimeRange::GLOBAL);
        let statistics = bvh.statistics();
        assert_eq!(statistics.nodes_4d, 0);
        assert!(statistics.leaf_blocks >= 25);
        bvh.validate(&builder.scene);
        assert!(bvh.last_build().is_some());
    }

    #[test]
    fn test_many_steps_build_multi_segment() {
        let mut builder = BvhBuilderMbSah::<Triangle4vMb>::new(sliding_triangles(50, 5), config(4));
        builder.build().unwrap();
        let bvh = builder.bvh();
        assert_eq!(bvh.num_time_segments(), 4);
        assert_eq!(bvh.time_range(), TimeRange::GLOBAL);
        bvh.validate(&builder.scene);
        for leaf in bvh.leaves() {
            let range = leaf.slot.time_range;
            assert!(range.size() <= 0.25 + 1e-6, "Leaf spans {range}.");
        }
        assert!(builder.info().contains("4 time segments"));
    }

    #[test]
    fn test_empty_scene_clears() {
        let mut builder = BvhBuilderMbSah::<Triangle4i>::new(Arc::new(Scene::new()), config(8));
        builder.build().unwrap();
        assert!(builder.bvh().is_empty());
        assert!(builder.bvh().last_build().is_none());
    }
}

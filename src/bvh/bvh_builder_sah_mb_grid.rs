//! Motion blur builder over grid meshes. Every grid is cut into sub-grids of at most 2x2 quads;
//! leaves store up to one sub-grid per branch of a node in a quantized [`SubGridQbvh`] block.

use std::any::Any;
use std::sync::Arc;

use log::debug;
use rayon::ThreadPool;

use crate::builders::bvh_builder_msmblur::{self, MsmBlurSettings};
use crate::builders::bvh_builder_sah::{self, DEFAULT_SINGLE_THREAD_THRESHOLD};
use crate::builders::primref_gen::{
    create_prim_ref_array_mblur_grid, create_prim_ref_array_msmblur_grid, RecalculateSubGridPrimRef,
};
use crate::common::build_error::BuildError;
use crate::common::build_profiler::{BuildProfiler, BuildStage};
use crate::common::scene::Scene;
use crate::geometry::motion_geometry::GeometryType;
use crate::geometry::sub_grid::SubGridQbvh;
use crate::utilities::memory::FastAllocator;
use crate::utilities::time_range::TimeRange;

use super::builder::Builder;
use super::bvh_builder_sah_mb::{run_build, BuilderConfig};
use super::create_leaf::CreateSubGridLeaf;
use super::hierarchy::{BuiltHierarchy, Bvh, MAX_BUILD_DEPTH_LEAF, MAX_DEPTH};
use super::node::{create_aligned_node_mb, create_aligned_node_mb4d, Node, NodeRef};
use super::size_estimate::SizeEstimate;

pub struct BvhBuilderMbSahGrid {
    scene: Arc<Scene>,
    bvh: Bvh<SubGridQbvh>,
    name: String,
    config: BuilderConfig,
    pool: Option<Arc<ThreadPool>>,
}

impl BvhBuilderMbSahGrid {
    pub fn new(scene: Arc<Scene>, config: BuilderConfig) -> Self {
        Self {
            name: format!(
                "BVH{n}<SubGridQBVH{n}>MBlurBuilderSAH",
                n = config.branching_factor
            ),
            bvh: Bvh::new(config.branching_factor),
            scene,
            config,
            pool: None,
        }
    }

    pub fn with_thread_pool(mut self, pool: Option<Arc<ThreadPool>>) -> Self {
        self.pool = pool;
        self
    }

    #[inline]
    pub fn bvh(&self) -> &Bvh<SubGridQbvh> {
        &self.bvh
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn build_single_segment(
        scene: &Scene,
        config: &BuilderConfig,
        name: &str,
        profiler: &mut BuildProfiler,
    ) -> Result<BuiltHierarchy<SubGridQbvh>, BuildError> {
        let monitor = scene.progress_monitor();
        let n = config.branching_factor;
        let (mut prims, sgrids, info) =
            profiler.time(BuildStage::PrimRefs, || create_prim_ref_array_mblur_grid(scene, monitor, 0))?;

        let estimate = SizeEstimate::grid(info.size(), info.size(), n);
        debug!(
            "{name}: {} sub-grids over one time segment, estimated {} bytes",
            info.size(),
            estimate.total()
        );
        let allocator = profiler.time(BuildStage::Allocate, || {
            let mut allocator: FastAllocator<Node, SubGridQbvh> = FastAllocator::new();
            allocator.init_estimate(estimate.total());
            allocator
        });
        let settings = config.settings(
            MAX_BUILD_DEPTH_LEAF,
            n * NodeRef::MAX_LEAF_BLOCKS,
            allocator.fix_single_thread_threshold(n, DEFAULT_SINGLE_THREAD_THRESHOLD, info.size(), estimate.total()),
        );
        let create_leaf = CreateSubGridLeaf::new(scene, &sgrids, n);

        let root = profiler.time(BuildStage::Build, || {
            bvh_builder_sah::build(
                &mut prims,
                info,
                &settings,
                monitor,
                || allocator.cached(),
                |children, alloc| create_aligned_node_mb(children, alloc),
                |prims, alloc| create_leaf.create_mb(prims, 0, alloc),
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
    ) -> Result<BuiltHierarchy<SubGridQbvh>, BuildError> {
        let monitor = scene.progress_monitor();
        let n = config.branching_factor;
        let (mut prims, sgrids, info) = profiler.time(BuildStage::PrimRefs, || {
            create_prim_ref_array_msmblur_grid(scene, monitor, &TimeRange::GLOBAL)
        })?;

        let estimate = SizeEstimate::grid(info.num_time_segments, info.size(), n);
        debug!(
            "{name}: {} sub-grids over {} time segments, estimated {} bytes",
            info.size(),
            num_time_steps - 1,
            estimate.total()
        );
        let allocator = profiler.time(BuildStage::Allocate, || {
            let mut allocator: FastAllocator<Node, SubGridQbvh> = FastAllocator::new();
            allocator.init_estimate(estimate.total());
            allocator
        });
        let settings = MsmBlurSettings {
            build: config.settings(
                MAX_DEPTH,
                n * NodeRef::MAX_LEAF_BLOCKS,
                allocator.fix_single_thread_threshold(n, DEFAULT_SINGLE_THREAD_THRESHOLD, info.size(), estimate.total()),
            ),
            single_leaf_time_segment: false,
        };
        let recalculate = RecalculateSubGridPrimRef {
            scene,
            sgrids: &sgrids,
        };
        let create_leaf = CreateSubGridLeaf::new(scene, &sgrids, n);

        let root = profiler.time(BuildStage::Build, || {
            bvh_builder_msmblur::build(
                &mut prims,
                info,
                &settings,
                monitor,
                &recalculate,
                || allocator.cached(),
                |children, timesplit, alloc| create_aligned_node_mb4d(children, timesplit, alloc),
                |prims, time_range, alloc| create_leaf.create_mb_range(prims, time_range, alloc),
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

impl Builder for BvhBuilderMbSahGrid {
    fn build(&mut self) -> Result<(), BuildError> {
        let (scene, config, name) = (&*self.scene, &self.config, self.name.as_str());
        run_build(
            &mut self.bvh,
            scene,
            GeometryType::Grid,
            name,
            self.pool.as_deref(),
            |profiler| Self::build_single_segment(scene, config, name, profiler),
            |num_time_steps, profiler| Self::build_multi_segment(scene, config, name, num_time_steps, profiler),
        )
    }

    fn info(&self) -> String {
        format!(
            "{}: {} sub-grids, {} time segments",
            self.name,
            self.bvh.num_primitives(),
            self.bvh.num_time_segments()
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

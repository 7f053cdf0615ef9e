use std::time::{Duration, Instant};

use log::{debug, info};

use crate::builders::bvh_builder_sah::MIN_LARGE_LEAF_LEVELS;
use crate::common::build_profiler::{BuildProfiler, BuildStage};
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::memory::{AllocatorStatistics, Arena};
use crate::utilities::time_range::TimeRange;

use super::node::{Node, NodeRef};

/// Depth at which the regular recursion must produce leaves.
pub const MAX_BUILD_DEPTH: usize = 32;
/// Depth limit of single segment builds, leaving room to split large leaves.
pub const MAX_BUILD_DEPTH_LEAF: usize = MAX_BUILD_DEPTH + MIN_LARGE_LEAF_LEVELS;
/// Depth limit of multi segment builds, where temporal splits add levels.
pub const MAX_DEPTH: usize = 2 * MAX_BUILD_DEPTH_LEAF;

/// Timing and memory figures of the last successful build.
#[derive(Clone, Debug, PartialEq)]
pub struct BuildStatistics {
    pub label: String,
    pub duration: Duration,
    pub num_primitives: usize,
    pub allocator: AllocatorStatistics,
}

/// Everything a finished build hands over to its hierarchy.
pub struct BuiltHierarchy<L> {
    pub nodes: Arena<Node>,
    pub leaves: Arena<L>,
    pub allocator: AllocatorStatistics,
    pub root: NodeRef,
    /// Root bounds parameterized by global scene time.
    pub bounds: LinearBounds,
    pub num_primitives: usize,
    pub time_range: TimeRange,
    pub num_time_segments: usize,
}

/// A motion blurred bounding volume hierarchy with leaf blocks of type `L`.
///
/// Created empty, populated by a builder, and cleared when the scene has nothing to build over.
/// Node and leaf storage is owned through arenas; [`NodeRef`]s index into them.
pub struct Bvh<L> {
    branching_factor: usize,
    nodes: Arena<Node>,
    leaves: Arena<L>,
    root: NodeRef,
    bounds: LinearBounds,
    num_primitives: usize,
    time_range: TimeRange,
    num_time_segments: usize,
    allocator: AllocatorStatistics,
    pending_label: String,
    last_build: Option<BuildStatistics>,
    /// Stage timings of the last completed build.
    pub profiler: BuildProfiler,
}

impl<L> Bvh<L> {
    pub fn new(branching_factor: usize) -> Self {
        Self {
            branching_factor,
            nodes: Arena::default(),
            leaves: Arena::default(),
            root: NodeRef::EMPTY,
            bounds: LinearBounds::empty(),
            num_primitives: 0,
            time_range: TimeRange::GLOBAL,
            num_time_segments: 1,
            allocator: AllocatorStatistics::default(),
            pending_label: String::new(),
            last_build: None,
            profiler: BuildProfiler::new(),
        }
    }

    #[inline]
    pub fn branching_factor(&self) -> usize {
        self.branching_factor
    }

    #[inline]
    pub fn root(&self) -> NodeRef {
        self.root
    }

    /// Bounds of the whole hierarchy, parameterized by global scene time.
    #[inline]
    pub fn bounds(&self) -> &LinearBounds {
        &self.bounds
    }

    #[inline]
    pub fn num_primitives(&self) -> usize {
        self.num_primitives
    }

    #[inline]
    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    #[inline]
    pub fn num_time_segments(&self) -> usize {
        self.num_time_segments
    }

    #[inline]
    pub fn nodes(&self) -> &Arena<Node> {
        &self.nodes
    }

    #[inline]
    pub fn leaf_arena(&self) -> &Arena<L> {
        &self.leaves
    }

    #[inline]
    pub fn node(&self, node: NodeRef) -> &Node {
        debug_assert!(!node.is_leaf(), "Leaf references do not address the node arena.");
        self.nodes.get(node.index())
    }

    /// Leaf blocks referenced by a leaf. Empty for the empty leaf.
    #[inline]
    pub fn leaf_blocks(&self, leaf: NodeRef) -> &[L] {
        match leaf.leaf_blocks() {
            0 => &[],
            count => self.leaves.slice(leaf.index(), count),
        }
    }

    pub fn last_build(&self) -> Option<&BuildStatistics> {
        self.last_build.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }
}

// ── Build lifecycle ────────────────────────────────────────────────────────

impl<L> Bvh<L> {
    /// Marks the start of a build named `label`.
    pub fn pre_build(&mut self, label: &str) -> Instant {
        self.profiler.discard();
        self.pending_label = label.to_owned();
        debug!("{label}: build started");
        Instant::now()
    }

    /// Records the statistics of a build started at `start`.
    pub fn post_build(&mut self, start: Instant) {
        let statistics = BuildStatistics {
            label: std::mem::take(&mut self.pending_label),
            duration: start.elapsed(),
            num_primitives: self.num_primitives,
            allocator: self.allocator,
        };
        info!(
            "{}: {} primitives in {:.3} ms, {} node and {} leaf blocks, {} of {} estimated bytes",
            statistics.label,
            statistics.num_primitives,
            statistics.duration.as_secs_f64() * 1000.0,
            self.nodes.len(),
            self.leaves.len(),
            self.nodes.used_bytes() + self.leaves.used_bytes(),
            statistics.allocator.estimated_bytes,
        );
        self.profiler.commit(&statistics.label);
        self.last_build = Some(statistics);
    }

    /// Empties the hierarchy and releases its storage.
    pub fn clear(&mut self) {
        self.nodes = Arena::default();
        self.leaves = Arena::default();
        self.allocator = AllocatorStatistics::default();
        self.set(NodeRef::EMPTY, LinearBounds::empty(), 0);
        self.time_range = TimeRange::GLOBAL;
        self.num_time_segments = 1;
    }

    pub fn set(&mut self, root: NodeRef, bounds: LinearBounds, num_primitives: usize) {
        self.root = root;
        self.bounds = bounds;
        self.num_primitives = num_primitives;
    }

    #[inline]
    pub fn set_time_range(&mut self, time_range: TimeRange) {
        self.time_range = time_range;
    }

    #[inline]
    pub fn set_num_time_segments(&mut self, num_time_segments: usize) {
        self.num_time_segments = num_time_segments;
    }

    /// Replaces the contents with a finished build.
    pub fn install(&mut self, built: BuiltHierarchy<L>) {
        self.nodes = built.nodes;
        self.leaves = built.leaves;
        self.allocator = built.allocator;
        self.set(built.root, built.bounds, built.num_primitives);
        self.set_time_range(built.time_range);
        self.set_num_time_segments(built.num_time_segments);
    }

    /// Drops per-build bookkeeping, whether the build finished or was aborted.
    pub fn cleanup(&mut self) {
        self.pending_label.clear();
        self.profiler.discard();
    }

    /// Installs a finished build, releasing spare arena capacity when `shrink` is set.
    pub fn finalize(&mut self, built: BuiltHierarchy<L>, shrink: bool) {
        let mut profiler = std::mem::take(&mut self.profiler);
        profiler.time(BuildStage::Finalize, || {
            self.install(built);
            if shrink {
                self.shrink();
            }
        });
        self.profiler = profiler;
    }

    /// Releases spare arena capacity.
    pub fn shrink(&mut self) {
        self.nodes.shrink_to_fit();
        self.leaves.shrink_to_fit();
    }
}

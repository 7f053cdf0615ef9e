//! Binned SAH builder over moving references that may be split in time.
//!
//! Besides object splits, a record can be cut at a time step of its most finely sampled
//! geometry. Both halves then cover half the time range and their references are re-bounded
//! over the shorter range, which tightens bounds of objects moving along curved paths. Nodes
//! whose children cover different time ranges are reported to `create_node` as time splits.

use rayon::prelude::*;

use crate::common::build_error::BuildError;
use crate::common::progress_monitor::ProgressMonitor;
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::time_range::TimeRange;

use super::bvh_builder_sah::{BuildSettings, MIN_LARGE_LEAF_LEVELS};
use super::heuristic_binning::{self, deterministic_order, partition_by, split_fallback, ObjectSplit};
use super::primref::{blocks, PrimInfoMb, PrimRefMb};

/// Re-bounds a reference over a sub range of its current time range.
pub trait Recalculate: Sync {
    /// Reference bounded over `time_range`, with its active segment count updated.
    fn recalculate(&self, prim: &PrimRefMb, time_range: &TimeRange) -> PrimRefMb;
    /// Bounds of the reference over `time_range`.
    fn linear_bounds(&self, prim: &PrimRefMb, time_range: &TimeRange) -> LinearBounds;
}

/// Result of building a subtree: the node handle, its bounds over `time_range` and that range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRecordMb4d<N> {
    pub node: N,
    pub lbounds: LinearBounds,
    pub time_range: TimeRange,
}

impl<N> NodeRecordMb4d<N> {
    #[inline]
    pub fn new(node: N, lbounds: LinearBounds, time_range: TimeRange) -> Self {
        Self {
            node,
            lbounds,
            time_range,
        }
    }
}

/// Tuning of a multi segment build.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MsmBlurSettings {
    pub build: BuildSettings,
    /// Forces every leaf reference to span at most one time segment of its geometry.
    pub single_leaf_time_segment: bool,
}

impl Default for MsmBlurSettings {
    fn default() -> Self {
        Self {
            build: BuildSettings {
                max_leaf_size: 8,
                ..Default::default()
            },
            single_leaf_time_segment: false,
        }
    }
}

/// References of a build record. The root borrows the caller's array; temporal splits hand the
/// left half a freshly allocated array while the right half keeps the parent's storage.
pub enum PrimSetMb<'a> {
    Borrowed(&'a mut [PrimRefMb]),
    Owned(Vec<PrimRefMb>),
}

impl<'a> PrimSetMb<'a> {
    #[inline]
    pub fn as_slice(&self) -> &[PrimRefMb] {
        match self {
            PrimSetMb::Borrowed(prims) => prims,
            PrimSetMb::Owned(prims) => prims,
        }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [PrimRefMb] {
        match self {
            PrimSetMb::Borrowed(prims) => prims,
            PrimSetMb::Owned(prims) => prims,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn split_at(self, mid: usize) -> (PrimSetMb<'a>, PrimSetMb<'a>) {
        match self {
            PrimSetMb::Borrowed(prims) => {
                let (left, right) = prims.split_at_mut(mid);
                (PrimSetMb::Borrowed(left), PrimSetMb::Borrowed(right))
            }
            PrimSetMb::Owned(mut prims) => {
                let right = prims.split_off(mid);
                (PrimSetMb::Owned(prims), PrimSetMb::Owned(right))
            }
        }
    }

    /// Replaces every reference by `f(reference)` in place, dropping those mapped to `None`.
    fn filter_map_in_place(self, f: impl Fn(&PrimRefMb) -> Option<PrimRefMb>) -> PrimSetMb<'a> {
        fn compact(prims: &mut [PrimRefMb], f: impl Fn(&PrimRefMb) -> Option<PrimRefMb>) -> usize {
            let mut kept = 0;
            for i in 0..prims.len() {
                if let Some(prim) = f(&prims[i]) {
                    prims[kept] = prim;
                    kept += 1;
                }
            }
            kept
        }
        match self {
            PrimSetMb::Borrowed(prims) => {
                let kept = compact(prims, f);
                PrimSetMb::Borrowed(&mut prims[..kept])
            }
            PrimSetMb::Owned(mut prims) => {
                let kept = compact(&mut prims, f);
                prims.truncate(kept);
                PrimSetMb::Owned(prims)
            }
        }
    }
}

/// References of one subtree under construction, bounded over `time_range`.
pub struct BuildRecordMb<'a> {
    pub depth: usize,
    pub prims: PrimSetMb<'a>,
    pub info: PrimInfoMb,
    pub time_range: TimeRange,
}

impl<'a> BuildRecordMb<'a> {
    #[inline]
    pub fn new(depth: usize, prims: PrimSetMb<'a>, info: PrimInfoMb, time_range: TimeRange) -> Self {
        Self {
            depth,
            prims,
            info,
            time_range,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.prims.len()
    }

    fn same_geometry(&self) -> bool {
        let prims = self.prims.as_slice();
        prims.first().map_or(true, |first| prims.iter().all(|p| p.geom_id == first.geom_id))
    }
}

#[derive(Clone, Copy, Debug)]
enum SplitKind {
    Object(ObjectSplit),
    Temporal(f32),
    Geometry(u32),
    Median,
}

#[derive(Clone, Copy, Debug)]
struct SplitMb {
    sah: f32,
    kind: SplitKind,
}

/// Recursive top-down builder with temporal splits. `N` is the node handle, `C` the per-task
/// allocator and `RC` the re-bounding callback.
pub struct BvhBuilderMsmBlur<'c, N, C, RC, FA, FN, FL> {
    settings: MsmBlurSettings,
    progress: &'c ProgressMonitor,
    recalculate: &'c RC,
    create_alloc: &'c FA,
    create_node: &'c FN,
    create_leaf: &'c FL,
    _marker: std::marker::PhantomData<fn() -> (N, C)>,
}

/// Builds a hierarchy over `prims`, whose bounds must be given over `info.time_range`, and
/// returns the record of its root.
///
/// # Arguments
///
/// * `recalculate` - Re-bounds references over the shorter ranges produced by temporal splits.
/// * `create_alloc` - Creates the allocator used by one parallel task.
/// * `create_node` - Creates an inner node from its built children. The flag tells whether the
///   children cover different time ranges.
/// * `create_leaf` - Creates a leaf from a range of references bounded over a time range.
#[allow(clippy::too_many_arguments)]
pub fn build<N, C, RC, FA, FN, FL>(
    prims: &mut [PrimRefMb],
    info: PrimInfoMb,
    settings: &MsmBlurSettings,
    progress: &ProgressMonitor,
    recalculate: &RC,
    create_alloc: FA,
    create_node: FN,
    create_leaf: FL,
) -> Result<NodeRecordMb4d<N>, BuildError>
where
    N: Send,
    RC: Recalculate,
    FA: Fn() -> C + Sync,
    FN: Fn(&[NodeRecordMb4d<N>], bool, &mut C) -> N + Sync,
    FL: Fn(&[PrimRefMb], &TimeRange, &mut C) -> NodeRecordMb4d<N> + Sync,
{
    settings.build.validate();
    debug_assert_eq!(info.size(), prims.len(), "Info must describe the references.");
    let builder = BvhBuilderMsmBlur {
        settings: *settings,
        progress,
        recalculate,
        create_alloc: &create_alloc,
        create_node: &create_node,
        create_leaf: &create_leaf,
        _marker: std::marker::PhantomData,
    };
    let time_range = info.time_range;
    let mut alloc = create_alloc();
    builder.recurse(
        BuildRecordMb::new(1, PrimSetMb::Borrowed(prims), info, time_range),
        &mut alloc,
        true,
    )
}

impl<'c, N, C, RC, FA, FN, FL> BvhBuilderMsmBlur<'c, N, C, RC, FA, FN, FL>
where
    N: Send,
    RC: Recalculate,
    FA: Fn() -> C + Sync,
    FN: Fn(&[NodeRecordMb4d<N>], bool, &mut C) -> N + Sync,
    FL: Fn(&[PrimRefMb], &TimeRange, &mut C) -> NodeRecordMb4d<N> + Sync,
{
    // ── Split selection ─────────────────────────────────────────────────────

    fn find(&self, current: &BuildRecordMb<'_>) -> SplitMb {
        let log_block_size = self.settings.build.log_block_size;
        let info = &current.info;
        let object = heuristic_binning::find(current.prims.as_slice(), &info.cent_bounds, log_block_size);
        let object_split = SplitMb {
            sah: object.sah,
            kind: SplitKind::Object(object),
        };
        if object.sah < 0.5 * info.leaf_sah(log_block_size) {
            return object_split;
        }
        if current.time_range.size() > 1.01 / info.max_num_time_segments as f32 {
            let temporal = self.find_temporal(current);
            if temporal.sah < object.sah {
                return temporal;
            }
        }
        object_split
    }

    /// Costs a cut at the time step closest to the middle of the record's range.
    fn find_temporal(&self, current: &BuildRecordMb<'_>) -> SplitMb {
        let range = current.time_range;
        let mut center = current.info.align_time(range.center());
        if center <= range.lower || center >= range.upper {
            center = range.center();
        }
        let (range0, range1) = range.split(center);

        let log_block_size = self.settings.build.log_block_size;
        let prims = current.prims.as_slice();
        let half_cost = |half: &TimeRange| {
            let accumulate = |(mut bounds, mut count): (LinearBounds, usize), prim: &PrimRefMb| {
                if prim.time_range_overlap(half) {
                    bounds.extend(&self.recalculate.linear_bounds(prim, half));
                    count += prim.time_segment_range(half).len();
                }
                (bounds, count)
            };
            let merge = |(mut a, ca): (LinearBounds, usize), (b, cb): (LinearBounds, usize)| {
                a.extend(&b);
                (a, ca + cb)
            };
            let (bounds, count) = if prims.len() > self.settings.build.single_thread_threshold {
                prims
                    .par_iter()
                    .fold(|| (LinearBounds::empty(), 0), accumulate)
                    .reduce(|| (LinearBounds::empty(), 0), merge)
            } else {
                prims.iter().fold((LinearBounds::empty(), 0), accumulate)
            };
            bounds.expected_approx_half_area() * blocks(count, log_block_size) as f32
        };

        SplitMb {
            sah: half_cost(&range0) + half_cost(&range1),
            kind: SplitKind::Temporal(center),
        }
    }

    /// Split used while forcing leaves: separate geometries first, then cut references that
    /// span several segments, then fall back to the median.
    fn find_fallback(&self, current: &BuildRecordMb<'_>) -> SplitMb {
        let prims = current.prims.as_slice();
        if !current.same_geometry() {
            return SplitMb {
                sah: f32::INFINITY,
                kind: SplitKind::Geometry(prims[0].geom_id),
            };
        }
        if self.settings.single_leaf_time_segment {
            let range = current.time_range;
            for prim in prims {
                let segments = prim.time_segment_range(&range);
                if segments.len() > 1 {
                    let center = (segments.start + segments.end) / 2;
                    let time = prim.time_step(center);
                    if range.lower < time && time < range.upper {
                        return SplitMb {
                            sah: f32::INFINITY,
                            kind: SplitKind::Temporal(time),
                        };
                    }
                }
            }
        }
        SplitMb {
            sah: f32::INFINITY,
            kind: SplitKind::Median,
        }
    }

    fn can_create_leaf(&self, current: &BuildRecordMb<'_>) -> bool {
        !self.settings.single_leaf_time_segment
            || current
                .prims
                .as_slice()
                .iter()
                .all(|prim| prim.time_segment_range(&current.time_range).len() <= 1)
    }

    // ── Split execution ─────────────────────────────────────────────────────

    fn split<'a>(&self, current: BuildRecordMb<'a>, split: SplitMb) -> (BuildRecordMb<'a>, BuildRecordMb<'a>) {
        match split.kind {
            SplitKind::Object(object) if object.valid() => {
                self.split_partition(current, |prim| object.is_left(prim))
            }
            SplitKind::Geometry(geom_id) => self.split_partition(current, |prim| prim.geom_id == geom_id),
            SplitKind::Temporal(time) => self.split_temporal(current, time),
            SplitKind::Object(_) | SplitKind::Median => Self::split_median(current),
        }
    }

    fn split_partition<'a>(
        &self,
        mut current: BuildRecordMb<'a>,
        is_left: impl Fn(&PrimRefMb) -> bool,
    ) -> (BuildRecordMb<'a>, BuildRecordMb<'a>) {
        let (mid, left_info, right_info) = partition_by(current.prims.as_mut_slice(), is_left);
        if mid == 0 || mid == current.size() {
            return Self::split_median(current);
        }
        let depth = current.depth + 1;
        let time_range = current.time_range;
        let (left, right) = current.prims.split_at(mid);
        (
            BuildRecordMb::new(depth, left, left_info, time_range),
            BuildRecordMb::new(depth, right, right_info, time_range),
        )
    }

    fn split_median<'a>(mut current: BuildRecordMb<'a>) -> (BuildRecordMb<'a>, BuildRecordMb<'a>) {
        deterministic_order(current.prims.as_mut_slice());
        let (mid, left_info, right_info) = split_fallback(current.prims.as_slice());
        let depth = current.depth + 1;
        let time_range = current.time_range;
        let (left, right) = current.prims.split_at(mid);
        (
            BuildRecordMb::new(depth, left, left_info, time_range),
            BuildRecordMb::new(depth, right, right_info, time_range),
        )
    }

    fn split_temporal<'a>(&self, current: BuildRecordMb<'a>, time: f32) -> (BuildRecordMb<'a>, BuildRecordMb<'a>) {
        let (range0, range1) = current.time_range.split(time);
        let depth = current.depth + 1;
        let recalculate = self.recalculate;

        let parent = current.prims.as_slice();
        let left: Vec<PrimRefMb> = if parent.len() > self.settings.build.single_thread_threshold {
            parent
                .par_iter()
                .filter(|prim| prim.time_range_overlap(&range0))
                .map(|prim| recalculate.recalculate(prim, &range0))
                .collect()
        } else {
            parent
                .iter()
                .filter(|prim| prim.time_range_overlap(&range0))
                .map(|prim| recalculate.recalculate(prim, &range0))
                .collect()
        };
        let left_info = PrimInfoMb::from_prims(&left);

        let right = current.prims.filter_map_in_place(|prim| {
            prim.time_range_overlap(&range1)
                .then(|| recalculate.recalculate(prim, &range1))
        });
        let right_info = PrimInfoMb::from_prims(right.as_slice());

        (
            BuildRecordMb::new(depth, PrimSetMb::Owned(left), left_info, range0),
            BuildRecordMb::new(depth, right, right_info, range1),
        )
    }

    // ── Recursion ───────────────────────────────────────────────────────────

    fn create_node(
        &self,
        values: &[NodeRecordMb4d<N>],
        time_range: TimeRange,
        time_split_bounds: LinearBounds,
        alloc: &mut C,
    ) -> NodeRecordMb4d<N> {
        let timesplit = values
            .iter()
            .any(|child| child.time_range.lower > time_range.lower || child.time_range.upper < time_range.upper);
        let node = (self.create_node)(values, timesplit, alloc);
        let lbounds = if timesplit {
            time_split_bounds
        } else {
            values.iter().fold(LinearBounds::empty(), |mut acc, child| {
                acc.extend(&child.lbounds);
                acc
            })
        };
        NodeRecordMb4d::new(node, lbounds, time_range)
    }

    /// Turns a record into a leaf, splitting it while it is too large or spans too many time
    /// segments per reference.
    fn create_large_leaf(&self, current: BuildRecordMb<'_>, alloc: &mut C) -> Result<NodeRecordMb4d<N>, BuildError> {
        let settings = &self.settings.build;
        if current.depth > settings.max_depth {
            return Err(BuildError::DepthLimitReached {
                depth: current.depth,
            });
        }
        let is_leaf = |record: &BuildRecordMb<'_>| {
            record.size() <= settings.max_leaf_size && self.can_create_leaf(record)
        };
        if is_leaf(&current) {
            return Ok((self.create_leaf)(current.prims.as_slice(), &current.time_range, alloc));
        }

        let time_range = current.time_range;
        let bounds = current.info.geom_bounds;
        let mut children = Vec::with_capacity(settings.branching_factor);
        children.push(current);
        while children.len() < settings.branching_factor {
            let best = children
                .iter()
                .enumerate()
                .filter(|(_, child)| !is_leaf(*child))
                .max_by_key(|(_, child)| child.size())
                .map(|(i, _)| i);
            let Some(best) = best else {
                break;
            };
            let child = children.swap_remove(best);
            let split = self.find_fallback(&child);
            let (left, right) = self.split(child, split);
            children.push(left);
            children.push(right);
        }

        let values = children
            .into_iter()
            .map(|child| self.create_large_leaf(child, alloc))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.create_node(&values, time_range, bounds, alloc))
    }

    fn recurse(
        &self,
        mut current: BuildRecordMb<'_>,
        alloc: &mut C,
        toplevel: bool,
    ) -> Result<NodeRecordMb4d<N>, BuildError> {
        let settings = &self.settings.build;
        if toplevel && current.size() <= settings.single_thread_threshold {
            self.progress.progress(current.size())?;
        }

        let split = self.find(&current);
        let leaf_sah = settings.int_cost * current.info.leaf_sah(settings.log_block_size);
        let split_sah = settings.trav_cost * current.info.half_area() + settings.int_cost * split.sah;

        if current.size() <= settings.min_leaf_size
            || current.depth + MIN_LARGE_LEAF_LEVELS >= settings.max_depth
            || (current.size() <= settings.max_leaf_size && leaf_sah <= split_sah)
        {
            deterministic_order(current.prims.as_mut_slice());
            return self.create_large_leaf(current, alloc);
        }

        let size = current.size();
        let time_range = current.time_range;
        let bounds = current.info.geom_bounds;
        let (left, right) = self.split(current, split);
        let mut children = Vec::with_capacity(settings.branching_factor);
        children.push(left);
        children.push(right);

        while children.len() < settings.branching_factor {
            let mut best_area = f32::NEG_INFINITY;
            let mut best_child = None;
            for (i, child) in children.iter().enumerate() {
                if child.size() <= settings.min_leaf_size {
                    continue;
                }
                let area = child.info.half_area();
                if area > best_area {
                    best_area = area;
                    best_child = Some(i);
                }
            }
            let Some(best) = best_child else {
                break;
            };
            let child = children.swap_remove(best);
            let split = self.find(&child);
            let (left, right) = self.split(child, split);
            children.push(left);
            children.push(right);
        }

        let values = if size > settings.single_thread_threshold {
            children
                .into_par_iter()
                .map(|child| {
                    let mut alloc = (self.create_alloc)();
                    self.recurse(child, &mut alloc, true)
                })
                .collect::<Result<Vec<_>, _>>()?
        } else {
            children
                .into_iter()
                .map(|child| self.recurse(child, alloc, false))
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(self.create_node(&values, time_range, bounds, alloc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::bounding_box::BoundingBox;
    use glam::Vec3;

    /// Points moving along a parabola, sampled at `SEGMENTS + 1` steps.
    const SEGMENTS: u32 = 4;

    fn position(prim_id: u32, step: usize) -> Vec3 {
        let t = step as f32 / SEGMENTS as f32;
        let base = Vec3::new((prim_id % 13) as f32, (prim_id / 13) as f32, 0.0);
        base + Vec3::new(0.0, 0.0, 40.0 * t * (1.0 - t))
    }

    fn step_bounds(prim_id: u32, step: usize) -> BoundingBox {
        let p = position(prim_id, step);
        BoundingBox::new(p, p + Vec3::splat(0.5))
    }

    struct Parabolas;

    impl Recalculate for Parabolas {
        fn recalculate(&self, prim: &PrimRefMb, time_range: &TimeRange) -> PrimRefMb {
            let mut out = *prim;
            out.lbounds = self.linear_bounds(prim, time_range);
            out.active_time_segments = prim.time_segment_range(time_range).len() as u32;
            out
        }

        fn linear_bounds(&self, prim: &PrimRefMb, time_range: &TimeRange) -> LinearBounds {
            LinearBounds::from_time_steps(|step| step_bounds(prim.prim_id, step), time_range, SEGMENTS as usize)
        }
    }

    fn prims(count: u32, geometries: u32) -> Vec<PrimRefMb> {
        (0..count)
            .map(|i| {
                let mut prim = PrimRefMb::new(
                    LinearBounds::empty(),
                    SEGMENTS,
                    TimeRange::GLOBAL,
                    SEGMENTS,
                    i % geometries,
                    i,
                );
                prim.lbounds = Parabolas.linear_bounds(&prim, &TimeRange::GLOBAL);
                prim
            })
            .collect()
    }

    #[derive(Clone, Debug)]
    enum Tree {
        Node(Vec<NodeRecordMb4d<Tree>>, bool),
        Leaf(Vec<PrimRefMb>),
    }

    impl Tree {
        fn check(record: &NodeRecordMb4d<Tree>, leaves: &mut Vec<(TimeRange, PrimRefMb)>, timesplits: &mut usize) {
            match &record.node {
                Tree::Node(children, timesplit) => {
                    if *timesplit {
                        *timesplits += 1;
                    }
                    for child in children {
                        assert!(child.time_range.is_within(&record.time_range, 1e-6));
                        Tree::check(child, leaves, timesplits);
                    }
                }
                Tree::Leaf(prims) => {
                    for prim in prims {
                        leaves.push((record.time_range, *prim));
                    }
                }
            }
        }
    }

    fn build_tree(prims: &mut [PrimRefMb], settings: &MsmBlurSettings) -> Result<NodeRecordMb4d<Tree>, BuildError> {
        let info = PrimInfoMb::from_prims(prims);
        let monitor = ProgressMonitor::default();
        build(
            prims,
            info,
            settings,
            &monitor,
            &Parabolas,
            || (),
            |children: &[NodeRecordMb4d<Tree>], timesplit, _: &mut ()| Tree::Node(children.to_vec(), timesplit),
            |prims: &[PrimRefMb], range: &TimeRange, _: &mut ()| {
                NodeRecordMb4d::new(Tree::Leaf(prims.to_vec()), PrimInfoMb::from_prims(prims).geom_bounds, *range)
            },
        )
    }

    fn settings() -> MsmBlurSettings {
        MsmBlurSettings {
            build: BuildSettings {
                branching_factor: 4,
                max_depth: 40,
                log_block_size: 2,
                min_leaf_size: 1,
                max_leaf_size: 8,
                single_thread_threshold: 32,
                ..Default::default()
            },
            single_leaf_time_segment: false,
        }
    }

    #[test]
    fn test_every_reference_covers_the_whole_time_domain() {
        let mut refs = prims(300, 3);
        let root = build_tree(&mut refs, &settings()).unwrap();
        assert_eq!(root.time_range, TimeRange::GLOBAL);

        let mut leaves = Vec::new();
        let mut timesplits = 0;
        Tree::check(&root, &mut leaves, &mut timesplits);
        for prim_id in 0..300 {
            let mut covered: Vec<TimeRange> = leaves
                .iter()
                .filter(|(_, p)| p.prim_id == prim_id)
                .map(|(range, _)| *range)
                .collect();
            covered.sort_by(|a, b| a.lower.total_cmp(&b.lower));
            assert!(!covered.is_empty(), "reference {prim_id} is missing");
            assert_eq!(covered[0].lower, 0.0);
            assert_eq!(covered[covered.len() - 1].upper, 1.0);
            for pair in covered.windows(2) {
                assert!((pair[0].upper - pair[1].lower).abs() < 1e-6, "gap in time coverage");
            }
        }
    }

    #[test]
    fn test_leaf_bounds_contain_motion() {
        let mut refs = prims(100, 1);
        let root = build_tree(&mut refs, &settings()).unwrap();
        let mut leaves = Vec::new();
        let mut timesplits = 0;
        Tree::check(&root, &mut leaves, &mut timesplits);
        for (range, prim) in leaves {
            for step in 0..=SEGMENTS as usize {
                let t = TimeRange::time_step(step, SEGMENTS as usize);
                if !range.contains(t) {
                    continue;
                }
                let fitted = prim.lbounds.interpolate(range.local_time(t));
                assert!(fitted.contains(&step_bounds(prim.prim_id, step), 1e-3));
            }
        }
    }

    #[test]
    fn test_single_leaf_time_segment_splits_time() {
        let mut refs = prims(1, 1);
        let settings = MsmBlurSettings {
            single_leaf_time_segment: true,
            ..settings()
        };
        let root = build_tree(&mut refs, &settings).unwrap();
        let mut leaves = Vec::new();
        let mut timesplits = 0;
        Tree::check(&root, &mut leaves, &mut timesplits);
        assert_eq!(leaves.len(), SEGMENTS as usize);
        assert!(timesplits > 0);
        for (range, prim) in &leaves {
            assert_eq!(prim.time_segment_range(range).len(), 1);
        }
    }

    #[test]
    fn test_forced_leaves_separate_geometries() {
        let min = Vec3::ZERO;
        let mut refs: Vec<PrimRefMb> = (0..6)
            .map(|i| {
                let b = LinearBounds::from_static(BoundingBox::new(min, min + Vec3::ONE));
                PrimRefMb::new(b, 1, TimeRange::GLOBAL, 1, i % 2, i)
            })
            .collect();
        // Shallow enough that the root is turned into a large leaf right away.
        let settings = MsmBlurSettings {
            build: BuildSettings {
                branching_factor: 2,
                max_depth: 9,
                min_leaf_size: 1,
                max_leaf_size: 3,
                ..Default::default()
            },
            single_leaf_time_segment: false,
        };
        let root = build_tree(&mut refs, &settings).unwrap();
        let Tree::Node(children, timesplit) = &root.node else {
            panic!("expected an inner root");
        };
        assert!(!timesplit);
        assert_eq!(children.len(), 2);
        for child in children {
            let Tree::Leaf(prims) = &child.node else {
                panic!("expected leaf children");
            };
            assert_eq!(prims.len(), 3);
            assert!(prims.iter().all(|p| p.geom_id == prims[0].geom_id));
        }
    }

    #[test]
    fn test_cancellation_stops_build() {
        let mut refs = prims(2000, 2);
        let info = PrimInfoMb::from_prims(&refs);
        let monitor = ProgressMonitor::default();
        monitor.set_function(Some(Box::new(|_| false)));
        monitor.start(refs.len());
        let result = build(
            &mut refs,
            info,
            &settings(),
            &monitor,
            &Parabolas,
            || (),
            |_: &[NodeRecordMb4d<()>], _, _: &mut ()| (),
            |_: &[PrimRefMb], range: &TimeRange, _: &mut ()| NodeRecordMb4d::new((), LinearBounds::empty(), *range),
        );
        assert_eq!(result, Err(BuildError::Cancelled));
    }
}

//! Binned SAH builder over references that are bounded at a single time.
//!
//! The builder only decides the shape of the hierarchy. Nodes and leaves are produced through
//! callbacks, which receive the per-task allocator created by `create_alloc`.

use rayon::prelude::*;

use crate::common::build_error::BuildError;
use crate::common::progress_monitor::ProgressMonitor;

use super::heuristic_binning::{self, deterministic_order, split_fallback, ObjectSplit};
use super::primref::{PrimInfo, PrimRef};

/// Largest branching factor a build may request.
pub const MAX_BRANCHING_FACTOR: usize = 8;
/// Levels reserved below a forced leaf so large leaves can still be split by the median.
pub const MIN_LARGE_LEAF_LEVELS: usize = 8;
/// Subtree size below which recursion stays on the current thread, unless tuned by the caller.
pub const DEFAULT_SINGLE_THREAD_THRESHOLD: usize = 1024;

/// Tuning of a build.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BuildSettings {
    pub branching_factor: usize,
    pub max_depth: usize,
    /// Log2 of the number of references a leaf block holds, used to cost leaves.
    pub log_block_size: usize,
    pub min_leaf_size: usize,
    pub max_leaf_size: usize,
    /// Cost of traversing a node relative to `int_cost`.
    pub trav_cost: f32,
    /// Cost of intersecting a leaf block.
    pub int_cost: f32,
    pub single_thread_threshold: usize,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            branching_factor: 2,
            max_depth: 32,
            log_block_size: 0,
            min_leaf_size: 1,
            max_leaf_size: 7,
            trav_cost: 1.0,
            int_cost: 1.0,
            single_thread_threshold: DEFAULT_SINGLE_THREAD_THRESHOLD,
        }
    }
}

impl BuildSettings {
    pub(crate) fn validate(&self) {
        assert!(
            (2..=MAX_BRANCHING_FACTOR).contains(&self.branching_factor),
            "Branching factor must lie in [2, {MAX_BRANCHING_FACTOR}], got {}.",
            self.branching_factor
        );
        assert!(
            self.min_leaf_size <= self.max_leaf_size,
            "Minimum leaf size {} exceeds maximum leaf size {}.",
            self.min_leaf_size,
            self.max_leaf_size
        );
    }
}

/// References of one subtree under construction.
pub struct BuildRecord<'a> {
    pub depth: usize,
    pub prims: &'a mut [PrimRef],
    pub info: PrimInfo,
}

impl<'a> BuildRecord<'a> {
    #[inline]
    pub fn new(depth: usize, prims: &'a mut [PrimRef], info: PrimInfo) -> Self {
        Self { depth, prims, info }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.prims.len()
    }

    /// Best binned split of the record.
    fn find(&self, log_block_size: usize) -> ObjectSplit {
        heuristic_binning::find(&self.prims[..], &self.info.cent_bounds, log_block_size)
    }

    /// Partitions the record in two along `split`, or by the median when the references
    /// cannot be separated.
    fn split(self, split: &ObjectSplit) -> (BuildRecord<'a>, BuildRecord<'a>) {
        let depth = self.depth + 1;
        let prims = self.prims;
        let (mid, left_info, right_info) = if split.valid() {
            let partitioned = heuristic_binning::partition(prims, split);
            if partitioned.0 == 0 || partitioned.0 == prims.len() {
                deterministic_order(prims);
                split_fallback(prims)
            } else {
                partitioned
            }
        } else {
            deterministic_order(prims);
            split_fallback(prims)
        };
        let (left, right) = prims.split_at_mut(mid);
        (
            BuildRecord::new(depth, left, left_info),
            BuildRecord::new(depth, right, right_info),
        )
    }

    /// Median split that keeps the current order.
    fn split_median(self) -> (BuildRecord<'a>, BuildRecord<'a>) {
        let depth = self.depth + 1;
        let (mid, left_info, right_info) = split_fallback(self.prims);
        let (left, right) = self.prims.split_at_mut(mid);
        (
            BuildRecord::new(depth, left, left_info),
            BuildRecord::new(depth, right, right_info),
        )
    }
}

/// Recursive top-down builder. `R` is the record returned for a built subtree, `C` the
/// per-task allocator.
pub struct BvhBuilderBinnedSah<'c, R, C, FA, FN, FL> {
    settings: BuildSettings,
    progress: &'c ProgressMonitor,
    create_alloc: &'c FA,
    create_node: &'c FN,
    create_leaf: &'c FL,
    _marker: std::marker::PhantomData<fn() -> (R, C)>,
}

/// Builds a hierarchy over `prims` and returns the record of its root.
///
/// # Arguments
///
/// * `create_alloc` - Creates the allocator used by one parallel task.
/// * `create_node` - Creates an inner node from the records of its built children.
/// * `create_leaf` - Creates a leaf from a range of references.
pub fn build<R, C, FA, FN, FL>(
    prims: &mut [PrimRef],
    info: PrimInfo,
    settings: &BuildSettings,
    progress: &ProgressMonitor,
    create_alloc: FA,
    create_node: FN,
    create_leaf: FL,
) -> Result<R, BuildError>
where
    R: Send,
    FA: Fn() -> C + Sync,
    FN: Fn(&[R], &mut C) -> R + Sync,
    FL: Fn(&[PrimRef], &mut C) -> R + Sync,
{
    settings.validate();
    debug_assert_eq!(info.size(), prims.len(), "Info must describe the references.");
    let builder = BvhBuilderBinnedSah {
        settings: *settings,
        progress,
        create_alloc: &create_alloc,
        create_node: &create_node,
        create_leaf: &create_leaf,
        _marker: std::marker::PhantomData,
    };
    let mut alloc = create_alloc();
    builder.recurse(BuildRecord::new(1, prims, info), &mut alloc, true)
}

impl<'c, R, C, FA, FN, FL> BvhBuilderBinnedSah<'c, R, C, FA, FN, FL>
where
    R: Send,
    FA: Fn() -> C + Sync,
    FN: Fn(&[R], &mut C) -> R + Sync,
    FL: Fn(&[PrimRef], &mut C) -> R + Sync,
{
    /// Turns a record into a leaf, splitting by the median while it is larger than a leaf may be.
    fn create_large_leaf(&self, current: BuildRecord<'_>, alloc: &mut C) -> Result<R, BuildError> {
        if current.depth > self.settings.max_depth {
            return Err(BuildError::DepthLimitReached {
                depth: current.depth,
            });
        }
        if current.size() <= self.settings.max_leaf_size {
            return Ok((self.create_leaf)(current.prims, alloc));
        }

        let mut children = Vec::with_capacity(self.settings.branching_factor);
        children.push(current);
        while children.len() < self.settings.branching_factor {
            let best = children
                .iter()
                .enumerate()
                .filter(|(_, child)| child.size() > self.settings.max_leaf_size)
                .max_by_key(|(_, child)| child.size())
                .map(|(i, _)| i);
            let Some(best) = best else {
                break;
            };
            let (left, right) = children.swap_remove(best).split_median();
            children.push(left);
            children.push(right);
        }

        let values = children
            .into_iter()
            .map(|child| self.create_large_leaf(child, alloc))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.create_node)(&values, alloc))
    }

    fn recurse(&self, current: BuildRecord<'_>, alloc: &mut C, toplevel: bool) -> Result<R, BuildError> {
        let settings = &self.settings;
        if toplevel && current.size() <= settings.single_thread_threshold {
            self.progress.progress(current.size())?;
        }

        let split = current.find(settings.log_block_size);
        let leaf_sah = settings.int_cost * current.info.leaf_sah(settings.log_block_size);
        let split_sah = settings.trav_cost * current.info.half_area() + settings.int_cost * split.sah;

        if current.size() <= settings.min_leaf_size
            || current.depth + MIN_LARGE_LEAF_LEVELS >= settings.max_depth
            || (current.size() <= settings.max_leaf_size && leaf_sah <= split_sah)
        {
            deterministic_order(current.prims);
            return self.create_large_leaf(current, alloc);
        }

        let size = current.size();
        let (left, right) = current.split(&split);
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
            let split = child.find(settings.log_block_size);
            let (left, right) = child.split(&split);
            children.push(left);
            children.push(right);
        }

        // Larger subtrees first.
        children.sort_by(|a, b| b.size().cmp(&a.size()));

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
        Ok((self.create_node)(&values, alloc))
    }
}

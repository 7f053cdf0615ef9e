use glam::Vec3;
use rayon::prelude::*;

use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::linear_bounds::LinearBounds;

use super::primref::{blocks, BuildPrimRef};

/// Upper bound on bins per axis.
pub const MAX_BINS: usize = 32;
/// Sets larger than this are binned in parallel.
pub const PARALLEL_THRESHOLD: usize = 3 * 1024;
/// References binned per parallel task.
pub const PARALLEL_FIND_BLOCK_SIZE: usize = 1024;

// ── Bin mapping ────────────────────────────────────────────────────────────

/// Maps doubled centroids to bin indices on all three axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BinMapping {
    num_bins: usize,
    offset: Vec3,
    scale: Vec3,
}

impl BinMapping {
    pub fn new(cent_bounds: &BoundingBox, count: usize) -> Self {
        let num_bins = MAX_BINS.min(4 + (0.05 * count as f32) as usize);
        let diagonal = if cent_bounds.is_empty() {
            Vec3::ZERO
        } else {
            cent_bounds.size()
        };
        let scale = Vec3::select(
            diagonal.cmpgt(Vec3::splat(1e-19)),
            Vec3::splat(0.99 * num_bins as f32) / diagonal,
            Vec3::ZERO,
        );
        Self {
            num_bins,
            offset: if cent_bounds.is_empty() { Vec3::ZERO } else { cent_bounds.min },
            scale,
        }
    }

    #[inline(always)]
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Bin of `center2` on each axis.
    #[inline(always)]
    pub fn bin(&self, center2: Vec3) -> [usize; 3] {
        let continuous = ((center2 - self.offset) * self.scale)
            .floor()
            .clamp(Vec3::ZERO, Vec3::splat((self.num_bins - 1) as f32));
        [continuous.x as usize, continuous.y as usize, continuous.z as usize]
    }

    /// Whether centroids cannot be separated along `axis`.
    #[inline(always)]
    pub fn is_degenerate_axis(&self, axis: usize) -> bool {
        self.scale[axis] == 0.0
    }

    #[inline(always)]
    pub fn is_degenerate(&self) -> bool {
        self.scale == Vec3::ZERO
    }
}

// ── Split ──────────────────────────────────────────────────────────────────

/// Best object partition found by binning. References whose bin on `axis` lies below `pos`
/// go left.
#[derive(Clone, Copy, Debug)]
pub struct ObjectSplit {
    /// Area weighted block cost of both halves, or infinity when no split exists.
    pub sah: f32,
    pub axis: usize,
    pub pos: usize,
    pub mapping: BinMapping,
}

impl ObjectSplit {
    pub fn invalid(mapping: BinMapping) -> Self {
        Self {
            sah: f32::INFINITY,
            axis: 0,
            pos: 0,
            mapping,
        }
    }

    #[inline(always)]
    pub fn valid(&self) -> bool {
        self.sah.is_finite()
    }

    #[inline(always)]
    pub fn is_left<R: BuildPrimRef>(&self, prim: &R) -> bool {
        self.mapping.bin(prim.center2())[self.axis] < self.pos
    }
}

// ── Bins ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct BinInfo {
    bounds: [[LinearBounds; MAX_BINS]; 3],
    counts: [[usize; MAX_BINS]; 3],
}

impl BinInfo {
    fn new() -> Self {
        Self {
            bounds: [[LinearBounds::empty(); MAX_BINS]; 3],
            counts: [[0; MAX_BINS]; 3],
        }
    }

    fn bin<R: BuildPrimRef>(&mut self, prims: &[R], mapping: &BinMapping) {
        for prim in prims {
            let bins = mapping.bin(prim.center2());
            let lbounds = prim.lbounds();
            let weight = prim.weight();
            for axis in 0..3 {
                self.bounds[axis][bins[axis]].extend(&lbounds);
                self.counts[axis][bins[axis]] += weight;
            }
        }
    }

    fn merge(mut self, other: &BinInfo, num_bins: usize) -> Self {
        for axis in 0..3 {
            for bin in 0..num_bins {
                self.bounds[axis][bin].extend(&other.bounds[axis][bin]);
                self.counts[axis][bin] += other.counts[axis][bin];
            }
        }
        self
    }

    /// Sweeps every axis and returns the cheapest split with references on both sides.
    fn best(&self, mapping: &BinMapping, log_block_size: usize) -> ObjectSplit {
        let num_bins = mapping.num_bins();
        let mut best = ObjectSplit::invalid(*mapping);
        for axis in 0..3 {
            if mapping.is_degenerate_axis(axis) {
                continue;
            }
            // Right to left prefix: cost of bins [i, num_bins).
            let mut right_costs = [0.0f32; MAX_BINS];
            let mut right_counts = [0usize; MAX_BINS];
            let mut accumulated = LinearBounds::empty();
            let mut count = 0;
            for bin in (1..num_bins).rev() {
                accumulated.extend(&self.bounds[axis][bin]);
                count += self.counts[axis][bin];
                right_costs[bin] = accumulated.expected_approx_half_area() * blocks(count, log_block_size) as f32;
                right_counts[bin] = count;
            }
            let mut accumulated = LinearBounds::empty();
            let mut count = 0;
            for pos in 1..num_bins {
                accumulated.extend(&self.bounds[axis][pos - 1]);
                count += self.counts[axis][pos - 1];
                if count == 0 || right_counts[pos] == 0 {
                    continue;
                }
                let sah = accumulated.expected_approx_half_area() * blocks(count, log_block_size) as f32
                    + right_costs[pos];
                if sah < best.sah {
                    best.sah = sah;
                    best.axis = axis;
                    best.pos = pos;
                }
            }
        }
        best
    }
}

// ── Heuristic ──────────────────────────────────────────────────────────────

/// Finds the best binned object split of `prims`, whose doubled centroids lie in `cent_bounds`.
pub fn find<R: BuildPrimRef>(prims: &[R], cent_bounds: &BoundingBox, log_block_size: usize) -> ObjectSplit {
    let mapping = BinMapping::new(cent_bounds, prims.len());
    if prims.len() < 2 || mapping.is_degenerate() {
        return ObjectSplit::invalid(mapping);
    }
    let bins = if prims.len() > PARALLEL_THRESHOLD {
        prims
            .par_chunks(PARALLEL_FIND_BLOCK_SIZE)
            .fold(BinInfo::new, |mut bins, chunk| {
                bins.bin(chunk, &mapping);
                bins
            })
            .reduce(BinInfo::new, |a, b| a.merge(&b, mapping.num_bins()))
    } else {
        let mut bins = BinInfo::new();
        bins.bin(prims, &mapping);
        bins
    };
    bins.best(&mapping, log_block_size)
}

/// Reorders `prims` so the left side of `split` comes first. Returns the left count and the
/// statistics of both sides.
pub fn partition<R: BuildPrimRef>(prims: &mut [R], split: &ObjectSplit) -> (usize, R::Info, R::Info) {
    debug_assert!(split.valid(), "Cannot partition along an invalid split.");
    partition_by(prims, |prim| split.is_left(prim))
}

/// Reorders `prims` so references satisfying `is_left` come first.
pub fn partition_by<R: BuildPrimRef>(
    prims: &mut [R],
    is_left: impl Fn(&R) -> bool,
) -> (usize, R::Info, R::Info) {
    let mut left_info = R::Info::default();
    let mut right_info = R::Info::default();
    let mut left = 0;
    let mut right = prims.len();
    while left < right {
        if is_left(&prims[left]) {
            prims[left].extend_info(&mut left_info);
            left += 1;
        } else {
            right -= 1;
            prims.swap(left, right);
            prims[right].extend_info(&mut right_info);
        }
    }
    (left, left_info, right_info)
}

/// Splits `prims` in the middle. Used when centroids cannot be separated.
pub fn split_fallback<R: BuildPrimRef>(prims: &[R]) -> (usize, R::Info, R::Info) {
    let mid = prims.len() / 2;
    let mut left_info = R::Info::default();
    let mut right_info = R::Info::default();
    for prim in &prims[..mid] {
        prim.extend_info(&mut left_info);
    }
    for prim in &prims[mid..] {
        prim.extend_info(&mut right_info);
    }
    (mid, left_info, right_info)
}

/// Sorts references by geometry and primitive id so fallback splits and leaves do not depend
/// on the order parallel tasks produced them in.
pub fn deterministic_order<R: BuildPrimRef>(prims: &mut [R]) {
    if prims.len() > PARALLEL_THRESHOLD {
        prims.par_sort_unstable_by_key(|prim| prim.order_key());
    } else {
        prims.sort_unstable_by_key(|prim| prim.order_key());
    }
}

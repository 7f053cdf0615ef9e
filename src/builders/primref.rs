use glam::Vec3;

use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::time_range::TimeRange;

/// Build time view of a primitive shared by both build engines.
pub trait BuildPrimRef: Copy + Send + Sync {
    /// Aggregate statistics over a set of references.
    type Info: Copy + Default + Send + Sync;

    fn geom_id(&self) -> u32;
    fn prim_id(&self) -> u32;
    /// Twice the centroid used for binning.
    fn center2(&self) -> Vec3;
    /// Bounds over the current build time range.
    fn lbounds(&self) -> LinearBounds;
    /// Number of leaf items this reference costs in the SAH.
    fn weight(&self) -> usize;
    fn extend_info(&self, info: &mut Self::Info);
    fn merge_info(info: &mut Self::Info, other: &Self::Info);

    /// Key used to put references of a leaf into a build independent order.
    #[inline]
    fn order_key(&self) -> (u32, u32) {
        (self.geom_id(), self.prim_id())
    }
}

/// Bounds of a primitive at a single reference time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimRef {
    pub bounds: BoundingBox,
    pub geom_id: u32,
    pub prim_id: u32,
}

impl PrimRef {
    #[inline]
    pub fn new(bounds: BoundingBox, geom_id: u32, prim_id: u32) -> Self {
        Self {
            bounds,
            geom_id,
            prim_id,
        }
    }
}

impl BuildPrimRef for PrimRef {
    type Info = PrimInfo;

    #[inline(always)]
    fn geom_id(&self) -> u32 {
        self.geom_id
    }

    #[inline(always)]
    fn prim_id(&self) -> u32 {
        self.prim_id
    }

    #[inline(always)]
    fn center2(&self) -> Vec3 {
        self.bounds.center2()
    }

    #[inline(always)]
    fn lbounds(&self) -> LinearBounds {
        LinearBounds::from_static(self.bounds)
    }

    #[inline(always)]
    fn weight(&self) -> usize {
        1
    }

    #[inline]
    fn extend_info(&self, info: &mut PrimInfo) {
        info.add(&self.bounds, self.center2());
    }

    #[inline]
    fn merge_info(info: &mut PrimInfo, other: &PrimInfo) {
        info.merge(other);
    }
}

/// Reference to a moving primitive, bounded over the time range of the build record it is in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimRefMb {
    /// Bounds at the ends of the current build time range.
    pub lbounds: LinearBounds,
    /// Time range the primitive's geometry is defined over.
    pub time_range: TimeRange,
    /// Time segments of the geometry overlapping the current build time range.
    pub active_time_segments: u32,
    /// Time segments of the geometry overall.
    pub total_time_segments: u32,
    pub geom_id: u32,
    pub prim_id: u32,
}

impl PrimRefMb {
    #[inline]
    pub fn new(
        lbounds: LinearBounds,
        active_time_segments: u32,
        time_range: TimeRange,
        total_time_segments: u32,
        geom_id: u32,
        prim_id: u32,
    ) -> Self {
        Self {
            lbounds,
            time_range,
            active_time_segments,
            total_time_segments,
            geom_id,
            prim_id,
        }
    }

    /// Whether the geometry's time range overlaps `range`, with a small tolerance against
    /// ranges that merely touch.
    #[inline]
    pub fn time_range_overlap(&self, range: &TimeRange) -> bool {
        0.9999 * self.time_range.upper > range.lower && 1.0001 * self.time_range.lower < range.upper
    }

    /// Segments of the geometry overlapping `range`.
    #[inline]
    pub fn time_segment_range(&self, range: &TimeRange) -> std::ops::Range<usize> {
        range.segment_range(self.total_time_segments as usize)
    }

    /// Time of step `index` of the geometry.
    #[inline]
    pub fn time_step(&self, index: usize) -> f32 {
        self.time_range.lower
            + self.time_range.size() * TimeRange::time_step(index, self.total_time_segments as usize)
    }
}

impl BuildPrimRef for PrimRefMb {
    type Info = PrimInfoMb;

    #[inline(always)]
    fn geom_id(&self) -> u32 {
        self.geom_id
    }

    #[inline(always)]
    fn prim_id(&self) -> u32 {
        self.prim_id
    }

    #[inline(always)]
    fn center2(&self) -> Vec3 {
        self.lbounds.interpolate(0.5).center2()
    }

    #[inline(always)]
    fn lbounds(&self) -> LinearBounds {
        self.lbounds
    }

    #[inline(always)]
    fn weight(&self) -> usize {
        self.active_time_segments as usize
    }

    #[inline]
    fn extend_info(&self, info: &mut PrimInfoMb) {
        info.add_primref(self);
    }

    #[inline]
    fn merge_info(info: &mut PrimInfoMb, other: &PrimInfoMb) {
        info.merge(other);
    }
}

/// Count and bounds of a set of [`PrimRef`]s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimInfo {
    pub count: usize,
    pub geom_bounds: BoundingBox,
    /// Bounds of the doubled centroids.
    pub cent_bounds: BoundingBox,
}

impl Default for PrimInfo {
    fn default() -> Self {
        Self::empty()
    }
}

impl PrimInfo {
    pub fn empty() -> Self {
        Self {
            count: 0,
            geom_bounds: BoundingBox::empty(),
            cent_bounds: BoundingBox::empty(),
        }
    }

    pub fn from_prims(prims: &[PrimRef]) -> Self {
        let mut info = Self::empty();
        for prim in prims {
            prim.extend_info(&mut info);
        }
        info
    }

    #[inline]
    pub fn add(&mut self, bounds: &BoundingBox, center2: Vec3) {
        self.count += 1;
        self.geom_bounds.extend(bounds);
        self.cent_bounds.extend_point(center2);
    }

    #[inline]
    pub fn merge(&mut self, other: &PrimInfo) {
        self.count += other.count;
        self.geom_bounds.extend(&other.geom_bounds);
        self.cent_bounds.extend(&other.cent_bounds);
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn half_area(&self) -> f32 {
        self.geom_bounds.half_area()
    }

    /// SAH cost of turning the whole set into one leaf, before the intersection cost factor.
    #[inline]
    pub fn leaf_sah(&self, log_block_size: usize) -> f32 {
        self.half_area() * blocks(self.count, log_block_size) as f32
    }
}

/// Count, bounds and time sampling statistics of a set of [`PrimRefMb`]s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrimInfoMb {
    pub count: usize,
    /// Union of the reference bounds over the build time range.
    pub geom_bounds: LinearBounds,
    pub cent_bounds: BoundingBox,
    /// Sum of active time segments over all references.
    pub num_time_segments: usize,
    /// Largest total time segment count of any reference.
    pub max_num_time_segments: u32,
    /// Geometry time range of the reference with the most time segments.
    pub max_time_range: TimeRange,
    /// Union of the geometry time ranges.
    pub time_range: TimeRange,
}

impl Default for PrimInfoMb {
    fn default() -> Self {
        Self::empty()
    }
}

impl PrimInfoMb {
    pub fn empty() -> Self {
        Self {
            count: 0,
            geom_bounds: LinearBounds::empty(),
            cent_bounds: BoundingBox::empty(),
            num_time_segments: 0,
            max_num_time_segments: 0,
            max_time_range: TimeRange::EMPTY,
            time_range: TimeRange::EMPTY,
        }
    }

    pub fn from_prims(prims: &[PrimRefMb]) -> Self {
        let mut info = Self::empty();
        for prim in prims {
            info.add_primref(prim);
        }
        info
    }

    #[inline]
    pub fn add_primref(&mut self, prim: &PrimRefMb) {
        self.count += 1;
        self.geom_bounds.extend(&prim.lbounds);
        self.cent_bounds.extend_point(prim.center2());
        self.num_time_segments += prim.active_time_segments as usize;
        if prim.total_time_segments > self.max_num_time_segments {
            self.max_num_time_segments = prim.total_time_segments;
            self.max_time_range = prim.time_range;
        }
        self.time_range.extend(&prim.time_range);
    }

    #[inline]
    pub fn merge(&mut self, other: &PrimInfoMb) {
        self.count += other.count;
        self.geom_bounds.extend(&other.geom_bounds);
        self.cent_bounds.extend(&other.cent_bounds);
        self.num_time_segments += other.num_time_segments;
        if other.max_num_time_segments > self.max_num_time_segments {
            self.max_num_time_segments = other.max_num_time_segments;
            self.max_time_range = other.max_time_range;
        }
        self.time_range.extend(&other.time_range);
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn half_area(&self) -> f32 {
        self.geom_bounds.expected_approx_half_area()
    }

    /// Leaf SAH in units of active time segments, before the intersection cost factor.
    #[inline]
    pub fn leaf_sah(&self, log_block_size: usize) -> f32 {
        self.half_area() * blocks(self.num_time_segments, log_block_size) as f32
    }

    /// Snaps `time` to a time step of the most finely sampled geometry in the set.
    #[inline]
    pub fn align_time(&self, time: f32) -> f32 {
        TimeRange::align_time(time, &self.max_time_range, self.max_num_time_segments)
    }
}

/// Number of leaf blocks of `2^log_block_size` items needed for `count` items.
#[inline(always)]
pub fn blocks(count: usize, log_block_size: usize) -> usize {
    (count + (1 << log_block_size) - 1) >> log_block_size
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primref_mb(x: f32, segments: u32) -> PrimRefMb {
        let b = BoundingBox::new(Vec3::splat(x), Vec3::splat(x + 1.0));
        PrimRefMb::new(LinearBounds::from_static(b), segments, TimeRange::GLOBAL, segments, 0, 0)
    }

    #[test]
    fn test_blocks_round_up() {
        assert_eq!(blocks(0, 2), 0);
        assert_eq!(blocks(1, 2), 1);
        assert_eq!(blocks(8, 2), 2);
        assert_eq!(blocks(9, 2), 3);
        assert_eq!(blocks(5, 0), 5);
    }

    #[test]
    fn test_info_tracks_time_segments() {
        let info = PrimInfoMb::from_prims(&[primref_mb(0.0, 1), primref_mb(2.0, 3)]);
        assert_eq!(info.size(), 2);
        assert_eq!(info.num_time_segments, 4);
        assert_eq!(info.max_num_time_segments, 3);
        assert_eq!(info.max_time_range, TimeRange::GLOBAL);
        assert_eq!(info.geom_bounds.bounds0.max, Vec3::splat(3.0));
        assert!((info.align_time(0.4) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_time_range_overlap_ignores_touching() {
        let mut prim = primref_mb(0.0, 2);
        prim.time_range = TimeRange::new(0.0, 0.5);
        assert!(prim.time_range_overlap(&TimeRange::new(0.25, 1.0)));
        assert!(!prim.time_range_overlap(&TimeRange::new(0.5, 1.0)));
        assert_eq!(prim.time_step(1), 0.25);
    }
}

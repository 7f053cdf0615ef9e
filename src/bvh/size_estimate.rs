use std::mem::size_of;

use crate::builders::primref::{PrimInfo, PrimInfoMb};
use crate::geometry::primitive::Primitive;
use crate::geometry::sub_grid::SubGridQbvh;

use super::node::Node;

/// Predicted arena footprint of a build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SizeEstimate {
    pub node_bytes: usize,
    pub leaf_bytes: usize,
}

impl SizeEstimate {
    /// Slack applied to leaf bytes for partially filled blocks.
    pub const LEAF_SLACK: f64 = 1.2;

    #[inline]
    pub fn total(&self) -> usize {
        self.node_bytes + self.leaf_bytes
    }

    fn from_items(items: usize, leaf_blocks: f64, leaf_block_bytes: usize, branching_factor: usize) -> Self {
        Self {
            node_bytes: items * size_of::<Node>() / (4 * branching_factor),
            leaf_bytes: (Self::LEAF_SLACK * leaf_blocks * leaf_block_bytes as f64) as usize,
        }
    }

    /// Estimate for a single segment build over `info`.
    pub fn mblur<P: Primitive>(info: &PrimInfo, branching_factor: usize) -> Self {
        Self::from_items(
            info.size(),
            P::blocks(info.size()) as f64,
            size_of::<P>(),
            branching_factor,
        )
    }

    /// Estimate for a multi segment build. Counts active time segments, since temporal splits
    /// replicate references once per segment in the worst case.
    pub fn msmblur<P: Primitive>(info: &PrimInfoMb, branching_factor: usize) -> Self {
        Self::from_items(
            info.num_time_segments,
            P::blocks(info.num_time_segments) as f64,
            size_of::<P>(),
            branching_factor,
        )
    }

    /// Estimate for sub-grid leaves, `branching_factor` sub-grids per block.
    pub fn grid(items: usize, num_grid_primitives: usize, branching_factor: usize) -> Self {
        Self::from_items(
            items,
            num_grid_primitives as f64 / branching_factor as f64,
            size_of::<SubGridQbvh>(),
            branching_factor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::primref::PrimRefMb;
    use crate::geometry::triangle4i::Triangle4i;
    use crate::utilities::bounding_box::BoundingBox;
    use crate::utilities::linear_bounds::LinearBounds;
    use crate::utilities::time_range::TimeRange;
    use glam::Vec3;

    #[test]
    fn test_leaf_bytes_carry_slack() {
        let mut info = PrimInfo::empty();
        for _ in 0..1000 {
            info.add(&BoundingBox::new(Vec3::ZERO, Vec3::ONE), Vec3::ONE);
        }
        let estimate = SizeEstimate::mblur::<Triangle4i>(&info, 4);
        assert_eq!(estimate.leaf_bytes, (1.2 * 250.0 * size_of::<Triangle4i>() as f64) as usize);
        assert_eq!(estimate.node_bytes, 1000 * size_of::<Node>() / 16);
        assert_eq!(estimate.total(), estimate.node_bytes + estimate.leaf_bytes);
    }

    #[test]
    fn test_multi_segment_estimate_counts_time_segments() {
        let unit = LinearBounds::from_static(BoundingBox::new(Vec3::ZERO, Vec3::ONE));
        let prims: Vec<PrimRefMb> = (0..100)
            .map(|i| PrimRefMb::new(unit, 3, TimeRange::GLOBAL, 3, 0, i))
            .collect();
        let info = PrimInfoMb::from_prims(&prims);
        assert_eq!(info.size(), 100);
        assert_eq!(info.num_time_segments, 300);

        let estimate = SizeEstimate::msmblur::<Triangle4i>(&info, 4);
        assert_eq!(estimate.node_bytes, 300 * size_of::<Node>() / 16);
        assert_eq!(
            estimate.leaf_bytes,
            (1.2 * Triangle4i::blocks(300) as f64 * size_of::<Triangle4i>() as f64) as usize
        );
    }

    #[test]
    fn test_grid_estimate_divides_by_width() {
        let estimate = SizeEstimate::grid(64, 64, 8);
        assert_eq!(estimate.leaf_bytes, (1.2 * 8.0 * size_of::<SubGridQbvh>() as f64) as usize);
    }
}

use std::ops::Range;

use glam::{Affine3A, Vec3};

use crate::utilities::bounding_box::BoundingBox;

use super::motion_geometry::{GeometryType, MotionGeometry};

/// Instance of an object with bounds `object_bounds`, placed by one transform per time step.
/// An instance is a single primitive.
#[derive(Clone, Debug)]
pub struct Instance {
    pub object_bounds: BoundingBox,
    pub transforms: Vec<Affine3A>,
}

impl Instance {
    pub fn new(object_bounds: BoundingBox, transforms: Vec<Affine3A>) -> Self {
        assert!(!transforms.is_empty(), "An instance needs at least one transform.");
        Self {
            object_bounds,
            transforms,
        }
    }
}

/// Bounds of `bounds` after applying `transform`, computed from the eight corners.
pub fn transform_bounds(transform: &Affine3A, bounds: &BoundingBox) -> BoundingBox {
    let mut result = BoundingBox::empty();
    for corner in 0..8 {
        let point = Vec3::new(
            if corner & 1 == 0 { bounds.min.x } else { bounds.max.x },
            if corner & 2 == 0 { bounds.min.y } else { bounds.max.y },
            if corner & 4 == 0 { bounds.min.z } else { bounds.max.z },
        );
        result.extend_point(transform.transform_point3(point));
    }
    result
}

impl MotionGeometry for Instance {
    fn geometry_type(&self) -> GeometryType {
        GeometryType::Instance
    }

    fn num_primitives(&self) -> usize {
        1
    }

    fn num_time_steps(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    fn bounds(&self, _prim: usize, itime: usize) -> BoundingBox {
        transform_bounds(&self.transforms[itime], &self.object_bounds)
    }

    fn is_valid(&self, prim: usize, itime_range: Range<usize>) -> bool {
        prim == 0
            && self.object_bounds.is_finite()
            && itime_range.end <= self.transforms.len()
            && self.transforms[itime_range].iter().all(|t| t.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotated_bounds_contain_corners() {
        let unit = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let rotation = Affine3A::from_rotation_z(std::f32::consts::FRAC_PI_4);
        let b = transform_bounds(&rotation, &unit);
        let diagonal = std::f32::consts::SQRT_2;
        assert!((b.max.y - diagonal).abs() < 1e-5);
        assert!((b.min.x + diagonal * 0.5).abs() < 1e-5);
    }
}

use std::ops::Range;

use crate::utilities::bounding_box::BoundingBox;

use super::motion_geometry::{GeometryType, MotionGeometry};

/// Callback returning the bounds of a primitive at a time step.
pub type BoundsFunction = Box<dyn Fn(usize, usize) -> BoundingBox + Send + Sync>;

/// Geometry whose primitives are only known through a bounds callback.
pub struct UserGeometry {
    num_primitives: usize,
    num_time_steps: usize,
    bounds_function: BoundsFunction,
}

impl UserGeometry {
    pub fn new(num_primitives: usize, num_time_steps: usize, bounds_function: BoundsFunction) -> Self {
        assert!(num_time_steps > 0, "User geometry needs at least one time step.");
        Self {
            num_primitives,
            num_time_steps,
            bounds_function,
        }
    }
}

impl MotionGeometry for UserGeometry {
    fn geometry_type(&self) -> GeometryType {
        GeometryType::User
    }

    fn num_primitives(&self) -> usize {
        self.num_primitives
    }

    fn num_time_steps(&self) -> usize {
        self.num_time_steps
    }

    #[inline]
    fn bounds(&self, prim: usize, itime: usize) -> BoundingBox {
        (self.bounds_function)(prim, itime)
    }

    fn is_valid(&self, prim: usize, itime_range: Range<usize>) -> bool {
        prim < self.num_primitives
            && itime_range.end <= self.num_time_steps
            && itime_range.into_iter().all(|itime| {
                let bounds = self.bounds(prim, itime);
                bounds.is_finite() && !bounds.is_empty()
            })
    }
}

impl std::fmt::Debug for UserGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserGeometry")
            .field("num_primitives", &self.num_primitives)
            .field("num_time_steps", &self.num_time_steps)
            .finish()
    }
}

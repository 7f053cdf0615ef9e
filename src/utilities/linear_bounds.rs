use super::bounding_box::BoundingBox;
use super::time_range::TimeRange;

/// Pair of boxes bounding a moving object at the start and end of a time range.
/// Bounds at intermediate times are obtained by linear interpolation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearBounds {
    pub bounds0: BoundingBox,
    pub bounds1: BoundingBox,
}

impl Default for LinearBounds {
    fn default() -> Self {
        Self::empty()
    }
}

impl LinearBounds {
    #[inline]
    pub fn new(bounds0: BoundingBox, bounds1: BoundingBox) -> Self {
        Self { bounds0, bounds1 }
    }

    #[inline]
    pub fn empty() -> Self {
        Self {
            bounds0: BoundingBox::empty(),
            bounds1: BoundingBox::empty(),
        }
    }

    /// Bounds of an object that does not move.
    #[inline]
    pub fn from_static(bounds: BoundingBox) -> Self {
        Self {
            bounds0: bounds,
            bounds1: bounds,
        }
    }

    /// Fits linear bounds over `time_range` to an object sampled at `num_time_segments + 1`
    /// uniformly spaced steps over `[0,1]`. `bounds_at` returns the bounds at a step index.
    ///
    /// The end boxes are interpolated from the enclosing steps. Every step strictly inside the
    /// range then pushes both end boxes outwards until the interpolated box contains it, so the
    /// result is conservative at all time steps.
    pub fn from_time_steps(
        bounds_at: impl Fn(usize) -> BoundingBox,
        time_range: &TimeRange,
        num_time_segments: usize,
    ) -> Self {
        debug_assert!(num_time_segments > 0, "At least one time segment is required.");
        let segments = num_time_segments as f32;
        let lower = time_range.lower * segments;
        let upper = time_range.upper * segments;
        let ilower_f = lower.floor();
        let iupper_f = upper.ceil();
        let ilower = (ilower_f.max(0.0) as usize).min(num_time_segments);
        let iupper = (iupper_f.max(0.0) as usize).min(num_time_segments);

        let blower0 = bounds_at(ilower);
        let bupper1 = bounds_at(iupper);
        if iupper <= ilower + 1 {
            return Self {
                bounds0: BoundingBox::lerp(&blower0, &bupper1, lower - ilower_f),
                bounds1: BoundingBox::lerp(&bupper1, &blower0, iupper_f - upper),
            };
        }

        let blower1 = bounds_at(ilower + 1);
        let bupper0 = bounds_at(iupper - 1);
        let mut b0 = BoundingBox::lerp(&blower0, &blower1, lower - ilower_f);
        let mut b1 = BoundingBox::lerp(&bupper1, &bupper0, iupper_f - upper);

        for i in ilower + 1..iupper {
            let f = (i as f32 / segments - time_range.lower) / time_range.size();
            let bt = BoundingBox::lerp(&b0, &b1, f);
            let bi = bounds_at(i);
            let dlower = (bi.min - bt.min).min(glam::Vec3::ZERO);
            let dupper = (bi.max - bt.max).max(glam::Vec3::ZERO);
            b0.min += dlower;
            b1.min += dlower;
            b0.max += dupper;
            b1.max += dupper;
        }
        Self {
            bounds0: b0,
            bounds1: b1,
        }
    }

    /// Bounds at local parameter `t` in `[0,1]` of the range these bounds were built for.
    #[inline]
    pub fn interpolate(&self, t: f32) -> BoundingBox {
        BoundingBox::lerp(&self.bounds0, &self.bounds1, t)
    }

    /// Box containing the object over the whole range.
    #[inline]
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::create_merged(self.bounds0, self.bounds1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bounds0.is_empty() && self.bounds1.is_empty()
    }

    #[inline]
    pub fn extend(&mut self, other: &LinearBounds) {
        self.bounds0.extend(&other.bounds0);
        self.bounds1.extend(&other.bounds1);
    }

    #[inline]
    pub fn create_merged(a: &LinearBounds, b: &LinearBounds) -> LinearBounds {
        let mut merged = *a;
        merged.extend(b);
        merged
    }

    /// Average of the half areas at both ends. Cheap stand-in for the expected half area over
    /// the range.
    #[inline]
    pub fn expected_approx_half_area(&self) -> f32 {
        0.5 * (self.bounds0.half_area() + self.bounds1.half_area())
    }

    /// Reparameterizes bounds built over `time_range` so that `interpolate(t)` takes global
    /// scene time instead of the local range parameter.
    #[inline]
    pub fn global(&self, time_range: &TimeRange) -> LinearBounds {
        if *time_range == TimeRange::GLOBAL || time_range.size() <= 0.0 {
            return *self;
        }
        let b0 = self.interpolate(-time_range.lower / time_range.size());
        let b1 = self.interpolate((1.0 - time_range.lower) / time_range.size());
        LinearBounds::new(b0, b1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn moving_box(step: usize) -> BoundingBox {
        // Moves along x, with a detour at step 1.
        let x = match step {
            0 => 0.0,
            1 => 3.0,
            2 => 2.0,
            _ => 3.0,
        };
        BoundingBox::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0))
    }

    #[test]
    fn test_single_segment_is_exact() {
        let lb = LinearBounds::from_time_steps(moving_box, &TimeRange::new(0.0, 1.0 / 3.0), 3);
        assert_eq!(lb.bounds0, moving_box(0));
        assert!(lb.interpolate(1.0).contains(&moving_box(1), 1e-5));
    }

    #[test]
    fn test_multi_segment_fit_contains_every_step() {
        let range = TimeRange::GLOBAL;
        let lb = LinearBounds::from_time_steps(moving_box, &range, 3);
        for step in 0..=3 {
            let t = step as f32 / 3.0;
            assert!(
                lb.interpolate(t).contains(&moving_box(step), 1e-5),
                "step {step} escapes the fitted bounds"
            );
        }
    }

    #[test]
    fn test_global_reparameterization() {
        let range = TimeRange::new(0.5, 1.0);
        let lb = LinearBounds::new(
            BoundingBox::from_point(Vec3::ZERO),
            BoundingBox::from_point(Vec3::new(1.0, 0.0, 0.0)),
        );
        let global = lb.global(&range);
        let at_075 = global.interpolate(0.75);
        assert!((at_075.min.x - 0.5).abs() < 1e-6);
    }
}

use glam::Vec3;

/// Provides simple axis-aligned bounding box functionality.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Location with the lowest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub min: Vec3,
    /// Location with the highest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub max: Vec3,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    /// Constructs a bounding box from the specified minimum and maximum.
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Creates an inverted box which acts as the identity for merging.
    #[inline]
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Creates a degenerate box containing a single point.
    #[inline]
    pub fn from_point(point: Vec3) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    /// Creates the smallest possible bounding box that contains a list of points.
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            panic!("Cannot construct a bounding box from an empty list.");
        }
        let mut min = points[0];
        let mut max = min;
        for point in points.iter().skip(1) {
            min = min.min(*point);
            max = max.max(*point);
        }
        Self { min, max }
    }

    /// Whether the box is inverted on any axis.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Whether both corners are finite. Empty boxes are not finite.
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Grows the box to contain `other`.
    #[inline]
    pub fn extend(&mut self, other: &BoundingBox) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Grows the box to contain `point`.
    #[inline]
    pub fn extend_point(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Computes a bounding box which contains two other bounding boxes.
    #[inline]
    pub fn create_merged(a: Self, b: Self) -> Self {
        Self {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    /// Extent of the box along each axis.
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Twice the center. Used for binning, where the constant factor is irrelevant.
    #[inline]
    pub fn center2(&self) -> Vec3 {
        self.min + self.max
    }

    /// Half of the surface area. Empty boxes report zero.
    #[inline]
    pub fn half_area(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        // Merely proportional to surface area; the constant factor is irrelevant for SAH.
        let offset = self.max - self.min;
        offset.x * offset.y + offset.y * offset.z + offset.x * offset.z
    }

    /// Componentwise linear interpolation between two boxes.
    #[inline]
    pub fn lerp(a: &Self, b: &Self, t: f32) -> Self {
        Self {
            min: a.min.lerp(b.min, t),
            max: a.max.lerp(b.max, t),
        }
    }

    /// Whether `other` lies inside this box, allowing `epsilon` slack on every side.
    #[inline]
    pub fn contains(&self, other: &BoundingBox, epsilon: f32) -> bool {
        let slack = Vec3::splat(epsilon);
        (self.min - slack).cmple(other.min).all() && (self.max + slack).cmpge(other.max).all()
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.min, self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_merge_identity() {
        let b = BoundingBox::new(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(1.0, 3.0, 4.0));
        let mut e = BoundingBox::empty();
        assert!(e.is_empty());
        assert_eq!(e.half_area(), 0.0);
        e.extend(&b);
        assert_eq!(e, b);
    }

    #[test]
    fn test_half_area() {
        let b = BoundingBox::new(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(b.half_area(), 1.0 * 2.0 + 2.0 * 3.0 + 1.0 * 3.0);
    }

    #[test]
    fn test_contains_with_slack() {
        let outer = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let inner = BoundingBox::new(Vec3::splat(0.25), Vec3::splat(1.0 + 1e-6));
        assert!(!outer.contains(&inner, 0.0));
        assert!(outer.contains(&inner, 1e-4));
    }
}

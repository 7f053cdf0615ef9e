/// Closed one dimensional interval over normalized scene time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeRange {
    pub lower: f32,
    pub upper: f32,
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::GLOBAL
    }
}

impl TimeRange {
    /// The full scene time domain.
    pub const GLOBAL: TimeRange = TimeRange {
        lower: 0.0,
        upper: 1.0,
    };

    /// Inverted range acting as the identity for `extend`.
    pub const EMPTY: TimeRange = TimeRange {
        lower: f32::INFINITY,
        upper: f32::NEG_INFINITY,
    };

    #[inline]
    pub fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn size(&self) -> f32 {
        self.upper - self.lower
    }

    #[inline]
    pub fn center(&self) -> f32 {
        0.5 * (self.lower + self.upper)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lower > self.upper
    }

    #[inline]
    pub fn contains(&self, time: f32) -> bool {
        self.lower <= time && time <= self.upper
    }

    /// Whether this range lies within `outer`, allowing `epsilon` slack.
    #[inline]
    pub fn is_within(&self, outer: &TimeRange, epsilon: f32) -> bool {
        self.lower >= outer.lower - epsilon && self.upper <= outer.upper + epsilon
    }

    #[inline]
    pub fn extend(&mut self, other: &TimeRange) {
        self.lower = self.lower.min(other.lower);
        self.upper = self.upper.max(other.upper);
    }

    /// Whether the interiors of both ranges overlap. Touching ranges do not overlap.
    #[inline]
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.lower.max(other.lower) < self.upper.min(other.upper)
    }

    /// Maps a global time into the `[0,1]` parameter of this range.
    #[inline]
    pub fn local_time(&self, time: f32) -> f32 {
        (time - self.lower) / self.size()
    }

    /// Splits the range at `center`, which must lie strictly inside.
    #[inline]
    pub fn split(&self, center: f32) -> (TimeRange, TimeRange) {
        debug_assert!(
            self.lower < center && center < self.upper,
            "Split time must lie strictly inside the range."
        );
        (
            TimeRange::new(self.lower, center),
            TimeRange::new(center, self.upper),
        )
    }

    /// Range of time segment indices, out of `num_time_segments` uniform segments over `[0,1]`,
    /// touched by this range. Boundaries that land within a small tolerance of a step do not
    /// pull in the neighbouring segment.
    #[inline]
    pub fn segment_range(&self, num_time_segments: usize) -> std::ops::Range<usize> {
        let segments = num_time_segments as f32;
        let ilower = (1.0001 * self.lower * segments).floor().max(0.0) as usize;
        let iupper = (0.9999 * self.upper * segments).ceil().max(0.0) as usize;
        let iupper = iupper.min(num_time_segments);
        ilower.min(iupper)..iupper
    }

    /// Time of step `index` for a geometry sampled with `num_time_segments` segments.
    #[inline]
    pub fn time_step(index: usize, num_time_segments: usize) -> f32 {
        index as f32 / num_time_segments as f32
    }

    /// Snaps `time` to the closest time step boundary of a geometry sampled with
    /// `num_time_segments` segments over `geometry_range`.
    #[inline]
    pub fn align_time(time: f32, geometry_range: &TimeRange, num_time_segments: u32) -> f32 {
        let segments = num_time_segments as f32;
        let t = (time - geometry_range.lower) / geometry_range.size();
        (t * segments).round() / segments * geometry_range.size() + geometry_range.lower
    }
}

impl std::fmt::Display for TimeRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.lower, self.upper)
    }
}

pub mod bounding_box;
pub mod linear_bounds;
pub mod memory;
pub mod time_range;

pub use bounding_box::BoundingBox;
pub use linear_bounds::LinearBounds;
pub use time_range::TimeRange;

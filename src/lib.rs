//! Motion blurred bounding volume hierarchy construction.
//!
//! A [`Scene`] holds geometries sampled at uniformly spaced time steps. A builder from the
//! [`BuilderRegistry`] (or one of the builders in [`bvh`] directly) turns the motion blurred
//! geometries of one type into a [`Bvh`] whose bounds contain every primitive at every time.

pub mod builders;
pub mod bvh;
pub mod common;
pub mod geometry;
pub mod utilities;

pub use bvh::{Builder, BuilderConfig, BuilderRegistry, Bvh, BvhBuilderMbSah, BvhBuilderMbSahGrid, PrimitiveKind};
pub use common::{BuildError, DeviceConfig, ProgressFunction, Scene};

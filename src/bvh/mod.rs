//! The motion blurred hierarchy, its nodes, and the builders that produce it.

pub mod builder;
pub mod builder_registry;
pub mod bvh_builder_sah_mb;
pub mod bvh_builder_sah_mb_grid;
pub mod bvh_diagnostics;
pub mod create_leaf;
pub mod hierarchy;
pub mod node;
pub mod size_estimate;

pub use builder::Builder;
pub use builder_registry::{BuilderConstructor, BuilderRegistry, PrimitiveKind};
pub use bvh_builder_sah_mb::{BuilderConfig, BvhBuilderMbSah};
pub use bvh_builder_sah_mb_grid::BvhBuilderMbSahGrid;
pub use bvh_diagnostics::{BvhStatistics, LeafVisit, Slot};
pub use hierarchy::{BuildStatistics, Bvh, MAX_BUILD_DEPTH, MAX_BUILD_DEPTH_LEAF, MAX_DEPTH};
pub use node::{AlignedNodeMb, AlignedNodeMb4d, Node, NodeKind, NodeRecordMb, NodeRef};
pub use size_estimate::SizeEstimate;

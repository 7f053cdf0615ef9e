pub mod bvh_builder_msmblur;
pub mod bvh_builder_sah;
pub mod heuristic_binning;
pub mod primref;
pub mod primref_gen;

pub use bvh_builder_msmblur::{MsmBlurSettings, NodeRecordMb4d, Recalculate};
pub use bvh_builder_sah::{BuildSettings, MAX_BRANCHING_FACTOR};
pub use primref::{BuildPrimRef, PrimInfo, PrimInfoMb, PrimRef, PrimRefMb};

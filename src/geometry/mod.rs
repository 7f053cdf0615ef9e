pub mod grid_mesh;
pub mod instance;
pub mod instance_primitive;
pub mod line4i;
pub mod line_segments;
pub mod motion_geometry;
pub mod object;
pub mod primitive;
pub mod quad4i;
pub mod quad_mesh;
pub mod sub_grid;
pub mod triangle4i;
pub mod triangle4v_mb;
pub mod triangle_mesh;
pub mod user_geometry;

pub use grid_mesh::{Grid, GridMesh};
pub use instance::Instance;
pub use instance_primitive::InstancePrimitive;
pub use line4i::Line4i;
pub use line_segments::LineSegments;
pub use motion_geometry::{Geometry, GeometryType, MotionGeometry};
pub use object::Object;
pub use primitive::{LeafBlock, Primitive};
pub use quad4i::Quad4i;
pub use quad_mesh::QuadMesh;
pub use sub_grid::SubGridQbvh;
pub use triangle4i::Triangle4i;
pub use triangle4v_mb::Triangle4vMb;
pub use triangle_mesh::TriangleMesh;
pub use user_geometry::{BoundsFunction, UserGeometry};

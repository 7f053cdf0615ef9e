use crate::common::scene::Scene;

use super::motion_geometry::GeometryType;
use super::primitive::{LeafBlock, Primitive, INVALID_ID};

/// Reference to one instance. The instance geometry is the only primitive of its geometry id.
#[repr(C, align(64))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstancePrimitive {
    pub instance_id: u32,
}

impl Default for InstancePrimitive {
    fn default() -> Self {
        Self {
            instance_id: INVALID_ID,
        }
    }
}

impl LeafBlock for InstancePrimitive {
    #[inline]
    fn size(&self) -> usize {
        usize::from(self.instance_id != INVALID_ID)
    }

    #[inline]
    fn geom_prim_id(&self, _slot: usize) -> (u32, u32) {
        (self.instance_id, 0)
    }
}

impl Primitive for InstancePrimitive {
    const NAME: &'static str = "instance";
    const MAX_SIZE: usize = 1;
    const GEOMETRY_TYPE: GeometryType = GeometryType::Instance;

    fn set_slot(&mut self, _slot: usize, _scene: &Scene, geom_id: u32, _prim_id: u32, _itime: usize) {
        self.instance_id = geom_id;
    }
}

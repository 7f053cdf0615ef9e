//! Leaf factories turning a range of references into a run of leaf blocks.

use std::marker::PhantomData;

use crate::builders::bvh_builder_msmblur::NodeRecordMb4d;
use crate::builders::primref::{PrimRef, PrimRefMb};
use crate::builders::primref_gen::SubGridBuildData;
use crate::common::scene::Scene;
use crate::geometry::primitive::Primitive;
use crate::geometry::sub_grid::SubGridQbvh;
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::memory::CachedAllocator;
use crate::utilities::time_range::TimeRange;

use super::node::{Node, NodeRecordMb, NodeRef};

/// Allocates `count` blocks produced by `fill` and returns the leaf reference and the union of
/// the block bounds. `fill` is called once per block, in order.
fn alloc_leaf<L>(
    count: usize,
    alloc: &mut CachedAllocator<'_, Node, L>,
    mut fill: impl FnMut() -> (L, LinearBounds),
) -> (NodeRef, LinearBounds) {
    if count == 0 {
        return (NodeRef::EMPTY, LinearBounds::empty());
    }
    let mut bounds = LinearBounds::empty();
    let index = alloc.alloc_leaf_blocks(
        count,
        (0..count).map(|_| {
            let (block, block_bounds) = fill();
            bounds.extend(&block_bounds);
            block
        }),
    );
    (NodeRef::leaf(index, count), bounds)
}

/// Creates leaves bounded over the time segment starting at `itime`.
pub struct CreateMbLeaf<'s, P> {
    scene: &'s Scene,
    itime: usize,
    _marker: PhantomData<fn() -> P>,
}

impl<'s, P: Primitive> CreateMbLeaf<'s, P> {
    pub fn new(scene: &'s Scene, itime: usize) -> Self {
        Self {
            scene,
            itime,
            _marker: PhantomData,
        }
    }

    pub fn create(&self, prims: &[PrimRef], alloc: &mut CachedAllocator<'_, Node, P>) -> NodeRecordMb {
        let mut begin = 0;
        let (node, lbounds) = alloc_leaf(P::blocks(prims.len()), alloc, || {
            P::fill_mb(prims, &mut begin, self.scene, self.itime)
        });
        debug_assert_eq!(begin, prims.len(), "Every reference must land in a leaf block.");
        NodeRecordMb::new(node, lbounds)
    }
}

/// Creates leaves bounded over the time range of the build record.
pub struct CreateMsmBlurLeaf<'s, P> {
    scene: &'s Scene,
    _marker: PhantomData<fn() -> P>,
}

impl<'s, P: Primitive> CreateMsmBlurLeaf<'s, P> {
    pub fn new(scene: &'s Scene) -> Self {
        Self {
            scene,
            _marker: PhantomData,
        }
    }

    pub fn create(
        &self,
        prims: &[PrimRefMb],
        time_range: &TimeRange,
        alloc: &mut CachedAllocator<'_, Node, P>,
    ) -> NodeRecordMb4d<NodeRef> {
        let mut begin = 0;
        let (node, lbounds) = alloc_leaf(P::blocks(prims.len()), alloc, || {
            P::fill_mb_range(prims, &mut begin, self.scene, time_range)
        });
        debug_assert_eq!(begin, prims.len(), "Every reference must land in a leaf block.");
        NodeRecordMb4d::new(node, lbounds, *time_range)
    }
}

/// Sub-grid leaf factory. References index `sgrids`; each block holds up to `branching_factor`
/// sub-grids.
pub struct CreateSubGridLeaf<'s> {
    scene: &'s Scene,
    sgrids: &'s [SubGridBuildData],
    branching_factor: usize,
}

impl<'s> CreateSubGridLeaf<'s> {
    pub fn new(scene: &'s Scene, sgrids: &'s [SubGridBuildData], branching_factor: usize) -> Self {
        Self {
            scene,
            sgrids,
            branching_factor,
        }
    }

    pub fn create_mb(
        &self,
        prims: &[PrimRef],
        itime: usize,
        alloc: &mut CachedAllocator<'_, Node, SubGridQbvh>,
    ) -> NodeRecordMb {
        let count = SubGridQbvh::blocks(prims.len(), self.branching_factor);
        let mut begin = 0;
        let (node, lbounds) = alloc_leaf(count, alloc, || {
            SubGridQbvh::fill_mb(prims, &mut begin, self.scene, self.sgrids, itime, self.branching_factor)
        });
        debug_assert_eq!(begin, prims.len(), "Every sub-grid must land in a leaf block.");
        NodeRecordMb::new(node, lbounds)
    }

    pub fn create_mb_range(
        &self,
        prims: &[PrimRefMb],
        time_range: &TimeRange,
        alloc: &mut CachedAllocator<'_, Node, SubGridQbvh>,
    ) -> NodeRecordMb4d<NodeRef> {
        let count = SubGridQbvh::blocks(prims.len(), self.branching_factor);
        let mut begin = 0;
        let (node, lbounds) = alloc_leaf(count, alloc, || {
            SubGridQbvh::fill_mb_range(
                prims,
                &mut begin,
                self.scene,
                self.sgrids,
                time_range,
                self.branching_factor,
            )
        });
        debug_assert_eq!(begin, prims.len(), "Every sub-grid must land in a leaf block.");
        NodeRecordMb4d::new(node, lbounds, *time_range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bvh::node::NodeKind;
    use crate::geometry::primitive::LeafBlock;
    use crate::geometry::triangle4i::Triangle4i;
    use crate::geometry::triangle_mesh::TriangleMesh;
    use crate::utilities::memory::FastAllocator;
    use glam::Vec3;

    fn strip_scene(count: u32) -> Scene {
        let mut scene = Scene::new();
        let vertices: Vec<Vec3> = (0..count + 2).map(|i| Vec3::new(i as f32, (i % 2) as f32, 0.0)).collect();
        let moved = vertices.iter().map(|v| *v + Vec3::Y).collect();
        let triangles = (0..count).map(|i| [i, i + 1, i + 2]).collect();
        scene.add_geometry(TriangleMesh::new(triangles, vec![vertices, moved]));
        scene
    }

    #[test]
    fn test_leaf_writes_every_reference_once_in_order() {
        let scene = strip_scene(10);
        let prims: Vec<PrimRef> = (0..10)
            .map(|i| PrimRef::new(scene.geometry(0).bounds(i, 0), 0, i as u32))
            .collect();
        let allocator: FastAllocator<Node, Triangle4i> = FastAllocator::new();
        let record = {
            let mut alloc = allocator.cached();
            CreateMbLeaf::<Triangle4i>::new(&scene, 0).create(&prims, &mut alloc)
        };
        assert_eq!(record.node.kind(), NodeKind::Leaf(3));
        assert_eq!(record.lbounds.bounds0.max, Vec3::new(11.0, 1.0, 0.0));
        assert_eq!(record.lbounds.bounds1.max, Vec3::new(11.0, 2.0, 0.0));

        let (_, leaves, _) = allocator.into_arenas();
        let blocks = leaves.slice(record.node.index(), 3);
        let ids: Vec<u32> = blocks
            .iter()
            .flat_map(|block| (0..block.size()).map(move |slot| block.geom_prim_id(slot).1))
            .collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_empty_range_makes_empty_leaf() {
        let scene = strip_scene(1);
        let allocator: FastAllocator<Node, Triangle4i> = FastAllocator::new();
        let mut alloc = allocator.cached();
        let record = CreateMsmBlurLeaf::<Triangle4i>::new(&scene).create(&[], &TimeRange::GLOBAL, &mut alloc);
        assert!(record.node.is_empty());
        assert!(record.lbounds.is_empty());
    }
}

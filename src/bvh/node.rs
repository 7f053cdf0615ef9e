use crate::builders::bvh_builder_msmblur::NodeRecordMb4d;
use crate::builders::bvh_builder_sah::MAX_BRANCHING_FACTOR;
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::memory::{ArenaIndex, CachedAllocator};
use crate::utilities::time_range::TimeRange;

const TAG_BITS: u64 = 4;
const TAG_MASK: u64 = (1 << TAG_BITS) - 1;
const OFFSET_MASK: u64 = (1 << (32 - TAG_BITS)) - 1;

/// Kind of the element a [`NodeRef`] points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Inner node whose children share the node's time range.
    Mb,
    /// Inner node with a time range per child.
    Mb4d,
    /// Run of leaf blocks; the payload is the block count.
    Leaf(usize),
}

/// Tagged handle to a node or leaf run inside the arenas of a hierarchy.
///
/// Layout: chunk index in the upper 32 bits, offset inside the chunk in bits 4..32, and a tag in
/// the lowest 4 bits. Tags 8..16 are leaves whose block count is `tag - 8`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef(u64);

impl NodeRef {
    pub const TAG_NODE_MB: u64 = 1;
    pub const TAG_NODE_MB4D: u64 = 6;
    pub const TAG_LEAF: u64 = 8;
    /// Most blocks a leaf run can reference.
    pub const MAX_LEAF_BLOCKS: usize = 7;

    /// Leaf without any blocks.
    pub const EMPTY: NodeRef = NodeRef(Self::TAG_LEAF);

    #[inline(always)]
    fn encode(index: ArenaIndex, tag: u64) -> Self {
        debug_assert!(
            (index.offset as u64) <= OFFSET_MASK,
            "Chunk offset {} does not fit in a node reference.",
            index.offset
        );
        NodeRef(((index.chunk as u64) << 32) | ((index.offset as u64) << TAG_BITS) | tag)
    }

    #[inline(always)]
    pub fn node_mb(index: ArenaIndex) -> Self {
        Self::encode(index, Self::TAG_NODE_MB)
    }

    #[inline(always)]
    pub fn node_mb4d(index: ArenaIndex) -> Self {
        Self::encode(index, Self::TAG_NODE_MB4D)
    }

    #[inline(always)]
    pub fn leaf(index: ArenaIndex, blocks: usize) -> Self {
        assert!(
            blocks <= Self::MAX_LEAF_BLOCKS,
            "Leaves reference at most {} blocks, got {blocks}.",
            Self::MAX_LEAF_BLOCKS
        );
        Self::encode(index, Self::TAG_LEAF | blocks as u64)
    }

    #[inline(always)]
    pub fn tag(&self) -> u64 {
        self.0 & TAG_MASK
    }

    #[inline(always)]
    pub fn kind(&self) -> NodeKind {
        match self.tag() {
            Self::TAG_NODE_MB => NodeKind::Mb,
            Self::TAG_NODE_MB4D => NodeKind::Mb4d,
            tag => {
                debug_assert!(tag & Self::TAG_LEAF != 0, "Invalid node reference tag {tag}.");
                NodeKind::Leaf((tag & !Self::TAG_LEAF) as usize)
            }
        }
    }

    #[inline(always)]
    pub fn is_leaf(&self) -> bool {
        self.tag() & Self::TAG_LEAF != 0
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Number of blocks of a leaf reference, zero for inner nodes.
    #[inline(always)]
    pub fn leaf_blocks(&self) -> usize {
        match self.kind() {
            NodeKind::Leaf(blocks) => blocks,
            _ => 0,
        }
    }

    /// Location of the node or first leaf block in its arena.
    #[inline(always)]
    pub fn index(&self) -> ArenaIndex {
        ArenaIndex::new((self.0 >> 32) as u32, ((self.0 >> TAG_BITS) & OFFSET_MASK) as u32)
    }
}

impl Default for NodeRef {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.index();
        write!(f, "NodeRef({:?} @ {}:{})", self.kind(), index.chunk, index.offset)
    }
}

/// Handle and bounds of a subtree built for the whole scene time range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeRecordMb {
    pub node: NodeRef,
    pub lbounds: LinearBounds,
}

impl NodeRecordMb {
    #[inline]
    pub fn new(node: NodeRef, lbounds: LinearBounds) -> Self {
        Self { node, lbounds }
    }

    #[inline]
    pub fn empty() -> Self {
        Self::new(NodeRef::EMPTY, LinearBounds::empty())
    }
}

/// Inner node storing linear child bounds. Child bounds are parameterized by global scene time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignedNodeMb {
    pub children: [NodeRef; MAX_BRANCHING_FACTOR],
    pub bounds: [LinearBounds; MAX_BRANCHING_FACTOR],
    pub num_children: u8,
}

impl Default for AlignedNodeMb {
    fn default() -> Self {
        Self {
            children: [NodeRef::EMPTY; MAX_BRANCHING_FACTOR],
            bounds: [LinearBounds::empty(); MAX_BRANCHING_FACTOR],
            num_children: 0,
        }
    }
}

impl AlignedNodeMb {
    #[inline]
    pub fn push(&mut self, child: NodeRef, global_bounds: LinearBounds) {
        let i = self.num_children as usize;
        assert!(i < MAX_BRANCHING_FACTOR, "Node is full.");
        self.children[i] = child;
        self.bounds[i] = global_bounds;
        self.num_children += 1;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.num_children as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_children == 0
    }

    #[inline]
    pub fn child(&self, i: usize) -> NodeRef {
        self.children[i]
    }

    /// Bounds of child `i` at global time `time`.
    #[inline]
    pub fn child_bounds(&self, i: usize, time: f32) -> BoundingBox {
        self.bounds[i].interpolate(time)
    }
}

/// Inner node whose children may cover different sub ranges of the node's time range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignedNodeMb4d {
    pub base: AlignedNodeMb,
    pub time_ranges: [TimeRange; MAX_BRANCHING_FACTOR],
}

impl Default for AlignedNodeMb4d {
    fn default() -> Self {
        Self {
            base: AlignedNodeMb::default(),
            time_ranges: [TimeRange::EMPTY; MAX_BRANCHING_FACTOR],
        }
    }
}

impl AlignedNodeMb4d {
    #[inline]
    pub fn push(&mut self, child: NodeRef, global_bounds: LinearBounds, time_range: TimeRange) {
        self.time_ranges[self.base.len()] = time_range;
        self.base.push(child, global_bounds);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.base.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }
}

/// Element of the node arena.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Node {
    Mb(AlignedNodeMb),
    Mb4d(AlignedNodeMb4d),
}

impl Node {
    /// Children and their global bounds, with per-child time ranges for 4D nodes.
    pub fn children(&self, parent_range: &TimeRange) -> impl Iterator<Item = (NodeRef, LinearBounds, TimeRange)> + '_ {
        let parent_range = *parent_range;
        let (base, ranges) = match self {
            Node::Mb(node) => (node, None),
            Node::Mb4d(node) => (&node.base, Some(&node.time_ranges)),
        };
        (0..base.len()).map(move |i| {
            let range = ranges.map_or(parent_range, |ranges| ranges[i]);
            (base.children[i], base.bounds[i], range)
        })
    }
}

// ── Node factories ─────────────────────────────────────────────────────────

/// Stores an inner node over subtrees that share the scene time range.
pub fn create_aligned_node_mb<L>(children: &[NodeRecordMb], alloc: &mut CachedAllocator<'_, Node, L>) -> NodeRecordMb {
    let mut node = AlignedNodeMb::default();
    let mut bounds = LinearBounds::empty();
    for child in children {
        node.push(child.node, child.lbounds);
        bounds.extend(&child.lbounds);
    }
    NodeRecordMb::new(NodeRef::node_mb(alloc.alloc_node(Node::Mb(node))), bounds)
}

/// Stores an inner node over subtrees built for time ranges. A 4D node is only used when the
/// children cover different time ranges.
pub fn create_aligned_node_mb4d<L>(
    children: &[NodeRecordMb4d<NodeRef>],
    timesplit: bool,
    alloc: &mut CachedAllocator<'_, Node, L>,
) -> NodeRef {
    if !timesplit {
        let mut node = AlignedNodeMb::default();
        for child in children {
            node.push(child.node, child.lbounds.global(&child.time_range));
        }
        return NodeRef::node_mb(alloc.alloc_node(Node::Mb(node)));
    }
    let mut node = AlignedNodeMb4d::default();
    for child in children {
        node.push(child.node, child.lbounds.global(&child.time_range), child.time_range);
    }
    NodeRef::node_mb4d(alloc.alloc_node(Node::Mb4d(node)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::memory::FastAllocator;
    use glam::Vec3;

    #[test]
    fn test_node_ref_round_trips_index_and_tag() {
        let index = ArenaIndex::new(7, 12345);
        let leaf = NodeRef::leaf(index, 3);
        assert_eq!(leaf.kind(), NodeKind::Leaf(3));
        assert_eq!(leaf.index(), index);
        assert!(leaf.is_leaf());
        let node = NodeRef::node_mb4d(index);
        assert_eq!(node.kind(), NodeKind::Mb4d);
        assert_eq!(node.leaf_blocks(), 0);
        assert!(NodeRef::EMPTY.is_empty());
        assert_eq!(NodeRef::EMPTY.kind(), NodeKind::Leaf(0));
    }

    #[test]
    fn test_4d_node_only_for_time_splits() {
        let allocator: FastAllocator<Node, u8> = FastAllocator::new();
        let unit = LinearBounds::from_static(BoundingBox::new(Vec3::ZERO, Vec3::ONE));
        let halves = [
            NodeRecordMb4d::new(NodeRef::EMPTY, unit, TimeRange::new(0.0, 0.5)),
            NodeRecordMb4d::new(NodeRef::EMPTY, unit, TimeRange::new(0.5, 1.0)),
        ];
        let (plain, split) = {
            let mut alloc = allocator.cached();
            let plain = create_aligned_node_mb4d(&halves[..1], false, &mut alloc);
            let split = create_aligned_node_mb4d(&halves, true, &mut alloc);
            (plain, split)
        };
        assert_eq!(plain.kind(), NodeKind::Mb);
        assert_eq!(split.kind(), NodeKind::Mb4d);

        let (nodes, _, _) = allocator.into_arenas();
        let Node::Mb(plain) = nodes.get(plain.index()) else {
            panic!("expected a plain motion blur node");
        };
        assert_eq!(plain.child_bounds(0, 0.25), unit.bounds());
        let Node::Mb4d(node) = nodes.get(split.index()) else {
            panic!("expected a 4D node");
        };
        assert_eq!(node.len(), 2);
        assert_eq!(node.time_ranges[1], TimeRange::new(0.5, 1.0));
        let children: Vec<_> = nodes.get(split.index()).children(&TimeRange::GLOBAL).collect();
        assert_eq!(children[0].2, TimeRange::new(0.0, 0.5));
    }
}

use std::collections::HashMap;

use crate::common::scene::Scene;
use crate::geometry::primitive::LeafBlock;
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::linear_bounds::LinearBounds;
use crate::utilities::time_range::TimeRange;

use super::hierarchy::Bvh;
use super::node::{Node, NodeKind, NodeRef};

/// Slot of a node or leaf inside its parent: global bounds and the time range they hold for.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Slot {
    pub bounds: LinearBounds,
    pub time_range: TimeRange,
}

/// A leaf reached while walking the hierarchy.
#[derive(Clone, Copy, Debug)]
pub struct LeafVisit<'a, L> {
    pub node: NodeRef,
    pub blocks: &'a [L],
    pub slot: Slot,
    pub depth: usize,
}

enum Visit<'a, L> {
    Inner(&'a Node, NodeKind),
    Leaf(LeafVisit<'a, L>),
}

/// Shape of a built hierarchy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BvhStatistics {
    /// Inner nodes, including 4D nodes.
    pub nodes: usize,
    pub nodes_4d: usize,
    /// Non-empty leaves.
    pub leaves: usize,
    pub leaf_blocks: usize,
    /// Items stored across all leaf blocks.
    pub items: usize,
    pub max_depth: usize,
}

impl<L: LeafBlock> Bvh<L> {
    /// Depth first walk. `path` holds the slots from the root down to the visited element.
    fn walk<'a>(
        &'a self,
        node: NodeRef,
        path: &mut Vec<Slot>,
        visit: &mut impl FnMut(&Visit<'a, L>, &[Slot]),
    ) {
        let slot = path[path.len() - 1];
        match node.kind() {
            NodeKind::Leaf(_) => {
                let leaf = LeafVisit {
                    node,
                    blocks: self.leaf_blocks(node),
                    slot,
                    depth: path.len(),
                };
                visit(&Visit::Leaf(leaf), path);
            }
            kind => {
                let inner = self.node(node);
                visit(&Visit::Inner(inner, kind), path);
                for (child, bounds, time_range) in inner.children(&slot.time_range) {
                    path.push(Slot { bounds, time_range });
                    self.walk(child, path, visit);
                    path.pop();
                }
            }
        }
    }

    fn walk_from_root<'a>(&'a self, visit: &mut impl FnMut(&Visit<'a, L>, &[Slot])) {
        let mut path = vec![Slot {
            bounds: *self.bounds(),
            time_range: self.time_range(),
        }];
        self.walk(self.root(), &mut path, visit);
    }

    /// Every non-empty leaf in depth first order.
    pub fn leaves(&self) -> Vec<LeafVisit<'_, L>> {
        let mut leaves = Vec::new();
        self.walk_from_root(&mut |visit, _| {
            if let Visit::Leaf(leaf) = visit {
                if !leaf.blocks.is_empty() {
                    leaves.push(*leaf);
                }
            }
        });
        leaves
    }

    pub fn statistics(&self) -> BvhStatistics {
        let mut statistics = BvhStatistics::default();
        self.walk_from_root(&mut |visit, path| {
            statistics.max_depth = statistics.max_depth.max(path.len());
            match visit {
                Visit::Inner(_, kind) => {
                    statistics.nodes += 1;
                    if *kind == NodeKind::Mb4d {
                        statistics.nodes_4d += 1;
                    }
                }
                Visit::Leaf(leaf) if !leaf.blocks.is_empty() => {
                    statistics.leaves += 1;
                    statistics.leaf_blocks += leaf.blocks.len();
                    statistics.items += leaf.blocks.iter().map(|b| b.size()).sum::<usize>();
                }
                Visit::Leaf(_) => {}
            }
        });
        statistics
    }

    /// Surface area heuristic cost of the hierarchy relative to its root. Lower is better.
    pub fn measure_cost_metric(&self) -> f32 {
        let root_area = slot_area(self.bounds(), &self.time_range());
        if self.is_empty() || self.root().is_leaf() || root_area <= 0.0 {
            return 0.0;
        }
        let mut total_cost = 0.0f32;
        self.walk_from_root(&mut |visit, path| {
            if path.len() < 2 {
                return;
            }
            let slot = &path[path.len() - 1];
            let weight = match visit {
                Visit::Inner(..) => 1.0,
                Visit::Leaf(leaf) => leaf.blocks.len() as f32,
            };
            total_cost += weight * slot_area(&slot.bounds, &slot.time_range);
        });
        total_cost / root_area
    }

    /// Checks the hierarchy against the scene it was built from, panicking on any
    /// inconsistency.
    ///
    /// Every item must be contained in the bounds of its leaf and of every ancestor at the ends
    /// of the leaf's time range and at each time step of its geometry in between. Child time
    /// ranges must nest in their parent's. Single segment hierarchies must store each primitive
    /// exactly once; multi segment hierarchies must store each primitive exactly once per point
    /// in time.
    pub fn validate(&self, scene: &Scene) {
        if self.is_empty() {
            assert_eq!(self.num_primitives(), 0, "Empty hierarchy reports primitives.");
            return;
        }
        let root_extent = self.bounds().bounds();
        let magnitude = root_extent.min.abs().max(root_extent.max.abs()).max_element();
        let epsilon = 1e-4 * (1.0 + magnitude);

        let mut leaf_ranges: HashMap<(u32, u32, u32), Vec<TimeRange>> = HashMap::new();
        let mut items = 0;
        self.walk_from_root(&mut |visit, path| {
            let slot = &path[path.len() - 1];
            if path.len() > 1 {
                let parent = &path[path.len() - 2];
                assert!(
                    slot.time_range.is_within(&parent.time_range, 1e-6),
                    "Child time range {} escapes parent time range {}.",
                    slot.time_range,
                    parent.time_range
                );
            }
            assert!(
                slot.time_range.size() > 0.0,
                "Degenerate time range {} at depth {}.",
                slot.time_range,
                path.len()
            );
            match visit {
                Visit::Inner(node, _) => {
                    let count = node.children(&slot.time_range).count();
                    assert!(
                        (1..=self.branching_factor()).contains(&count),
                        "Node at depth {} has {count} children.",
                        path.len()
                    );
                }
                Visit::Leaf(leaf) => {
                    for block in leaf.blocks {
                        assert!(block.size() > 0, "Empty leaf block at depth {}.", leaf.depth);
                        for item in 0..block.size() {
                            items += 1;
                            validate_item(block, item, scene, path, epsilon);
                            leaf_ranges
                                .entry(block.item_key(item))
                                .or_default()
                                .push(slot.time_range);
                        }
                    }
                }
            }
        });

        assert_eq!(
            leaf_ranges.len(),
            self.num_primitives(),
            "Hierarchy stores {} distinct primitives, expected {}.",
            leaf_ranges.len(),
            self.num_primitives()
        );
        if self.num_time_segments() == 1 {
            assert_eq!(items, self.num_primitives(), "Primitives are stored more than once.");
            return;
        }
        let probes = 2 * self.num_time_segments();
        for (id, ranges) in &leaf_ranges {
            for probe in 0..probes {
                let time = (probe as f32 + 0.5) / probes as f32;
                let covering = ranges
                    .iter()
                    .filter(|range| range.lower <= time && time < range.upper)
                    .count();
                assert_eq!(covering, 1, "Primitive {id:?} is stored {covering} times at time {time}.");
            }
        }
    }
}

/// Expected half area of `bounds` over `time_range`, weighted by the range length.
fn slot_area(bounds: &LinearBounds, time_range: &TimeRange) -> f32 {
    let ends = LinearBounds::new(bounds.interpolate(time_range.lower), bounds.interpolate(time_range.upper));
    ends.expected_approx_half_area() * time_range.size()
}

/// Bounds of an item at global `time`, interpolated between the time steps of its geometry.
fn item_bounds_at<L: LeafBlock>(block: &L, item: usize, scene: &Scene, time: f32) -> BoundingBox {
    let (geom_id, _) = block.geom_prim_id(item);
    let segments = scene.geometry(geom_id).num_time_segments();
    if segments == 0 {
        return block.item_bounds(item, scene, 0);
    }
    let scaled = time.clamp(0.0, 1.0) * segments as f32;
    let itime = (scaled.floor() as usize).min(segments - 1);
    BoundingBox::lerp(
        &block.item_bounds(item, scene, itime),
        &block.item_bounds(item, scene, itime + 1),
        scaled - itime as f32,
    )
}

fn validate_item<L: LeafBlock>(block: &L, item: usize, scene: &Scene, path: &[Slot], epsilon: f32) {
    let range = path[path.len() - 1].time_range;
    let (geom_id, prim_id) = block.geom_prim_id(item);
    let segments = scene.geometry(geom_id).num_time_segments();
    let steps = range
        .segment_range(segments)
        .map(|step| TimeRange::time_step(step, segments))
        .filter(|&time| range.lower < time && time < range.upper);
    let mut probes: Vec<f32> = std::iter::once(range.lower)
        .chain(steps)
        .chain(std::iter::once(range.upper))
        .collect();
    let midpoints: Vec<f32> = probes.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
    probes.extend(midpoints);

    for time in probes {
        let exact = item_bounds_at(block, item, scene, time);
        for (depth, slot) in path.iter().enumerate() {
            let bounds = slot.bounds.interpolate(time);
            assert!(
                bounds.contains(&exact, epsilon),
                "Primitive ({geom_id}, {prim_id}) at time {time} escapes bounds {bounds} at depth {depth}: {exact}."
            );
        }
    }
}

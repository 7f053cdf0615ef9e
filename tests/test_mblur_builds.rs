//! Integration tests: end to end motion blur builds through the builder registry.

mod common;

use std::sync::Arc;

use common::*;
use rust_mblur_bvh::bvh::{Builder, BuilderRegistry, Bvh, BvhBuilderMbSah, BvhBuilderMbSahGrid, PrimitiveKind};
use rust_mblur_bvh::geometry::{
    Geometry, InstancePrimitive, LeafBlock, Line4i, Object, Primitive, Quad4i, SubGridQbvh, Triangle4i, Triangle4vMb,
};
use rust_mblur_bvh::utilities::TimeRange;
use rust_mblur_bvh::common::BuildStage;
use rust_mblur_bvh::{BuildError, DeviceConfig, Scene};

fn registry() -> BuilderRegistry {
    BuilderRegistry::new(DeviceConfig {
        wide_nodes: Some(true),
        ..Default::default()
    })
}

fn create(kind: PrimitiveKind, width: usize, scene: &Arc<Scene>) -> Box<dyn Builder> {
    registry().create(kind, width, Arc::clone(scene)).unwrap()
}

fn bvh_of<P: Primitive>(builder: &dyn Builder) -> &Bvh<P> {
    builder
        .as_any()
        .downcast_ref::<BvhBuilderMbSah<P>>()
        .expect("builder builds a different representation")
        .bvh()
}

fn scene_of(geometries: Vec<Geometry>) -> Arc<Scene> {
    let mut scene = Scene::new();
    for geometry in geometries {
        scene.add_geometry(geometry);
    }
    Arc::new(scene)
}

// ============================================================================
// Time segment selection
// ============================================================================

#[test]
fn test_two_steps_take_single_segment_path() {
    let scene = scene_of(vec![random_triangles(1000, 2, 1).into()]);
    let mut builder = create(PrimitiveKind::Triangle4i, 4, &scene);
    builder.build().unwrap();

    let bvh = bvh_of::<Triangle4i>(builder.as_ref());
    assert_eq!(bvh.num_primitives(), 1000);
    assert_eq!(bvh.num_time_segments(), 1);
    assert_eq!(bvh.time_range(), TimeRange::GLOBAL);
    let statistics = bvh.statistics();
    assert_eq!(statistics.nodes_4d, 0);
    assert_eq!(statistics.items, 1000);
    assert!(statistics.leaf_blocks >= 250, "{} leaf blocks", statistics.leaf_blocks);
    bvh.validate(&scene);
}

#[test]
fn test_four_steps_take_multi_segment_path() {
    let scene = scene_of(vec![random_triangles(1000, 4, 2).into()]);
    let mut builder = create(PrimitiveKind::Triangle4i, 4, &scene);
    builder.build().unwrap();

    let bvh = bvh_of::<Triangle4i>(builder.as_ref());
    assert_eq!(bvh.num_primitives(), 1000);
    assert_eq!(bvh.num_time_segments(), 3);
    assert_eq!(bvh.time_range(), TimeRange::GLOBAL);
    bvh.validate(&scene);
}

#[test]
fn test_single_time_segment_leaves() {
    let scene = scene_of(vec![random_triangles(300, 5, 3).into()]);
    let mut builder = create(PrimitiveKind::Triangle4vMb, 8, &scene);
    builder.build().unwrap();

    let bvh = bvh_of::<Triangle4vMb>(builder.as_ref());
    assert_eq!(bvh.num_time_segments(), 4);
    assert!(bvh.statistics().nodes_4d > 0);
    for leaf in bvh.leaves() {
        let range = leaf.slot.time_range;
        assert!(range.size() <= 0.25 + 1e-6, "leaf spans {range}");
    }
    bvh.validate(&scene);
}

#[test]
fn test_only_motion_blurred_geometry_is_built() {
    let scene = scene_of(vec![
        random_triangles(40, 1, 4).into(),
        random_triangles(60, 2, 5).into(),
        random_quads(30, 2, 6).into(),
    ]);
    let mut builder = create(PrimitiveKind::Triangle4i, 4, &scene);
    builder.build().unwrap();

    let bvh = bvh_of::<Triangle4i>(builder.as_ref());
    assert_eq!(bvh.num_primitives(), 60);
    for leaf in bvh.leaves() {
        for block in leaf.blocks {
            for slot in 0..block.size() {
                assert_eq!(block.geom_prim_id(slot).0, 1);
            }
        }
    }
    bvh.validate(&scene);
}

// ============================================================================
// Edge cases
// ============================================================================

#[test]
fn test_zero_primitives_clear_the_hierarchy() {
    let scene = scene_of(vec![random_triangles(10, 1, 7).into()]);
    let mut builder = create(PrimitiveKind::Triangle4i, 4, &scene);
    builder.build().unwrap();

    let bvh = bvh_of::<Triangle4i>(builder.as_ref());
    assert!(bvh.is_empty());
    assert_eq!(bvh.num_primitives(), 0);
    assert!(bvh.leaf_arena().is_empty());
    assert!(bvh.nodes().is_empty());
    assert!(bvh.last_build().is_none());
    bvh.validate(&scene);
}

#[test]
fn test_single_primitive_makes_one_leaf() {
    for width in [4, 8] {
        let scene = scene_of(vec![random_objects(1, 2, 8).into()]);
        let mut builder = create(PrimitiveKind::Object, width, &scene);
        builder.build().unwrap();

        let bvh = bvh_of::<Object>(builder.as_ref());
        let root = bvh.root();
        assert!(root.is_leaf(), "width {width}: root is {root:?}");
        let blocks = bvh.leaf_blocks(root);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].size(), 1);
        assert_eq!(blocks[0].geom_prim_id(0), (0, 0));
        bvh.validate(&scene);
    }
}

#[test]
fn test_unsupported_width() {
    let registry = BuilderRegistry::new(DeviceConfig {
        wide_nodes: Some(false),
        ..Default::default()
    });
    let result = registry.create(PrimitiveKind::Quad4i, 8, Arc::new(Scene::new()));
    assert!(matches!(result, Err(BuildError::UnsupportedBuilder { .. })));
}

// ============================================================================
// Rebuilds and cancellation
// ============================================================================

#[test]
fn test_rebuild_is_idempotent() {
    let scene = scene_of(vec![random_triangles(500, 3, 9).into()]);
    let mut builder = create(PrimitiveKind::Triangle4i, 8, &scene);
    builder.build().unwrap();
    let (first_statistics, first_bounds, first_count) = {
        let bvh = bvh_of::<Triangle4i>(builder.as_ref());
        (bvh.statistics(), *bvh.bounds(), bvh.num_primitives())
    };

    builder.build().unwrap();
    let bvh = bvh_of::<Triangle4i>(builder.as_ref());
    assert_eq!(bvh.statistics().items, first_statistics.items);
    assert_eq!(bvh.num_primitives(), first_count);
    assert_eq!(*bvh.bounds(), first_bounds);
}

#[test]
fn test_cancellation_keeps_previous_hierarchy() {
    let scene = scene_of(vec![random_triangles(2000, 2, 10).into()]);
    let mut builder = create(PrimitiveKind::Triangle4i, 4, &scene);
    builder.build().unwrap();
    let before = bvh_of::<Triangle4i>(builder.as_ref()).statistics();
    let timings = BuildStage::ALL.map(|stage| bvh_of::<Triangle4i>(builder.as_ref()).profiler.get(stage));

    scene.set_progress_monitor_function(Some(Box::new(|fraction| fraction < 0.25)));
    assert_eq!(builder.build(), Err(BuildError::Cancelled));
    let bvh = bvh_of::<Triangle4i>(builder.as_ref());
    assert_eq!(bvh.statistics(), before);
    assert_eq!(BuildStage::ALL.map(|stage| bvh.profiler.get(stage)), timings);
    assert_eq!(bvh.num_primitives(), 2000);
    bvh.validate(&scene);

    scene.set_progress_monitor_function(None);
    builder.build().unwrap();
}

#[test]
fn test_progress_reaches_completion() {
    let scene = scene_of(vec![random_quads(3000, 2, 11).into()]);
    let last = Arc::new(std::sync::Mutex::new(0.0f64));
    let observed = Arc::clone(&last);
    scene.set_progress_monitor_function(Some(Box::new(move |fraction| {
        let mut last = observed.lock().unwrap();
        *last = last.max(fraction);
        true
    })));
    let mut builder = create(PrimitiveKind::Quad4i, 4, &scene);
    builder.build().unwrap();
    let last = *last.lock().unwrap();
    assert!(last > 0.5 && last <= 1.0, "progress ended at {last}");
}

// ============================================================================
// Other representations
// ============================================================================

#[test]
fn test_quads_and_lines_bound_their_motion() {
    let scene = scene_of(vec![random_quads(400, 3, 12).into(), random_lines(400, 3, 13).into()]);
    let mut quads = create(PrimitiveKind::Quad4i, 4, &scene);
    let mut lines = create(PrimitiveKind::Line4i, 8, &scene);
    quads.build().unwrap();
    lines.build().unwrap();
    bvh_of::<Quad4i>(quads.as_ref()).validate(&scene);
    bvh_of::<Line4i>(lines.as_ref()).validate(&scene);
    assert_eq!(bvh_of::<Line4i>(lines.as_ref()).num_primitives(), 400);
}

#[test]
fn test_instances_use_single_item_leaves() {
    let scene = scene_of((0..50).map(|seed| spinning_instance(3, seed).into()).collect());
    let mut builder = create(PrimitiveKind::Instance, 4, &scene);
    builder.build().unwrap();

    let bvh = bvh_of::<InstancePrimitive>(builder.as_ref());
    assert_eq!(bvh.num_primitives(), 50);
    for leaf in bvh.leaves() {
        assert_eq!(leaf.blocks.len(), 1);
    }
    bvh.validate(&scene);
}

#[test]
fn test_grid_builds() {
    for steps in [2, 3] {
        let scene = scene_of(vec![wave_grid(17, steps, 14).into()]);
        let mut builder = create(PrimitiveKind::Grid, 8, &scene);
        builder.build().unwrap();

        let bvh: &Bvh<SubGridQbvh> = builder
            .as_any()
            .downcast_ref::<BvhBuilderMbSahGrid>()
            .unwrap()
            .bvh();
        assert_eq!(bvh.num_primitives(), 64);
        assert_eq!(bvh.num_time_segments(), steps - 1);
        bvh.validate(&scene);
    }
}

#[test]
fn test_cancelled_grid_build_keeps_previous_hierarchy() {
    let scene = scene_of(vec![wave_grid(33, 3, 15).into()]);
    let mut builder = create(PrimitiveKind::Grid, 4, &scene);
    builder.build().unwrap();
    let grid_bvh = |builder: &dyn Builder| -> (usize, usize) {
        let bvh = builder
            .as_any()
            .downcast_ref::<BvhBuilderMbSahGrid>()
            .unwrap()
            .bvh();
        (bvh.num_primitives(), bvh.statistics().items)
    };
    let before = grid_bvh(builder.as_ref());
    assert_eq!(before.0, 256);

    scene.set_progress_monitor_function(Some(Box::new(|_| false)));
    assert_eq!(builder.build(), Err(BuildError::Cancelled));
    assert_eq!(grid_bvh(builder.as_ref()), before);
}

//! Deterministic scene generators shared by the integration tests.

#![allow(dead_code)]

use glam::{Affine3A, Quat, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_mblur_bvh::geometry::{Grid, GridMesh, Instance, LineSegments, QuadMesh, TriangleMesh, UserGeometry};
use rust_mblur_bvh::utilities::BoundingBox;

fn random_point(rng: &mut StdRng, extent: f32) -> Vec3 {
    Vec3::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
    )
}

/// Offsets of one moving primitive: a random walk with one step per time step.
fn random_motion(rng: &mut StdRng, steps: usize) -> Vec<Vec3> {
    let mut offset = Vec3::ZERO;
    (0..steps)
        .map(|_| {
            let current = offset;
            offset += random_point(rng, 0.5);
            current
        })
        .collect()
}

/// `count` small triangles scattered in a cube, each moving independently over `steps` steps.
pub fn random_triangles(count: usize, steps: usize, seed: u64) -> TriangleMesh {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut vertices = vec![Vec::with_capacity(3 * count); steps];
    for _ in 0..count {
        let center = random_point(&mut rng, 10.0);
        let corners = [0, 1, 2].map(|_| center + random_point(&mut rng, 0.3));
        for (step, offset) in random_motion(&mut rng, steps).into_iter().enumerate() {
            vertices[step].extend(corners.iter().map(|corner| *corner + offset));
        }
    }
    let triangles = (0..count as u32).map(|i| [3 * i, 3 * i + 1, 3 * i + 2]).collect();
    TriangleMesh::new(triangles, vertices)
}

/// `count` moving quads.
pub fn random_quads(count: usize, steps: usize, seed: u64) -> QuadMesh {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut vertices = vec![Vec::with_capacity(4 * count); steps];
    for _ in 0..count {
        let origin = random_point(&mut rng, 10.0);
        let (u, v) = (random_point(&mut rng, 0.4), random_point(&mut rng, 0.4));
        let corners = [origin, origin + u, origin + u + v, origin + v];
        for (step, offset) in random_motion(&mut rng, steps).into_iter().enumerate() {
            vertices[step].extend(corners.iter().map(|corner| *corner + offset));
        }
    }
    let quads = (0..count as u32).map(|i| [4 * i, 4 * i + 1, 4 * i + 2, 4 * i + 3]).collect();
    QuadMesh::new(quads, vertices)
}

/// `count` disconnected moving line segments with random radii.
pub fn random_lines(count: usize, steps: usize, seed: u64) -> LineSegments {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut vertices = vec![Vec::with_capacity(2 * count); steps];
    for _ in 0..count {
        let start = random_point(&mut rng, 10.0);
        let end = start + random_point(&mut rng, 0.5);
        let radius = rng.gen_range(0.01..0.1);
        for (step, offset) in random_motion(&mut rng, steps).into_iter().enumerate() {
            vertices[step].push((start + offset).extend(radius));
            vertices[step].push((end + offset).extend(radius));
        }
    }
    let segments = (0..count as u32).map(|i| 2 * i).collect();
    LineSegments::new(segments, vertices)
}

/// `count` user primitives, unit boxes drifting along a random direction.
pub fn random_objects(count: usize, steps: usize, seed: u64) -> UserGeometry {
    let mut rng = StdRng::seed_from_u64(seed);
    let boxes: Vec<(Vec3, Vec3)> = (0..count)
        .map(|_| (random_point(&mut rng, 10.0), random_point(&mut rng, 1.0)))
        .collect();
    UserGeometry::new(
        count,
        steps,
        Box::new(move |prim, itime| {
            let (origin, velocity) = boxes[prim];
            let min = origin + velocity * itime as f32;
            BoundingBox::new(min, min + Vec3::ONE)
        }),
    )
}

/// An instance of a unit cube rotating and translating over `steps` steps.
pub fn spinning_instance(steps: usize, seed: u64) -> Instance {
    let mut rng = StdRng::seed_from_u64(seed);
    let position = random_point(&mut rng, 10.0);
    let transforms = (0..steps)
        .map(|step| {
            let angle = step as f32 * 0.4;
            Affine3A::from_rotation_translation(Quat::from_rotation_y(angle), position + Vec3::X * step as f32)
        })
        .collect();
    Instance::new(BoundingBox::new(Vec3::splat(-0.5), Vec3::splat(0.5)), transforms)
}

/// One `size` x `size` vertex grid with a wave moving over it.
pub fn wave_grid(size: u16, steps: usize, seed: u64) -> GridMesh {
    let mut rng = StdRng::seed_from_u64(seed);
    let phase: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
    let vertices = (0..steps)
        .map(|step| {
            (0..size)
                .flat_map(|y| {
                    (0..size).map(move |x| {
                        let height = (x as f32 * 0.5 + phase + step as f32).sin();
                        Vec3::new(x as f32, y as f32, height)
                    })
                })
                .collect()
        })
        .collect();
    let grid = Grid {
        start_vertex_index: 0,
        stride: size as u32,
        width: size,
        height: size,
    };
    GridMesh::new(vec![grid], vertices)
}

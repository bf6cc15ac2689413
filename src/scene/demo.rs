// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Seeded demonstration scenes

use super::{MemoryScene, NodeId};
use crate::geometry::{Mesh, Primitive};
use nalgebra::{Matrix4, Rotation3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;

/// Spacing between generated objects, larger than any demo part's search radius
const GRID_SPACING: f64 = 9.0;

/// Random rigid placement on a jittered grid cell
pub fn random_placement(rng: &mut StdRng, cell: usize) -> Matrix4<f64> {
    let columns = 6;
    let base = Vector3::new(
        (cell % columns) as f64 * GRID_SPACING,
        0.0,
        (cell / columns) as f64 * GRID_SPACING,
    );
    let jitter = Vector3::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
    let rotation = Rotation3::from_euler_angles(
        rng.gen_range(0.0..TAU),
        rng.gen_range(0.0..TAU),
        rng.gen_range(0.0..TAU),
    );
    Matrix4::new_translation(&(base + jitter)) * rotation.to_homogeneous()
}

/// Body and lid as two disconnected shells
pub fn canister_mesh() -> Mesh {
    let mut mesh = Primitive::cylinder(2.0, 1.0, 12).to_mesh();
    mesh.set_material("body");

    let mut lid = Primitive::cylinder(0.3, 0.6, 12).to_mesh();
    lid.transform(&Matrix4::new_translation(&Vector3::new(0.0, 1.25, 0.0)));
    lid.set_material("lid");

    mesh.merge(&lid);
    mesh
}

/// `count` cubes, each on its own transform
pub fn cubes(count: usize, seed: u64) -> (MemoryScene, Vec<NodeId>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scene = MemoryScene::new();
    let mut mesh = Primitive::cube(1.0).to_mesh();
    mesh.set_material("grey");

    let nodes = (0..count)
        .map(|i| {
            let placement = random_placement(&mut rng, i);
            scene.add_mesh(&format!("cube{}", i + 1), mesh.clone(), placement, None)
        })
        .collect();
    (scene, nodes)
}

/// `count` canisters baked into one combined mesh at random placements
pub fn canisters(count: usize, seed: u64) -> (MemoryScene, NodeId) {
    clutter(count, 0, seed)
}

/// Canisters plus `junk` one-off cones, all baked into one combined mesh
pub fn clutter(count: usize, junk: usize, seed: u64) -> (MemoryScene, NodeId) {
    let mut rng = StdRng::seed_from_u64(seed);
    let canister = canister_mesh();
    let mut combined = Mesh::new();

    for i in 0..count {
        let placement = random_placement(&mut rng, i);
        combined.merge(&canister.transformed(&placement));
    }

    for j in 0..junk {
        let height = rng.gen_range(0.4..3.0);
        let radius = rng.gen_range(0.2..1.5);
        let segments = rng.gen_range(5..11);
        let mut cone = Primitive::cone(height, radius, segments).to_mesh();
        cone.set_material("junk");
        let placement = random_placement(&mut rng, count + j);
        combined.merge(&cone.transformed(&placement));
    }

    let mut scene = MemoryScene::new();
    let node = scene.add_mesh("combined", combined, Matrix4::identity(), None);
    (scene, node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneGraph;

    #[test]
    fn test_canister_has_two_shells() {
        assert_eq!(canister_mesh().shells().len(), 2);
    }

    #[test]
    fn test_clutter_shell_count() {
        let (scene, node) = clutter(3, 4, 11);
        assert_eq!(scene.mesh(node).unwrap().shells().len(), 3 * 2 + 4);
    }

    #[test]
    fn test_seeded_scenes_repeat() {
        let (a, _) = cubes(4, 5);
        let (b, _) = cubes(4, 5);
        assert_eq!(a, b);
        assert_eq!(a.transforms().len(), 4);
    }
}

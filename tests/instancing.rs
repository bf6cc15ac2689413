// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! End-to-end instancing of loose meshes

use anyhow::Result;
use approx::assert_relative_eq;
use autoinstance::scene::demo;
use autoinstance::{AutoInstancer, InstancerConfig, MemoryScene, NodeId, Primitive, SceneGraph, Space};
use nalgebra::{Matrix4, Point3, Rotation3, Vector3};

fn at(x: f64, y: f64, z: f64) -> Matrix4<f64> {
    Matrix4::new_translation(&Vector3::new(x, y, z))
}

fn three_cubes() -> (MemoryScene, Vec<NodeId>) {
    let mut scene = MemoryScene::new();
    let mut mesh = Primitive::cube(1.0).to_mesh();
    mesh.set_material("grey");
    let nodes = vec![
        scene.add_mesh("cube1", mesh.clone(), at(0.0, 0.0, 0.0), None),
        scene.add_mesh("cube2", mesh.clone(), at(3.0, 0.0, 1.0), None),
        scene.add_mesh("cube3", mesh, at(-2.0, 4.0, 0.5), None),
    ];
    (scene, nodes)
}

fn assert_same_points(before: &[Point3<f64>], after: &[Point3<f64>]) {
    assert_eq!(before.len(), after.len());
    for p in before {
        assert!(
            after.iter().any(|q| (p - q).norm() < 1e-6),
            "point {p:?} moved"
        );
    }
}

#[test]
fn test_three_cubes_become_one_prototype_and_two_instances() -> Result<()> {
    let (mut scene, nodes) = three_cubes();
    let worlds = nodes
        .iter()
        .map(|&n| scene.world_matrix(n))
        .collect::<Result<Vec<_>, _>>()?;

    let config = InstancerConfig {
        tolerance: 0.99,
        ..Default::default()
    };
    let mut instancer = AutoInstancer::new(config);
    let created = instancer.run(&mut scene, None);

    assert_eq!(created.len(), 3);
    assert_eq!(instancer.report().groups_processed, 1);
    assert_eq!(instancer.report().instances_created, 2);
    assert_eq!(scene.geometry_count(), 1);

    for (i, &node) in created.iter().enumerate() {
        assert!(scene.is_instanced(node)?);
        assert_eq!(scene.name(node)?, format!("cube{}", i + 1));
        assert_relative_eq!(scene.world_matrix(node)?, worlds[i], epsilon = 1e-9);
    }

    // Moving or removing the prototype leaves the instances where they are
    let prototype = created[0];
    scene.set_local_matrix(prototype, Matrix4::identity())?;
    assert_relative_eq!(scene.world_matrix(created[1])?, worlds[1], epsilon = 1e-9);
    scene.delete(prototype)?;
    assert_relative_eq!(scene.world_matrix(created[2])?, worlds[2], epsilon = 1e-9);
    assert!(scene.has_renderable_shape(created[2]));
    Ok(())
}

#[test]
fn test_off_center_pivots_keep_their_world_transforms() -> Result<()> {
    let mut scene = MemoryScene::new();
    let mesh = Primitive::cuboid(Vector3::new(1.0, 4.0, 2.0))
        .to_mesh()
        .transformed(&at(0.5, 0.0, 0.0));
    let turn = Rotation3::from_axis_angle(&Vector3::y_axis(), 0.7).to_homogeneous();
    let nodes = [
        scene.add_mesh("left", mesh.clone(), Matrix4::identity(), None),
        scene.add_mesh("right", mesh, at(5.0, 0.0, -2.0) * turn, None),
    ];
    let worlds = nodes
        .iter()
        .map(|&n| scene.world_matrix(n))
        .collect::<Result<Vec<_>, _>>()?;

    let created = AutoInstancer::default().run(&mut scene, Some(&nodes));
    assert_eq!(created.len(), 2);
    assert_eq!(scene.geometry_count(), 1);

    for (name, world) in ["left", "right"].iter().zip(&worlds) {
        let node = scene.find(name).expect("node keeps its name");
        assert!(created.contains(&node));
        assert_relative_eq!(scene.world_matrix(node)?, *world, epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn test_material_change_excludes_one_cube() -> Result<()> {
    let (mut scene, nodes) = three_cubes();
    scene.set_material(nodes[1], "red")?;

    let mut instancer = AutoInstancer::default();
    let created = instancer.run(&mut scene, Some(&nodes));

    assert_eq!(created.len(), 2);
    assert_eq!(instancer.report().instances_created, 1);
    let odd = scene.find("cube2").expect("cube2 survives");
    assert!(!scene.is_instanced(odd)?);
    assert_eq!(scene.geometry_count(), 2);

    // Without material matching all three share one shape
    let (mut scene, nodes) = three_cubes();
    scene.set_material(nodes[1], "red")?;
    let config = InstancerConfig {
        require_same_material: false,
        ..Default::default()
    };
    AutoInstancer::new(config).run(&mut scene, Some(&nodes));
    assert_eq!(scene.geometry_count(), 1);
    Ok(())
}

#[test]
fn test_baked_rotation_matches_but_mirror_does_not() -> Result<()> {
    let mut scene = MemoryScene::new();
    let mesh = Primitive::tetrahedron(Vector3::new(1.0, 2.0, 3.0)).to_mesh();
    let turn = Rotation3::from_euler_angles(0.3, -0.7, 1.1).to_homogeneous();
    let mirror = Matrix4::new_nonuniform_scaling(&Vector3::new(-1.0, 1.0, 1.0));

    let plain = scene.add_mesh("plain", mesh.clone(), at(0.0, 0.0, 0.0), None);
    let turned = scene.add_mesh("turned", mesh.clone(), at(6.0, 0.0, 0.0) * turn, None);
    let baked = scene.add_mesh("baked", mesh.transformed(&turn), at(12.0, 0.0, 0.0), None);
    let mirrored = scene.add_mesh("mirrored", mesh.transformed(&mirror), at(18.0, 0.0, 0.0), None);
    let nodes = [plain, turned, baked, mirrored];

    let names = ["plain", "turned", "baked", "mirrored"];
    let before = nodes
        .iter()
        .map(|&n| scene.points(n, Space::World))
        .collect::<Result<Vec<_>, _>>()?;

    let mut instancer = AutoInstancer::default();
    instancer.run(&mut scene, Some(&nodes));
    assert_eq!(instancer.report().instances_created, 2);

    for (name, points) in names.iter().zip(&before) {
        let node = scene.find(name).expect("node keeps its name");
        assert_same_points(points, &scene.points(node, Space::World)?);
        assert_eq!(scene.is_instanced(node)?, *name != "mirrored", "{name}");
    }
    assert_eq!(scene.geometry_count(), 2);
    Ok(())
}

#[test]
fn test_second_run_creates_nothing() -> Result<()> {
    let (mut scene, nodes) = demo::cubes(5, 21);
    let mut instancer = AutoInstancer::default();
    instancer.run(&mut scene, Some(&nodes));
    assert_eq!(instancer.report().instances_created, 4);

    let snapshot = scene.clone();
    let worlds = scene
        .transforms()
        .into_iter()
        .map(|n| scene.world_matrix(n).map(|w| (n, w)))
        .collect::<Result<Vec<_>, _>>()?;

    let created = instancer.run(&mut scene, None);
    assert!(created.is_empty());
    assert_eq!(instancer.report().instances_created, 0);
    assert_eq!(scene.node_count(), snapshot.node_count());
    assert_eq!(scene.geometry_count(), 1);
    for (node, world) in worlds {
        assert_relative_eq!(scene.world_matrix(node)?, world, epsilon = 1e-9);
    }
    Ok(())
}

#[test]
fn test_instances_keep_parent_and_visibility() -> Result<()> {
    let mut scene = MemoryScene::new();
    let shelf = scene.create_group("shelf", None)?;
    scene.set_local_matrix(shelf, at(0.0, 2.0, 0.0))?;
    let mesh = Primitive::cylinder(1.0, 0.3, 10).to_mesh();
    let a = scene.add_mesh("jar_a", mesh.clone(), at(0.0, 0.0, 0.0), Some(shelf));
    let b = scene.add_mesh("jar_b", mesh, at(1.5, 0.0, 0.0), Some(shelf));
    scene.set_visible(b, false)?;

    let created = AutoInstancer::default().run(&mut scene, Some(&[a, b]));
    assert_eq!(created.len(), 2);

    let jar_b = scene.find("jar_b").expect("jar_b survives");
    assert_eq!(scene.parent(jar_b)?, Some(shelf));
    assert!(!scene.is_visible(jar_b)?);
    assert_eq!(scene.children(shelf)?.len(), 2);
    Ok(())
}

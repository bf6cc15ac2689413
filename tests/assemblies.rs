// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Assembly reconstruction from combined meshes, end to end

use anyhow::Result;
use autoinstance::scene::demo;
use autoinstance::{AssemblyMode, AutoInstancer, InstancerConfig, MemoryScene, NodeId, SceneGraph, Space};
use nalgebra::Point3;

fn hierarchy_config() -> InstancerConfig {
    InstancerConfig {
        separate_combined: true,
        assembly_mode: AssemblyMode::Hierarchy,
        ..Default::default()
    }
}

fn world_points(scene: &MemoryScene) -> Result<Vec<Point3<f64>>> {
    let mut points = Vec::new();
    for node in scene.transforms() {
        if scene.has_renderable_shape(node) {
            points.extend(scene.points(node, Space::World)?);
        }
    }
    Ok(points)
}

fn assert_same_points(before: &[Point3<f64>], after: &[Point3<f64>]) {
    assert_eq!(before.len(), after.len());
    for p in before {
        assert!(after.iter().any(|q| (p - q).norm() < 1e-6), "point {p:?} moved");
    }
}

/// Sorted materials of a group's children
fn child_materials(scene: &MemoryScene, group: NodeId) -> Result<Vec<String>> {
    let mut materials = Vec::new();
    for child in scene.children(group)? {
        materials.extend(scene.materials(child)?);
    }
    materials.sort();
    Ok(materials)
}

fn canister_groups(scene: &MemoryScene) -> Result<Vec<NodeId>> {
    let mut groups = Vec::new();
    for node in scene.transforms() {
        if !scene.has_renderable_shape(node) && child_materials(scene, node)? == ["body", "lid"] {
            groups.push(node);
        }
    }
    Ok(groups)
}

#[test]
fn test_canisters_are_rebuilt_and_instanced() -> Result<()> {
    let count = 5;
    let (mut scene, combined) = demo::canisters(count, 17);
    let before = scene.points(combined, Space::World)?;

    let mut instancer = AutoInstancer::new(hierarchy_config());
    instancer.run(&mut scene, Some(&[combined]));

    assert!(!scene.exists(combined));
    let roots = scene.roots();
    assert_eq!(roots.len(), count);
    for &root in &roots {
        assert!(scene.name(root)?.starts_with("Assembly_"));
        assert_eq!(scene.children(root)?.len(), 2);
        assert_eq!(child_materials(&scene, root)?, ["body", "lid"]);
    }

    // One body shape and one lid shape left
    assert_eq!(scene.geometry_count(), 2);
    assert!(instancer.report().instances_created >= count - 1);
    assert_same_points(&before, &world_points(&scene)?);
    Ok(())
}

#[test]
fn test_canisters_survive_clutter() -> Result<()> {
    let (count, junk) = (6, 4);
    let (mut scene, combined) = demo::clutter(count, junk, 5);
    let before = scene.points(combined, Space::World)?;

    AutoInstancer::new(hierarchy_config()).run(&mut scene, Some(&[combined]));

    assert!(canister_groups(&scene)?.len() >= count - 1);

    let mut cones = 0;
    let mut bodies = std::collections::BTreeSet::new();
    for node in scene.transforms() {
        if !scene.has_renderable_shape(node) {
            continue;
        }
        match scene.materials(node)?.as_slice() {
            [m] if m == "junk" => cones += 1,
            [m] if m == "body" => {
                bodies.insert(scene.geometry_key(node)?);
            }
            _ => {}
        }
    }
    assert_eq!(cones, junk);
    assert_eq!(bodies.len(), 1);
    assert_same_points(&before, &world_points(&scene)?);
    Ok(())
}

#[test]
fn test_cluster_mode_splits_into_fixed_groups() -> Result<()> {
    let (mut scene, combined) = demo::canisters(4, 3);
    let config = InstancerConfig {
        assembly_mode: AssemblyMode::Cluster,
        cluster_count: 4,
        ..hierarchy_config()
    };
    AutoInstancer::new(config).run(&mut scene, Some(&[combined]));

    assert_eq!(canister_groups(&scene)?.len(), 4);
    assert_eq!(scene.roots().len(), 4);
    assert_eq!(scene.geometry_count(), 2);
    Ok(())
}

#[test]
fn test_combined_assemblies_match_as_single_meshes() -> Result<()> {
    let (mut scene, combined) = demo::canisters(3, 9);
    let before = scene.points(combined, Space::World)?;
    let config = InstancerConfig {
        combine_assemblies: true,
        ..hierarchy_config()
    };

    let mut instancer = AutoInstancer::new(config);
    let created = instancer.run(&mut scene, Some(&[combined]));

    assert_eq!(created.len(), 3);
    assert_eq!(scene.node_count(), 3);
    assert_eq!(scene.geometry_count(), 1);
    for node in scene.roots() {
        assert!(scene.name(node)?.ends_with("_combined"));
        assert!(scene.children(node)?.is_empty());
    }
    assert_same_points(&before, &world_points(&scene)?);
    Ok(())
}

#[test]
fn test_hierarchy_matching_of_prebuilt_groups() -> Result<()> {
    // Assemblies already grouped by hand: match them as wholes
    let (mut scene, combined) = demo::canisters(3, 12);
    let mut instancer = AutoInstancer::new(hierarchy_config());
    instancer.run(&mut scene, Some(&[combined]));
    let groups = scene.roots();

    let config = InstancerConfig {
        check_hierarchy: true,
        ..Default::default()
    };
    let found = AutoInstancer::new(config).find_instance_groups(&scene, Some(&groups));
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].size(), 3);
    Ok(())
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene and configuration files feeding a run

use anyhow::Result;
use autoinstance::scene::demo;
use autoinstance::{io, AssemblyMode, AutoInstancer, InstancerConfig, SceneGraph};
use tempfile::tempdir;

#[test]
fn test_saved_scene_instances_like_the_original() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("cubes.json");
    let (scene, _) = demo::cubes(4, 2);
    io::save_scene(&scene, &path)?;

    let mut loaded = io::load_scene(&path)?;
    let mut instancer = AutoInstancer::default();
    let created = instancer.run(&mut loaded, None);
    assert_eq!(created.len(), 4);

    let out = dir.path().join("instanced.json");
    io::save_scene(&loaded, &out)?;
    let reloaded = io::load_scene(&out)?;
    assert_eq!(reloaded.geometry_count(), 1);
    assert!(reloaded.transforms().iter().all(|&n| reloaded.is_instanced(n).unwrap_or(false)));
    Ok(())
}

#[test]
fn test_config_file_drives_the_run() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("autoinstance.toml");
    std::fs::write(
        &path,
        "separate_combined = true\nassembly_mode = \"hierarchy\"\nsearch_radius_mult = 1.5\n",
    )?;

    let config = InstancerConfig::from_file(&path)?;
    assert_eq!(config.assembly_mode, AssemblyMode::Hierarchy);
    assert!(config.separate_combined);
    assert!(config.require_same_material);

    let (mut scene, combined) = demo::canisters(3, 4);
    AutoInstancer::new(config).run(&mut scene, Some(&[combined]));
    assert_eq!(scene.roots().len(), 3);
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "tolerance = -0.5\n")?;
    assert!(InstancerConfig::from_file(&path).is_err());

    std::fs::write(&path, "assembly_mode = \"spiral\"\n")?;
    assert!(InstancerConfig::from_file(&path).is_err());
    Ok(())
}

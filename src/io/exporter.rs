// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene file exporter

use crate::scene::MemoryScene;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Write `scene` as pretty-printed JSON
pub fn save_scene(scene: &MemoryScene, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(scene).context("Failed to serialize scene")?;
    fs::write(path, json).with_context(|| format!("Failed to write scene file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::load_scene;
    use crate::scene::{demo, SceneGraph};
    use approx::assert_relative_eq;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("scene.json");
        let (scene, nodes) = demo::cubes(3, 4);

        save_scene(&scene, &path)?;
        let loaded = load_scene(&path)?;
        assert_eq!(loaded.node_count(), 3);
        assert_eq!(loaded.geometry_count(), 3);
        assert_eq!(loaded.name(nodes[2])?, "cube3");
        assert_relative_eq!(loaded.world_matrix(nodes[2])?, scene.world_matrix(nodes[2])?, epsilon = 1e-12);
        Ok(())
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene file importer

use crate::scene::MemoryScene;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Read a JSON scene file and check its links
pub fn load_scene(path: impl AsRef<Path>) -> Result<MemoryScene> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).with_context(|| format!("Failed to read scene file: {}", path.display()))?;

    let scene: MemoryScene =
        serde_json::from_str(&source).with_context(|| format!("Failed to parse scene file: {}", path.display()))?;
    scene
        .validate()
        .with_context(|| format!("Scene file is inconsistent: {}", path.display()))?;
    Ok(scene)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_rejects_garbage() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "cube([10, 10, 10]);")?;

        let err = load_scene(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse scene file"));
        Ok(())
    }

    #[test]
    fn test_rejects_broken_links() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        let identity = "[1.0,0.0,0.0,0.0,0.0,1.0,0.0,0.0,0.0,0.0,1.0,0.0,0.0,0.0,0.0,1.0]";
        write!(
            file,
            r#"{{"nodes":[{{"name":"orphan","parent":5,"local":{identity}}}],"geometries":[]}}"#
        )?;

        let err = load_scene(file.path()).unwrap_err();
        assert!(err.to_string().contains("inconsistent"));
        Ok(())
    }
}

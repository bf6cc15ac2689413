// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Instancer configuration

use crate::strategy::StrategyConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File read by [`InstancerConfig::load`] when present
pub const DEFAULT_CONFIG_FILE: &str = "autoinstance.toml";

/// How loose shells are gathered into assemblies before matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyMode {
    /// Match shells as they are
    #[default]
    None,
    /// Infer parent/child assemblies from proximity and size
    Hierarchy,
    /// Split into `cluster_count` spatial clusters
    Cluster,
}

impl std::str::FromStr for AssemblyMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "hierarchy" => Ok(Self::Hierarchy),
            "cluster" => Ok(Self::Cluster),
            other => bail!("unknown assembly mode '{other}' (expected none, hierarchy or cluster)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancerConfig {
    /// Geometric tolerance for every equality stage
    pub tolerance: f64,
    pub require_same_material: bool,
    pub check_uvs: bool,
    pub uv_tolerance: f64,
    /// Match whole subtrees instead of single meshes
    pub check_hierarchy: bool,
    /// Split multi-shell meshes before matching
    pub separate_combined: bool,
    pub assembly_mode: AssemblyMode,
    pub cluster_count: usize,
    /// Merge each assembly into one mesh before matching
    pub combine_assemblies: bool,
    /// Peer-body search radius as a multiple of the root's diagonal
    pub search_radius_mult: f64,
    pub area_precision: u32,
    pub eigen_precision: u32,
    pub distance_precision: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyConfig>,
}

impl Default for InstancerConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.001,
            require_same_material: true,
            check_uvs: false,
            uv_tolerance: 0.001,
            check_hierarchy: false,
            separate_combined: false,
            assembly_mode: AssemblyMode::None,
            cluster_count: 1,
            combine_assemblies: false,
            search_radius_mult: 1.5,
            area_precision: 2,
            eigen_precision: 3,
            distance_precision: 2,
            strategy: None,
        }
    }
}

impl InstancerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: InstancerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or `autoinstance.toml` if it exists, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if PathBuf::from(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Self::default(),
        };

        if let Ok(tolerance) = std::env::var("AUTOINSTANCE_TOLERANCE") {
            config.tolerance = tolerance
                .parse()
                .with_context(|| format!("AUTOINSTANCE_TOLERANCE is not a number: {tolerance}"))?;
        }

        if let Ok(value) = std::env::var("AUTOINSTANCE_REQUIRE_MATERIAL") {
            config.require_same_material = value.parse().unwrap_or(config.require_same_material);
        }

        if let Ok(value) = std::env::var("AUTOINSTANCE_CHECK_UVS") {
            config.check_uvs = value.parse().unwrap_or(config.check_uvs);
        }

        if let Ok(value) = std::env::var("AUTOINSTANCE_CHECK_HIERARCHY") {
            config.check_hierarchy = value.parse().unwrap_or(config.check_hierarchy);
        }

        if let Ok(value) = std::env::var("AUTOINSTANCE_SEPARATE") {
            config.separate_combined = value.parse().unwrap_or(config.separate_combined);
        }

        if let Ok(value) = std::env::var("AUTOINSTANCE_RADIUS_MULT") {
            config.search_radius_mult = value
                .parse()
                .with_context(|| format!("AUTOINSTANCE_RADIUS_MULT is not a number: {value}"))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            bail!("tolerance must be a finite non-negative number, got {}", self.tolerance);
        }
        if !self.uv_tolerance.is_finite() || self.uv_tolerance < 0.0 {
            bail!("uv_tolerance must be a finite non-negative number, got {}", self.uv_tolerance);
        }
        if !self.search_radius_mult.is_finite() || self.search_radius_mult <= 0.0 {
            bail!("search_radius_mult must be positive, got {}", self.search_radius_mult);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = InstancerConfig::default();
        assert_eq!(config.tolerance, 0.001);
        assert!(config.require_same_material);
        assert_eq!(config.assembly_mode, AssemblyMode::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("autoinstance.toml");

        let config = InstancerConfig {
            tolerance: 0.5,
            assembly_mode: AssemblyMode::Hierarchy,
            strategy: Some(StrategyConfig::default()),
            ..Default::default()
        };
        config.save(&path)?;

        let loaded = InstancerConfig::from_file(&path)?;
        assert_eq!(loaded, config);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("partial.toml");
        std::fs::write(&path, "tolerance = 0.25\nassembly_mode = \"cluster\"\ncluster_count = 4\n")?;

        let config = InstancerConfig::from_file(&path)?;
        assert_eq!(config.tolerance, 0.25);
        assert_eq!(config.assembly_mode, AssemblyMode::Cluster);
        assert_eq!(config.cluster_count, 4);
        assert_eq!(config.search_radius_mult, 1.5);
        Ok(())
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let negative = InstancerConfig {
            tolerance: -1.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());

        let radius = InstancerConfig {
            search_radius_mult: 0.0,
            ..Default::default()
        };
        assert!(radius.validate().is_err());
    }

    #[test]
    fn test_assembly_mode_parsing() {
        assert_eq!("Hierarchy".parse::<AssemblyMode>().unwrap(), AssemblyMode::Hierarchy);
        assert!("tree".parse::<AssemblyMode>().is_err());
    }
}

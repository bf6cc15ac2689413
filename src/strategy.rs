// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Advice on whether a duplicate group is worth instancing

use serde::{Deserialize, Serialize};

/// Below this many triangles a mesh is cheap enough to merge
const MICRO_TRIANGLES: usize = 300;
const LIGHTMAPPED_TRIANGLES: usize = 1500;
const STANDARD_TRIANGLES: usize = 800;
const HEAVY_TRIANGLES: usize = 5000;
const MANY_COPIES: usize = 10;
const HEAVY_COPIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstancingStrategy {
    Bake,
    Combine,
    GpuInstance,
    KeepSeparate,
}

impl std::fmt::Display for InstancingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bake => "bake",
            Self::Combine => "combine",
            Self::GpuInstance => "gpu-instance",
            Self::KeepSeparate => "keep-separate",
        };
        f.write_str(name)
    }
}

/// How the target engine will treat the objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub is_static: bool,
    pub needs_individual_control: bool,
    pub will_be_lightmapped: bool,
    pub can_gpu_instance: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            is_static: true,
            needs_individual_control: false,
            will_be_lightmapped: false,
            can_gpu_instance: true,
        }
    }
}

impl StrategyConfig {
    /// Strategy for `group_size` copies of a mesh with `triangle_count` triangles
    pub fn evaluate(&self, group_size: usize, triangle_count: usize) -> InstancingStrategy {
        if self.needs_individual_control {
            return InstancingStrategy::KeepSeparate;
        }
        if !self.is_static {
            return if self.can_gpu_instance {
                InstancingStrategy::GpuInstance
            } else {
                InstancingStrategy::KeepSeparate
            };
        }

        if triangle_count < MICRO_TRIANGLES {
            return if group_size > 1 {
                InstancingStrategy::Combine
            } else {
                InstancingStrategy::KeepSeparate
            };
        }

        if !self.can_gpu_instance {
            return InstancingStrategy::Combine;
        }

        let threshold = if self.will_be_lightmapped {
            LIGHTMAPPED_TRIANGLES
        } else {
            STANDARD_TRIANGLES
        };
        if triangle_count >= threshold && group_size >= MANY_COPIES {
            return InstancingStrategy::GpuInstance;
        }
        if triangle_count >= HEAVY_TRIANGLES && group_size >= HEAVY_COPIES {
            return InstancingStrategy::GpuInstance;
        }

        InstancingStrategy::Combine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hard_constraints() {
        let individual = StrategyConfig {
            needs_individual_control: true,
            ..Default::default()
        };
        assert_eq!(individual.evaluate(50, 10_000), InstancingStrategy::KeepSeparate);

        let dynamic = StrategyConfig {
            is_static: false,
            ..Default::default()
        };
        assert_eq!(dynamic.evaluate(2, 10), InstancingStrategy::GpuInstance);

        let dynamic_no_gpu = StrategyConfig {
            can_gpu_instance: false,
            ..dynamic
        };
        assert_eq!(dynamic_no_gpu.evaluate(2, 10), InstancingStrategy::KeepSeparate);
    }

    #[test]
    fn test_micro_meshes_combine() {
        let config = StrategyConfig::default();
        assert_eq!(config.evaluate(12, 12), InstancingStrategy::Combine);
        assert_eq!(config.evaluate(1, 12), InstancingStrategy::KeepSeparate);
    }

    #[test]
    fn test_triangle_and_copy_thresholds() {
        let config = StrategyConfig::default();
        assert_eq!(config.evaluate(10, 800), InstancingStrategy::GpuInstance);
        assert_eq!(config.evaluate(9, 800), InstancingStrategy::Combine);
        assert_eq!(config.evaluate(3, 5000), InstancingStrategy::GpuInstance);

        let lightmapped = StrategyConfig {
            will_be_lightmapped: true,
            ..config
        };
        assert_eq!(lightmapped.evaluate(10, 800), InstancingStrategy::Combine);
        assert_eq!(lightmapped.evaluate(10, 1500), InstancingStrategy::GpuInstance);

        let no_gpu = StrategyConfig {
            can_gpu_instance: false,
            ..config
        };
        assert_eq!(no_gpu.evaluate(100, 100_000), InstancingStrategy::Combine);
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! autoinstance
//!
//! Finds geometrically identical meshes in an unstructured scene, rebuilds
//! multi-part assemblies from loose shells, and turns duplicates into
//! shared-geometry instances of one prototype.
//!
//! The host scene is reached only through [`SceneGraph`]; [`MemoryScene`] is
//! a complete in-memory implementation.

pub mod assembly;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod geometry;
pub mod instancer;
pub mod io;
pub mod matching;
pub mod report;
pub mod scene;
pub mod strategy;

pub use config::{AssemblyMode, InstancerConfig};
pub use error::{SceneError, SceneResult};
pub use executor::{GroupOutcome, InstancingExecutor};
pub use geometry::{Mesh, Primitive};
pub use instancer::AutoInstancer;
pub use matching::{EqualityEngine, InstanceCandidate, InstanceGroup, InstanceGroupBuilder, MatchStage};
pub use report::{GroupReport, RunReport, SkipRecord, Stage};
pub use scene::{MemoryScene, NodeId, SceneGraph, Space};
pub use strategy::{InstancingStrategy, StrategyConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cubes() {
        let (mut scene, nodes) = scene::demo::cubes(3, 1);
        let created = AutoInstancer::default().run(&mut scene, Some(&nodes));
        assert_eq!(created.len(), 3);
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Per-shell geometric metrics

use crate::error::{SceneError, SceneResult};
use crate::geometry::{analytics, BoundingBox};
use crate::scene::{MeshCounts, NodeId, SceneGraph, Space};
use nalgebra::{Point3, Vector3};
use serde::Serialize;
use tracing::debug;

/// Role a shell plays in a reconstructed assembly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellClass {
    #[default]
    Unassigned,
    /// Assembly root candidate
    Body,
    /// Claimed as a child of a body
    Part,
    /// Left unattached by clutter reduction
    Clutter,
}

/// Metrics of one connected mesh piece, all in world space
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellInfo {
    pub node: NodeId,
    pub name: String,
    pub counts: MeshCounts,
    pub bbox: BoundingBox,
    /// Bounding box center
    pub center: Point3<f64>,
    pub size: Vector3<f64>,
    pub diagonal: f64,
    pub bbox_volume: f64,
    /// Enclosed volume, smaller than true for open meshes
    pub volume: f64,
    pub area: f64,
    /// Mean vertex position
    pub centroid: Point3<f64>,
    pub class: ShellClass,
}

pub struct ShellAnalyzer;

impl ShellAnalyzer {
    /// Measure one shell. Read-only.
    pub fn analyze<S: SceneGraph + ?Sized>(scene: &S, node: NodeId) -> SceneResult<ShellInfo> {
        if !scene.exists(node) {
            return Err(SceneError::StaleReference(node));
        }
        if !scene.has_renderable_shape(node) {
            return Err(SceneError::NoGeometry(node));
        }

        let points = scene.points(node, Space::World)?;
        let stats = analytics::analyze(&points, &scene.triangles(node)?);

        Ok(ShellInfo {
            node,
            name: scene.name(node)?,
            counts: scene.counts(node)?,
            bbox: stats.bbox,
            center: stats.bbox.center(),
            size: stats.bbox.size(),
            diagonal: stats.bbox.diagonal(),
            bbox_volume: stats.bbox.volume(),
            volume: stats.volume,
            area: stats.surface_area,
            centroid: stats.centroid,
            class: ShellClass::Unassigned,
        })
    }

    /// Measure every node that still carries geometry, in input order
    pub fn analyze_all<S: SceneGraph + ?Sized>(scene: &S, nodes: &[NodeId]) -> Vec<ShellInfo> {
        nodes
            .iter()
            .filter_map(|&node| match Self::analyze(scene, node) {
                Ok(info) => Some(info),
                Err(err) => {
                    debug!(%node, stage = "analyze", kind = err.kind(), "skipping shell: {err}");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use crate::scene::MemoryScene;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Rotation3};

    #[test]
    fn test_metrics_are_world_space() {
        let mut scene = MemoryScene::new();
        let placement = Matrix4::new_translation(&Vector3::new(3.0, 0.0, 0.0))
            * Rotation3::from_euler_angles(0.4, 1.1, -0.3).to_homogeneous();
        let node = scene.add_mesh("box", Primitive::cuboid(Vector3::new(1.0, 2.0, 3.0)).to_mesh(), placement, None);

        let info = ShellAnalyzer::analyze(&scene, node).unwrap();
        assert_eq!(info.counts.vertices, 8);
        assert_eq!(info.counts.edges, 12);
        assert_relative_eq!(info.volume, 6.0, epsilon = 1e-9);
        assert_relative_eq!(info.area, 22.0, epsilon = 1e-9);
        assert_relative_eq!(info.centroid, Point3::new(3.0, 0.0, 0.0), epsilon = 1e-9);
        assert!(info.bbox_volume >= info.volume);
        assert_eq!(info.class, ShellClass::Unassigned);
    }

    #[test]
    fn test_groups_and_stale_nodes_are_filtered() {
        let mut scene = MemoryScene::new();
        let group = scene.create_group("empty", None).unwrap();
        let cube = scene.add_mesh("cube", Primitive::cube(1.0).to_mesh(), Matrix4::identity(), None);
        let gone = scene.add_mesh("gone", Primitive::cube(1.0).to_mesh(), Matrix4::identity(), None);
        scene.delete(gone).unwrap();

        assert_eq!(ShellAnalyzer::analyze(&scene, group), Err(SceneError::NoGeometry(group)));
        let infos = ShellAnalyzer::analyze_all(&scene, &[group, cube, gone]);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].node, cube);
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Abstract scene-graph contract consumed by the instancer
//!
//! The host owns every node. Any id may go stale between two calls, so all
//! queries return [`SceneResult`] and callers skip what has disappeared.

pub mod demo;
mod memory;

pub use memory::MemoryScene;

use crate::error::{SceneError, SceneResult};
use crate::geometry::{analytics, BoundingBox, UvSet};
use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a transform node in the host scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coordinate space for point queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    Object,
    World,
}

/// What `duplicate` copies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMode {
    /// The transform alone: placement, parent, visibility, attributes
    TransformOnly,
    /// The transform, its geometry, and its whole subtree
    Full,
}

/// Topology counts of a shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MeshCounts {
    pub vertices: usize,
    pub edges: usize,
    pub faces: usize,
    pub triangles: usize,
}

/// Operations the instancer needs from a host scene graph.
pub trait SceneGraph {
    /// Every transform node in a stable order
    fn transforms(&self) -> Vec<NodeId>;

    /// Current selection, possibly empty
    fn selection(&self) -> Vec<NodeId>;

    fn exists(&self, node: NodeId) -> bool;

    fn name(&self, node: NodeId) -> SceneResult<String>;

    fn rename(&mut self, node: NodeId, name: &str) -> SceneResult<()>;

    fn parent(&self, node: NodeId) -> SceneResult<Option<NodeId>>;

    fn children(&self, node: NodeId) -> SceneResult<Vec<NodeId>>;

    /// Whether the transform carries a renderable mesh shape
    fn has_renderable_shape(&self, node: NodeId) -> bool;

    fn is_visible(&self, node: NodeId) -> SceneResult<bool>;

    fn local_matrix(&self, node: NodeId) -> SceneResult<Matrix4<f64>>;

    fn set_local_matrix(&mut self, node: NodeId, matrix: Matrix4<f64>) -> SceneResult<()>;

    fn world_matrix(&self, node: NodeId) -> SceneResult<Matrix4<f64>>;

    /// Shape vertex positions
    fn points(&self, node: NodeId, space: Space) -> SceneResult<Vec<Point3<f64>>>;

    /// Overwrite shape vertex positions; the count must not change
    fn set_points(&mut self, node: NodeId, points: &[Point3<f64>], space: Space) -> SceneResult<()>;

    /// Triangulated shape indices into `points`
    fn triangles(&self, node: NodeId) -> SceneResult<Vec<[usize; 3]>>;

    fn counts(&self, node: NodeId) -> SceneResult<MeshCounts>;

    /// Sorted unique material names assigned to the shape
    fn materials(&self, node: NodeId) -> SceneResult<Vec<String>>;

    fn uv_sets(&self, node: NodeId) -> SceneResult<Vec<UvSet>>;

    /// Whether the shape is shared with another transform
    fn is_instanced(&self, node: NodeId) -> SceneResult<bool>;

    /// Identity of the shape data; equal keys mean shared geometry
    fn geometry_key(&self, node: NodeId) -> SceneResult<Option<u64>>;

    /// Split a multi-shell shape into one transform per shell.
    ///
    /// Returns the new transforms, or `[node]` when there is one shell.
    fn separate(&mut self, node: NodeId) -> SceneResult<Vec<NodeId>>;

    /// Merge shapes into one world-space mesh on a new top-level transform.
    /// The inputs are deleted.
    fn unite(&mut self, nodes: &[NodeId], name: &str) -> SceneResult<NodeId>;

    /// Empty transform with an identity local matrix
    fn create_group(&mut self, name: &str, parent: Option<NodeId>) -> SceneResult<NodeId>;

    fn duplicate(&mut self, node: NodeId, mode: DuplicateMode) -> SceneResult<NodeId>;

    /// New transform subtree sharing the shapes of `node` and its descendants
    fn instance(&mut self, node: NodeId) -> SceneResult<NodeId>;

    /// Move `node` under `parent` (or to the top level) keeping its world placement.
    ///
    /// Fails with [`SceneError::Cycle`] if `parent` is `node` or one of its descendants.
    fn reparent(&mut self, node: NodeId, parent: Option<NodeId>) -> SceneResult<()>;

    /// Move the shape of `from` onto `to`; `from` is left without geometry
    fn transfer_shape(&mut self, from: NodeId, to: NodeId) -> SceneResult<()>;

    /// Delete a node and its subtree
    fn delete(&mut self, node: NodeId) -> SceneResult<()>;

    /// Copy user attributes and lock state
    fn copy_attributes(&mut self, from: NodeId, to: NodeId) -> SceneResult<()>;

    /// Number of ancestors
    fn depth(&self, node: NodeId) -> SceneResult<usize> {
        let mut depth = 0;
        let mut current = self.parent(node)?;
        while let Some(parent) = current {
            depth += 1;
            current = self.parent(parent)?;
        }
        Ok(depth)
    }

    /// Set the local matrix so the node lands at `world`
    fn set_world_matrix(&mut self, node: NodeId, world: Matrix4<f64>) -> SceneResult<()> {
        let local = match self.parent(node)? {
            Some(parent) => {
                let parent_world = self.world_matrix(parent)?;
                let inverse = parent_world
                    .try_inverse()
                    .ok_or_else(|| SceneError::Operation(format!("parent of {node} is singular")))?;
                inverse * world
            }
            None => world,
        };
        self.set_local_matrix(node, local)
    }

    fn world_bounding_box(&self, node: NodeId) -> SceneResult<BoundingBox> {
        Ok(BoundingBox::from_points(&self.points(node, Space::World)?))
    }

    /// World-space surface area of the shape
    fn surface_area(&self, node: NodeId) -> SceneResult<f64> {
        let points = self.points(node, Space::World)?;
        Ok(analytics::surface_area(&points, &self.triangles(node)?))
    }

    /// Node and all of its descendants, depth first
    fn subtree(&self, node: NodeId) -> SceneResult<Vec<NodeId>> {
        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            result.push(current);
            let mut children = self.children(current)?;
            children.reverse();
            stack.extend(children);
        }
        Ok(result)
    }
}

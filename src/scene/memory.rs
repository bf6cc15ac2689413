// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! In-memory scene graph
//!
//! Nodes and shapes live in slot arenas; a deleted slot becomes `None` so
//! stale ids are detected instead of aliasing new nodes. Instancing is
//! several transforms pointing at one geometry slot.

use super::{DuplicateMode, MeshCounts, NodeId, SceneGraph, Space};
use crate::error::{SceneError, SceneResult};
use crate::geometry::{Mesh, UvSet};
use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

fn default_visible() -> bool {
    true
}

/// One transform node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneNode {
    pub name: String,
    #[serde(default)]
    pub parent: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    pub local: Matrix4<f64>,
    /// Index into the geometry arena
    #[serde(default)]
    pub geometry: Option<usize>,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
    #[serde(default)]
    pub locked: BTreeSet<String>,
}

impl SceneNode {
    fn new(name: &str, parent: Option<NodeId>, local: Matrix4<f64>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            local,
            geometry: None,
            visible: true,
            attributes: BTreeMap::new(),
            locked: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryScene {
    nodes: Vec<Option<SceneNode>>,
    geometries: Vec<Option<Mesh>>,
    #[serde(default)]
    selection: Vec<NodeId>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a transform carrying `mesh` (object space) at `local`
    pub fn add_mesh(&mut self, name: &str, mesh: Mesh, local: Matrix4<f64>, parent: Option<NodeId>) -> NodeId {
        let geometry = self.add_geometry(mesh);
        let id = self.insert_node(SceneNode::new(name, parent, local));
        self.attach(id, parent);
        if let Some(node) = self.slot_mut(id) {
            node.geometry = Some(geometry);
        }
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id.0 as usize).and_then(Option::as_ref)
    }

    /// Geometry carried by a transform
    pub fn mesh(&self, id: NodeId) -> Option<&Mesh> {
        let geometry = self.node(id)?.geometry?;
        self.geometries.get(geometry).and_then(Option::as_ref)
    }

    /// First live node with the given name
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.transforms()
            .into_iter()
            .find(|&id| self.node(id).is_some_and(|n| n.name == name))
    }

    /// Live top-level nodes
    pub fn roots(&self) -> Vec<NodeId> {
        self.transforms()
            .into_iter()
            .filter(|&id| self.node(id).is_some_and(|n| n.parent.is_none()))
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    /// Number of distinct live shapes
    pub fn geometry_count(&self) -> usize {
        self.geometries.iter().flatten().count()
    }

    pub fn set_selection(&mut self, selection: Vec<NodeId>) {
        self.selection = selection;
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> SceneResult<()> {
        self.live_mut(id)?.visible = visible;
        Ok(())
    }

    /// Assign one material to every face of the node's shape
    pub fn set_material(&mut self, id: NodeId, material: &str) -> SceneResult<()> {
        self.mesh_mut(id)?.set_material(material);
        Ok(())
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: f64) -> SceneResult<()> {
        self.live_mut(id)?.attributes.insert(name.to_string(), value);
        Ok(())
    }

    pub fn lock(&mut self, id: NodeId, attribute: &str) -> SceneResult<()> {
        self.live_mut(id)?.locked.insert(attribute.to_string());
        Ok(())
    }

    /// Check parent/child links and geometry indices after deserialization
    pub fn validate(&self) -> SceneResult<()> {
        for id in self.transforms() {
            let node = self.live(id)?;
            if let Some(parent) = node.parent {
                if !self.live(parent)?.children.contains(&id) {
                    return Err(SceneError::Operation(format!(
                        "{id} names {parent} as parent but is not among its children"
                    )));
                }
            }
            for &child in &node.children {
                if self.live(child)?.parent != Some(id) {
                    return Err(SceneError::Operation(format!(
                        "{child} is listed under {id} but has another parent"
                    )));
                }
            }
            if let Some(geometry) = node.geometry {
                if self.geometries.get(geometry).and_then(Option::as_ref).is_none() {
                    return Err(SceneError::Operation(format!(
                        "{id} references missing geometry {geometry}"
                    )));
                }
            }
            if self.is_ancestor(id, id)? {
                return Err(SceneError::Cycle { node: id, parent: id });
            }
        }
        Ok(())
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    fn live(&self, id: NodeId) -> SceneResult<&SceneNode> {
        self.node(id).ok_or(SceneError::StaleReference(id))
    }

    fn live_mut(&mut self, id: NodeId) -> SceneResult<&mut SceneNode> {
        self.slot_mut(id).ok_or(SceneError::StaleReference(id))
    }

    fn mesh_ref(&self, id: NodeId) -> SceneResult<&Mesh> {
        let geometry = self.live(id)?.geometry.ok_or(SceneError::NoGeometry(id))?;
        self.geometries
            .get(geometry)
            .and_then(Option::as_ref)
            .ok_or(SceneError::NoGeometry(id))
    }

    fn mesh_mut(&mut self, id: NodeId) -> SceneResult<&mut Mesh> {
        let geometry = self.live(id)?.geometry.ok_or(SceneError::NoGeometry(id))?;
        self.geometries
            .get_mut(geometry)
            .and_then(Option::as_mut)
            .ok_or(SceneError::NoGeometry(id))
    }

    fn add_geometry(&mut self, mesh: Mesh) -> usize {
        self.geometries.push(Some(mesh));
        self.geometries.len() - 1
    }

    fn insert_node(&mut self, node: SceneNode) -> NodeId {
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() as u64 - 1)
    }

    fn attach(&mut self, id: NodeId, parent: Option<NodeId>) {
        if let Some(parent) = parent {
            if let Some(node) = self.slot_mut(parent) {
                node.children.push(id);
            }
        }
        if let Some(node) = self.slot_mut(id) {
            node.parent = parent;
        }
    }

    fn detach(&mut self, id: NodeId) {
        let parent = self.node(id).and_then(|n| n.parent);
        if let Some(parent) = parent.and_then(|p| self.slot_mut(p)) {
            parent.children.retain(|&c| c != id);
        }
        if let Some(node) = self.slot_mut(id) {
            node.parent = None;
        }
    }

    /// Insert `id` right after `sibling` in the sibling's parent
    fn attach_after(&mut self, id: NodeId, sibling: NodeId) -> SceneResult<()> {
        let parent = self.live(sibling)?.parent;
        if let Some(parent) = parent {
            let node = self.live_mut(parent)?;
            let position = node
                .children
                .iter()
                .position(|&c| c == sibling)
                .map_or(node.children.len(), |p| p + 1);
            node.children.insert(position, id);
        }
        self.live_mut(id)?.parent = parent;
        Ok(())
    }

    /// Whether `ancestor` is `node` or above it
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> SceneResult<bool> {
        let mut current = self.live(node)?.parent;
        let mut steps = 0;
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            steps += 1;
            if steps > self.nodes.len() {
                return Err(SceneError::Cycle { node, parent: id });
            }
            current = self.live(id)?.parent;
        }
        Ok(false)
    }

    fn geometry_users(&self, geometry: usize) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| n.geometry == Some(geometry))
            .count()
    }

    fn release_geometry(&mut self, geometry: Option<usize>) {
        if let Some(geometry) = geometry {
            if self.geometry_users(geometry) == 0 {
                if let Some(slot) = self.geometries.get_mut(geometry) {
                    *slot = None;
                }
            }
        }
    }

    fn copy_node(&self, id: NodeId) -> SceneResult<SceneNode> {
        let mut copy = self.live(id)?.clone();
        copy.children.clear();
        copy.parent = None;
        copy.geometry = None;
        Ok(copy)
    }

    fn clone_subtree(&mut self, id: NodeId, share_geometry: bool) -> SceneResult<NodeId> {
        let mut copy = self.copy_node(id)?;
        let source_geometry = self.live(id)?.geometry;
        copy.geometry = match source_geometry {
            Some(geometry) if share_geometry => Some(geometry),
            Some(_) => {
                let mesh = self.mesh_ref(id)?.clone();
                Some(self.add_geometry(mesh))
            }
            None => None,
        };
        let new_id = self.insert_node(copy);

        for child in self.live(id)?.children.clone() {
            let new_child = self.clone_subtree(child, share_geometry)?;
            self.attach(new_child, Some(new_id));
        }
        Ok(new_id)
    }
}

impl SceneGraph for MemoryScene {
    fn transforms(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NodeId(i as u64))
            .collect()
    }

    fn selection(&self) -> Vec<NodeId> {
        self.selection.iter().copied().filter(|&id| self.exists(id)).collect()
    }

    fn exists(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    fn name(&self, node: NodeId) -> SceneResult<String> {
        Ok(self.live(node)?.name.clone())
    }

    fn rename(&mut self, node: NodeId, name: &str) -> SceneResult<()> {
        self.live_mut(node)?.name = name.to_string();
        Ok(())
    }

    fn parent(&self, node: NodeId) -> SceneResult<Option<NodeId>> {
        Ok(self.live(node)?.parent)
    }

    fn children(&self, node: NodeId) -> SceneResult<Vec<NodeId>> {
        Ok(self.live(node)?.children.clone())
    }

    fn has_renderable_shape(&self, node: NodeId) -> bool {
        self.mesh_ref(node).is_ok_and(|mesh| !mesh.faces.is_empty())
    }

    fn is_visible(&self, node: NodeId) -> SceneResult<bool> {
        Ok(self.live(node)?.visible)
    }

    fn local_matrix(&self, node: NodeId) -> SceneResult<Matrix4<f64>> {
        Ok(self.live(node)?.local)
    }

    fn set_local_matrix(&mut self, node: NodeId, matrix: Matrix4<f64>) -> SceneResult<()> {
        self.live_mut(node)?.local = matrix;
        Ok(())
    }

    fn world_matrix(&self, node: NodeId) -> SceneResult<Matrix4<f64>> {
        let mut current = self.live(node)?;
        let mut world = current.local;
        while let Some(parent) = current.parent {
            current = self.live(parent)?;
            world = current.local * world;
        }
        Ok(world)
    }

    fn points(&self, node: NodeId, space: Space) -> SceneResult<Vec<Point3<f64>>> {
        let positions = &self.mesh_ref(node)?.positions;
        match space {
            Space::Object => Ok(positions.clone()),
            Space::World => {
                let world = self.world_matrix(node)?;
                Ok(positions.iter().map(|p| world.transform_point(p)).collect())
            }
        }
    }

    fn set_points(&mut self, node: NodeId, points: &[Point3<f64>], space: Space) -> SceneResult<()> {
        let local_points: Vec<Point3<f64>> = match space {
            Space::Object => points.to_vec(),
            Space::World => {
                let inverse = self
                    .world_matrix(node)?
                    .try_inverse()
                    .ok_or_else(|| SceneError::Operation(format!("world matrix of {node} is singular")))?;
                points.iter().map(|p| inverse.transform_point(p)).collect()
            }
        };

        let mesh = self.mesh_mut(node)?;
        if mesh.positions.len() != local_points.len() {
            return Err(SceneError::Operation(format!(
                "{node} has {} points, {} were given",
                mesh.positions.len(),
                local_points.len()
            )));
        }
        mesh.positions = local_points;
        Ok(())
    }

    fn triangles(&self, node: NodeId) -> SceneResult<Vec<[usize; 3]>> {
        Ok(self.mesh_ref(node)?.triangles())
    }

    fn counts(&self, node: NodeId) -> SceneResult<MeshCounts> {
        let mesh = self.mesh_ref(node)?;
        Ok(MeshCounts {
            vertices: mesh.vertex_count(),
            edges: mesh.edge_count(),
            faces: mesh.face_count(),
            triangles: mesh.triangle_count(),
        })
    }

    fn materials(&self, node: NodeId) -> SceneResult<Vec<String>> {
        Ok(self.mesh_ref(node)?.materials())
    }

    fn uv_sets(&self, node: NodeId) -> SceneResult<Vec<UvSet>> {
        Ok(self.mesh_ref(node)?.uv_sets.clone())
    }

    fn is_instanced(&self, node: NodeId) -> SceneResult<bool> {
        let geometry = self.live(node)?.geometry.ok_or(SceneError::NoGeometry(node))?;
        Ok(self.geometry_users(geometry) > 1)
    }

    fn geometry_key(&self, node: NodeId) -> SceneResult<Option<u64>> {
        Ok(self.live(node)?.geometry.map(|g| g as u64))
    }

    fn separate(&mut self, node: NodeId) -> SceneResult<Vec<NodeId>> {
        let mesh = self.mesh_ref(node)?;
        let shells = mesh.shells();
        if shells.len() <= 1 {
            return Ok(vec![node]);
        }

        let pieces: Vec<Mesh> = shells.iter().map(|faces| mesh.extract(faces)).collect();
        let base = self.live(node)?.name.clone();
        let geometry = self.live_mut(node)?.geometry.take();
        self.release_geometry(geometry);

        // The source transform stays behind as an empty group
        let mut created = Vec::with_capacity(pieces.len());
        for (i, piece) in pieces.into_iter().enumerate() {
            let name = format!("{}_{}", base, i + 1);
            created.push(self.add_mesh(&name, piece, Matrix4::identity(), Some(node)));
        }
        Ok(created)
    }

    fn unite(&mut self, nodes: &[NodeId], name: &str) -> SceneResult<NodeId> {
        if nodes.is_empty() {
            return Err(SceneError::Operation("nothing to unite".to_string()));
        }

        let mut combined = Mesh::new();
        for &node in nodes {
            let world = self.world_matrix(node)?;
            combined.merge(&self.mesh_ref(node)?.transformed(&world));
        }

        for &node in nodes {
            let parent = self.live(node)?.parent;
            for child in self.children(node)? {
                self.reparent(child, parent)?;
            }
            self.delete(node)?;
        }

        Ok(self.add_mesh(name, combined, Matrix4::identity(), None))
    }

    fn create_group(&mut self, name: &str, parent: Option<NodeId>) -> SceneResult<NodeId> {
        if let Some(parent) = parent {
            self.live(parent)?;
        }
        let id = self.insert_node(SceneNode::new(name, parent, Matrix4::identity()));
        self.attach(id, parent);
        Ok(id)
    }

    fn duplicate(&mut self, node: NodeId, mode: DuplicateMode) -> SceneResult<NodeId> {
        let id = match mode {
            DuplicateMode::TransformOnly => {
                let copy = self.copy_node(node)?;
                self.insert_node(copy)
            }
            DuplicateMode::Full => self.clone_subtree(node, false)?,
        };
        self.attach_after(id, node)?;
        Ok(id)
    }

    fn instance(&mut self, node: NodeId) -> SceneResult<NodeId> {
        let id = self.clone_subtree(node, true)?;
        self.attach_after(id, node)?;
        Ok(id)
    }

    fn reparent(&mut self, node: NodeId, parent: Option<NodeId>) -> SceneResult<()> {
        let world = self.world_matrix(node)?;
        let local = match parent {
            Some(parent) => {
                if parent == node || self.is_ancestor(node, parent)? {
                    return Err(SceneError::Cycle { node, parent });
                }
                self.world_matrix(parent)?
                    .try_inverse()
                    .ok_or_else(|| SceneError::Operation(format!("world matrix of {parent} is singular")))?
                    * world
            }
            None => world,
        };

        self.detach(node);
        self.attach(node, parent);
        self.live_mut(node)?.local = local;
        Ok(())
    }

    fn transfer_shape(&mut self, from: NodeId, to: NodeId) -> SceneResult<()> {
        self.live(to)?;
        let geometry = self.live_mut(from)?.geometry.take().ok_or(SceneError::NoGeometry(from))?;
        let previous = self.live_mut(to)?.geometry.replace(geometry);
        self.release_geometry(previous);
        Ok(())
    }

    fn delete(&mut self, node: NodeId) -> SceneResult<()> {
        let doomed = self.subtree(node)?;
        self.detach(node);

        let mut released = Vec::new();
        for id in doomed {
            if let Some(slot) = self.nodes.get_mut(id.0 as usize) {
                if let Some(removed) = slot.take() {
                    released.push(removed.geometry);
                }
            }
        }
        for geometry in released {
            self.release_geometry(geometry);
        }
        Ok(())
    }

    fn copy_attributes(&mut self, from: NodeId, to: NodeId) -> SceneResult<()> {
        let source = self.live(from)?;
        let attributes = source.attributes.clone();
        let locked = source.locked.clone();

        let target = self.live_mut(to)?;
        target.attributes.extend(attributes);
        target.locked.extend(locked);
        Ok(())
    }
}

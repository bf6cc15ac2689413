// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Polygon mesh representation and utilities

use super::{BoundingBox, DisjointSet};
use ahash::AHashSet;
use nalgebra::{Matrix4, Point3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Polygon face with an optional material assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub indices: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
}

impl Face {
    pub fn new(indices: impl Into<Vec<usize>>) -> Self {
        Self {
            indices: indices.into(),
            material: None,
        }
    }
}

/// Per-vertex UV coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UvSet {
    pub name: String,
    pub coords: Vec<[f64; 2]>,
}

/// Polygon mesh
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<Point3<f64>>,
    pub faces: Vec<Face>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uv_sets: Vec<UvSet>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertex_count: usize, face_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count),
            faces: Vec::with_capacity(face_count),
            uv_sets: Vec::new(),
        }
    }

    /// Add a vertex and return its index
    pub fn add_vertex(&mut self, position: Point3<f64>) -> usize {
        let index = self.positions.len();
        self.positions.push(position);
        index
    }

    /// Add a polygon face
    pub fn add_face(&mut self, indices: impl Into<Vec<usize>>) {
        self.faces.push(Face::new(indices));
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Number of unique undirected edges
    pub fn edge_count(&self) -> usize {
        let mut edges = AHashSet::new();
        for face in &self.faces {
            let n = face.indices.len();
            for i in 0..n {
                let a = face.indices[i];
                let b = face.indices[(i + 1) % n];
                if a != b {
                    edges.insert((a.min(b), a.max(b)));
                }
            }
        }
        edges.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.faces
            .iter()
            .map(|face| face.indices.len().saturating_sub(2))
            .sum()
    }

    /// Fan-triangulate every polygon
    pub fn triangles(&self) -> Vec<[usize; 3]> {
        let mut triangles = Vec::with_capacity(self.triangle_count());
        for face in &self.faces {
            if face.indices.len() < 3 {
                continue;
            }
            let first = face.indices[0];
            for pair in face.indices[1..].windows(2) {
                triangles.push([first, pair[0], pair[1]]);
            }
        }
        triangles
    }

    /// Transform all vertices by a matrix
    pub fn transform(&mut self, matrix: &Matrix4<f64>) {
        for position in &mut self.positions {
            *position = matrix.transform_point(position);
        }
    }

    pub fn transformed(&self, matrix: &Matrix4<f64>) -> Mesh {
        let mut mesh = self.clone();
        mesh.transform(matrix);
        mesh
    }

    pub fn bounding_box(&self) -> BoundingBox {
        BoundingBox::from_points(&self.positions)
    }

    /// Assign one material to every face
    pub fn set_material(&mut self, material: &str) {
        for face in &mut self.faces {
            face.material = Some(material.to_string());
        }
    }

    /// Sorted unique material names
    pub fn materials(&self) -> Vec<String> {
        let names: BTreeSet<&String> = self
            .faces
            .iter()
            .filter_map(|face| face.material.as_ref())
            .collect();
        names.into_iter().cloned().collect()
    }

    /// Faces of each connected component, ordered by their lowest face index
    pub fn shells(&self) -> Vec<Vec<usize>> {
        let mut set = DisjointSet::new(self.positions.len());
        for face in &self.faces {
            if let Some((&first, rest)) = face.indices.split_first() {
                for &index in rest {
                    set.union(first, index);
                }
            }
        }

        let mut shells: Vec<Vec<usize>> = Vec::new();
        let mut shell_of_root: Vec<Option<usize>> = vec![None; self.positions.len()];
        for (face_index, face) in self.faces.iter().enumerate() {
            let Some(&first) = face.indices.first() else {
                continue;
            };
            let root = set.find(first);
            let slot = match shell_of_root[root] {
                Some(slot) => slot,
                None => {
                    shell_of_root[root] = Some(shells.len());
                    shells.push(Vec::new());
                    shells.len() - 1
                }
            };
            shells[slot].push(face_index);
        }
        shells
    }

    /// Copy out a subset of faces, keeping the original relative vertex order
    pub fn extract(&self, face_ids: &[usize]) -> Mesh {
        let used: BTreeSet<usize> = face_ids
            .iter()
            .flat_map(|&f| self.faces[f].indices.iter().copied())
            .collect();

        let mut remap = vec![usize::MAX; self.positions.len()];
        let mut mesh = Mesh::with_capacity(used.len(), face_ids.len());
        for &old in &used {
            remap[old] = mesh.add_vertex(self.positions[old]);
        }
        for &f in face_ids {
            let face = &self.faces[f];
            mesh.faces.push(Face {
                indices: face.indices.iter().map(|&i| remap[i]).collect(),
                material: face.material.clone(),
            });
        }
        mesh.uv_sets = self
            .uv_sets
            .iter()
            .map(|set| UvSet {
                name: set.name.clone(),
                coords: used
                    .iter()
                    .map(|&old| set.coords.get(old).copied().unwrap_or([0.0, 0.0]))
                    .collect(),
            })
            .collect();
        mesh
    }

    /// Append another mesh (no boolean, just concatenation)
    pub fn merge(&mut self, other: &Mesh) {
        let offset = self.positions.len();
        let other_count = other.positions.len();

        for set in &mut self.uv_sets {
            set.coords.resize(offset, [0.0, 0.0]);
            match other.uv_sets.iter().find(|s| s.name == set.name) {
                Some(theirs) => {
                    set.coords.extend(theirs.coords.iter().copied());
                    set.coords.resize(offset + other_count, [0.0, 0.0]);
                }
                None => set.coords.resize(offset + other_count, [0.0, 0.0]),
            }
        }
        for theirs in &other.uv_sets {
            if self.uv_sets.iter().any(|s| s.name == theirs.name) {
                continue;
            }
            let mut coords = vec![[0.0, 0.0]; offset];
            coords.extend(theirs.coords.iter().copied());
            coords.resize(offset + other_count, [0.0, 0.0]);
            self.uv_sets.push(UvSet {
                name: theirs.name.clone(),
                coords,
            });
        }

        self.positions.extend_from_slice(&other.positions);
        for face in &other.faces {
            self.faces.push(Face {
                indices: face.indices.iter().map(|i| i + offset).collect(),
                material: face.material.clone(),
            });
        }
    }

    /// UV set names paired with their coordinate counts
    pub fn uv_signature(&self) -> Vec<(String, usize)> {
        let mut signature: Vec<(String, usize)> = self
            .uv_sets
            .iter()
            .map(|set| (set.name.clone(), set.coords.len()))
            .collect();
        signature.sort();
        signature
    }
}

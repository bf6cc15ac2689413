// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Quantized shape fingerprints and signature buckets
//!
//! Two shapes with different signatures are never identical. Equal signatures
//! only make two shapes candidates for the equality engine.

use super::cache::AnalysisCache;
use super::canonicalize::MIN_CANONICAL_POINTS;
use crate::config::InstancerConfig;
use crate::error::SceneResult;
use crate::geometry::{analytics, PrincipalAxes};
use crate::scene::{MeshCounts, NodeId, SceneGraph, Space};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Round `value` to `precision` decimals and keep it as an integer key
pub fn quantize(value: f64, precision: u32) -> i64 {
    (value * 10f64.powi(precision as i32)).round() as i64
}

/// What goes into a shape signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureOptions {
    pub area_precision: u32,
    pub eigen_precision: u32,
    pub distance_precision: u32,
    pub materials: bool,
    pub uvs: bool,
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self {
            area_precision: 2,
            eigen_precision: 3,
            distance_precision: 2,
            materials: true,
            uvs: false,
        }
    }
}

impl From<&InstancerConfig> for SignatureOptions {
    fn from(config: &InstancerConfig) -> Self {
        Self {
            area_precision: config.area_precision,
            eigen_precision: config.eigen_precision,
            distance_precision: config.distance_precision,
            materials: config.require_same_material,
            uvs: config.check_uvs,
        }
    }
}

/// Hashable fingerprint of one shape
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Signature {
    pub vertices: usize,
    pub edges: usize,
    pub faces: usize,
    /// Quantized object-space surface area
    pub area: i64,
    /// Quantized eigenvalues divided by the largest, descending; empty for tiny shapes
    pub eigenvalues: Vec<i64>,
    /// Empty unless material matching is on
    pub materials: Vec<String>,
    /// UV set names and sizes; empty unless UV matching is on
    pub uvs: Vec<(String, usize)>,
}

impl Signature {
    /// Build from raw shape data
    pub fn from_parts(
        counts: MeshCounts,
        points: &[nalgebra::Point3<f64>],
        triangles: &[[usize; 3]],
        materials: Vec<String>,
        uvs: Vec<(String, usize)>,
        options: &SignatureOptions,
    ) -> Self {
        let eigenvalues = if points.len() >= MIN_CANONICAL_POINTS {
            PrincipalAxes::compute(points)
                .map(|axes| {
                    axes.normalized_eigenvalues()
                        .iter()
                        .map(|&v| quantize(v, options.eigen_precision))
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        Self {
            vertices: counts.vertices,
            edges: counts.edges,
            faces: counts.faces,
            area: quantize(analytics::surface_area(points, triangles), options.area_precision),
            eigenvalues,
            materials: if options.materials { materials } else { Vec::new() },
            uvs: if options.uvs { uvs } else { Vec::new() },
        }
    }

    /// Compute from a scene node's object-space shape
    pub fn compute<S: SceneGraph + ?Sized>(scene: &S, node: NodeId, options: &SignatureOptions) -> SceneResult<Self> {
        let points = scene.points(node, Space::Object)?;
        let triangles = scene.triangles(node)?;
        let materials = if options.materials { scene.materials(node)? } else { Vec::new() };
        let uvs = if options.uvs {
            let mut uvs: Vec<(String, usize)> = scene
                .uv_sets(node)?
                .into_iter()
                .map(|set| (set.name, set.coords.len()))
                .collect();
            uvs.sort();
            uvs
        } else {
            Vec::new()
        };
        Ok(Self::from_parts(scene.counts(node)?, &points, &triangles, materials, uvs, options))
    }

    /// Topology counts only, used to relate parts across assemblies
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.vertices, self.edges, self.faces)
    }
}

/// Root signature plus sorted (child signature, quantized distance to root)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AssemblySignature {
    pub root: Signature,
    pub children: Vec<(Signature, i64)>,
}

impl AssemblySignature {
    pub fn new(root: Signature, mut children: Vec<(Signature, i64)>) -> Self {
        children.sort();
        Self { root, children }
    }
}

/// Recursive signature of a transform subtree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HierarchySignature {
    pub shape: Option<Signature>,
    /// Child signatures with their quantized distance from this node's pivot
    pub children: Vec<(HierarchySignature, i64)>,
}

impl HierarchySignature {
    pub fn leaf(shape: Signature) -> Self {
        Self {
            shape: Some(shape),
            children: Vec::new(),
        }
    }

    pub fn compute<S: SceneGraph + ?Sized>(
        scene: &S,
        cache: &mut AnalysisCache,
        node: NodeId,
        options: &SignatureOptions,
    ) -> SceneResult<Self> {
        let shape = if scene.has_renderable_shape(node) {
            Some(cache.signature(scene, node, options)?)
        } else {
            None
        };

        let mut children = Vec::new();
        for child in scene.children(node)? {
            let distance = scene.local_matrix(child)?.fixed_view::<3, 1>(0, 3).norm();
            children.push((
                Self::compute(scene, cache, child, options)?,
                quantize(distance, options.distance_precision),
            ));
        }
        children.sort();
        Ok(Self { shape, children })
    }

    /// Whether the subtree carries no geometry at all
    pub fn is_empty(&self) -> bool {
        self.shape.is_none() && self.children.iter().all(|(child, _)| child.is_empty())
    }
}

/// Nodes bucketed by signature, buckets in signature order
#[derive(Debug, Clone, Default)]
pub struct SignatureIndex {
    buckets: BTreeMap<HierarchySignature, Vec<NodeId>>,
}

impl SignatureIndex {
    /// Bucket shapes by their own signature
    pub fn build<S: SceneGraph + ?Sized>(
        scene: &S,
        cache: &mut AnalysisCache,
        nodes: &[NodeId],
        options: &SignatureOptions,
    ) -> Self {
        let mut index = Self::default();
        for &node in nodes {
            match cache.signature(scene, node, options) {
                Ok(signature) => index.insert(HierarchySignature::leaf(signature), node),
                Err(err) => debug!(%node, stage = "signature", kind = err.kind(), "skipping: {err}"),
            }
        }
        index
    }

    /// Bucket whole subtrees by their recursive signature
    pub fn build_hierarchical<S: SceneGraph + ?Sized>(
        scene: &S,
        cache: &mut AnalysisCache,
        nodes: &[NodeId],
        options: &SignatureOptions,
    ) -> Self {
        let mut index = Self::default();
        for &node in nodes {
            match HierarchySignature::compute(scene, cache, node, options) {
                Ok(signature) if !signature.is_empty() => index.insert(signature, node),
                Ok(_) => debug!(%node, stage = "signature", "skipping subtree without geometry"),
                Err(err) => debug!(%node, stage = "signature", kind = err.kind(), "skipping: {err}"),
            }
        }
        index
    }

    pub fn insert(&mut self, signature: HierarchySignature, node: NodeId) {
        self.buckets.entry(signature).or_default().push(node);
    }

    pub fn buckets(&self) -> impl Iterator<Item = (&HierarchySignature, &[NodeId])> {
        self.buckets.iter().map(|(sig, nodes)| (sig, nodes.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

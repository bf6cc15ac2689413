// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Per-run cache of object-space shape data
//!
//! Owned by the caller and cleared at the start of every run. Anything that
//! rewrites a shape's points must invalidate its entry.

use super::signature::{Signature, SignatureOptions};
use crate::error::SceneResult;
use crate::geometry::PointTree;
use crate::scene::{NodeId, SceneGraph, Space};
use ahash::AHashMap;
use nalgebra::Point3;
use std::rc::Rc;

/// Cache hit statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

#[derive(Debug, Default)]
pub struct AnalysisCache {
    points: AHashMap<NodeId, Rc<[Point3<f64>]>>,
    trees: AHashMap<NodeId, Rc<PointTree>>,
    signatures: AHashMap<NodeId, Signature>,
    stats: CacheStats,
}

impl AnalysisCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.trees.clear();
        self.signatures.clear();
        self.stats = CacheStats::default();
    }

    pub fn invalidate(&mut self, node: NodeId) {
        self.points.remove(&node);
        self.trees.remove(&node);
        self.signatures.remove(&node);
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.points.len() + self.trees.len() + self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn object_points<S: SceneGraph + ?Sized>(&mut self, scene: &S, node: NodeId) -> SceneResult<Rc<[Point3<f64>]>> {
        if let Some(points) = self.points.get(&node) {
            self.stats.hits += 1;
            return Ok(Rc::clone(points));
        }
        self.stats.misses += 1;
        let points: Rc<[Point3<f64>]> = scene.points(node, Space::Object)?.into();
        self.points.insert(node, Rc::clone(&points));
        Ok(points)
    }

    /// Spatial index over the object-space points
    pub fn point_tree<S: SceneGraph + ?Sized>(&mut self, scene: &S, node: NodeId) -> SceneResult<Rc<PointTree>> {
        if let Some(tree) = self.trees.get(&node) {
            self.stats.hits += 1;
            return Ok(Rc::clone(tree));
        }
        let points = self.object_points(scene, node)?;
        let tree = Rc::new(PointTree::build(&points));
        self.trees.insert(node, Rc::clone(&tree));
        Ok(tree)
    }

    pub fn signature<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &S,
        node: NodeId,
        options: &SignatureOptions,
    ) -> SceneResult<Signature> {
        if let Some(signature) = self.signatures.get(&node) {
            self.stats.hits += 1;
            return Ok(signature.clone());
        }
        self.stats.misses += 1;
        let signature = Signature::compute(scene, node, options)?;
        self.signatures.insert(node, signature.clone());
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use crate::scene::MemoryScene;
    use nalgebra::Matrix4;

    #[test]
    fn test_hits_and_invalidation() {
        let mut scene = MemoryScene::new();
        let cube = scene.add_mesh("cube", Primitive::cube(1.0).to_mesh(), Matrix4::identity(), None);
        let mut cache = AnalysisCache::new();

        cache.object_points(&scene, cube).unwrap();
        cache.object_points(&scene, cube).unwrap();
        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });

        cache.invalidate(cube);
        cache.point_tree(&scene, cube).unwrap();
        assert_eq!(cache.stats().misses, 2);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}

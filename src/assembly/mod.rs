// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Assembly reconstruction: infer multi-part objects from loose shells

pub mod cluster;
pub mod combine;
pub mod hierarchy;

pub use cluster::{kmeans_1d, size_threshold, AssemblyClusterer};
pub use combine::AssemblyCombiner;
pub use hierarchy::HierarchyReconstructor;

use crate::error::SceneResult;
use crate::matching::{quantize, AssemblySignature, ShellInfo, Signature};
use crate::scene::{NodeId, SceneGraph};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Root shell plus every shell it transitively claimed, as indices into the shell list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assembly {
    pub root: usize,
    pub parts: Vec<usize>,
    pub signature: AssemblySignature,
}

impl Assembly {
    pub fn new(root: usize, parts: Vec<usize>, shells: &[ShellInfo], signatures: &[Signature], precision: u32) -> Self {
        let children = parts
            .iter()
            .map(|&part| {
                let distance = (shells[part].centroid - shells[root].centroid).norm();
                (signatures[part].clone(), quantize(distance, precision))
            })
            .collect();
        Self {
            root,
            parts,
            signature: AssemblySignature::new(signatures[root].clone(), children),
        }
    }

    pub fn size(&self) -> usize {
        1 + self.parts.len()
    }

    pub fn is_singleton(&self) -> bool {
        self.parts.is_empty()
    }

    /// Root first, then parts in claim order
    pub fn shells(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(self.root).chain(self.parts.iter().copied())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconstruction {
    pub shells: Vec<ShellInfo>,
    pub assemblies: Vec<Assembly>,
    /// Shells left out of every assembly
    pub clutter: Vec<usize>,
}

impl Reconstruction {
    /// Assemblies from fixed clusters; the shell with the largest area becomes the root
    pub fn from_clusters(
        shells: Vec<ShellInfo>,
        signatures: &[Signature],
        clusters: &[Vec<usize>],
        precision: u32,
    ) -> Self {
        let assemblies = clusters
            .iter()
            .filter(|cluster| !cluster.is_empty())
            .map(|cluster| {
                let mut root = cluster[0];
                for &index in cluster {
                    if shells[index].area > shells[root].area {
                        root = index;
                    }
                }
                let parts = cluster.iter().copied().filter(|&i| i != root).collect();
                Assembly::new(root, parts, &shells, signatures, precision)
            })
            .collect();
        Self {
            shells,
            assemblies,
            clutter: Vec::new(),
        }
    }

    pub fn singleton_count(&self) -> usize {
        self.assemblies.iter().filter(|a| a.is_singleton()).count()
    }

    /// How often each assembly shape occurs
    pub fn signature_frequencies(&self) -> BTreeMap<&AssemblySignature, usize> {
        let mut counts = BTreeMap::new();
        for assembly in &self.assemblies {
            *counts.entry(&assembly.signature).or_insert(0) += 1;
        }
        counts
    }

    /// Put every multi-part assembly under a new `Assembly_<n>` group.
    ///
    /// Returns the groups, the lone shells, and the clutter shells. An assembly
    /// that cannot be grouped is left loose and its shells are returned instead.
    pub fn materialize<S: SceneGraph + ?Sized>(&self, scene: &mut S) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut created = 0;

        for assembly in &self.assemblies {
            let root = self.shells[assembly.root].node;
            if assembly.is_singleton() {
                if scene.exists(root) {
                    nodes.push(root);
                }
                continue;
            }

            match self.group(scene, assembly, created + 1) {
                Ok(group) => {
                    created += 1;
                    nodes.push(group);
                }
                Err(err) => {
                    warn!(node = %root, stage = "reconstruct", kind = err.kind(), "assembly left loose: {err}");
                    nodes.extend(
                        assembly
                            .shells()
                            .map(|i| self.shells[i].node)
                            .filter(|&n| scene.exists(n)),
                    );
                }
            }
        }

        nodes.extend(
            self.clutter
                .iter()
                .map(|&i| self.shells[i].node)
                .filter(|&n| scene.exists(n)),
        );
        debug!(groups = created, nodes = nodes.len(), "assemblies materialized");
        nodes
    }

    fn group<S: SceneGraph + ?Sized>(&self, scene: &mut S, assembly: &Assembly, number: usize) -> SceneResult<NodeId> {
        let root = self.shells[assembly.root].node;
        let parent = scene.parent(root)?;
        let frame = scene.world_matrix(root)?;

        let group = scene.create_group(&format!("Assembly_{number}"), parent)?;
        let moved = scene
            .set_world_matrix(group, frame)
            .and_then(|_| assembly.shells().try_for_each(|i| scene.reparent(self.shells[i].node, Some(group))));

        if let Err(err) = moved {
            // Undo: hand the shells back and drop the group
            for child in scene.children(group).unwrap_or_default() {
                if let Err(undo) = scene.reparent(child, parent) {
                    warn!(node = %child, stage = "reconstruct", kind = undo.kind(), "shell stuck in partial group: {undo}");
                }
            }
            if let Err(undo) = scene.delete(group) {
                warn!(node = %group, stage = "reconstruct", kind = undo.kind(), "partial group not removed: {undo}");
            }
            return Err(err);
        }
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use crate::matching::{ShellAnalyzer, SignatureOptions};
    use crate::scene::MemoryScene;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix4, Vector3};

    fn scene_with_pairs(pairs: usize) -> (MemoryScene, Vec<NodeId>) {
        let mut scene = MemoryScene::new();
        let mut nodes = Vec::new();
        for i in 0..pairs {
            let x = 10.0 * i as f64;
            nodes.push(scene.add_mesh(
                "body",
                Primitive::cube(2.0).to_mesh(),
                Matrix4::new_translation(&Vector3::new(x, 0.0, 0.0)),
                None,
            ));
            nodes.push(scene.add_mesh(
                "knob",
                Primitive::cube(0.4).to_mesh(),
                Matrix4::new_translation(&Vector3::new(x, 1.5, 0.0)),
                None,
            ));
        }
        (scene, nodes)
    }

    fn signatures(scene: &MemoryScene, shells: &[ShellInfo]) -> Vec<Signature> {
        shells
            .iter()
            .map(|s| Signature::compute(scene, s.node, &SignatureOptions::default()).unwrap())
            .collect()
    }

    #[test]
    fn test_materialize_groups_at_root_frame() {
        let (mut scene, nodes) = scene_with_pairs(2);
        let shells = ShellAnalyzer::analyze_all(&scene, &nodes);
        let sigs = signatures(&scene, &shells);
        let reconstruction = HierarchyReconstructor::default().reconstruct(shells, &sigs);
        assert_eq!(reconstruction.signature_frequencies().values().copied().collect::<Vec<_>>(), vec![2]);

        let before: Vec<Matrix4<f64>> = nodes.iter().map(|&n| scene.world_matrix(n).unwrap()).collect();
        let groups = reconstruction.materialize(&mut scene);
        assert_eq!(groups.len(), 2);
        assert_eq!(scene.name(groups[0]).unwrap(), "Assembly_1");
        assert_eq!(scene.name(groups[1]).unwrap(), "Assembly_2");
        assert_eq!(scene.children(groups[0]).unwrap().len(), 2);
        assert_relative_eq!(scene.world_matrix(groups[1]).unwrap(), before[2], epsilon = 1e-9);

        for (node, world) in nodes.iter().zip(&before) {
            assert_relative_eq!(scene.world_matrix(*node).unwrap(), *world, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ungroupable_assembly_is_left_loose() {
        let mut scene = MemoryScene::new();
        let holder = scene.create_group("holder", None).unwrap();
        let body = scene.add_mesh("body", Primitive::cube(2.0).to_mesh(), Matrix4::identity(), Some(holder));
        let knob = scene.add_mesh(
            "knob",
            Primitive::cube(0.4).to_mesh(),
            Matrix4::new_translation(&Vector3::new(0.0, 1.5, 0.0)),
            Some(holder),
        );
        let shells = ShellAnalyzer::analyze_all(&scene, &[body, knob]);
        let sigs = signatures(&scene, &shells);
        let reconstruction = Reconstruction::from_clusters(shells, &sigs, &[vec![0, 1]], 2);

        // A flattened holder cannot take a new child frame
        scene
            .set_local_matrix(holder, Matrix4::new_nonuniform_scaling(&Vector3::new(1.0, 0.0, 1.0)))
            .unwrap();
        let nodes = reconstruction.materialize(&mut scene);

        assert_eq!(nodes, vec![body, knob]);
        assert_eq!(scene.children(holder).unwrap(), vec![body, knob]);
        assert_eq!(scene.node_count(), 3);
        assert!(scene.find("Assembly_1").is_none());
    }

    #[test]
    fn test_clusters_pick_largest_root() {
        let (scene, nodes) = scene_with_pairs(2);
        let shells = ShellAnalyzer::analyze_all(&scene, &nodes);
        let sigs = signatures(&scene, &shells);
        let reconstruction = Reconstruction::from_clusters(shells, &sigs, &[vec![1, 0], vec![3, 2], vec![]], 2);

        assert_eq!(reconstruction.assemblies.len(), 2);
        assert_eq!(reconstruction.assemblies[0].root, 0);
        assert_eq!(reconstruction.assemblies[0].parts, vec![1]);
        assert_eq!(reconstruction.singleton_count(), 0);
        assert_eq!(
            reconstruction.assemblies[0].shells().collect::<Vec<_>>(),
            vec![0, 1]
        );
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! End-to-end instancing pipeline
//!
//! separate → canonicalize → (reconstruct | cluster) → (combine) → group →
//! execute. Every stage skips what it cannot handle and records why; a run
//! never fails as a whole.

use crate::assembly::{AssemblyClusterer, AssemblyCombiner, HierarchyReconstructor, Reconstruction};
use crate::config::{AssemblyMode, InstancerConfig};
use crate::error::SceneResult;
use crate::executor::InstancingExecutor;
use crate::matching::{
    AnalysisCache, CacheStats, CanonicalOutcome, GroupingMode, InstanceGroup, InstanceGroupBuilder, ShellAnalyzer,
    SignatureOptions, SkipReason, TransformCanonicalizer,
};
use crate::report::{GroupReport, RunReport, SkipRecord, Stage};
use crate::scene::{NodeId, SceneGraph};
use crate::strategy::InstancingStrategy;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Strategies converted by the main pass when a strategy is configured
const MAIN_PASS: &[InstancingStrategy] = &[InstancingStrategy::GpuInstance];

/// The leaf pass also merges micro meshes that would otherwise stay unique
const LEAF_PASS: &[InstancingStrategy] = &[InstancingStrategy::GpuInstance, InstancingStrategy::Combine];

pub struct AutoInstancer {
    config: InstancerConfig,
    cache: AnalysisCache,
    report: RunReport,
}

impl AutoInstancer {
    pub fn new(config: InstancerConfig) -> Self {
        Self {
            config,
            cache: AnalysisCache::new(),
            report: RunReport::new(),
        }
    }

    pub fn config(&self) -> &InstancerConfig {
        &self.config
    }

    /// Outcome of the last `run`
    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Convert duplicates among `nodes` (default: selection, else every
    /// transform) into instances. Returns each converted group's prototype
    /// followed by the instances created for it.
    pub fn run<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, nodes: Option<&[NodeId]>) -> Vec<NodeId> {
        self.cache.clear();
        self.report = RunReport::new();

        let mut nodes = input_nodes(scene, nodes);
        if nodes.is_empty() {
            info!("nothing to instance");
            return Vec::new();
        }

        // Loose shells need a comparable pivot; untouched meshes keep their frames
        if self.config.separate_combined {
            nodes = self.separate(scene, &nodes);
        }
        if self.config.separate_combined || self.config.assembly_mode != AssemblyMode::None {
            self.canonicalize(scene, &nodes);
        }

        let mut mode = if self.config.check_hierarchy {
            GroupingMode::Hierarchy
        } else {
            GroupingMode::Leaf
        };
        if self.config.assembly_mode != AssemblyMode::None {
            nodes = self.reconstruct(scene, &nodes).materialize(scene);
            if self.config.combine_assemblies {
                nodes = AssemblyCombiner::combine(scene, &nodes);
                self.canonicalize(scene, &nodes);
                mode = GroupingMode::Leaf;
            } else {
                mode = GroupingMode::Hierarchy;
            }
        }

        let mut output = OrderedNodes::default();
        let roots: Vec<NodeId> = nodes.iter().copied().filter(|&n| scene.exists(n)).collect();
        output.extend(self.instance_pass(scene, &roots, mode, MAIN_PASS));

        if mode == GroupingMode::Hierarchy {
            let mut tops: Vec<NodeId> = roots.iter().copied().filter(|&n| scene.exists(n)).collect();
            tops.extend(output.nodes.iter().copied());
            let leaves = mesh_transforms(scene, &tops);
            debug!(leaves = leaves.len(), "leaf pass");
            output.extend(self.instance_pass(scene, &leaves, GroupingMode::Leaf, LEAF_PASS));
        }

        info!(
            "processed {} groups and created {} instances",
            self.report.groups_processed, self.report.instances_created
        );
        output.into_vec()
    }

    /// Duplicate groups among `nodes` without touching the scene
    pub fn find_instance_groups<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &S,
        nodes: Option<&[NodeId]>,
    ) -> Vec<InstanceGroup> {
        self.cache.clear();
        let nodes = input_nodes(scene, nodes);
        let mode = if self.config.check_hierarchy {
            GroupingMode::Hierarchy
        } else {
            GroupingMode::Leaf
        };
        InstanceGroupBuilder::from_config(&self.config, mode).build(scene, &mut self.cache, &nodes)
    }

    /// Split multi-shell meshes; the shells take the source's place under its parent
    fn separate<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, nodes: &[NodeId]) -> Vec<NodeId> {
        let mut output = Vec::with_capacity(nodes.len());
        for &node in nodes {
            if !scene.has_renderable_shape(node) {
                output.push(node);
                continue;
            }
            match separate_one(scene, node) {
                Ok(shells) => output.extend(shells),
                Err(err) => {
                    warn!(%node, stage = "separate", kind = err.kind(), "not separated: {err}");
                    self.report.skip(SkipRecord::from_error(node, Stage::Separate, &err));
                    if scene.exists(node) {
                        output.push(node);
                    }
                }
            }
        }
        debug!(before = nodes.len(), after = output.len(), "combined meshes separated");
        output
    }

    /// Canonicalize every unshared mesh under `nodes`
    fn canonicalize<S: SceneGraph + ?Sized>(&mut self, scene: &mut S, nodes: &[NodeId]) {
        let mut seen = BTreeSet::new();
        for &node in nodes {
            let subtree = match scene.subtree(node) {
                Ok(subtree) => subtree,
                Err(err) => {
                    debug!(%node, stage = "canonicalize", kind = err.kind(), "skipping: {err}");
                    continue;
                }
            };
            for shell in subtree {
                if !seen.insert(shell) || !scene.has_renderable_shape(shell) {
                    continue;
                }
                match TransformCanonicalizer::canonicalize(scene, shell) {
                    Ok(CanonicalOutcome::Applied(_)) => self.cache.invalidate(shell),
                    Ok(CanonicalOutcome::Skipped(SkipReason::Instanced)) => {}
                    Ok(CanonicalOutcome::Skipped(reason)) => {
                        self.report.skip(SkipRecord::new(
                            shell,
                            Stage::Canonicalize,
                            format!("frame left as is: {reason:?}"),
                        ));
                    }
                    Err(err) => {
                        warn!(node = %shell, stage = "canonicalize", kind = err.kind(), "skipping: {err}");
                        self.report.skip(SkipRecord::from_error(shell, Stage::Canonicalize, &err));
                    }
                }
            }
        }
    }

    fn reconstruct<S: SceneGraph + ?Sized>(&mut self, scene: &S, nodes: &[NodeId]) -> Reconstruction {
        let options = SignatureOptions::from(&self.config);
        let mut shells = Vec::new();
        let mut signatures = Vec::new();
        for info in ShellAnalyzer::analyze_all(scene, nodes) {
            match self.cache.signature(scene, info.node, &options) {
                Ok(signature) => {
                    shells.push(info);
                    signatures.push(signature);
                }
                Err(err) => {
                    debug!(node = %info.node, stage = "reconstruct", kind = err.kind(), "skipping shell: {err}");
                    self.report.skip(SkipRecord::from_error(info.node, Stage::Reconstruct, &err));
                }
            }
        }

        match self.config.assembly_mode {
            AssemblyMode::Cluster => {
                let clusters = AssemblyClusterer::new(self.config.cluster_count).cluster(&shells);
                Reconstruction::from_clusters(shells, &signatures, &clusters, self.config.distance_precision)
            }
            _ => HierarchyReconstructor::from_config(&self.config).reconstruct(shells, &signatures),
        }
    }

    /// Group, then convert shallowest prototypes first; with a strategy
    /// configured only groups advised one of `allowed` are converted
    fn instance_pass<S: SceneGraph + ?Sized>(
        &mut self,
        scene: &mut S,
        nodes: &[NodeId],
        mode: GroupingMode,
        allowed: &[InstancingStrategy],
    ) -> Vec<NodeId> {
        let builder = InstanceGroupBuilder::from_config(&self.config, mode);
        let mut groups: Vec<InstanceGroup> = builder
            .build(&*scene, &mut self.cache, nodes)
            .into_iter()
            .filter(InstanceGroup::has_members)
            .collect();
        groups.sort_by_key(|group| scene.depth(group.prototype.node).unwrap_or(usize::MAX));

        let mut output = Vec::new();
        for group in groups {
            let strategy = self.config.strategy.map(|strategy| {
                let triangles = triangle_count(&*scene, group.prototype.node, mode).unwrap_or(0);
                strategy.evaluate(group.size(), triangles)
            });

            let mut record = GroupReport {
                prototype: group.prototype.node,
                prototype_name: group.prototype.name.clone(),
                members: group.members.len(),
                instances: 0,
                strategy,
            };
            if strategy.is_some_and(|s| !allowed.contains(&s)) {
                debug!(node = %group.prototype.node, strategy = ?strategy, "group left as is");
                self.report.record_group(record);
                continue;
            }

            let outcome = InstancingExecutor::execute(scene, &group);
            for &node in outcome.nodes.iter().skip(1) {
                for n in scene.subtree(node).unwrap_or_default() {
                    self.cache.invalidate(n);
                }
            }
            record.instances = outcome.instances();
            if outcome.instances() > 0 {
                output.extend(outcome.nodes.iter().copied());
            }
            for skip in outcome.skipped {
                self.report.skip(skip);
            }
            self.report.record_group(record);
        }
        output
    }
}

impl Default for AutoInstancer {
    fn default() -> Self {
        Self::new(InstancerConfig::default())
    }
}

/// Explicit nodes, else the selection, else every transform
fn input_nodes<S: SceneGraph + ?Sized>(scene: &S, nodes: Option<&[NodeId]>) -> Vec<NodeId> {
    let nodes = match nodes {
        Some(nodes) => nodes.to_vec(),
        None => {
            let selection = scene.selection();
            if selection.is_empty() {
                scene.transforms()
            } else {
                selection
            }
        }
    };
    let mut seen = BTreeSet::new();
    nodes
        .into_iter()
        .filter(|&n| scene.exists(n) && seen.insert(n))
        .collect()
}

fn separate_one<S: SceneGraph + ?Sized>(scene: &mut S, node: NodeId) -> SceneResult<Vec<NodeId>> {
    let shells = scene.separate(node)?;
    if shells == [node] {
        return Ok(shells);
    }
    let parent = scene.parent(node)?;
    for &shell in &shells {
        scene.reparent(shell, parent)?;
    }
    if !scene.has_renderable_shape(node) && scene.children(node)?.is_empty() {
        scene.delete(node)?;
    }
    Ok(shells)
}

/// Every live mesh transform in the subtrees of `roots`
fn mesh_transforms<S: SceneGraph + ?Sized>(scene: &S, roots: &[NodeId]) -> Vec<NodeId> {
    let mut seen = BTreeSet::new();
    let mut meshes = Vec::new();
    for &root in roots {
        for node in scene.subtree(root).unwrap_or_default() {
            if scene.has_renderable_shape(node) && seen.insert(node) {
                meshes.push(node);
            }
        }
    }
    meshes
}

fn triangle_count<S: SceneGraph + ?Sized>(scene: &S, node: NodeId, mode: GroupingMode) -> SceneResult<usize> {
    let nodes = match mode {
        GroupingMode::Leaf => vec![node],
        GroupingMode::Hierarchy => scene.subtree(node)?,
    };
    let mut total = 0;
    for n in nodes {
        if scene.has_renderable_shape(n) {
            total += scene.counts(n)?.triangles;
        }
    }
    Ok(total)
}

/// Insertion-ordered set of nodes
#[derive(Default)]
struct OrderedNodes {
    seen: BTreeSet<NodeId>,
    nodes: Vec<NodeId>,
}

impl OrderedNodes {
    fn extend(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        for node in nodes {
            if self.seen.insert(node) {
                self.nodes.push(node);
            }
        }
    }

    fn into_vec(self) -> Vec<NodeId> {
        self.nodes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use crate::scene::{demo, MemoryScene};
    use crate::strategy::StrategyConfig;
    use nalgebra::{Matrix4, Vector3};

    #[test]
    fn test_empty_scene_yields_nothing() {
        let mut scene = MemoryScene::new();
        let mut instancer = AutoInstancer::default();
        assert!(instancer.run(&mut scene, None).is_empty());
        assert_eq!(instancer.report().groups_processed, 0);
    }

    #[test]
    fn test_find_groups_does_not_mutate() {
        let (scene, nodes) = demo::cubes(4, 3);
        let before = scene.clone();
        let mut instancer = AutoInstancer::default();
        let groups = instancer.find_instance_groups(&scene, Some(&nodes));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].size(), 4);
        assert_eq!(scene, before);
    }

    #[test]
    fn test_separate_replaces_the_combined_source() {
        let mut scene = MemoryScene::new();
        let mut mesh = Primitive::cube(1.0).to_mesh();
        mesh.merge(&Primitive::cube(1.0).to_mesh().transformed(&Matrix4::new_translation(&Vector3::new(5.0, 0.0, 0.0))));
        let combined = scene.add_mesh("pair", mesh, Matrix4::identity(), None);

        let config = InstancerConfig {
            separate_combined: true,
            ..Default::default()
        };
        let mut instancer = AutoInstancer::new(config);
        let created = instancer.run(&mut scene, Some(&[combined]));

        assert!(!scene.exists(combined));
        assert_eq!(created.len(), 2);
        assert_eq!(scene.geometry_count(), 1);
        assert_eq!(instancer.report().instances_created, 1);
    }

    #[test]
    fn test_strategy_gates_conversion() {
        let (mut scene, nodes) = demo::cubes(3, 8);
        let config = InstancerConfig {
            strategy: Some(StrategyConfig::default()),
            ..Default::default()
        };
        let mut instancer = AutoInstancer::new(config);
        let created = instancer.run(&mut scene, Some(&nodes));

        // Twelve triangles, three copies: merge, do not instance
        assert!(created.is_empty());
        let report = instancer.report();
        assert_eq!(report.groups_processed, 1);
        assert_eq!(report.groups[0].strategy, Some(InstancingStrategy::Combine));
        assert_eq!(report.instances_created, 0);
        assert_eq!(scene.geometry_count(), 3);
    }

    #[test]
    fn test_leaf_pass_merges_micro_parts() {
        let (mut scene, combined) = demo::canisters(4, 6);
        let config = InstancerConfig {
            separate_combined: true,
            assembly_mode: AssemblyMode::Hierarchy,
            strategy: Some(StrategyConfig::default()),
            ..Default::default()
        };
        let mut instancer = AutoInstancer::new(config);
        instancer.run(&mut scene, Some(&[combined]));

        // Whole canisters are left as groups; their bodies and lids still share shapes
        let report = instancer.report();
        assert!(report
            .groups
            .iter()
            .all(|g| g.strategy == Some(InstancingStrategy::Combine)));
        assert_eq!(report.instances_created, 6);
        assert_eq!(scene.geometry_count(), 2);
        assert_eq!(scene.roots().len(), 4);
    }

    #[test]
    fn test_stale_input_is_ignored() {
        let (mut scene, nodes) = demo::cubes(3, 2);
        scene.delete(nodes[2]).unwrap();
        let mut instancer = AutoInstancer::default();
        let created = instancer.run(&mut scene, Some(&nodes));
        assert_eq!(created.len(), 2);
    }
}

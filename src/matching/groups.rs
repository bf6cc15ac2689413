// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Partition signature buckets into groups of identical geometry

use super::cache::AnalysisCache;
use super::equality::{EqualityEngine, MatchStage, ShellMatch};
use super::signature::{SignatureIndex, SignatureOptions};
use crate::config::InstancerConfig;
use crate::error::SceneResult;
use crate::scene::{NodeId, SceneGraph};
use nalgebra::Matrix4;
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};
use tracing::debug;

/// What a group member stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMode {
    /// Individual mesh transforms
    #[default]
    Leaf,
    /// Whole subtrees rooted at the outermost given nodes
    Hierarchy,
}

/// Snapshot of a node taken when groups are built
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceCandidate {
    pub node: NodeId,
    pub name: String,
    pub world: Matrix4<f64>,
    pub parent: Option<NodeId>,
    pub visible: bool,
    /// Some shape in the subtree is already shared
    pub instanced: bool,
    /// Stage that matched this member against its prototype
    pub stage: Option<MatchStage>,
    /// Set only when the match needed a rigid alignment
    pub relative: Option<Matrix4<f64>>,
}

impl InstanceCandidate {
    pub fn capture<S: SceneGraph + ?Sized>(scene: &S, node: NodeId) -> SceneResult<Self> {
        Ok(Self {
            node,
            name: scene.name(node)?,
            world: scene.world_matrix(node)?,
            parent: scene.parent(node)?,
            visible: scene.is_visible(node)?,
            instanced: subtree_instanced(scene, node)?,
            stage: None,
            relative: None,
        })
    }

    /// World matrix that puts the prototype's geometry where this member is
    pub fn placement(&self) -> Matrix4<f64> {
        match self.relative {
            Some(relative) => self.world * relative,
            None => self.world,
        }
    }

    fn matched(mut self, found: ShellMatch) -> Self {
        self.stage = Some(found.stage);
        self.relative = found.relative;
        self
    }
}

/// One prototype and everything found identical to it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceGroup {
    pub prototype: InstanceCandidate,
    pub members: Vec<InstanceCandidate>,
    pub mode: GroupingMode,
}

impl InstanceGroup {
    /// Prototype plus members
    pub fn size(&self) -> usize {
        1 + self.members.len()
    }

    pub fn has_members(&self) -> bool {
        !self.members.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct InstanceGroupBuilder {
    engine: EqualityEngine,
    options: SignatureOptions,
    mode: GroupingMode,
}

impl InstanceGroupBuilder {
    pub fn new(engine: EqualityEngine, options: SignatureOptions, mode: GroupingMode) -> Self {
        Self { engine, options, mode }
    }

    pub fn from_config(config: &InstancerConfig, mode: GroupingMode) -> Self {
        Self::new(EqualityEngine::from_config(config), SignatureOptions::from(config), mode)
    }

    pub fn mode(&self) -> GroupingMode {
        self.mode
    }

    /// Live, deduplicated nodes eligible for grouping in this mode
    pub fn candidates<S: SceneGraph + ?Sized>(&self, scene: &S, nodes: &[NodeId]) -> Vec<NodeId> {
        let mut seen = BTreeSet::new();
        let live: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|&node| scene.exists(node) && seen.insert(node))
            .collect();

        match self.mode {
            GroupingMode::Leaf => live.into_iter().filter(|&n| scene.has_renderable_shape(n)).collect(),
            GroupingMode::Hierarchy => live
                .into_iter()
                .filter(|&n| !has_ancestor_in(scene, n, &seen))
                .collect(),
        }
    }

    pub fn build<S: SceneGraph + ?Sized>(
        &self,
        scene: &S,
        cache: &mut AnalysisCache,
        nodes: &[NodeId],
    ) -> Vec<InstanceGroup> {
        let candidates = self.candidates(scene, nodes);
        let index = match self.mode {
            GroupingMode::Leaf => SignatureIndex::build(scene, cache, &candidates, &self.options),
            GroupingMode::Hierarchy => SignatureIndex::build_hierarchical(scene, cache, &candidates, &self.options),
        };
        debug!(candidates = candidates.len(), buckets = index.len(), mode = ?self.mode, "signature buckets built");

        let mut groups = Vec::new();
        for (_, bucket) in index.buckets() {
            let mut ordered: Vec<InstanceCandidate> = bucket
                .iter()
                .filter_map(|&node| match InstanceCandidate::capture(scene, node) {
                    Ok(candidate) => Some(candidate),
                    Err(err) => {
                        debug!(%node, stage = "group", kind = err.kind(), "dropping candidate: {err}");
                        None
                    }
                })
                .collect();
            // Shared shapes first so re-runs keep their prototypes
            ordered.sort_by(|a, b| {
                b.instanced
                    .cmp(&a.instanced)
                    .then_with(|| a.name.cmp(&b.name))
                    .then(a.node.cmp(&b.node))
            });

            let mut queue = VecDeque::from(ordered);
            while let Some(prototype) = queue.pop_front() {
                let mut members = Vec::new();
                let mut rest = VecDeque::new();
                for candidate in queue.drain(..) {
                    match self.compare(scene, cache, prototype.node, candidate.node) {
                        Ok(Some(found)) => members.push(candidate.matched(found)),
                        Ok(None) => rest.push_back(candidate),
                        Err(err) => {
                            debug!(node = %candidate.node, stage = "group", kind = err.kind(), "dropping candidate: {err}")
                        }
                    }
                }
                queue = rest;
                groups.push(InstanceGroup {
                    prototype,
                    members,
                    mode: self.mode,
                });
            }
        }
        groups
    }

    fn compare<S: SceneGraph + ?Sized>(
        &self,
        scene: &S,
        cache: &mut AnalysisCache,
        prototype: NodeId,
        member: NodeId,
    ) -> SceneResult<Option<ShellMatch>> {
        match self.mode {
            GroupingMode::Leaf => self.engine.compare_shells(scene, cache, prototype, member),
            GroupingMode::Hierarchy => self.engine.compare_hierarchies(scene, cache, prototype, member),
        }
    }
}

/// Whether any shape under `node` is shared with another transform
pub fn subtree_instanced<S: SceneGraph + ?Sized>(scene: &S, node: NodeId) -> SceneResult<bool> {
    for current in scene.subtree(node)? {
        if scene.has_renderable_shape(current) && scene.is_instanced(current)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn has_ancestor_in<S: SceneGraph + ?Sized>(scene: &S, node: NodeId, set: &BTreeSet<NodeId>) -> bool {
    let mut current = scene.parent(node).ok().flatten();
    while let Some(parent) = current {
        if set.contains(&parent) {
            return true;
        }
        current = scene.parent(parent).ok().flatten();
    }
    false
}

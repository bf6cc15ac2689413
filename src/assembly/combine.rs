// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Merge each assembly group into one mesh
//!
//! Only the parts most assemblies share are merged, so one assembly with an
//! extra attachment still combines into the same core shape as its siblings.

use crate::error::SceneResult;
use crate::scene::{NodeId, SceneGraph};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Relaxed part signature: vertex, edge and face counts
type PartKey = (usize, usize, usize);

pub struct AssemblyCombiner;

impl AssemblyCombiner {
    /// Combine every assembly group among `nodes`.
    ///
    /// Returns the combined meshes, the parts left out of a core, and every
    /// input that was not a group.
    pub fn combine<S: SceneGraph + ?Sized>(scene: &mut S, nodes: &[NodeId]) -> Vec<NodeId> {
        let mut output = Vec::new();
        let mut groups: Vec<(NodeId, Vec<(NodeId, PartKey)>)> = Vec::new();

        for &node in nodes {
            if !scene.exists(node) {
                continue;
            }
            if scene.has_renderable_shape(node) {
                output.push(node);
                continue;
            }
            match mesh_parts(scene, node) {
                Ok(parts) if !parts.is_empty() => groups.push((node, parts)),
                Ok(_) => output.push(node),
                Err(err) => warn!(%node, stage = "combine", kind = err.kind(), "skipping group: {err}"),
            }
        }

        let mut frequency: BTreeMap<PartKey, usize> = BTreeMap::new();
        for (_, parts) in &groups {
            let keys: BTreeSet<PartKey> = parts.iter().map(|(_, key)| *key).collect();
            for key in keys {
                *frequency.entry(key).or_default() += 1;
            }
        }
        let majority = groups.len() / 2 + 1;
        debug!(groups = groups.len(), majority, "combining assemblies");

        for (group, parts) in groups {
            let (core, rest): (Vec<_>, Vec<_>) = parts
                .into_iter()
                .partition(|(_, key)| frequency.get(key).copied().unwrap_or(0) >= majority);
            if core.is_empty() {
                output.push(group);
                continue;
            }

            let core: Vec<NodeId> = core.into_iter().map(|(node, _)| node).collect();
            let rest: Vec<NodeId> = rest.into_iter().map(|(node, _)| node).collect();
            match combine_group(scene, group, &core, &rest) {
                Ok(created) => output.extend(created),
                Err(err) => {
                    warn!(node = %group, stage = "combine", kind = err.kind(), "assembly not combined: {err}");
                    if scene.exists(group) {
                        output.push(group);
                    }
                }
            }
        }
        output
    }
}

fn mesh_parts<S: SceneGraph + ?Sized>(scene: &S, group: NodeId) -> SceneResult<Vec<(NodeId, PartKey)>> {
    let mut parts = Vec::new();
    for child in scene.children(group)? {
        if scene.has_renderable_shape(child) {
            let counts = scene.counts(child)?;
            parts.push((child, (counts.vertices, counts.edges, counts.faces)));
        }
    }
    Ok(parts)
}

fn combine_group<S: SceneGraph + ?Sized>(
    scene: &mut S,
    group: NodeId,
    core: &[NodeId],
    rest: &[NodeId],
) -> SceneResult<Vec<NodeId>> {
    let parent = scene.parent(group)?;
    let name = scene.name(group)?;

    let mut created = Vec::with_capacity(rest.len() + 1);
    let combined = scene.unite(core, &format!("{name}_combined"))?;
    scene.reparent(combined, parent)?;
    created.push(combined);

    for &part in rest {
        scene.reparent(part, parent)?;
        created.push(part);
    }

    if scene.children(group)?.is_empty() {
        scene.delete(group)?;
    }
    Ok(created)
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Replace duplicate members with instances of their prototype
//!
//! Each member is converted on its own. A failure leaves that member as it
//! was and the rest of the group continues.

use crate::error::SceneResult;
use crate::matching::{GroupingMode, InstanceCandidate, InstanceGroup};
use crate::report::{SkipRecord, Stage};
use crate::scene::{DuplicateMode, NodeId, SceneGraph};
use tracing::{debug, warn};

/// Result of converting one group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupOutcome {
    /// Prototype first, then every instance created for it
    pub nodes: Vec<NodeId>,
    pub skipped: Vec<SkipRecord>,
}

impl GroupOutcome {
    pub fn instances(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}

pub struct InstancingExecutor;

impl InstancingExecutor {
    pub fn execute<S: SceneGraph + ?Sized>(scene: &mut S, group: &InstanceGroup) -> GroupOutcome {
        let mut outcome = GroupOutcome::default();
        let prototype = group.prototype.node;
        if !scene.exists(prototype) {
            warn!(node = %prototype, stage = "execute", "prototype vanished, group skipped");
            outcome
                .skipped
                .push(SkipRecord::new(prototype, Stage::Execute, "prototype no longer exists"));
            return outcome;
        }
        outcome.nodes.push(prototype);

        let prototype_keys = shape_keys(scene, prototype, group.mode).unwrap_or_default();
        for member in &group.members {
            if !scene.exists(member.node) {
                debug!(node = %member.node, stage = "execute", "member vanished");
                outcome
                    .skipped
                    .push(SkipRecord::new(member.node, Stage::Execute, "member no longer exists"));
                continue;
            }

            let keys = shape_keys(scene, member.node, group.mode).unwrap_or_default();
            if !keys.is_empty() && keys == prototype_keys {
                debug!(node = %member.node, stage = "execute", "already shares the prototype geometry");
                outcome.skipped.push(SkipRecord::new(
                    member.node,
                    Stage::Execute,
                    "already shares the prototype geometry",
                ));
                continue;
            }

            match convert(scene, prototype, member, group.mode) {
                Ok(node) => outcome.nodes.push(node),
                Err(err) => {
                    warn!(node = %member.node, stage = "execute", kind = err.kind(), "member left unconverted: {err}");
                    outcome
                        .skipped
                        .push(SkipRecord::from_error(member.node, Stage::Execute, &err));
                }
            }
        }
        outcome
    }
}

/// Sorted shape identities; in hierarchy mode across the whole subtree
fn shape_keys<S: SceneGraph + ?Sized>(scene: &S, node: NodeId, mode: GroupingMode) -> SceneResult<Vec<u64>> {
    let nodes = match mode {
        GroupingMode::Leaf => vec![node],
        GroupingMode::Hierarchy => scene.subtree(node)?,
    };
    let mut keys = Vec::new();
    for n in nodes {
        if let Some(key) = scene.geometry_key(n)? {
            keys.push(key);
        }
    }
    keys.sort_unstable();
    Ok(keys)
}

fn convert<S: SceneGraph + ?Sized>(
    scene: &mut S,
    prototype: NodeId,
    member: &InstanceCandidate,
    mode: GroupingMode,
) -> SceneResult<NodeId> {
    let target = scene.duplicate(member.node, DuplicateMode::TransformOnly)?;
    if let Err(err) = fill(scene, prototype, member, target, mode) {
        discard(scene, target, "unfinished instance");
        return Err(err);
    }

    // Loose children of a leaf mesh stay with the new instance
    if mode == GroupingMode::Leaf {
        for child in scene.children(member.node)? {
            scene.reparent(child, Some(target))?;
        }
    }
    scene.delete(member.node)?;
    scene.rename(target, &member.name)?;
    Ok(target)
}

fn fill<S: SceneGraph + ?Sized>(
    scene: &mut S,
    prototype: NodeId,
    member: &InstanceCandidate,
    target: NodeId,
    mode: GroupingMode,
) -> SceneResult<()> {
    scene.set_world_matrix(target, member.placement())?;
    if let Err(err) = scene.copy_attributes(member.node, target) {
        debug!(node = %member.node, stage = "execute", "attributes not copied: {err}");
    }

    let temp = scene.instance(prototype)?;
    let adopted = adopt(scene, temp, target, mode);
    if scene.exists(temp) {
        discard(scene, temp, "temporary instance");
    }
    adopted
}

fn discard<S: SceneGraph + ?Sized>(scene: &mut S, node: NodeId, what: &str) {
    if let Err(err) = scene.delete(node) {
        warn!(%node, stage = "execute", kind = err.kind(), "{what} left in the scene: {err}");
    }
}

/// Move the shared shape (and in hierarchy mode the shared subtree) onto `target`
fn adopt<S: SceneGraph + ?Sized>(scene: &mut S, temp: NodeId, target: NodeId, mode: GroupingMode) -> SceneResult<()> {
    if scene.has_renderable_shape(temp) {
        scene.transfer_shape(temp, target)?;
    }
    if mode == GroupingMode::Hierarchy {
        for child in scene.children(temp)? {
            let local = scene.local_matrix(child)?;
            scene.reparent(child, Some(target))?;
            scene.set_local_matrix(child, local)?;
        }
    }
    Ok(())
}

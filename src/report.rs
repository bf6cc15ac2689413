// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Structured outcome of an instancing run

use crate::error::SceneError;
use crate::scene::NodeId;
use crate::strategy::InstancingStrategy;
use serde::Serialize;
use std::fmt;

/// Pipeline stage a record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Separate,
    Canonicalize,
    Analyze,
    Reconstruct,
    Combine,
    Group,
    Execute,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Separate => "separate",
            Self::Canonicalize => "canonicalize",
            Self::Analyze => "analyze",
            Self::Reconstruct => "reconstruct",
            Self::Combine => "combine",
            Self::Group => "group",
            Self::Execute => "execute",
        };
        f.write_str(name)
    }
}

/// Something the run stepped over instead of failing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkipRecord {
    pub node: NodeId,
    pub stage: Stage,
    /// Error category, see [`SceneError::kind`]
    pub kind: &'static str,
    pub reason: String,
}

impl SkipRecord {
    pub fn new(node: NodeId, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            node,
            stage,
            kind: "skipped",
            reason: reason.into(),
        }
    }

    pub fn from_error(node: NodeId, stage: Stage, err: &SceneError) -> Self {
        Self {
            node,
            stage,
            kind: err.kind(),
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupReport {
    pub prototype: NodeId,
    pub prototype_name: String,
    /// Members found identical to the prototype
    pub members: usize,
    /// Members actually converted
    pub instances: usize,
    pub strategy: Option<InstancingStrategy>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub groups_processed: usize,
    pub instances_created: usize,
    pub groups: Vec<GroupReport>,
    pub skipped: Vec<SkipRecord>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_group(&mut self, group: GroupReport) {
        self.groups_processed += 1;
        self.instances_created += group.instances;
        self.groups.push(group);
    }

    pub fn skip(&mut self, record: SkipRecord) {
        self.skipped.push(record);
    }
}

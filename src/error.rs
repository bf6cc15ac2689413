// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Errors reported by scene-graph operations

use crate::scene::NodeId;
use thiserror::Error;

/// Failure of a single scene-graph call.
///
/// None of these abort a run: the instancer logs them with the node and
/// stage that produced them and moves on to the next item.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    /// The node was deleted earlier in the run.
    #[error("node {0} no longer exists")]
    StaleReference(NodeId),

    /// The node has no renderable geometry where some was expected.
    #[error("node {0} has no renderable geometry")]
    NoGeometry(NodeId),

    /// Parenting `node` under `parent` would make it its own ancestor.
    #[error("parenting {node} under {parent} would create a cycle")]
    Cycle { node: NodeId, parent: NodeId },

    /// Too few points for a principal-axis frame.
    #[error("node {node} has {found} points, at least {required} are required")]
    InsufficientPoints {
        node: NodeId,
        required: usize,
        found: usize,
    },

    /// The host rejected the operation.
    #[error("scene operation failed: {0}")]
    Operation(String),
}

impl SceneError {
    /// Short category name used in logs and skip records.
    pub fn kind(&self) -> &'static str {
        match self {
            SceneError::StaleReference(_) => "stale-reference",
            SceneError::NoGeometry(_) => "structural-invalid",
            SceneError::Cycle { .. } => "cycle-risk",
            SceneError::InsufficientPoints { .. } => "degenerate-input",
            SceneError::Operation(_) => "operation",
        }
    }
}

pub type SceneResult<T> = Result<T, SceneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SceneError::StaleReference(NodeId(3)).kind(), "stale-reference");
        assert_eq!(
            SceneError::Cycle {
                node: NodeId(1),
                parent: NodeId(2)
            }
            .kind(),
            "cycle-risk"
        );
    }

    #[test]
    fn test_error_display() {
        let err = SceneError::InsufficientPoints {
            node: NodeId(7),
            required: 4,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "node #7 has 2 points, at least 4 are required"
        );
    }
}

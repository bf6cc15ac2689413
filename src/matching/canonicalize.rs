// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Re-express a shell in its principal-axis frame
//!
//! The pivot moves to the vertex centroid and the local axes rotate onto the
//! principal axes while every vertex keeps its world position. Duplicates that
//! had their rotation frozen into the vertices end up with the same
//! object-space coordinates.

use crate::error::{SceneError, SceneResult};
use crate::geometry::pca::{self, PrincipalAxes};
use crate::scene::{NodeId, SceneGraph, Space};
use nalgebra::{Matrix3, Matrix4, Vector3};
use tracing::debug;

/// Fewer vertices than this leaves the frame untouched
pub const MIN_CANONICAL_POINTS: usize = 4;

/// Relative eigenvalue gap under which two principal axes are interchangeable
const DEGENERATE_RATIO: f64 = 1e-3;

#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalOutcome {
    /// New world matrix of the transform
    Applied(Matrix4<f64>),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Shape is shared; moving its vertices would move the other instances
    Instanced,
    TooFewPoints,
    NoEigenBasis,
}

pub struct TransformCanonicalizer;

impl TransformCanonicalizer {
    pub fn canonicalize<S: SceneGraph + ?Sized>(scene: &mut S, node: NodeId) -> SceneResult<CanonicalOutcome> {
        if !scene.exists(node) {
            return Err(SceneError::StaleReference(node));
        }
        if !scene.has_renderable_shape(node) {
            return Err(SceneError::NoGeometry(node));
        }
        if scene.is_instanced(node)? {
            return Ok(CanonicalOutcome::Skipped(SkipReason::Instanced));
        }

        let world_points = scene.points(node, Space::World)?;
        if world_points.len() < MIN_CANONICAL_POINTS {
            debug!(%node, stage = "canonicalize", points = world_points.len(), "too few points");
            return Ok(CanonicalOutcome::Skipped(SkipReason::TooFewPoints));
        }
        let Some(axes) = PrincipalAxes::compute(&world_points) else {
            return Ok(CanonicalOutcome::Skipped(SkipReason::NoEigenBasis));
        };

        let reference = pca::rotation_part(&scene.world_matrix(node)?);
        let rotation = canonical_rotation(&axes, &reference);
        let frame = pca::rigid_matrix(&rotation, &axes.centroid.coords);

        // Children must not follow the pivot
        let children = scene.children(node)?;
        let child_worlds = children
            .iter()
            .map(|&child| scene.world_matrix(child))
            .collect::<SceneResult<Vec<_>>>()?;

        scene.set_world_matrix(node, frame)?;
        scene.set_points(node, &world_points, Space::World)?;
        for (child, world) in children.into_iter().zip(child_worlds) {
            scene.set_world_matrix(child, world)?;
        }

        Ok(CanonicalOutcome::Applied(frame))
    }
}

/// Right-handed principal frame, disambiguated against `reference`.
///
/// Axis signs follow the reference axis they are most aligned with. Inside a
/// degenerate eigenspace the in-plane axis is the projection of the reference
/// axis most orthogonal to the well-defined one; a fully isotropic shape keeps
/// the reference frame.
pub fn canonical_rotation(axes: &PrincipalAxes, reference: &Matrix3<f64>) -> Matrix3<f64> {
    let refs = [
        reference.column(0).into_owned(),
        reference.column(1).into_owned(),
        reference.column(2).into_owned(),
    ];

    match (
        axes.major_pair_degenerate(DEGENERATE_RATIO),
        axes.minor_pair_degenerate(DEGENERATE_RATIO),
    ) {
        (true, true) => *reference,
        (true, false) => {
            let z = align_sign(&axes.axes[2], &refs);
            let x = in_plane(&z, &refs);
            Matrix3::from_columns(&[x, z.cross(&x), z])
        }
        (false, true) => {
            let x = align_sign(&axes.axes[0], &refs);
            let y = in_plane(&x, &refs);
            Matrix3::from_columns(&[x, y, x.cross(&y)])
        }
        (false, false) => {
            let x = align_sign(&axes.axes[0], &refs);
            let y = align_sign(&axes.axes[1], &refs);
            Matrix3::from_columns(&[x, y, x.cross(&y)])
        }
    }
}

fn align_sign(axis: &Vector3<f64>, refs: &[Vector3<f64>; 3]) -> Vector3<f64> {
    let mut best = 0;
    for k in 1..3 {
        if axis.dot(&refs[k]).abs() > axis.dot(&refs[best]).abs() {
            best = k;
        }
    }
    if axis.dot(&refs[best]) < 0.0 {
        -axis
    } else {
        *axis
    }
}

fn in_plane(normal: &Vector3<f64>, refs: &[Vector3<f64>; 3]) -> Vector3<f64> {
    let mut best = 0;
    for k in 1..3 {
        if normal.dot(&refs[k]).abs() < normal.dot(&refs[best]).abs() {
            best = k;
        }
    }
    let projected = refs[best] - normal * normal.dot(&refs[best]);
    projected.normalize()
}

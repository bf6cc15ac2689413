// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Principal component analysis and rigid alignment of point sets

use super::analytics::centroid;
use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, SymmetricEigen, Unit, Vector3};

/// Principal axes of a point cloud, largest variance first
#[derive(Debug, Clone, PartialEq)]
pub struct PrincipalAxes {
    pub centroid: Point3<f64>,
    /// Unit eigenvectors; `axes[2]` is `axes[0] × axes[1]` so the frame is right-handed
    pub axes: [Vector3<f64>; 3],
    /// Variances along each axis, sorted descending
    pub eigenvalues: [f64; 3],
}

impl PrincipalAxes {
    /// Returns `None` for fewer than 3 points or a non-finite decomposition.
    pub fn compute(points: &[Point3<f64>]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }

        let center = centroid(points);
        let eigen = SymmetricEigen::new(covariance(points, &center));

        let mut order = [0usize, 1, 2];
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

        let eigenvalues = order.map(|i| eigen.eigenvalues[i].max(0.0));
        let major = eigen.eigenvectors.column(order[0]).normalize();
        let second = eigen.eigenvectors.column(order[1]).normalize();
        let axes = [major, second, major.cross(&second)];

        let finite = eigenvalues.iter().all(|v| v.is_finite())
            && axes.iter().all(|a| a.iter().all(|c| c.is_finite()));
        finite.then_some(Self {
            centroid: center,
            axes,
            eigenvalues,
        })
    }

    /// Rotation whose columns are the principal axes
    pub fn basis(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&self.axes)
    }

    /// Eigenvalues divided by the largest one
    pub fn normalized_eigenvalues(&self) -> [f64; 3] {
        let max = self.eigenvalues[0];
        if max <= f64::EPSILON {
            return [0.0; 3];
        }
        self.eigenvalues.map(|v| v / max)
    }

    /// Whether the two largest eigenvalues are within `ratio` of the largest
    pub fn major_pair_degenerate(&self, ratio: f64) -> bool {
        self.nearly_equal(0, 1, ratio)
    }

    /// Whether the two smallest eigenvalues are within `ratio` of the largest
    pub fn minor_pair_degenerate(&self, ratio: f64) -> bool {
        self.nearly_equal(1, 2, ratio)
    }

    fn nearly_equal(&self, a: usize, b: usize, ratio: f64) -> bool {
        let scale = self.eigenvalues[0].max(f64::EPSILON);
        (self.eigenvalues[a] - self.eigenvalues[b]).abs() <= ratio * scale
    }
}

/// Covariance of points about `center`, normalized by the point count
pub fn covariance(points: &[Point3<f64>], center: &Point3<f64>) -> Matrix3<f64> {
    let mut cov = Matrix3::zeros();
    for p in points {
        let d = p - center;
        cov += d * d.transpose();
    }
    cov / points.len().max(1) as f64
}

/// The four sign flips with determinant +1
pub fn proper_sign_flips() -> [Matrix3<f64>; 4] {
    [
        Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 1.0)),
        Matrix3::from_diagonal(&Vector3::new(1.0, -1.0, -1.0)),
        Matrix3::from_diagonal(&Vector3::new(-1.0, 1.0, -1.0)),
        Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0)),
    ]
}

/// Rotation by `angle` radians about coordinate axis `axis` (0 = x, 1 = y, 2 = z)
pub fn axis_rotation(axis: usize, angle: f64) -> Matrix3<f64> {
    let unit = Unit::new_unchecked(match axis {
        0 => Vector3::x(),
        1 => Vector3::y(),
        _ => Vector3::z(),
    });
    Rotation3::from_axis_angle(&unit, angle).into_inner()
}

/// Embed a rotation and translation in a homogeneous matrix
pub fn rigid_matrix(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix4<f64> {
    let mut m = rotation.to_homogeneous();
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(translation);
    m
}

/// Least-squares rigid transform taking paired `source` points onto `target`.
///
/// Returns `None` for empty or mismatched inputs or a failed SVD.
pub fn kabsch(source: &[Point3<f64>], target: &[Point3<f64>]) -> Option<Matrix4<f64>> {
    if source.is_empty() || source.len() != target.len() {
        return None;
    }

    let source_center = centroid(source);
    let target_center = centroid(target);

    let mut h = Matrix3::zeros();
    for (s, t) in source.iter().zip(target) {
        h += (s - source_center) * (t - target_center).transpose();
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v = svd.v_t?.transpose();

    let mut rotation = v * u.transpose();
    if rotation.determinant() < 0.0 {
        let mut v = v;
        v.column_mut(2).neg_mut();
        rotation = v * u.transpose();
    }

    let translation = target_center.coords - rotation * source_center.coords;
    Some(rigid_matrix(&rotation, &translation))
}

/// Nearest proper rotation to the upper 3x3 of `matrix` with scale removed.
///
/// Columns are normalized and Gram-Schmidt orthogonalized; a mirrored frame
/// has its third axis flipped.
pub fn rotation_part(matrix: &Matrix4<f64>) -> Matrix3<f64> {
    let m = matrix.fixed_view::<3, 3>(0, 0);
    let x = m.column(0).into_owned();
    let y = m.column(1).into_owned();

    let x = if x.norm() > f64::EPSILON { x.normalize() } else { Vector3::x() };
    let y = y - x * x.dot(&y);
    let y = if y.norm() > f64::EPSILON {
        y.normalize()
    } else {
        x.cross(&Vector3::z()).try_normalize(f64::EPSILON).unwrap_or_else(Vector3::y)
    };
    Matrix3::from_columns(&[x, y, x.cross(&y)])
}

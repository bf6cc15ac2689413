// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry analytics and statistics

use super::BoundingBox;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Geometry statistics over a triangulated point set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryStats {
    /// Enclosed volume in cubic units (smaller than true for open meshes)
    pub volume: f64,
    /// Total surface area in square units
    pub surface_area: f64,
    pub bbox: BoundingBox,
    /// Mean vertex position
    pub centroid: Point3<f64>,
    pub vertex_count: usize,
    pub triangle_count: usize,
}

impl GeometryStats {
    /// Create empty stats
    pub fn empty() -> Self {
        Self {
            volume: 0.0,
            surface_area: 0.0,
            bbox: BoundingBox::empty(),
            centroid: Point3::origin(),
            vertex_count: 0,
            triangle_count: 0,
        }
    }
}

/// Analyze geometry and compute statistics
pub fn analyze(points: &[Point3<f64>], triangles: &[[usize; 3]]) -> GeometryStats {
    if points.is_empty() {
        return GeometryStats::empty();
    }

    GeometryStats {
        volume: enclosed_volume(points, triangles),
        surface_area: surface_area(points, triangles),
        bbox: BoundingBox::from_points(points),
        centroid: centroid(points),
        vertex_count: points.len(),
        triangle_count: triangles.len(),
    }
}

/// Volume from the signed tetrahedra each triangle forms with the origin
pub fn enclosed_volume(points: &[Point3<f64>], triangles: &[[usize; 3]]) -> f64 {
    let mut volume = 0.0;

    for tri in triangles {
        let v0 = &points[tri[0]].coords;
        let v1 = &points[tri[1]].coords;
        let v2 = &points[tri[2]].coords;
        volume += v0.dot(&v1.cross(v2)) / 6.0;
    }

    volume.abs()
}

/// Calculate total surface area
pub fn surface_area(points: &[Point3<f64>], triangles: &[[usize; 3]]) -> f64 {
    triangles
        .iter()
        .map(|tri| {
            let edge1 = points[tri[1]] - points[tri[0]];
            let edge2 = points[tri[2]] - points[tri[0]];
            edge1.cross(&edge2).norm() / 2.0
        })
        .sum()
}

/// Mean of all points, origin when empty
pub fn centroid(points: &[Point3<f64>]) -> Point3<f64> {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum = points
        .iter()
        .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords);
    Point3::from(sum / points.len() as f64)
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Point index for nearest-neighbor and radius queries
//!
//! Mesh vertices routinely share a coordinate on one axis (rings, grids,
//! box faces), so the index is kiddo's immutable tree, which has no bucket
//! limit on repeated axis values.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use nalgebra::Point3;
use std::fmt;

/// Static spatial index over a point set
pub struct PointTree {
    points: Vec<Point3<f64>>,
    tree: Option<ImmutableKdTree<f64, 3>>,
}

impl PointTree {
    pub fn build(points: &[Point3<f64>]) -> Self {
        let tree = if points.is_empty() {
            None
        } else {
            let coords: Vec<[f64; 3]> = points.iter().map(|p| [p.x, p.y, p.z]).collect();
            Some(ImmutableKdTree::new_from_slice(&coords))
        };
        Self {
            points: points.to_vec(),
            tree,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Closest point to `query` as (index, distance)
    pub fn nearest(&self, query: &Point3<f64>) -> Option<(usize, f64)> {
        let tree = self.tree.as_ref()?;
        let found = tree.nearest_one::<SquaredEuclidean>(&[query.x, query.y, query.z]);
        Some((found.item as usize, found.distance.sqrt()))
    }

    /// Indices of all points within `radius` of `query`, ascending
    pub fn within(&self, query: &Point3<f64>, radius: f64) -> Vec<usize> {
        let Some(tree) = self.tree.as_ref() else {
            return Vec::new();
        };
        let mut result: Vec<usize> = tree
            .within_unsorted::<SquaredEuclidean>(&[query.x, query.y, query.z], radius * radius)
            .into_iter()
            .map(|neighbour| neighbour.item as usize)
            .collect();
        result.sort_unstable();
        result
    }

    /// Largest nearest-neighbor distance from any of `points` into this tree
    pub fn max_nearest_distance(&self, points: &[Point3<f64>]) -> f64 {
        points
            .iter()
            .filter_map(|p| self.nearest(p))
            .map(|(_, d)| d)
            .fold(0.0, f64::max)
    }
}

impl fmt::Debug for PointTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PointTree").field("points", &self.points.len()).finish()
    }
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! k-means helpers: size classes in one dimension and spatial shell clusters

use crate::matching::ShellInfo;
use nalgebra::Point3;
use std::cmp::Ordering;
use tracing::debug;

const MAX_ITERATIONS: usize = 100;

/// Lowest two size classes closer than this ratio are treated as one
const CLASS_MERGE_RATIO: f64 = 3.0;

/// 1-D k-means over finite values, seeded at evenly spaced order statistics.
///
/// Returns the non-empty clusters in ascending order. `k` is capped at the
/// number of distinct values.
pub fn kmeans_1d(values: &[f64], k: usize) -> Vec<Vec<f64>> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    let mut distinct = sorted.clone();
    distinct.dedup();

    let k = k.min(distinct.len());
    if k == 0 {
        return Vec::new();
    }

    // min, median, max for k = 3
    let mut centers: Vec<f64> = if k == 1 {
        vec![sorted[sorted.len() / 2]]
    } else {
        (0..k).map(|i| sorted[i * (sorted.len() - 1) / (k - 1)]).collect()
    };

    let mut labels = vec![usize::MAX; sorted.len()];
    for _ in 0..MAX_ITERATIONS {
        let mut changed = false;
        for (i, v) in sorted.iter().enumerate() {
            let label = nearest_center(*v, &centers);
            if labels[i] != label {
                labels[i] = label;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        for (c, center) in centers.iter_mut().enumerate() {
            let (sum, count) = sorted
                .iter()
                .zip(&labels)
                .filter(|(_, &l)| l == c)
                .fold((0.0, 0usize), |(s, n), (v, _)| (s + v, n + 1));
            if count > 0 {
                *center = sum / count as f64;
            }
        }
    }

    let mut order: Vec<usize> = (0..k).collect();
    order.sort_by(|&a, &b| centers[a].total_cmp(&centers[b]));
    order
        .into_iter()
        .map(|c| {
            sorted
                .iter()
                .zip(&labels)
                .filter(|(_, &l)| l == c)
                .map(|(v, _)| *v)
                .collect::<Vec<f64>>()
        })
        .filter(|cluster| !cluster.is_empty())
        .collect()
}

fn nearest_center(value: f64, centers: &[f64]) -> usize {
    let mut best = 0;
    for (i, center) in centers.iter().enumerate().skip(1) {
        if (value - center).abs() < (value - centers[best]).abs() {
            best = i;
        }
    }
    best
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len().max(1) as f64
}

/// Value above which a size counts as body-sized, if the sizes separate at all.
///
/// Three classes are fitted; when the two smallest are within a factor of
/// three of each other they count as one small class and the cut moves up.
pub fn size_threshold(values: &[f64]) -> Option<f64> {
    let clusters = kmeans_1d(values, 3);
    let cut = |lower: &[f64], upper: &[f64]| {
        let low = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let high = upper.iter().copied().fold(f64::INFINITY, f64::min);
        (low + high) / 2.0
    };

    match clusters.len() {
        0 | 1 => None,
        2 => Some(cut(&clusters[0], &clusters[1])),
        _ => {
            if mean(&clusters[1]) < CLASS_MERGE_RATIO * mean(&clusters[0]) {
                Some(cut(&clusters[1], &clusters[2]))
            } else {
                Some(cut(&clusters[0], &clusters[1]))
            }
        }
    }
}

/// Partitions shells into a fixed number of spatial clusters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyClusterer {
    pub target: usize,
    pub max_iterations: usize,
}

impl AssemblyClusterer {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            max_iterations: MAX_ITERATIONS,
        }
    }

    /// Clusters of shell indices, each ascending, in seed order; empty clusters are dropped
    pub fn cluster(&self, shells: &[ShellInfo]) -> Vec<Vec<usize>> {
        if shells.is_empty() {
            return Vec::new();
        }
        if self.target <= 1 || shells.len() == 1 {
            return vec![(0..shells.len()).collect()];
        }

        // Big, detailed shells make stable anchors
        let mut ranked: Vec<usize> = (0..shells.len()).collect();
        ranked.sort_by(|&a, &b| {
            shells[b]
                .area
                .total_cmp(&shells[a].area)
                .then(shells[b].counts.vertices.cmp(&shells[a].counts.vertices))
                .then(a.cmp(&b))
        });
        let mut centers: Vec<Point3<f64>> = ranked
            .iter()
            .take(self.target)
            .map(|&i| shells[i].centroid)
            .collect();

        let mut labels = vec![usize::MAX; shells.len()];
        for iteration in 0..self.max_iterations {
            let mut changed = false;
            for (i, shell) in shells.iter().enumerate() {
                let label = nearest_point(&shell.centroid, &centers);
                if labels[i] != label {
                    labels[i] = label;
                    changed = true;
                }
            }
            if !changed {
                debug!(iterations = iteration, clusters = centers.len(), "k-means converged");
                break;
            }

            for (c, center) in centers.iter_mut().enumerate() {
                let members: Vec<&ShellInfo> = shells
                    .iter()
                    .zip(&labels)
                    .filter(|(_, &l)| l == c)
                    .map(|(s, _)| s)
                    .collect();
                if !members.is_empty() {
                    let sum = members.iter().fold(nalgebra::Vector3::zeros(), |acc, s| acc + s.centroid.coords);
                    *center = Point3::from(sum / members.len() as f64);
                }
            }
        }

        (0..centers.len())
            .map(|c| (0..shells.len()).filter(|&i| labels[i] == c).collect::<Vec<usize>>())
            .filter(|cluster| !cluster.is_empty())
            .collect()
    }
}

fn nearest_point(point: &Point3<f64>, centers: &[Point3<f64>]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (i, center) in centers.iter().enumerate() {
        let d = (point - center).norm_squared();
        if d.partial_cmp(&best_distance) == Some(Ordering::Less) {
            best = i;
            best_distance = d;
        }
    }
    best
}

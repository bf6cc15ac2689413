// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Infer parent/child assemblies from a flat list of shells
//!
//! Roots claim nearby smaller shells, nearest pair first. Repeated large
//! signatures ("peer bodies") never claim each other, and once a repeated peer
//! exists only peers may act as roots.

use super::cluster::size_threshold;
use super::{Assembly, Reconstruction};
use crate::config::InstancerConfig;
use crate::geometry::PointTree;
use crate::matching::{quantize, ShellClass, ShellInfo, Signature};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info};

/// A child must be below this fraction of its root on the deciding metric
const SIZE_MARGIN: f64 = 0.95;

/// A unique shell this many times the median size counts as a peer body
const GIANT_FACTOR: f64 = 20.0;

/// Singleton share above which the clutter pass runs
const SINGLETON_LIMIT: f64 = 0.3;

/// Metrics at or below this carry no signal
const METRIC_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    distance: f64,
    root: usize,
    child: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct SignatureStats {
    count: usize,
    volume: f64,
    area: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyReconstructor {
    /// Search radius as a multiple of the root's bounding-box diagonal
    pub search_radius_mult: f64,
    pub distance_precision: u32,
    /// Run the clutter pass when too many shells end up alone
    pub reduce_clutter: bool,
}

impl Default for HierarchyReconstructor {
    fn default() -> Self {
        Self {
            search_radius_mult: 1.5,
            distance_precision: 2,
            reduce_clutter: true,
        }
    }
}

impl HierarchyReconstructor {
    pub fn from_config(config: &InstancerConfig) -> Self {
        Self {
            search_radius_mult: config.search_radius_mult,
            distance_precision: config.distance_precision,
            reduce_clutter: !config.combine_assemblies,
        }
    }

    /// Group shells into assemblies; `signatures[i]` belongs to `shells[i]`
    pub fn reconstruct(&self, mut shells: Vec<ShellInfo>, signatures: &[Signature]) -> Reconstruction {
        let n = shells.len().min(signatures.len());
        shells.truncate(n);
        if n == 0 {
            return Reconstruction::default();
        }

        // Dense ids in signature order
        let mut ids: BTreeMap<&Signature, usize> = BTreeMap::new();
        for signature in &signatures[..n] {
            let next = ids.len();
            ids.entry(signature).or_insert(next);
        }
        let sig_of: Vec<usize> = signatures[..n].iter().map(|s| ids[s]).collect();

        let peers = self.peer_bodies(&shells, &sig_of, ids.len());
        let candidates = self.candidates(&shells, &sig_of, &peers);
        debug!(shells = n, signatures = ids.len(), candidates = candidates.len(), "reconstruction candidates");

        let parents = greedy_assign(&candidates, n);
        let mut assemblies = self.assemblies(&shells, signatures, &parents);
        let mut clutter = Vec::new();

        let singletons = assemblies.iter().filter(|a| a.is_singleton()).count();
        if self.reduce_clutter && singletons as f64 > SINGLETON_LIMIT * assemblies.len() as f64 {
            if let Some((kept, junk)) = self.reduce(&shells, signatures, &sig_of, &candidates, &assemblies) {
                assemblies = kept;
                clutter = junk;
            }
        }

        for assembly in &assemblies {
            if assembly.is_singleton() {
                continue;
            }
            shells[assembly.root].class = ShellClass::Body;
            for &part in &assembly.parts {
                shells[part].class = ShellClass::Part;
            }
        }
        for &index in &clutter {
            shells[index].class = ShellClass::Clutter;
        }

        info!(
            assemblies = assemblies.len(),
            multi_part = assemblies.iter().filter(|a| !a.is_singleton()).count(),
            clutter = clutter.len(),
            "hierarchy reconstructed"
        );
        Reconstruction {
            shells,
            assemblies,
            clutter,
        }
    }

    /// Per-signature flag: may act as a root and never be claimed by another peer
    fn peer_bodies(&self, shells: &[ShellInfo], sig_of: &[usize], count: usize) -> Vec<bool> {
        let mut stats = vec![SignatureStats::default(); count];
        for (shell, &sig) in shells.iter().zip(sig_of) {
            stats[sig].count += 1;
            stats[sig].volume += shell.volume;
            stats[sig].area += shell.area;
        }
        for s in &mut stats {
            s.volume /= s.count.max(1) as f64;
            s.area /= s.count.max(1) as f64;
        }

        let volume_threshold = class_threshold(&stats, |s| s.volume);
        let area_threshold = class_threshold(&stats, |s| s.area);
        let large = |s: &SignatureStats| {
            if s.volume > METRIC_EPSILON {
                if let Some(threshold) = volume_threshold {
                    return s.volume > threshold;
                }
            }
            area_threshold.is_some_and(|threshold| s.area > threshold)
        };

        let mut metrics: Vec<f64> = shells.iter().map(size_metric).collect();
        metrics.sort_by(f64::total_cmp);
        let median = metrics[metrics.len() / 2];

        let mut peers: Vec<bool> = stats
            .iter()
            .map(|s| s.count >= 2 && large(s))
            .collect();
        for (shell, &sig) in shells.iter().zip(sig_of) {
            if stats[sig].count == 1 && median > METRIC_EPSILON && size_metric(shell) >= GIANT_FACTOR * median {
                peers[sig] = true;
            }
        }
        debug!(peers = peers.iter().filter(|p| **p).count(), "peer body signatures");
        peers
    }

    fn candidates(&self, shells: &[ShellInfo], sig_of: &[usize], peers: &[bool]) -> Vec<Candidate> {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &sig in sig_of {
            *counts.entry(sig).or_default() += 1;
        }
        let restrict = peers
            .iter()
            .enumerate()
            .any(|(sig, &peer)| peer && counts.get(&sig).copied().unwrap_or(0) >= 2);

        let centers: Vec<_> = shells.iter().map(|s| s.center).collect();
        let tree = PointTree::build(&centers);

        let mut candidates = Vec::new();
        for (root, shell) in shells.iter().enumerate() {
            if restrict && !peers[sig_of[root]] {
                continue;
            }
            let radius = shell.diagonal * self.search_radius_mult;
            for child in tree.within(&shell.center, radius) {
                if child == root || sig_of[child] == sig_of[root] {
                    continue;
                }
                if peers[sig_of[child]] && peers[sig_of[root]] {
                    continue;
                }
                if !strictly_smaller(&shells[child], shell) {
                    continue;
                }
                candidates.push(Candidate {
                    distance: (shells[child].centroid - shell.centroid).norm(),
                    root,
                    child,
                });
            }
        }
        candidates
    }

    fn assemblies(&self, shells: &[ShellInfo], signatures: &[Signature], parents: &[Option<usize>]) -> Vec<Assembly> {
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); parents.len()];
        for (child, parent) in parents.iter().enumerate() {
            if let Some(parent) = parent {
                children[*parent].push(child);
            }
        }

        (0..parents.len())
            .filter(|&i| parents[i].is_none())
            .map(|root| {
                let mut parts = Vec::new();
                let mut queue: VecDeque<usize> = children[root].iter().copied().collect();
                while let Some(next) = queue.pop_front() {
                    parts.push(next);
                    queue.extend(children[next].iter().copied());
                }
                Assembly::new(root, parts, shells, signatures, self.distance_precision)
            })
            .collect()
    }

    /// Second grouping that ignores rare attachments; `None` when it is no better
    fn reduce(
        &self,
        shells: &[ShellInfo],
        signatures: &[Signature],
        sig_of: &[usize],
        candidates: &[Candidate],
        first: &[Assembly],
    ) -> Option<(Vec<Assembly>, Vec<usize>)> {
        let pair_key = |child: usize, root: usize| {
            let distance = (shells[child].centroid - shells[root].centroid).norm();
            (sig_of[child], quantize(distance, self.distance_precision))
        };

        let mut frequency: BTreeMap<(usize, i64), usize> = BTreeMap::new();
        for assembly in first {
            let pairs: BTreeSet<(usize, i64)> = assembly.parts.iter().map(|&p| pair_key(p, assembly.root)).collect();
            for pair in pairs {
                *frequency.entry(pair).or_default() += 1;
            }
        }
        let threshold = (first.len() / 10).max(2);

        let (kept, dropped): (Vec<Candidate>, Vec<Candidate>) = candidates.iter().partition(|c| {
            frequency.get(&pair_key(c.child, c.root)).copied().unwrap_or(0) >= threshold
        });
        let second = self.assemblies(shells, signatures, &greedy_assign(&kept, shells.len()));

        let rejected: BTreeSet<usize> = dropped.iter().map(|c| c.child).collect();
        let clutter: Vec<usize> = second
            .iter()
            .filter(|a| a.is_singleton() && rejected.contains(&a.root))
            .map(|a| a.root)
            .collect();

        let before = singleton_share(first.iter().filter(|a| a.is_singleton()).count(), first.len());
        let after = singleton_share(
            second.iter().filter(|a| a.is_singleton()).count() - clutter.len(),
            second.len() - clutter.len(),
        );
        debug!(threshold, before, after, clutter = clutter.len(), "clutter pass");
        if after >= before {
            return None;
        }

        let junk: BTreeSet<usize> = clutter.iter().copied().collect();
        let assemblies = second.into_iter().filter(|a| !junk.contains(&a.root)).collect();
        Some((assemblies, clutter))
    }
}

/// Size cut over per-signature averages.
///
/// Repeated signatures decide when they separate on their own; one-off shells
/// would otherwise drag the cut around.
fn class_threshold(stats: &[SignatureStats], metric: impl Fn(&SignatureStats) -> f64) -> Option<f64> {
    let repeated: Vec<f64> = stats.iter().filter(|s| s.count >= 2).map(&metric).collect();
    size_threshold(&repeated).or_else(|| {
        let all: Vec<f64> = stats.iter().map(&metric).collect();
        size_threshold(&all)
    })
}

fn size_metric(shell: &ShellInfo) -> f64 {
    if shell.volume > METRIC_EPSILON {
        shell.volume
    } else {
        shell.area
    }
}

/// Volume, then area, then diagonal; the first both shells carry decides
fn strictly_smaller(child: &ShellInfo, root: &ShellInfo) -> bool {
    if child.volume > METRIC_EPSILON && root.volume > METRIC_EPSILON {
        child.volume < root.volume * SIZE_MARGIN
    } else if child.area > METRIC_EPSILON && root.area > METRIC_EPSILON {
        child.area < root.area * SIZE_MARGIN
    } else {
        child.diagonal < root.diagonal * SIZE_MARGIN
    }
}

fn singleton_share(singletons: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        singletons as f64 / total as f64
    }
}

/// Nearest pair first; a claimed child stays with its first root
fn greedy_assign(candidates: &[Candidate], count: usize) -> Vec<Option<usize>> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.root.cmp(&b.root))
            .then(a.child.cmp(&b.child))
    });

    let mut parents: Vec<Option<usize>> = vec![None; count];
    for candidate in sorted {
        if parents[candidate.child].is_some() {
            continue;
        }
        // Walking up from the root must not reach the child
        let mut cursor = Some(candidate.root);
        let mut cycle = false;
        while let Some(node) = cursor {
            if node == candidate.child {
                cycle = true;
                break;
            }
            cursor = parents[node];
        }
        if !cycle {
            parents[candidate.child] = Some(candidate.root);
        }
    }
    parents
}

// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometric identity tests between shapes and between subtrees
//!
//! Shapes are compared in escalating cost order: same-index points, nearest
//! neighbors, then rigid alignment through the principal axes. The first
//! stage that passes decides.

use super::cache::AnalysisCache;
use crate::config::InstancerConfig;
use crate::error::SceneResult;
use crate::geometry::pca::{self, PrincipalAxes};
use crate::geometry::{BoundingBox, PointTree};
use crate::scene::{NodeId, SceneGraph};
use nalgebra::{Matrix3, Matrix4, Point3};
use serde::Serialize;

/// Relative eigenvalue gap under which an eigenspace counts as symmetric
const SYMMETRY_RATIO: f64 = 0.05;

/// Angular step for rotation samples inside a symmetric eigenspace
const ROTATION_STEP_DEGREES: usize = 15;

/// Closest-point refinement rounds per candidate rotation
const REFINE_ITERATIONS: usize = 3;

/// Candidates farther off than this fraction of the prototype diagonal are not refined
const REFINE_FRACTION: f64 = 0.25;

/// Cap on alignment hypotheses tried for one subtree pair
const MAX_HIERARCHY_SEEDS: usize = 16;

/// Stage that confirmed a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Ordered,
    Unordered,
    Centered,
    Aligned,
    Hierarchy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShellMatch {
    pub stage: MatchStage,
    /// Rigid transform with `member ≈ relative · prototype` in object space;
    /// `None` means identity
    pub relative: Option<Matrix4<f64>>,
}

impl ShellMatch {
    fn exact(stage: MatchStage) -> Self {
        Self { stage, relative: None }
    }

    pub fn relative_or_identity(&self) -> Matrix4<f64> {
        self.relative.unwrap_or_else(Matrix4::identity)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EqualityEngine {
    pub tolerance: f64,
    pub check_uvs: bool,
    pub uv_tolerance: f64,
}

impl EqualityEngine {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            check_uvs: false,
            uv_tolerance: 0.001,
        }
    }

    pub fn with_uv_check(mut self, uv_tolerance: f64) -> Self {
        self.check_uvs = true;
        self.uv_tolerance = uv_tolerance;
        self
    }

    pub fn from_config(config: &InstancerConfig) -> Self {
        let engine = Self::new(config.tolerance);
        if config.check_uvs {
            engine.with_uv_check(config.uv_tolerance)
        } else {
            engine
        }
    }

    /// Compare raw object-space point sets; `prototype_tree` indexes `prototype`
    pub fn compare_points(
        &self,
        prototype: &[Point3<f64>],
        prototype_tree: &PointTree,
        member: &[Point3<f64>],
    ) -> Option<ShellMatch> {
        if prototype.is_empty() || member.is_empty() {
            return None;
        }

        if prototype.len() == member.len()
            && prototype
                .iter()
                .zip(member)
                .all(|(a, b)| (a - b).norm() <= self.tolerance)
        {
            return Some(ShellMatch::exact(MatchStage::Ordered));
        }

        if self.covers(prototype, prototype_tree, member) {
            return Some(ShellMatch::exact(MatchStage::Unordered));
        }

        self.align(prototype, prototype_tree, member)
    }

    /// Symmetric nearest-neighbor distance within tolerance
    fn covers(&self, prototype: &[Point3<f64>], prototype_tree: &PointTree, member: &[Point3<f64>]) -> bool {
        prototype_tree.max_nearest_distance(member) <= self.tolerance
            && PointTree::build(member).max_nearest_distance(prototype) <= self.tolerance
    }

    fn align(&self, prototype: &[Point3<f64>], tree: &PointTree, member: &[Point3<f64>]) -> Option<ShellMatch> {
        self.alignments(prototype, tree, member, 1).into_iter().next()
    }

    /// Up to `limit` distinct rigid placements of the prototype onto the member
    fn alignments(
        &self,
        prototype: &[Point3<f64>],
        tree: &PointTree,
        member: &[Point3<f64>],
        limit: usize,
    ) -> Vec<ShellMatch> {
        let mut found: Vec<ShellMatch> = Vec::new();
        if prototype.len() < 3 || member.len() < 3 || limit == 0 {
            return found;
        }
        let (Some(pa), Some(pb)) = (PrincipalAxes::compute(prototype), PrincipalAxes::compute(member)) else {
            return found;
        };

        let offset = pa.centroid - pb.centroid;
        let shifted: Vec<Point3<f64>> = member.iter().map(|p| p + offset).collect();
        if self.covers(prototype, tree, &shifted) {
            found.push(ShellMatch {
                stage: MatchStage::Centered,
                relative: Some(Matrix4::new_translation(&-offset)),
            });
        }

        let bound = REFINE_FRACTION * BoundingBox::from_points(prototype).diagonal();
        for rotation in candidate_rotations(&pa, &pb) {
            if found.len() >= limit {
                break;
            }
            let translation = pa.centroid.coords - rotation * pb.centroid.coords;
            let guess = pca::rigid_matrix(&rotation, &translation);
            let Some(relative) = self
                .fit(prototype, tree, member, guess, bound)
                .and_then(|to_prototype| to_prototype.try_inverse())
            else {
                continue;
            };
            let known = found
                .iter()
                .any(|m| (m.relative_or_identity() - relative).abs().max() < 1e-6);
            if !known {
                found.push(ShellMatch {
                    stage: MatchStage::Aligned,
                    relative: Some(relative),
                });
            }
        }
        found.truncate(limit);
        found
    }

    /// Accept `transform` (member → prototype) or refine it by closest points
    fn fit(
        &self,
        prototype: &[Point3<f64>],
        tree: &PointTree,
        member: &[Point3<f64>],
        mut transform: Matrix4<f64>,
        bound: f64,
    ) -> Option<Matrix4<f64>> {
        for iteration in 0..=REFINE_ITERATIONS {
            let mut worst: f64 = 0.0;
            let mut paired = Vec::with_capacity(member.len());
            for p in member {
                let (index, distance) = tree.nearest(&transform.transform_point(p))?;
                worst = worst.max(distance);
                paired.push(prototype[index]);
            }

            if worst <= self.tolerance {
                return Some(transform);
            }
            if worst > bound || iteration == REFINE_ITERATIONS {
                return None;
            }
            transform = pca::kabsch(member, &paired)?;
        }
        None
    }

    /// Compare two shapes in the scene
    pub fn compare_shells<S: SceneGraph + ?Sized>(
        &self,
        scene: &S,
        cache: &mut AnalysisCache,
        prototype: NodeId,
        member: NodeId,
    ) -> SceneResult<Option<ShellMatch>> {
        let a = cache.object_points(scene, prototype)?;
        let tree = cache.point_tree(scene, prototype)?;
        let b = cache.object_points(scene, member)?;

        let Some(found) = self.compare_points(&a, &tree, &b) else {
            return Ok(None);
        };
        if self.check_uvs && !self.uvs_match(scene, prototype, member)? {
            return Ok(None);
        }
        Ok(Some(found))
    }

    fn uvs_match<S: SceneGraph + ?Sized>(&self, scene: &S, a: NodeId, b: NodeId) -> SceneResult<bool> {
        let mut ua = scene.uv_sets(a)?;
        let mut ub = scene.uv_sets(b)?;
        if ua.len() != ub.len() {
            return Ok(false);
        }
        ua.sort_by(|x, y| x.name.cmp(&y.name));
        ub.sort_by(|x, y| x.name.cmp(&y.name));

        Ok(ua.iter().zip(&ub).all(|(x, y)| {
            x.name == y.name
                && x.coords.len() == y.coords.len()
                && x.coords.iter().zip(&y.coords).all(|(p, q)| {
                    (p[0] - q[0]).abs() <= self.uv_tolerance && (p[1] - q[1]).abs() <= self.uv_tolerance
                })
        }))
    }

    /// Compare two subtrees: shape at each level, child layout, and a common rigid placement
    pub fn compare_hierarchies<S: SceneGraph + ?Sized>(
        &self,
        scene: &S,
        cache: &mut AnalysisCache,
        prototype: NodeId,
        member: NodeId,
    ) -> SceneResult<Option<ShellMatch>> {
        if !self.same_layout(scene, prototype, member)? {
            return Ok(None);
        }

        for seed in self.hierarchy_seeds(scene, cache, prototype, member)? {
            if self.verify_subtree(scene, cache, prototype, member, &seed)? {
                let identity = (seed - Matrix4::identity()).abs().max() < 1e-9;
                return Ok(Some(ShellMatch {
                    stage: MatchStage::Hierarchy,
                    relative: (!identity).then_some(seed),
                }));
            }
        }
        Ok(None)
    }

    /// Shape presence, child count, child keys, and pairwise child distances
    fn same_layout<S: SceneGraph + ?Sized>(&self, scene: &S, a: NodeId, b: NodeId) -> SceneResult<bool> {
        if scene.has_renderable_shape(a) != scene.has_renderable_shape(b) {
            return Ok(false);
        }
        let ka = sorted_child_keys(scene, a)?;
        let kb = sorted_child_keys(scene, b)?;
        if ka.len() != kb.len() {
            return Ok(false);
        }
        if !ka.iter().zip(&kb).all(|(x, y)| self.keys_match(x, y)) {
            return Ok(false);
        }

        let da = constellation(&ka);
        let db = constellation(&kb);
        Ok(da.iter().zip(&db).all(|(x, y)| (x - y).abs() <= self.tolerance))
    }

    fn keys_match(&self, x: &ChildKey, y: &ChildKey) -> bool {
        x.counts == y.counts && (x.distance - y.distance).abs() <= self.tolerance
    }

    /// Candidate placements of the prototype subtree onto the member subtree
    fn hierarchy_seeds<S: SceneGraph + ?Sized>(
        &self,
        scene: &S,
        cache: &mut AnalysisCache,
        a: NodeId,
        b: NodeId,
    ) -> SceneResult<Vec<Matrix4<f64>>> {
        let mut seeds = Vec::new();

        if scene.has_renderable_shape(a) {
            let placements = self.shell_placements(scene, cache, a, b, MAX_HIERARCHY_SEEDS)?;
            if placements.is_empty() {
                return Ok(seeds);
            }
            seeds.extend(placements);
        }

        let ka = sorted_child_keys(scene, a)?;
        let kb = sorted_child_keys(scene, b)?;
        'pairs: for x in &ka {
            if !scene.has_renderable_shape(x.node) {
                continue;
            }
            for y in kb.iter().filter(|y| self.keys_match(x, y)) {
                if seeds.len() >= MAX_HIERARCHY_SEEDS {
                    break 'pairs;
                }
                if !scene.has_renderable_shape(y.node) {
                    continue;
                }
                let Some(inverse) = x.local.try_inverse() else {
                    continue;
                };
                let limit = MAX_HIERARCHY_SEEDS - seeds.len();
                for relative in self.shell_placements(scene, cache, x.node, y.node, limit)? {
                    seeds.push(y.local * relative * inverse);
                }
            }
        }

        if ka.len() >= 3 {
            let source: Vec<Point3<f64>> = ka.iter().map(|k| k.position).collect();
            let target: Vec<Point3<f64>> = kb.iter().map(|k| k.position).collect();
            if let Some(fit) = pca::kabsch(&source, &target) {
                seeds.push(fit);
            }
        }

        seeds.push(Matrix4::identity());
        Ok(seeds)
    }

    /// Every way the prototype shape sits on the member shape, exact placement first.
    ///
    /// Symmetric parts admit several placements; only the subtree as a whole
    /// decides which one is right.
    fn shell_placements<S: SceneGraph + ?Sized>(
        &self,
        scene: &S,
        cache: &mut AnalysisCache,
        a: NodeId,
        b: NodeId,
        limit: usize,
    ) -> SceneResult<Vec<Matrix4<f64>>> {
        let pa = cache.object_points(scene, a)?;
        let tree = cache.point_tree(scene, a)?;
        let pb = cache.object_points(scene, b)?;
        if pa.is_empty() || pb.is_empty() {
            return Ok(Vec::new());
        }

        let mut placements = Vec::new();
        if self.covers(&pa, &tree, &pb) {
            placements.push(Matrix4::identity());
        }
        placements.extend(
            self.alignments(&pa, &tree, &pb, limit)
                .iter()
                .map(ShellMatch::relative_or_identity),
        );
        placements.truncate(limit);
        Ok(placements)
    }

    /// Whether `b ≈ g · a` holds for the shape and every descendant
    fn verify_subtree<S: SceneGraph + ?Sized>(
        &self,
        scene: &S,
        cache: &mut AnalysisCache,
        a: NodeId,
        b: NodeId,
        g: &Matrix4<f64>,
    ) -> SceneResult<bool> {
        let has_shape = scene.has_renderable_shape(a);
        if has_shape != scene.has_renderable_shape(b) {
            return Ok(false);
        }
        if has_shape {
            let pa = cache.object_points(scene, a)?;
            let pb = cache.object_points(scene, b)?;
            if pa.len() != pb.len() {
                return Ok(false);
            }
            let tree = cache.point_tree(scene, b)?;
            let moved: Vec<Point3<f64>> = pa.iter().map(|p| g.transform_point(p)).collect();
            if tree.max_nearest_distance(&moved) > self.tolerance {
                return Ok(false);
            }
            if self.check_uvs && !self.uvs_match(scene, a, b)? {
                return Ok(false);
            }
        }

        let ka = sorted_child_keys(scene, a)?;
        let kb = sorted_child_keys(scene, b)?;
        if ka.len() != kb.len() {
            return Ok(false);
        }

        let mut used = vec![false; kb.len()];
        for x in &ka {
            let mut found = false;
            for (j, y) in kb.iter().enumerate() {
                if used[j] || !self.keys_match(x, y) {
                    continue;
                }
                let Some(inverse) = y.local.try_inverse() else {
                    continue;
                };
                if self.verify_subtree(scene, cache, x.node, y.node, &(inverse * g * x.local))? {
                    used[j] = true;
                    found = true;
                    break;
                }
            }
            if !found {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Sort key and placement of a child relative to its parent
struct ChildKey {
    node: NodeId,
    local: Matrix4<f64>,
    position: Point3<f64>,
    distance: f64,
    counts: (usize, usize, usize),
}

fn sorted_child_keys<S: SceneGraph + ?Sized>(scene: &S, node: NodeId) -> SceneResult<Vec<ChildKey>> {
    let mut keys = Vec::new();
    for child in scene.children(node)? {
        let local = scene.local_matrix(child)?;
        let position = Point3::from(local.fixed_view::<3, 1>(0, 3).into_owned());
        let counts = if scene.has_renderable_shape(child) {
            let c = scene.counts(child)?;
            (c.vertices, c.edges, c.faces)
        } else {
            (0, 0, 0)
        };
        keys.push(ChildKey {
            node: child,
            local,
            position,
            distance: position.coords.norm(),
            counts,
        });
    }
    keys.sort_by(|x, y| {
        super::signature::quantize(x.distance, 3)
            .cmp(&super::signature::quantize(y.distance, 3))
            .then(x.counts.cmp(&y.counts))
    });
    Ok(keys)
}

/// Sorted pairwise distances between child pivots
fn constellation(keys: &[ChildKey]) -> Vec<f64> {
    let mut distances = Vec::new();
    for i in 0..keys.len() {
        for j in i + 1..keys.len() {
            distances.push((keys[i].position - keys[j].position).norm());
        }
    }
    distances.sort_by(f64::total_cmp);
    distances
}

/// Rotations taking the member's centered points onto the prototype's
fn candidate_rotations(pa: &PrincipalAxes, pb: &PrincipalAxes) -> Vec<Matrix3<f64>> {
    let ea = pa.basis();
    let eb_t = pb.basis().transpose();
    let flips = pca::proper_sign_flips();

    let mut rotations: Vec<Matrix3<f64>> = flips.iter().map(|flip| ea * flip * eb_t).collect();

    let mut symmetric_axes = Vec::new();
    if pa.major_pair_degenerate(SYMMETRY_RATIO) || pb.major_pair_degenerate(SYMMETRY_RATIO) {
        symmetric_axes.push(2);
    }
    if pa.minor_pair_degenerate(SYMMETRY_RATIO) || pb.minor_pair_degenerate(SYMMETRY_RATIO) {
        symmetric_axes.push(0);
    }

    for axis in symmetric_axes {
        for step in 1..360 / ROTATION_STEP_DEGREES {
            let angle = ((step * ROTATION_STEP_DEGREES) as f64).to_radians();
            let sample = pca::axis_rotation(axis, angle);
            rotations.extend(flips.iter().map(|flip| ea * flip * sample * eb_t));
        }
    }
    rotations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Primitive;
    use crate::scene::MemoryScene;
    use nalgebra::{Rotation3, Vector3};

    fn engine() -> EqualityEngine {
        EqualityEngine::new(1e-3)
    }

    fn compare(a: &[Point3<f64>], b: &[Point3<f64>]) -> Option<ShellMatch> {
        engine().compare_points(a, &PointTree::build(a), b)
    }

    fn moved(points: &[Point3<f64>], m: &Matrix4<f64>) -> Vec<Point3<f64>> {
        points.iter().map(|p| m.transform_point(p)).collect()
    }

    #[test]
    fn test_ordered_then_unordered() {
        let a = Primitive::cuboid(Vector3::new(1.0, 2.0, 3.0)).to_mesh().positions;
        assert_eq!(compare(&a, &a).unwrap().stage, MatchStage::Ordered);

        let mut shuffled = a.clone();
        shuffled.reverse();
        assert_eq!(compare(&a, &shuffled).unwrap().stage, MatchStage::Unordered);
    }

    #[test]
    fn test_translated_points_match_centered() {
        let a = Primitive::cuboid(Vector3::new(1.0, 2.0, 3.0)).to_mesh().positions;
        let b = moved(&a, &Matrix4::new_translation(&Vector3::new(0.5, 0.0, 0.0)));
        let found = compare(&a, &b).unwrap();
        assert_eq!(found.stage, MatchStage::Centered);

        let relative = found.relative.unwrap();
        for (p, q) in a.iter().zip(&b) {
            assert!((relative.transform_point(p) - q).norm() < 1e-9);
        }
    }

    #[test]
    fn test_rotated_points_are_aligned() {
        let a = Primitive::tetrahedron(Vector3::new(3.0, 2.0, 1.0)).to_mesh().positions;
        let motion = Rotation3::from_euler_angles(0.7, -1.3, 2.1).to_homogeneous();
        let b = moved(&a, &motion);

        let found = compare(&a, &b).unwrap();
        assert_eq!(found.stage, MatchStage::Aligned);
        let relative = found.relative.unwrap();
        for (p, q) in a.iter().zip(&b) {
            assert!((relative.transform_point(p) - q).norm() < 1e-6);
        }
    }

    #[test]
    fn test_symmetric_shape_found_by_rotation_samples() {
        let a = Primitive::cylinder(3.0, 1.0, 12).to_mesh().positions;
        // Spin about the symmetry axis by an angle off every sample
        let b = moved(&a, &Rotation3::from_euler_angles(0.0, 0.21, 0.0).to_homogeneous());
        let found = compare(&a, &b).unwrap();
        assert_ne!(found.stage, MatchStage::Ordered);
    }

    #[test]
    fn test_mirror_image_is_rejected() {
        let a = Primitive::tetrahedron(Vector3::new(3.0, 2.0, 1.0)).to_mesh().positions;
        let mirror = Matrix4::new_nonuniform_scaling(&Vector3::new(-1.0, 1.0, 1.0));
        assert!(compare(&a, &moved(&a, &mirror)).is_none());
    }

    #[test]
    fn test_different_shapes_are_rejected() {
        let a = Primitive::cuboid(Vector3::new(1.0, 2.0, 3.0)).to_mesh().positions;
        let b = Primitive::cuboid(Vector3::new(1.0, 2.0, 3.1)).to_mesh().positions;
        assert!(compare(&a, &b).is_none());
    }

    #[test]
    fn test_too_few_points_skip_alignment() {
        let a = vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)];
        let b = vec![Point3::new(0.0, 1.0, 0.0), Point3::new(0.0, 2.0, 0.0)];
        assert!(compare(&a, &b).is_none());
    }

    #[test]
    fn test_uv_mismatch_rejects() {
        use crate::geometry::UvSet;
        let mut scene = MemoryScene::new();
        let mut mesh = Primitive::cube(1.0).to_mesh();
        mesh.uv_sets.push(UvSet {
            name: "map1".to_string(),
            coords: vec![[0.0, 0.0]; 8],
        });
        let a = scene.add_mesh("a", mesh.clone(), Matrix4::identity(), None);
        mesh.uv_sets[0].coords[3] = [0.5, 0.5];
        let b = scene.add_mesh("b", mesh, Matrix4::identity(), None);

        let mut cache = AnalysisCache::new();
        assert!(engine().compare_shells(&scene, &mut cache, a, b).unwrap().is_some());
        let strict = engine().with_uv_check(1e-3);
        assert!(strict.compare_shells(&scene, &mut cache, a, b).unwrap().is_none());
    }

    fn assembly(scene: &mut MemoryScene, placement: Matrix4<f64>, lid_offset: f64) -> NodeId {
        let group = scene.create_group("assembly", None).unwrap();
        scene.set_local_matrix(group, placement).unwrap();
        scene.add_mesh("body", Primitive::cuboid(Vector3::new(2.0, 3.0, 1.0)).to_mesh(), Matrix4::identity(), Some(group));
        scene.add_mesh(
            "lid",
            Primitive::cuboid(Vector3::new(1.0, 0.2, 0.5)).to_mesh(),
            Matrix4::new_translation(&Vector3::new(0.0, lid_offset, 0.0)),
            Some(group),
        );
        scene.add_mesh(
            "handle",
            Primitive::cube(0.3).to_mesh(),
            Matrix4::new_translation(&Vector3::new(1.2, 0.0, 0.0)),
            Some(group),
        );
        group
    }

    #[test]
    fn test_hierarchies_match_and_differ() {
        let mut scene = MemoryScene::new();
        let a = assembly(&mut scene, Matrix4::identity(), 1.6);
        let b = assembly(
            &mut scene,
            Matrix4::new_translation(&Vector3::new(10.0, 0.0, 0.0)) * Rotation3::from_euler_angles(0.0, 0.8, 0.0).to_homogeneous(),
            1.6,
        );
        let c = assembly(&mut scene, Matrix4::new_translation(&Vector3::new(20.0, 0.0, 0.0)), 1.9);

        let mut cache = AnalysisCache::new();
        let found = engine().compare_hierarchies(&scene, &mut cache, a, b).unwrap().unwrap();
        assert_eq!(found.stage, MatchStage::Hierarchy);
        assert!(found.relative.is_none());
        assert!(engine().compare_hierarchies(&scene, &mut cache, a, c).unwrap().is_none());
    }

    #[test]
    fn test_hierarchy_with_rearranged_child_frames() {
        let mut scene = MemoryScene::new();
        let a = assembly(&mut scene, Matrix4::identity(), 1.6);
        let b = assembly(&mut scene, Matrix4::new_translation(&Vector3::new(10.0, 0.0, 0.0)), 1.6);

        // Rotate b's contents by 90 degrees about Y inside its group
        let turn = Rotation3::from_euler_angles(0.0, std::f64::consts::FRAC_PI_2, 0.0).to_homogeneous();
        for child in scene.children(b).unwrap() {
            let local = scene.local_matrix(child).unwrap();
            scene.set_local_matrix(child, turn * local).unwrap();
        }

        let mut cache = AnalysisCache::new();
        let found = engine().compare_hierarchies(&scene, &mut cache, a, b).unwrap().unwrap();
        let relative = found.relative.unwrap();
        assert!((relative - turn).abs().max() < 1e-6);
    }
}

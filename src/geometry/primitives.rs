// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Indexed primitive generators, centered on the origin with Y up

use super::Mesh;
use nalgebra::{Point3, Vector3};
use std::f64::consts::PI;

/// Geometric primitives
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive {
    Cuboid { size: Vector3<f64> },
    Cylinder { h: f64, r: f64, segments: usize },
    Cone { h: f64, r: f64, segments: usize },
    Torus { major: f64, minor: f64, segments: usize, sides: usize },
    /// Right-corner tetrahedron with legs along +X, +Y, +Z. Chiral when the
    /// legs all differ.
    Tetrahedron { legs: Vector3<f64> },
}

impl Primitive {
    pub fn cube(size: f64) -> Self {
        Self::Cuboid {
            size: Vector3::new(size, size, size),
        }
    }

    pub fn cuboid(size: Vector3<f64>) -> Self {
        Self::Cuboid { size }
    }

    pub fn cylinder(h: f64, r: f64, segments: usize) -> Self {
        Self::Cylinder {
            h,
            r,
            segments: segments.max(3),
        }
    }

    pub fn cone(h: f64, r: f64, segments: usize) -> Self {
        Self::Cone {
            h,
            r,
            segments: segments.max(3),
        }
    }

    pub fn torus(major: f64, minor: f64, segments: usize, sides: usize) -> Self {
        Self::Torus {
            major,
            minor,
            segments: segments.max(3),
            sides: sides.max(3),
        }
    }

    pub fn tetrahedron(legs: Vector3<f64>) -> Self {
        Self::Tetrahedron { legs }
    }

    pub fn to_mesh(&self) -> Mesh {
        match *self {
            Self::Cuboid { size } => generate_cuboid_mesh(size),
            Self::Cylinder { h, r, segments } => generate_cylinder_mesh(h, r, segments),
            Self::Cone { h, r, segments } => generate_cone_mesh(h, r, segments),
            Self::Torus {
                major,
                minor,
                segments,
                sides,
            } => generate_torus_mesh(major, minor, segments, sides),
            Self::Tetrahedron { legs } => generate_tetrahedron_mesh(legs),
        }
    }
}

fn generate_cuboid_mesh(size: Vector3<f64>) -> Mesh {
    let h = size / 2.0;
    let mut mesh = Mesh::with_capacity(8, 6);
    for &(x, y, z) in &[
        (-h.x, -h.y, -h.z),
        (h.x, -h.y, -h.z),
        (h.x, h.y, -h.z),
        (-h.x, h.y, -h.z),
        (-h.x, -h.y, h.z),
        (h.x, -h.y, h.z),
        (h.x, h.y, h.z),
        (-h.x, h.y, h.z),
    ] {
        mesh.add_vertex(Point3::new(x, y, z));
    }

    // Outward winding
    mesh.add_face([0, 3, 2, 1]);
    mesh.add_face([4, 5, 6, 7]);
    mesh.add_face([0, 1, 5, 4]);
    mesh.add_face([3, 7, 6, 2]);
    mesh.add_face([0, 4, 7, 3]);
    mesh.add_face([1, 2, 6, 5]);
    mesh
}

fn ring_point(radius: f64, y: f64, i: usize, segments: usize) -> Point3<f64> {
    let angle = 2.0 * PI * i as f64 / segments as f64;
    Point3::new(radius * angle.cos(), y, radius * angle.sin())
}

fn generate_cylinder_mesh(height: f64, radius: f64, segments: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity(segments * 2, segments + 2);
    let half = height / 2.0;

    for i in 0..segments {
        mesh.add_vertex(ring_point(radius, -half, i, segments));
    }
    for i in 0..segments {
        mesh.add_vertex(ring_point(radius, half, i, segments));
    }

    for i in 0..segments {
        let next = (i + 1) % segments;
        mesh.add_face([i, segments + i, segments + next, next]);
    }
    mesh.add_face((0..segments).collect::<Vec<_>>());
    mesh.add_face((segments..segments * 2).rev().collect::<Vec<_>>());
    mesh
}

fn generate_cone_mesh(height: f64, radius: f64, segments: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity(segments + 1, segments + 1);
    let half = height / 2.0;

    for i in 0..segments {
        mesh.add_vertex(ring_point(radius, -half, i, segments));
    }
    let apex = mesh.add_vertex(Point3::new(0.0, half, 0.0));

    for i in 0..segments {
        mesh.add_face([i, apex, (i + 1) % segments]);
    }
    mesh.add_face((0..segments).collect::<Vec<_>>());
    mesh
}

fn generate_torus_mesh(major: f64, minor: f64, segments: usize, sides: usize) -> Mesh {
    let mut mesh = Mesh::with_capacity(segments * sides, segments * sides);

    for i in 0..segments {
        let u = 2.0 * PI * i as f64 / segments as f64;
        for j in 0..sides {
            let v = 2.0 * PI * j as f64 / sides as f64;
            let ring = major + minor * v.cos();
            mesh.add_vertex(Point3::new(ring * u.cos(), minor * v.sin(), ring * u.sin()));
        }
    }

    let index = |i: usize, j: usize| (i % segments) * sides + (j % sides);
    for i in 0..segments {
        for j in 0..sides {
            mesh.add_face([
                index(i, j),
                index(i, j + 1),
                index(i + 1, j + 1),
                index(i + 1, j),
            ]);
        }
    }
    mesh
}

fn generate_tetrahedron_mesh(legs: Vector3<f64>) -> Mesh {
    let mut mesh = Mesh::with_capacity(4, 4);
    mesh.add_vertex(Point3::origin());
    mesh.add_vertex(Point3::new(legs.x, 0.0, 0.0));
    mesh.add_vertex(Point3::new(0.0, legs.y, 0.0));
    mesh.add_vertex(Point3::new(0.0, 0.0, legs.z));

    mesh.add_face([0, 2, 1]);
    mesh.add_face([0, 1, 3]);
    mesh.add_face([0, 3, 2]);
    mesh.add_face([1, 2, 3]);
    mesh
}

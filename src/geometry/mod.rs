// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Geometry module - mesh representation and point-set math

pub mod analytics;
mod bbox;
mod mesh;
pub mod pca;
mod primitives;
mod spatial;
mod union_find;

pub use analytics::GeometryStats;
pub use bbox::BoundingBox;
pub use mesh::{Face, Mesh, UvSet};
pub use pca::PrincipalAxes;
pub use primitives::Primitive;
pub use spatial::PointTree;
pub use union_find::DisjointSet;

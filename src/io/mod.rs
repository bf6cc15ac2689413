// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Scene files: JSON snapshots of a [`MemoryScene`](crate::scene::MemoryScene)

mod exporter;
mod importer;

pub use exporter::save_scene;
pub use importer::load_scene;

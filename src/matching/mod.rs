// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Shell analysis, canonical frames, signatures and geometric equality

pub mod cache;
pub mod canonicalize;
pub mod equality;
pub mod groups;
pub mod shell;
pub mod signature;

pub use cache::{AnalysisCache, CacheStats};
pub use canonicalize::{CanonicalOutcome, SkipReason, TransformCanonicalizer};
pub use equality::{EqualityEngine, MatchStage, ShellMatch};
pub use groups::{GroupingMode, InstanceCandidate, InstanceGroup, InstanceGroupBuilder};
pub use shell::{ShellAnalyzer, ShellClass, ShellInfo};
pub use signature::{quantize, AssemblySignature, HierarchySignature, Signature, SignatureIndex, SignatureOptions};

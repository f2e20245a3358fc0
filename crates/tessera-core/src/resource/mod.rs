// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Resource vocabulary shared by every layer: kinds, fidelity tiers, strategy
//! classes, job priorities, cleanup severities, and the payload contract.

mod payload;
mod shape;
mod task;

pub use payload::{
    PlaceholderPayload, ResourcePayload, PLACEHOLDER_BUFFER_BYTES, PLACEHOLDER_IMAGE_EXTENT,
    PLACEHOLDER_MESH_VERTICES,
};
pub use shape::ResourceShape;
pub use task::{StreamTask, TaskState};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a streamed resource. Each kind lives in its own cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// Image-like data mapped onto surfaces.
    Image,
    /// Mesh vertex data.
    Mesh,
    /// Auxiliary buffers (audio clips, small lookup tables, scratch data).
    Buffer,
}

impl ResourceKind {
    /// Every kind, in store order.
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Image, ResourceKind::Mesh, ResourceKind::Buffer];

    /// A short lowercase name, used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Mesh => "mesh",
            ResourceKind::Buffer => "buffer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fidelity level of a cached resource.
///
/// Images use the tier directly. Meshes express it as a level of detail where
/// `lod 0` is the most detailed:
///
/// | tier | lod |
/// |---|---|
/// | `High` | 0 |
/// | `Medium` | 1 |
/// | `Low` | 2 |
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DetailTier {
    /// Minimal fidelity; the placeholder tier.
    #[default]
    Low,
    /// Intermediate fidelity.
    Medium,
    /// Full fidelity.
    High,
}

impl DetailTier {
    /// Converts a mesh level of detail into a tier. Any value above 2 is `Low`.
    pub fn from_lod(lod: u8) -> Self {
        match lod {
            0 => DetailTier::High,
            1 => DetailTier::Medium,
            _ => DetailTier::Low,
        }
    }

    /// Returns the mesh level of detail for this tier.
    pub fn lod(&self) -> u8 {
        match self {
            DetailTier::High => 0,
            DetailTier::Medium => 1,
            DetailTier::Low => 2,
        }
    }
}

impl fmt::Display for DetailTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetailTier::Low => f.write_str("low"),
            DetailTier::Medium => f.write_str("medium"),
            DetailTier::High => f.write_str("high"),
        }
    }
}

/// How important a resource is to the running application.
///
/// The class governs age-based expiry: `Essential` entries never expire,
/// `Optional` entries expire first.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyClass {
    /// Always needed (UI, HUD, system resources).
    Essential,
    /// Regular scene content.
    #[default]
    Important,
    /// Cosmetic or preview content that can be dropped at any time.
    Optional,
}

impl StrategyClass {
    /// Derives a strategy class from the resource key when the caller gave no hint.
    pub fn from_key(key: &str) -> Self {
        let key = key.to_ascii_lowercase();

        const ESSENTIAL_PREFIXES: [&str; 3] = ["ui/", "hud/", "system/"];
        const ESSENTIAL_SEGMENTS: [&str; 3] = ["/ui/", "/hud/", "/essential/"];
        const OPTIONAL_MARKERS: [&str; 4] = ["preview", "thumb", "decor", "fx/"];

        if ESSENTIAL_PREFIXES.iter().any(|p| key.starts_with(p))
            || ESSENTIAL_SEGMENTS.iter().any(|s| key.contains(s))
        {
            StrategyClass::Essential
        } else if OPTIONAL_MARKERS.iter().any(|m| key.contains(m)) {
            StrategyClass::Optional
        } else {
            StrategyClass::Important
        }
    }
}

/// Scheduling priority of a streaming job. Higher priorities are drained first.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum JobPriority {
    /// Background prefetch.
    Low,
    /// Regular requests.
    #[default]
    Normal,
    /// Content the viewer is looking at right now.
    High,
}

/// Cleanup aggressiveness selected from the memory usage ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Usage crossed the standard threshold.
    Standard,
    /// Usage crossed the aggressive threshold.
    Aggressive,
    /// Usage crossed the critical threshold.
    Critical,
}

impl Severity {
    /// Every severity, mildest first.
    pub const ALL: [Severity; 3] = [Severity::Standard, Severity::Aggressive, Severity::Critical];
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Standard => f.write_str("standard"),
            Severity::Aggressive => f.write_str("aggressive"),
            Severity::Critical => f.write_str("critical"),
        }
    }
}

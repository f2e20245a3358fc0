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

use super::{ResourceKind, ResourceShape};
use std::any::Any;

/// Edge length in pixels of a placeholder image.
pub const PLACEHOLDER_IMAGE_EXTENT: u32 = 4;
/// Vertex count of a placeholder mesh (a unit cube proxy).
pub const PLACEHOLDER_MESH_VERTICES: u32 = 24;
/// Byte length of a placeholder buffer.
pub const PLACEHOLDER_BUFFER_BYTES: u64 = 256;

/// A decoded resource held by a cache entry.
///
/// A payload is owned by exactly one cache entry. When the entry is evicted,
/// invalidated, or its payload is replaced by an upgrade, the store calls
/// [`release`](ResourcePayload::release) synchronously before anything else is
/// installed in its place.
pub trait ResourcePayload: Send + 'static {
    /// The declared dimensions of this payload, used for size estimation.
    fn shape(&self) -> ResourceShape;

    /// Returns `true` for the synthesized low-fidelity stand-in.
    fn is_placeholder(&self) -> bool {
        false
    }

    /// Releases the payload's backing memory.
    ///
    /// The default implementation simply drops the payload.
    fn release(self: Box<Self>) {}

    /// Allows downcasting to the concrete payload type.
    fn as_any(&self) -> &dyn Any;
}

/// The minimal stand-in returned synchronously while the real resource streams in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderPayload {
    kind: ResourceKind,
}

impl PlaceholderPayload {
    /// Creates a placeholder for the given resource kind.
    pub fn new(kind: ResourceKind) -> Self {
        Self { kind }
    }

    /// The kind this placeholder stands in for.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }
}

impl ResourcePayload for PlaceholderPayload {
    fn shape(&self) -> ResourceShape {
        match self.kind {
            ResourceKind::Image => ResourceShape::Image {
                width: PLACEHOLDER_IMAGE_EXTENT,
                height: PLACEHOLDER_IMAGE_EXTENT,
                mipmaps: false,
            },
            ResourceKind::Mesh => ResourceShape::Mesh {
                vertex_count: PLACEHOLDER_MESH_VERTICES,
            },
            ResourceKind::Buffer => ResourceShape::Buffer {
                byte_len: PLACEHOLDER_BUFFER_BYTES,
            },
        }
    }

    fn is_placeholder(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

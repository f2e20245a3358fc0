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

use serde::{Deserialize, Serialize};

/// The declared dimensions of a resource, from which its memory footprint is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceShape {
    /// A null payload that holds no memory.
    Empty,
    /// A 2D image stored as RGBA8.
    Image {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Whether a full mip chain is generated for the image.
        mipmaps: bool,
    },
    /// Interleaved mesh vertices (position, normal, UV).
    Mesh {
        /// Number of vertices.
        vertex_count: u32,
    },
    /// An opaque byte buffer.
    Buffer {
        /// Length of the buffer in bytes.
        byte_len: u64,
    },
    /// The shape could not be determined.
    Unknown,
}

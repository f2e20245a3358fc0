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

//! Memory footprint estimation for streamed resources.
//!
//! These functions are pure and never fail. A shape that cannot be measured is
//! charged as a 1024x1024 RGBA image so the budget is never understated.

use crate::resource::ResourceShape;

/// Bytes per RGBA8 texel.
pub const BYTES_PER_PIXEL: u64 = 4;
/// Extra storage for a full mip chain (1 + 1/4 + 1/16 + ... ≈ 4/3).
pub const MIPMAP_FACTOR: f64 = 1.33;
/// Position (3) + normal (3) + UV (2).
pub const FLOATS_PER_VERTEX: u64 = 8;
/// Size of an `f32`.
pub const BYTES_PER_FLOAT: u64 = 4;
/// Edge length of the conservative fallback image.
pub const FALLBACK_EXTENT: u64 = 1024;

/// Estimates the size of an RGBA8 image, optionally with a mip chain.
pub fn estimate_image_bytes(width: u32, height: u32, mipmaps: bool) -> u64 {
    if width == 0 || height == 0 {
        log::debug!("Degenerate image {width}x{height}, using fallback estimate");
        return fallback_bytes();
    }
    let base = (width as u64)
        .saturating_mul(height as u64)
        .saturating_mul(BYTES_PER_PIXEL);
    if mipmaps {
        (base as f64 * MIPMAP_FACTOR).ceil() as u64
    } else {
        base
    }
}

/// Estimates the size of an interleaved mesh vertex buffer.
pub fn estimate_mesh_bytes(vertex_count: u32) -> u64 {
    if vertex_count == 0 {
        log::debug!("Mesh with no vertices, using fallback estimate");
        return fallback_bytes();
    }
    (vertex_count as u64)
        .saturating_mul(FLOATS_PER_VERTEX)
        .saturating_mul(BYTES_PER_FLOAT)
}

/// The conservative size charged for shapes that cannot be measured.
pub fn fallback_bytes() -> u64 {
    FALLBACK_EXTENT * FALLBACK_EXTENT * BYTES_PER_PIXEL
}

/// Estimates the memory footprint of any resource shape.
pub fn estimate_bytes(shape: &ResourceShape) -> u64 {
    match *shape {
        ResourceShape::Empty => 0,
        ResourceShape::Image {
            width,
            height,
            mipmaps,
        } => estimate_image_bytes(width, height, mipmaps),
        ResourceShape::Mesh { vertex_count } => estimate_mesh_bytes(vertex_count),
        ResourceShape::Buffer { byte_len } => byte_len,
        ResourceShape::Unknown => {
            log::debug!("Unknown resource shape, using fallback estimate");
            fallback_bytes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_without_mips() {
        assert_eq!(estimate_image_bytes(256, 128, false), 256 * 128 * 4);
    }

    #[test]
    fn test_image_with_mips_applies_factor() {
        let base = 1024 * 1024 * 4;
        let with_mips = estimate_image_bytes(1024, 1024, true);
        assert_eq!(with_mips, (base as f64 * 1.33).ceil() as u64);
        assert!(with_mips > base);
    }

    #[test]
    fn test_mesh_uses_eight_floats_per_vertex() {
        assert_eq!(estimate_mesh_bytes(1000), 1000 * 8 * 4);
    }

    #[test]
    fn test_empty_payload_is_free() {
        assert_eq!(estimate_bytes(&ResourceShape::Empty), 0);
    }

    #[test]
    fn test_unknown_and_degenerate_shapes_fall_back() {
        let fallback = 1024 * 1024 * 4;
        assert_eq!(estimate_bytes(&ResourceShape::Unknown), fallback);
        assert_eq!(estimate_image_bytes(0, 512, true), fallback);
        assert_eq!(estimate_mesh_bytes(0), fallback);
    }

    #[test]
    fn test_huge_dimensions_saturate() {
        let bytes = estimate_bytes(&ResourceShape::Buffer { byte_len: u64::MAX });
        assert_eq!(bytes, u64::MAX);
        assert!(estimate_image_bytes(u32::MAX, u32::MAX, false) > 0);
    }
}

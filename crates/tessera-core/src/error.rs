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

//! Defines the error types of the streaming subsystem.
//!
//! None of these are fatal to the host: a failed fetch keeps the lower tier,
//! and configuration errors are reported before the manager starts.

use thiserror::Error;

/// A failure while fetching or decoding a resource in a streaming job.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source has nothing under this key.
    #[error("Resource '{key}' was not found")]
    NotFound {
        /// The requested key.
        key: String,
    },
    /// Reading the resource bytes failed.
    #[error("I/O failure while fetching '{key}': {source}")]
    Io {
        /// The requested key.
        key: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The bytes could not be decoded into a payload.
    #[error("Failed to decode '{key}': {details}")]
    Decode {
        /// The requested key.
        key: String,
        /// Decoder diagnostics.
        details: String,
    },
    /// The source cannot produce this kind of resource.
    #[error("Source does not support '{key}'")]
    Unsupported {
        /// The requested key.
        key: String,
    },
}

/// A failure while loading or validating a [`ManagerConfig`](crate::ManagerConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    /// The RON document is malformed.
    #[error("Invalid RON configuration: {0}")]
    Ron(#[from] ron::error::SpannedError),
    /// The JSON document is malformed.
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    /// A field holds a value outside its valid range.
    #[error("Invalid configuration field '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

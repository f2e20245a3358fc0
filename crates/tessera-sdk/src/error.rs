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

//! Errors surfaced by the manager's public API.

use thiserror::Error;

use tessera_core::{ConfigError, ResourceKind, Vec3};

use crate::state::ManagerState;

/// Misuse of the manager's lifecycle, or a bad configuration.
///
/// Fetch failures never appear here: they are logged and published on the
/// notification bus.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The operation needs a running manager.
    #[error("Resource manager is {state}, expected running")]
    NotRunning {
        /// The state the manager was in.
        state: ManagerState,
    },
    /// The requested lifecycle step is not allowed from the current state.
    #[error("Cannot move resource manager from {from} to {to}")]
    InvalidTransition {
        /// The current state.
        from: ManagerState,
        /// The requested state.
        to: ManagerState,
    },
    /// The key is already cached as a different kind of resource.
    #[error("Resource '{key}' is cached as {cached}, not {requested}")]
    KindMismatch {
        /// The requested key.
        key: String,
        /// The kind the key is cached under.
        cached: ResourceKind,
        /// The kind the caller asked for.
        requested: ResourceKind,
    },
    /// A viewpoint had a NaN or infinite component.
    #[error("Viewpoint {0:?} is not finite")]
    NonFiniteViewpoint(Vec3),
    /// The configuration was rejected.
    #[error("Invalid manager configuration: {0}")]
    Config(#[from] ConfigError),
    /// A worker thread could not be started.
    #[error("Failed to spawn the {name} worker: {source}")]
    Spawn {
        /// Which worker.
        name: &'static str,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

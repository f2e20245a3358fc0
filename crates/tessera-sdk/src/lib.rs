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

//! # Tessera SDK
//!
//! The public entry point: a [`ResourceManager`] that keeps resident resource
//! memory under a hard ceiling while streaming images and meshes in
//! progressively.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tessera_sdk::prelude::*;
//!
//! # fn source() -> Arc<dyn ResourceSource> { unimplemented!() }
//! let manager = ResourceManager::new(ManagerConfig::default(), source(), Arc::new(NullHost))?;
//! manager.initialize()?;
//!
//! let handle = manager.request_resource("rock.mesh", ResourceKind::Mesh, RequestOptions::default())?;
//! assert!(handle.is_placeholder);
//!
//! manager.dispose();
//! # Ok::<(), tessera_sdk::ManagerError>(())
//! ```

#![warn(missing_docs)]

mod error;
mod manager;
mod state;
mod workers;

pub use error::ManagerError;
pub use manager::{ManagerDiagnostics, ResourceManager};
pub use state::ManagerState;

/// Commonly used types, re-exported from every Tessera crate.
pub mod prelude {
    pub use crate::{ManagerDiagnostics, ManagerError, ManagerState, ResourceManager};
    pub use tessera_core::config::{UsageSource, WorkerMode};
    pub use tessera_core::{
        DetailTier, FetchError, FetchRequest, FetchedResource, HostRuntime, JobPriority,
        ManagerConfig, Notification, NullHost, ResourceKind, ResourcePayload, ResourceShape,
        ResourceSource, Severity, StrategyClass, StreamTask, TaskState, Vec3,
    };
    pub use tessera_data::{BudgetSnapshot, KindUsage};
    pub use tessera_lanes::{CleanupReport, DrainOutcome, LodDecision, RequestOptions, ResourceHandle};
    pub use tessera_telemetry::{MonitorDiagnostics, SysinfoHost, TickReport};
}

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

use crate::resource::{DetailTier, ResourceKind, Severity};

/// Lifecycle events published by the resource manager.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The manager finished initializing and is running.
    Initialized,
    /// A streaming job installed a new payload for `key`.
    ResourceUpgraded {
        /// The resource key.
        key: String,
        /// The kind of the resource.
        kind: ResourceKind,
        /// The tier now cached.
        tier: DetailTier,
    },
    /// A streaming job failed; the previously cached tier was kept.
    ResourceFailed {
        /// The resource key.
        key: String,
        /// A human-readable failure description.
        reason: String,
    },
    /// The budget monitor ran a cleanup pass.
    BudgetDegraded {
        /// The severity of the pass.
        severity: Severity,
        /// The usage ratio that triggered it.
        usage_ratio: f64,
    },
    /// Usage reached the critical threshold. Collaborators should shed demand.
    Critical {
        /// The usage ratio that triggered it.
        usage_ratio: f64,
    },
    /// Usage is still above the limit after a critical cleanup.
    BudgetExceededAfterCleanup {
        /// The usage ratio measured after cleanup.
        usage_ratio: f64,
    },
    /// The host application moved to (`true`) or returned from (`false`) the background.
    Backgrounded(bool),
    /// The manager was disposed and released every payload.
    Disposed,
}

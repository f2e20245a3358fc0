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

//! The lifecycle of a manager instance.

use std::fmt;

/// Where a [`ResourceManager`](crate::ResourceManager) is in its lifecycle.
///
/// `Uninitialized → Initializing → Running → Disposed`. Only `Running` drives
/// the budget monitor and the streaming drain. `Disposed` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    /// Constructed, not started.
    #[default]
    Uninitialized,
    /// Starting workers.
    Initializing,
    /// Accepting requests and draining jobs.
    Running,
    /// Stopped; every payload was released.
    Disposed,
}

impl ManagerState {
    /// Checks if the manager can move to `to`.
    #[must_use]
    pub fn can_transition_to(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Uninitialized, Self::Initializing)
                | (Self::Initializing, Self::Running)
                | (Self::Uninitialized | Self::Initializing | Self::Running, Self::Disposed)
        )
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerState::Uninitialized => f.write_str("uninitialized"),
            ManagerState::Initializing => f.write_str("initializing"),
            ManagerState::Running => f.write_str("running"),
            ManagerState::Disposed => f.write_str("disposed"),
        }
    }
}

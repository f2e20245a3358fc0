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

//! sysinfo-based implementation of the HostRuntime trait.

use std::sync::Mutex;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tessera_core::HostRuntime;

/// A host probe that reports this process's resident memory through `sysinfo`.
pub struct SysinfoHost {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SysinfoHost {
    /// Creates a new SysinfoHost.
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(reason) => {
                log::warn!("Process memory probe unavailable: {reason}");
                None
            }
        };
        Self {
            system: Mutex::new(System::new()),
            pid,
        }
    }
}

impl HostRuntime for SysinfoHost {
    fn heap_usage_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).map(|process| process.memory())
    }

    fn request_reclamation(&self) {
        // Freed payloads go straight back to the allocator.
        log::trace!("Host reclamation hint received.");
    }
}

impl Default for SysinfoHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SysinfoHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SysinfoHost").field("pid", &self.pid).finish()
    }
}

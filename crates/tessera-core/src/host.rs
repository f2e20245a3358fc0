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

//! The hooks the surrounding host runtime exposes to the manager.

/// Host-level memory facilities.
pub trait HostRuntime: Send + Sync {
    /// The host's own view of resident memory, in bytes, when it has one.
    fn heap_usage_bytes(&self) -> Option<u64> {
        None
    }

    /// A best-effort hint that now is a good moment to reclaim freed memory.
    fn request_reclamation(&self) {}
}

/// A host that reports nothing and ignores reclamation hints.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl HostRuntime for NullHost {}

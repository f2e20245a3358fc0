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

//! # Tessera Core
//!
//! Foundational crate containing the resource contracts, the size estimator,
//! the notification bus, and the configuration surface shared by every other
//! Tessera crate.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod estimate;
pub mod event;
pub mod host;
pub mod math;
pub mod resource;
pub mod source;

pub use config::ManagerConfig;
pub use error::{ConfigError, FetchError};
pub use event::{NotificationBus, Notification};
pub use host::{HostRuntime, NullHost};
pub use math::Vec3;
pub use resource::{
    DetailTier, JobPriority, ResourceKind, ResourcePayload, ResourceShape, Severity,
    StrategyClass, StreamTask, TaskState,
};
pub use source::{FetchRequest, FetchedResource, ResourceSource};

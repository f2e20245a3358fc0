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

//! Shared fixtures for the manager integration tests.
#![allow(dead_code)]

use std::any::Any;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tessera_sdk::prelude::*;

/// Counts what the source and payloads did.
#[derive(Debug, Default)]
pub struct Counters {
    pub fetches: AtomicUsize,
    pub released: AtomicUsize,
}

impl Counters {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// An image whose side grows with its tier.
pub struct TestImage {
    pub side: u32,
    released: Arc<Counters>,
}

impl ResourcePayload for TestImage {
    fn shape(&self) -> ResourceShape {
        ResourceShape::Image {
            width: self.side,
            height: self.side,
            mipmaps: false,
        }
    }

    fn release(self: Box<Self>) {
        self.released.released.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A mesh whose vertex count grows with its tier.
pub struct TestMesh {
    pub vertex_count: u32,
    released: Arc<Counters>,
}

impl ResourcePayload for TestMesh {
    fn shape(&self) -> ResourceShape {
        ResourceShape::Mesh {
            vertex_count: self.vertex_count,
        }
    }

    fn release(self: Box<Self>) {
        self.released.released.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Image side per tier: a High image is exactly 256 KiB.
pub fn image_side(tier: DetailTier) -> u32 {
    match tier {
        DetailTier::Low => 16,
        DetailTier::Medium => 64,
        DetailTier::High => 256,
    }
}

/// Produces exactly the requested tier, failing for keys in `failing`.
#[derive(Default)]
pub struct ExactSource {
    pub counters: Arc<Counters>,
    pub failing: Mutex<HashSet<String>>,
}

impl ExactSource {
    pub fn fail(&self, key: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(key.to_owned());
    }
}

impl ResourceSource for ExactSource {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedResource, FetchError> {
        self.counters.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(request.key) {
            return Err(FetchError::Decode {
                key: request.key.to_owned(),
                details: "corrupt test data".to_owned(),
            });
        }

        let released = Arc::clone(&self.counters);
        let resource = match request.kind {
            ResourceKind::Image => FetchedResource::new(
                TestImage {
                    side: image_side(request.target),
                    released,
                },
                request.target,
            ),
            ResourceKind::Mesh | ResourceKind::Buffer => FetchedResource::new(
                TestMesh {
                    vertex_count: 100 * (3 - request.target.lod() as u32),
                    released,
                },
                request.target,
            ),
        };
        Ok(resource)
    }
}

/// A deterministic configuration: host-pumped workers, no delays.
pub fn manual_config() -> ManagerConfig {
    ManagerConfig {
        worker_mode: WorkerMode::Manual,
        drain_delay_ms: 0,
        reclaim_retry_delay_ms: 0,
        ..ManagerConfig::default()
    }
}

/// A running manager over an [`ExactSource`].
pub fn running_manager(config: ManagerConfig) -> (ResourceManager, Arc<ExactSource>) {
    let source = Arc::new(ExactSource::default());
    let manager = ResourceManager::new(config, source.clone(), Arc::new(NullHost)).unwrap();
    manager.initialize().unwrap();
    (manager, source)
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

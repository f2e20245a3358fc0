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

//! Streams a small simulated scene through a threaded resource manager.
//!
//! Usage: `tessera-demo [config.ron|config.json]`

use std::any::Any;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tessera_sdk::prelude::*;

/// A decoded image held in memory.
struct DemoImage {
    width: u32,
    height: u32,
}

impl ResourcePayload for DemoImage {
    fn shape(&self) -> ResourceShape {
        ResourceShape::Image {
            width: self.width,
            height: self.height,
            mipmaps: true,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A decoded mesh held in memory.
struct DemoMesh {
    vertex_count: u32,
}

impl ResourcePayload for DemoMesh {
    fn shape(&self) -> ResourceShape {
        ResourceShape::Mesh {
            vertex_count: self.vertex_count,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Pretends to decode resources, taking longer for finer tiers.
struct SimulatedSource;

impl ResourceSource for SimulatedSource {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<FetchedResource, FetchError> {
        if request.key.contains("missing") {
            return Err(FetchError::NotFound {
                key: request.key.to_owned(),
            });
        }

        let scale = match request.target {
            DetailTier::Low => 1,
            DetailTier::Medium => 4,
            DetailTier::High => 16,
        };
        thread::sleep(Duration::from_millis(5 * scale as u64));

        let resource = match request.kind {
            ResourceKind::Image => FetchedResource::new(
                DemoImage {
                    width: 256 * scale,
                    height: 256 * scale,
                },
                request.target,
            ),
            ResourceKind::Mesh | ResourceKind::Buffer => FetchedResource::new(
                DemoMesh {
                    vertex_count: 2_000 * scale,
                },
                request.target,
            ),
        };
        Ok(resource)
    }
}

fn load_config() -> Result<ManagerConfig> {
    let config = match std::env::args().nth(1) {
        Some(path) => ManagerConfig::from_file(&path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => ManagerConfig {
            total_limit_bytes: 256 * 1024 * 1024,
            image_limit_bytes: 160 * 1024 * 1024,
            mesh_limit_bytes: 80 * 1024 * 1024,
            buffer_limit_bytes: 16 * 1024 * 1024,
            monitor_interval_ms: 250,
            ..ManagerConfig::default()
        },
    };
    config.validate().context("configuration rejected")?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let manager = ResourceManager::new(config, Arc::new(SimulatedSource), Arc::new(SysinfoHost::new()))?;
    let events = manager.subscribe();
    manager.initialize()?;

    let viewer = Vec3::new(0.0, 0.0, 0.0);
    manager.set_viewpoint(viewer)?;

    let mut keys = Vec::new();
    for i in 0..24 {
        let key = format!("scene/rock_{i}.mesh");
        let anchor = Vec3::new(i as f32 * 12.0, 0.0, 0.0);
        manager.request_resource(
            &key,
            ResourceKind::Mesh,
            RequestOptions::default().with_anchor(anchor),
        )?;
        keys.push(key);
    }
    for i in 0..12 {
        manager.request_resource(
            &format!("textures/ground_{i}.png"),
            ResourceKind::Image,
            RequestOptions::default().with_priority(JobPriority::High),
        )?;
    }
    manager.request_resource("ui/cursor.png", ResourceKind::Image, RequestOptions::default())?;
    manager.request_resource("textures/missing.png", ResourceKind::Image, RequestOptions::default())?;

    thread::sleep(Duration::from_millis(500));

    // The viewer walks along the row of rocks.
    for step in 1..=4 {
        let viewer = Vec3::new(step as f32 * 60.0, 0.0, 0.0);
        for key in &keys {
            manager.reevaluate_lod(key, viewer)?;
        }
        thread::sleep(Duration::from_millis(300));
    }

    manager.set_backgrounded(true);
    thread::sleep(Duration::from_millis(100));
    manager.set_backgrounded(false);
    thread::sleep(Duration::from_millis(300));

    for event in events.try_iter() {
        log::debug!("Notification: {event:?}");
    }

    let snapshot = manager.budget_snapshot();
    log::info!(
        "Usage: {} / {} bytes ({:.1}%)",
        snapshot.total_bytes_used,
        snapshot.limit_bytes,
        snapshot.usage_ratio * 100.0
    );
    for usage in &snapshot.per_kind {
        log::info!(
            "  {}: {} entries, {:.1}% of {} bytes",
            usage.kind,
            usage.entries,
            usage.ratio * 100.0,
            usage.limit_bytes
        );
    }
    let diagnostics = manager.diagnostics();
    log::info!(
        "Peak {} bytes over {} ticks, {} cleanup passes ({} before admission)",
        diagnostics.monitor.peak_bytes,
        diagnostics.monitor.ticks,
        diagnostics.monitor.total_triggers(),
        diagnostics.monitor.admission_cleanups
    );

    manager.dispose();
    Ok(())
}

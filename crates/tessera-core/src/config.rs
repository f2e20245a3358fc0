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

//! Configuration surface of the resource manager.
//!
//! Every field has a default, so a configuration document only needs to name
//! the values it overrides:
//!
//! ```
//! use tessera_core::ManagerConfig;
//!
//! let config = ManagerConfig::from_ron_str("(total_limit_bytes: 268435456)").unwrap();
//! assert_eq!(config.total_limit_bytes, 256 * 1024 * 1024);
//! assert_eq!(config.monitor_interval_ms, 5000);
//! ```

use crate::error::ConfigError;
use crate::resource::{ResourceKind, Severity, StrategyClass};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

/// Usage ratios at which each cleanup severity starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupThresholds {
    /// Start of the standard band.
    pub standard: f64,
    /// Start of the aggressive band.
    pub aggressive: f64,
    /// Start of the critical band.
    pub critical: f64,
}

impl Default for CleanupThresholds {
    fn default() -> Self {
        Self {
            standard: 0.80,
            aggressive: 0.90,
            critical: 0.95,
        }
    }
}

impl CleanupThresholds {
    /// Maps a usage ratio to the cleanup severity it calls for.
    ///
    /// | ratio | severity |
    /// |---|---|
    /// | `< standard` | none |
    /// | `[standard, aggressive)` | `Standard` |
    /// | `[aggressive, critical)` | `Aggressive` |
    /// | `>= critical` | `Critical` |
    pub fn classify(&self, usage_ratio: f64) -> Option<Severity> {
        if usage_ratio >= self.critical {
            Some(Severity::Critical)
        } else if usage_ratio >= self.aggressive {
            Some(Severity::Aggressive)
        } else if usage_ratio >= self.standard {
            Some(Severity::Standard)
        } else {
            None
        }
    }
}

/// Fraction of each store's entries evicted per severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupFractions {
    /// Fraction evicted by a standard pass.
    pub standard: f64,
    /// Fraction evicted by an aggressive pass.
    pub aggressive: f64,
    /// Fraction evicted by a critical pass.
    pub critical: f64,
}

impl Default for CleanupFractions {
    fn default() -> Self {
        Self {
            standard: 0.20,
            aggressive: 0.40,
            critical: 0.60,
        }
    }
}

impl CleanupFractions {
    /// Returns the eviction fraction for a severity.
    pub fn for_severity(&self, severity: Severity) -> f64 {
        match severity {
            Severity::Standard => self.standard,
            Severity::Aggressive => self.aggressive,
            Severity::Critical => self.critical,
        }
    }
}

/// Distance breakpoints (world units) separating the three levels of detail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodBreakpoints {
    /// Up to this distance, lod 0.
    pub near: f32,
    /// Up to this distance, lod 1.
    pub mid: f32,
    /// Beyond `mid` the resource is lod 2. Past `far` it is out of range and
    /// re-evaluation leaves it alone.
    pub far: f32,
}

impl Default for LodBreakpoints {
    fn default() -> Self {
        Self {
            near: 10.0,
            mid: 50.0,
            far: 200.0,
        }
    }
}

/// Maximum age per strategy class before an entry is considered stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryPolicy {
    /// Lifetime of `Important` entries, in seconds.
    pub important_secs: u64,
    /// Lifetime of `Optional` entries, in seconds.
    pub optional_secs: u64,
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self {
            important_secs: 600,
            optional_secs: 120,
        }
    }
}

impl ExpiryPolicy {
    /// The time-to-live of a class. `Essential` entries never expire.
    pub fn ttl_for(&self, class: StrategyClass) -> Option<Duration> {
        match class {
            StrategyClass::Essential => None,
            StrategyClass::Important => Some(Duration::from_secs(self.important_secs)),
            StrategyClass::Optional => Some(Duration::from_secs(self.optional_secs)),
        }
    }
}

/// Which figure the budget monitor treats as the authoritative usage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UsageSource {
    /// The sum of live cache entries.
    #[default]
    CacheSum,
    /// The larger of the cache sum and the host heap figure.
    Conservative,
}

/// How the drain and monitor loops are driven.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerMode {
    /// Background threads drive both loops.
    #[default]
    Threaded,
    /// The host pumps both loops from its own frame loop.
    Manual,
}

/// Configuration for the resource manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Hard ceiling across all stores, in bytes.
    pub total_limit_bytes: u64,
    /// Sub-limit of the image store, in bytes.
    pub image_limit_bytes: u64,
    /// Sub-limit of the mesh store, in bytes.
    pub mesh_limit_bytes: u64,
    /// Sub-limit of the auxiliary buffer pool, in bytes.
    pub buffer_limit_bytes: u64,
    /// Usage ratios that start each cleanup severity.
    pub thresholds: CleanupThresholds,
    /// Eviction fraction per severity.
    pub fractions: CleanupFractions,
    /// Period of the budget monitor.
    pub monitor_interval_ms: u64,
    /// Level-of-detail distance breakpoints.
    pub lod: LodBreakpoints,
    /// Pause between two streaming jobs.
    pub drain_delay_ms: u64,
    /// Delay before the second reclamation hint of a critical pass.
    pub reclaim_retry_delay_ms: u64,
    /// Age-based expiry per strategy class.
    pub expiry: ExpiryPolicy,
    /// Authoritative usage figure.
    pub usage_source: UsageSource,
    /// How the background loops are driven.
    pub worker_mode: WorkerMode,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            total_limit_bytes: 1024 * MIB,
            image_limit_bytes: 512 * MIB,
            mesh_limit_bytes: 384 * MIB,
            buffer_limit_bytes: 64 * MIB,
            thresholds: CleanupThresholds::default(),
            fractions: CleanupFractions::default(),
            monitor_interval_ms: 5000,
            lod: LodBreakpoints::default(),
            drain_delay_ms: 8,
            reclaim_retry_delay_ms: 250,
            expiry: ExpiryPolicy::default(),
            usage_source: UsageSource::default(),
            worker_mode: WorkerMode::default(),
        }
    }
}

impl ManagerConfig {
    /// Parses and validates a RON document.
    pub fn from_ron_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file. `.json` files are read as JSON, anything else as RON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_ron_str(&content),
        }
    }

    /// Checks every field against its valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if self.total_limit_bytes == 0 {
            return Err(invalid("total_limit_bytes", "must be greater than zero"));
        }
        for (field, limit) in [
            ("image_limit_bytes", self.image_limit_bytes),
            ("mesh_limit_bytes", self.mesh_limit_bytes),
            ("buffer_limit_bytes", self.buffer_limit_bytes),
        ] {
            if limit == 0 {
                return Err(invalid(field, "must be greater than zero"));
            }
        }

        let t = &self.thresholds;
        if !(t.standard > 0.0 && t.standard < t.aggressive && t.aggressive < t.critical) {
            return Err(invalid(
                "thresholds",
                format!(
                    "expected 0 < standard < aggressive < critical, got {} / {} / {}",
                    t.standard, t.aggressive, t.critical
                ),
            ));
        }

        for severity in Severity::ALL {
            let fraction = self.fractions.for_severity(severity);
            if !(fraction > 0.0 && fraction <= 1.0) {
                return Err(invalid(
                    "fractions",
                    format!("{severity} fraction must be within (0, 1], got {fraction}"),
                ));
            }
        }

        let lod = &self.lod;
        if !(lod.near > 0.0 && lod.near < lod.mid && lod.mid < lod.far) {
            return Err(invalid(
                "lod",
                format!(
                    "expected 0 < near < mid < far, got {} / {} / {}",
                    lod.near, lod.mid, lod.far
                ),
            ));
        }

        if self.monitor_interval_ms == 0 {
            return Err(invalid("monitor_interval_ms", "must be greater than zero"));
        }

        Ok(())
    }

    /// The sub-limit of a kind's store, in bytes.
    pub fn limit_for(&self, kind: ResourceKind) -> u64 {
        match kind {
            ResourceKind::Image => self.image_limit_bytes,
            ResourceKind::Mesh => self.mesh_limit_bytes,
            ResourceKind::Buffer => self.buffer_limit_bytes,
        }
    }

    /// Period of the budget monitor.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Pause between two streaming jobs.
    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }

    /// Delay before the second reclamation hint.
    pub fn reclaim_retry_delay(&self) -> Duration {
        Duration::from_millis(self.reclaim_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ManagerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limit_for(ResourceKind::Image), 512 * MIB);
        assert_eq!(config.monitor_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_threshold_mapping() {
        let thresholds = CleanupThresholds::default();
        assert_eq!(thresholds.classify(0.79), None);
        assert_eq!(thresholds.classify(0.80), Some(Severity::Standard));
        assert_eq!(thresholds.classify(0.89), Some(Severity::Standard));
        assert_eq!(thresholds.classify(0.91), Some(Severity::Aggressive));
        assert_eq!(thresholds.classify(0.95), Some(Severity::Critical));
        assert_eq!(thresholds.classify(1.70), Some(Severity::Critical));
    }

    #[test]
    fn test_fraction_per_severity() {
        let fractions = CleanupFractions::default();
        assert_eq!(fractions.for_severity(Severity::Standard), 0.20);
        assert_eq!(fractions.for_severity(Severity::Aggressive), 0.40);
        assert_eq!(fractions.for_severity(Severity::Critical), 0.60);
    }

    #[test]
    fn test_essential_never_expires() {
        let policy = ExpiryPolicy::default();
        assert_eq!(policy.ttl_for(StrategyClass::Essential), None);
        assert_eq!(
            policy.ttl_for(StrategyClass::Optional),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = ManagerConfig::from_ron_str(
            "(drain_delay_ms: 0, lod: (near: 5.0), worker_mode: Manual)",
        )
        .unwrap();
        assert_eq!(config.drain_delay_ms, 0);
        assert_eq!(config.lod.near, 5.0);
        assert_eq!(config.lod.mid, 50.0);
        assert_eq!(config.worker_mode, WorkerMode::Manual);
        assert_eq!(config.fractions, CleanupFractions::default());
    }

    #[test]
    fn test_json_document() {
        let config = ManagerConfig::from_json_str(
            r#"{ "image_limit_bytes": 1048576, "usage_source": "Conservative" }"#,
        )
        .unwrap();
        assert_eq!(config.image_limit_bytes, MIB);
        assert_eq!(config.usage_source, UsageSource::Conservative);
    }

    #[test]
    fn test_invalid_thresholds_are_rejected() {
        let err = ManagerConfig::from_ron_str("(thresholds: (standard: 0.9, aggressive: 0.8))")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "thresholds", .. }));
    }

    #[test]
    fn test_invalid_fraction_is_rejected() {
        let err = ManagerConfig::from_ron_str("(fractions: (critical: 1.5))").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "fractions", .. }));
    }

    #[test]
    fn test_malformed_document_is_a_parse_error() {
        assert!(matches!(
            ManagerConfig::from_ron_str("(total_limit_bytes: "),
            Err(ConfigError::Ron(_))
        ));
        assert!(matches!(
            ManagerConfig::from_json_str("{"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_from_file_picks_format_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let ron_path = dir.path().join("tessera.ron");
        let mut file = std::fs::File::create(&ron_path).unwrap();
        writeln!(file, "(monitor_interval_ms: 1000)").unwrap();
        assert_eq!(
            ManagerConfig::from_file(&ron_path).unwrap().monitor_interval_ms,
            1000
        );

        let json_path = dir.path().join("tessera.json");
        std::fs::write(&json_path, r#"{ "monitor_interval_ms": 2000 }"#).unwrap();
        assert_eq!(
            ManagerConfig::from_file(&json_path).unwrap().monitor_interval_ms,
            2000
        );

        assert!(matches!(
            ManagerConfig::from_file(dir.path().join("missing.ron")),
            Err(ConfigError::Io(_))
        ));
    }
}

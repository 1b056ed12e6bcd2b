//! Sensor configuration: the YAML-backed knobs the evaluator, loader, and
//! session registry consume.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use nectar_rules::Layer;

use crate::engine::EngineOptions;
use crate::error::Result;
use crate::session::EvictionPolicy;

/// Which bounding policy the session registry runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionChoice {
    Lru,
    Ttl,
}

/// Sensor configuration, deserialized from a YAML file.
///
/// Every field has a default so a partial file works; unknown keys are
/// rejected to keep typos from silently disabling features.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SensorConfig {
    /// Root directory walked for `.yml` rule files.
    pub rules_dir: PathBuf,
    /// Layers whose rules are indexed and evaluated.
    pub active_layers: Vec<Layer>,
    /// Cap on stored HTTP bodies and packet payloads.
    pub max_body_bytes: usize,
    /// Live session bound under the `lru` policy.
    pub max_sessions: usize,
    /// Idle expiry under the `ttl` policy.
    pub session_ttl_secs: u64,
    pub eviction: EvictionChoice,
    /// Best-effort per-rule evaluation budget, in milliseconds. Zero
    /// disables the budget.
    pub rule_budget_ms: u64,
    pub log_level: String,
    /// `json` or `pretty`.
    pub log_format: String,
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            rules_dir: PathBuf::from("rules"),
            active_layers: Layer::ALL.to_vec(),
            max_body_bytes: 16 * 1024,
            max_sessions: 65536,
            session_ttl_secs: 300,
            eviction: EvictionChoice::Lru,
            rule_budget_ms: 5,
            log_level: "info".into(),
            log_format: "json".into(),
        }
    }
}

impl SensorConfig {
    /// Read configuration from a YAML file.
    pub fn load(path: &Path) -> Result<SensorConfig> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// The configured session eviction policy.
    pub fn eviction_policy(&self) -> EvictionPolicy {
        match self.eviction {
            EvictionChoice::Lru => EvictionPolicy::MaxSessions(self.max_sessions),
            EvictionChoice::Ttl => EvictionPolicy::Ttl(Duration::from_secs(self.session_ttl_secs)),
        }
    }

    /// Engine options derived from this configuration.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            rule_budget: (self.rule_budget_ms > 0)
                .then(|| Duration::from_millis(self.rule_budget_ms)),
        }
    }
}

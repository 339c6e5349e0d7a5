use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config_error;
use crate::errors::Result;
use crate::orchestrator::OrchestratorConfig;
use crate::protocol::{MAX_SKILL_LEVEL, MIN_SKILL_LEVEL};

/// Top-level configuration, loadable from JSON. Missing fields take their
/// defaults, so `{}` is a valid file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Skill used when a request does not specify one (1-20)
    pub default_skill: u8,
    pub orchestrator: OrchestratorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_skill: 10,
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn offline() -> Self {
        Self {
            orchestrator: OrchestratorConfig::offline(),
            ..Self::default()
        }
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_SKILL_LEVEL..=MAX_SKILL_LEVEL).contains(&self.default_skill) {
            return Err(config_error!(
                "default_skill {} outside {}..={}",
                self.default_skill,
                MIN_SKILL_LEVEL,
                MAX_SKILL_LEVEL
            ));
        }

        let search = &self.orchestrator.search;
        if search.max_depth == 0 {
            return Err(config_error!("search.max_depth must be at least 1"));
        }
        for (name, depth) in [
            ("fallback_depth", self.orchestrator.fallback_depth),
            ("evaluation_depth", self.orchestrator.evaluation_depth),
        ] {
            if depth == 0 || depth > search.max_depth {
                return Err(config_error!(
                    "{} {} outside 1..={}",
                    name,
                    depth,
                    search.max_depth
                ));
            }
        }

        if self.orchestrator.remote.timeout_ms == 0 {
            return Err(config_error!("remote.timeout_ms must be positive"));
        }
        Ok(())
    }
}

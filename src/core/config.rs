//! Engine configuration and pipeline definitions from YAML

use crate::core::variable::VariableSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub app: AppConfig,
    pub broker: BrokerConfig,
    pub lock: LockConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "pipeline-engine".to_string(),
        }
    }
}

/// In-process event broker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Buffer size of a subscriber stream when none is requested
    pub default_buffer_size: usize,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            default_buffer_size: 16,
        }
    }
}

/// Distributed lock settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lifetime of a lock marker in seconds
    pub ttl_secs: u64,

    /// Prefix prepended to every lock key
    pub key_prefix: String,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 60,
            key_prefix: "lock:".to_string(),
        }
    }
}

impl LockConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl EngineConfig {
    /// Load engine configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse engine configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Default location, `<config dir>/pipeline-engine/engine.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("pipeline-engine").join("engine.yaml"))
    }

    /// Load from `path`, or from the default location when it exists, or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(default),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.app.name.trim().is_empty() {
            anyhow::bail!("app.name must not be empty");
        }
        if self.broker.default_buffer_size == 0 {
            anyhow::bail!("broker.default_buffer_size must be at least 1");
        }
        if self.lock.ttl_secs == 0 {
            anyhow::bail!("lock.ttl_secs must be at least 1");
        }
        Ok(())
    }
}

/// Kind of work a step performs; the side effect itself lives elsewhere
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Start,
    End,
    Sleep,
    #[serde(rename = "scriptJS")]
    ScriptJs,
    Condition,
    Rest,
    Mysql,
    Postgresql,
    Redis,
}

/// A pipeline as authored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,

    pub steps: Vec<StepDefinition>,
}

/// One step and its declared inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique step identifier
    pub id: String,

    #[serde(rename = "type")]
    pub job_type: JobType,

    /// Declared inputs by variable name
    #[serde(default)]
    pub inputs: BTreeMap<String, VariableSpec>,
}

impl PipelineDefinition {
    /// Load a pipeline definition from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let definition: PipelineDefinition = serde_yaml::from_str(yaml)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Check that step ids are unique and non-empty
    pub fn validate(&self) -> Result<()> {
        let mut seen_ids = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                anyhow::bail!("Pipeline '{}' has a step with an empty id", self.name);
            }
            if !seen_ids.insert(&step.id) {
                anyhow::bail!("Duplicate step ID: {}", step.id);
            }
        }
        Ok(())
    }

    pub fn step(&self, id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|step| step.id == id)
    }
}

//! Runtime configuration
//!
//! Loaded from YAML. Every key is optional; missing keys take the defaults
//! below. Keys are snake_case, with the camelCase spellings of earlier
//! deployments (`bufferSize`, `maxStashes`, `eventFilter`, ...) accepted as
//! aliases.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::Span;

use crate::filter::{FilterEngine, FilterRule, ObjectLookup, StashTrigger};
use crate::stash::{CollisionPolicy, StashManagerConfig, DEFAULT_STASH_PREFIX};
use crate::types::EventType;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "EVENT_STASH_CONFIG";
pub const PORT_ENV: &str = "EVENT_STASH_PORT";
pub const STASH_DIR_ENV: &str = "EVENT_STASH_DIR";

const SYSTEM_CONFIG_PATH: &str = "/etc/event-stash/config.yaml";
const LOCAL_CONFIG_PATH: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for {var}: {value}")]
    Env { var: String, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Automatic stash trigger settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StashTriggerConfig {
    #[serde(default, alias = "eventType")]
    pub event_type: Option<EventType>,
    #[serde(default, alias = "eventFilters")]
    pub event_filters: Option<Vec<FilterRule>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    pub port: u16,
    #[serde(alias = "bufferSize")]
    pub buffer_size: usize,
    #[serde(alias = "maxStashes")]
    pub max_stashes: usize,
    pub stash_dir: PathBuf,
    pub stash_prefix: String,
    pub name_collision: CollisionPolicy,
    /// Rules selecting events for the buffer; empty accepts everything
    #[serde(alias = "eventFilter")]
    pub event_filters: Vec<FilterRule>,
    #[serde(alias = "stashOnWarningEvents")]
    pub stash_on_warning_events: bool,
    /// Takes precedence over `stash_on_warning_events`
    #[serde(alias = "stashTriggers")]
    pub stash_trigger: Option<StashTriggerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            buffer_size: 100,
            max_stashes: 20,
            stash_dir: PathBuf::from("/tmp"),
            stash_prefix: DEFAULT_STASH_PREFIX.to_string(),
            name_collision: CollisionPolicy::Reject,
            event_filters: Vec::new(),
            stash_on_warning_events: false,
            stash_trigger: None,
        }
    }
}

/// Result of [`Config::load`]
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    /// File the config came from; `None` when defaults were used
    pub source: Option<PathBuf>,
}

impl Config {
    pub fn from_yaml_str(content: &str, path: &str) -> Result<Self, ConfigError> {
        // An empty document means "all defaults"
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_yaml_str(&content, &display)
    }

    /// Candidate config files, most specific first
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(explicit) = env::var(CONFIG_PATH_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        paths.push(PathBuf::from(SYSTEM_CONFIG_PATH));
        paths.push(PathBuf::from(LOCAL_CONFIG_PATH));
        paths
    }

    /// Load from the first existing candidate, then apply environment overrides
    pub fn load() -> Result<LoadedConfig, ConfigError> {
        let mut loaded = Self::load_from(&Self::search_paths())?;
        loaded.config.apply_overrides(|var| env::var(var).ok())?;
        loaded.config.validate()?;
        Ok(loaded)
    }

    /// Read the first of `paths` that exists; defaults if none do
    pub fn load_from(paths: &[PathBuf]) -> Result<LoadedConfig, ConfigError> {
        for path in paths {
            if path.is_file() {
                return Ok(LoadedConfig {
                    config: Self::from_file(path)?,
                    source: Some(path.clone()),
                });
            }
        }

        Ok(LoadedConfig {
            config: Self::default(),
            source: None,
        })
    }

    /// Apply `EVENT_STASH_PORT` and `EVENT_STASH_DIR` as looked up by `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(PORT_ENV) {
            self.port = value.trim().parse().map_err(|_| ConfigError::Env {
                var: PORT_ENV.to_string(),
                value,
            })?;
        }

        if let Some(value) = lookup(STASH_DIR_ENV) {
            if value.is_empty() {
                return Err(ConfigError::Env {
                    var: STASH_DIR_ENV.to_string(),
                    value,
                });
            }
            self.stash_dir = PathBuf::from(value);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("buffer_size must be at least 1".to_string()));
        }
        if self.max_stashes == 0 {
            return Err(ConfigError::Invalid("max_stashes must be at least 1".to_string()));
        }
        if self.stash_prefix.is_empty() || self.stash_prefix.contains(|c: char| c == '/' || c == '\\') {
            return Err(ConfigError::Invalid(format!(
                "stash_prefix {:?} is not a valid file name prefix",
                self.stash_prefix
            )));
        }
        Ok(())
    }

    /// True if any configured rule needs live label lookups
    pub fn uses_labels(&self) -> bool {
        let trigger_rules = self
            .stash_trigger
            .as_ref()
            .and_then(|t| t.event_filters.as_deref())
            .unwrap_or(&[]);
        self.event_filters
            .iter()
            .chain(trigger_rules)
            .any(|rule| !rule.labels.is_empty())
    }

    pub fn manager_config(&self) -> StashManagerConfig {
        StashManagerConfig {
            max_stashes: self.max_stashes,
            prefix: self.stash_prefix.clone(),
            collision: self.name_collision,
        }
    }

    /// Filter deciding which events enter the buffer
    pub fn event_filter(&self, lookup: Arc<dyn ObjectLookup>, span: Span) -> FilterEngine {
        FilterEngine::new(self.event_filters.clone(), lookup, span)
    }

    /// Trigger for automatic stashes, if any is configured.
    ///
    /// A `stash_trigger` section with neither a type nor filters triggers on
    /// Warning events. Without a section, `stash_on_warning_events` enables a
    /// Warning-only trigger.
    pub fn stash_trigger(&self, lookup: Arc<dyn ObjectLookup>, span: Span) -> Option<StashTrigger> {
        match &self.stash_trigger {
            Some(trigger) => {
                let event_type = match (&trigger.event_type, &trigger.event_filters) {
                    (None, None) => Some(EventType::Warning),
                    (event_type, _) => *event_type,
                };
                let filter = trigger
                    .event_filters
                    .as_ref()
                    .map(|rules| FilterEngine::new(rules.clone(), lookup, span));
                Some(StashTrigger::new(event_type, filter))
            }
            None if self.stash_on_warning_events => Some(StashTrigger::on_warnings()),
            None => None,
        }
    }
}

//! Configuration file for logtap
//!
//! Settings are read from an optional TOML file. Every section and field
//! may be omitted; missing values fall back to the built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use logtap_logs::ServiceLimits;
use logtap_source::{DEFAULT_JOURNAL_COMMAND, DEFAULT_TIMEOUT, JournalSource, SystemLogSource};
use logtap_types::{CACHE_TTL, DEFAULT_LINES, DEFAULT_UNIT, MAX_CONCURRENT_FETCHES, MAX_LINES_CAP};

/// Errors raised while loading the configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub admission: AdmissionSettings,
    pub request: RequestSettings,
    pub source: SourceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Snapshot lifetime in milliseconds
    pub ttl_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_ms: CACHE_TTL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionSettings {
    /// Journal reads allowed in flight
    pub max_concurrent: usize,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            max_concurrent: MAX_CONCURRENT_FETCHES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestSettings {
    /// Lines returned when the caller does not say
    pub default_lines: i64,
    /// Upper clamp for requested lines
    pub max_lines: usize,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            default_lines: DEFAULT_LINES,
            max_lines: MAX_LINES_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// systemd unit to tail
    pub unit: String,
    /// Program used to read the journal
    pub command: String,
    /// Bounded wait for the journal command, in milliseconds
    pub timeout_ms: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            unit: DEFAULT_UNIT.to_string(),
            command: DEFAULT_JOURNAL_COMMAND.to_string(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn limits(&self) -> ServiceLimits {
        ServiceLimits {
            cache_ttl: Duration::from_millis(self.cache.ttl_ms),
            max_concurrent: self.admission.max_concurrent.min(Semaphore::MAX_PERMITS),
            max_lines: self.request.max_lines,
        }
    }

    pub fn log_source(&self) -> SystemLogSource {
        let journal = JournalSource::new(self.source.unit.clone())
            .with_program(self.source.command.clone())
            .with_timeout(Duration::from_millis(self.source.timeout_ms));
        SystemLogSource::with_journal(journal)
    }
}

//! # Pool Manifests
//!
//! Pools can be declared up front in TOML instead of in code:
//!
//! ```toml
//! [disposal]
//! batch_size = 16
//! interval_ms = 50
//!
//! [logging]
//! level = "info"
//!
//! [[prefab]]
//! name = "bullets"
//! amount = 32
//! template = "prefabs/bullet"
//! parent = "projectiles"
//!
//! [[asset]]
//! name = "explosions"
//! amount = 4
//! template = "fx/explosion"
//! ```
//!
//! Template and parent keys are plain strings; the `Host` resolves them when the
//! manifest is applied by the coordinator. A `[logging]` table installs the global
//! `tracing` formatter at that point; without one, logging is left to the caller.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tidepool_pool::DisposalConfig;
use tracing::Level;

use crate::error::ManifestError;
use crate::logging;

/// Declarative pool setup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolManifest {
    /// Pacing of time-sliced disposal.
    #[serde(default)]
    pub disposal: DisposalSettings,
    /// Logging bootstrap, applied by `Coordinator::load_manifest` when present.
    #[serde(default)]
    pub logging: Option<LoggingSettings>,
    /// Pools built from host prefabs.
    #[serde(default, rename = "prefab")]
    pub prefabs: Vec<PoolEntry>,
    /// Pools built from loadable assets.
    #[serde(default, rename = "asset")]
    pub assets: Vec<PoolEntry>,
}

/// `[disposal]` table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisposalSettings {
    /// Instances destroyed per batch.
    pub batch_size: usize,
    /// Milliseconds of engine time between batches.
    pub interval_ms: u64,
}

impl Default for DisposalSettings {
    fn default() -> Self {
        let config = DisposalConfig::default();
        Self {
            batch_size: config.batch_size,
            interval_ms: u64::try_from(config.interval.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<DisposalSettings> for DisposalConfig {
    fn from(settings: DisposalSettings) -> Self {
        Self {
            // A zero batch would never finish.
            batch_size: settings.batch_size.max(1),
            interval: Duration::from_millis(settings.interval_ms),
        }
    }
}

/// `[logging]` table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSettings {
    /// Maximum level: `trace`, `debug`, `info`, `warn` or `error`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl LoggingSettings {
    /// Parsed level; unrecognized names fall back to `INFO`.
    #[must_use]
    pub fn level(&self) -> Level {
        logging::parse_level(&self.level)
    }

    /// Installs the global formatter at this level. Returns false if a subscriber
    /// was already installed.
    pub fn install(&self) -> bool {
        logging::init(self.level())
    }
}

/// One `[[prefab]]` or `[[asset]]` entry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolEntry {
    /// Pool name.
    pub name: String,
    /// Instances created up front.
    #[serde(default)]
    pub amount: usize,
    /// Host key of the template.
    pub template: String,
    /// Host key of the parent; the scene root when absent.
    #[serde(default)]
    pub parent: Option<String>,
}

impl PoolManifest {
    /// Parses a manifest from TOML text.
    ///
    /// # Errors
    ///
    /// `Parse` for malformed TOML or unknown fields.
    pub fn from_toml_str(text: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a manifest file.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Parse` if it is malformed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Disposal pacing as the pool engines expect it.
    #[must_use]
    pub fn disposal_config(&self) -> DisposalConfig {
        self.disposal.into()
    }

    /// Number of pools declared.
    #[must_use]
    pub fn pool_count(&self) -> usize {
        self.prefabs.len() + self.assets.len()
    }
}

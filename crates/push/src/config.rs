use std::{path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    DEFAULT_EVENT_BUFFER,
    poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, Poller},
};

/// The default name for the dropship configuration file.
pub const CONFIG_FILENAME: &str = "Dropship.toml";

/// Where and how applications are pushed.
///
/// Serialized to and from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    /// Base URL of the control plane API.
    pub api: Url,
    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub target: Target,
    #[serde(default)]
    pub polling: PollSettings,
    /// Capacity of the progress event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

/// The organization and space applications are pushed into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub organization_guid: String,
    pub space_guid: String,
    pub space_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSettings {
    pub interval_secs: u64,
    /// Absent means poll until a terminal state or cancellation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            timeout_secs: Some(DEFAULT_POLL_TIMEOUT.as_secs()),
        }
    }
}

impl PollSettings {
    pub fn poller(&self) -> Poller {
        Poller::new(Duration::from_secs(self.interval_secs))
            .with_timeout(self.timeout_secs.map(Duration::from_secs))
    }
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

impl PushConfig {
    pub fn new(api: Url, target: Target) -> Self {
        Self {
            api,
            token: None,
            target,
            polling: PollSettings::default(),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    /// Write the push target and polling settings to `path` as TOML.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .with_context(|| format!("Failed to encode push config for {}", self.api))?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write push config to {}", path.display()))?;
        tracing::info!(
            path = %path.display(),
            api = %self.api,
            space = %self.target.space_name,
            "Push target saved"
        );
        Ok(())
    }

    /// Read a push config from `path`, or from [`CONFIG_FILENAME`] when
    /// `path` is a directory.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config_path = match path {
            dir if dir.is_dir() => dir.join(CONFIG_FILENAME),
            file if file.exists() => file.to_path_buf(),
            missing => anyhow::bail!("No push config at {}", missing.display()),
        };

        let content = std::fs::read_to_string(&config_path).with_context(|| {
            format!("Failed to read push config from {}", config_path.display())
        })?;
        let config: Self = toml::from_str(&content).with_context(|| {
            format!("Invalid push config in {}", config_path.display())
        })?;
        tracing::info!(
            path = %config_path.display(),
            api = %config.api,
            space = %config.target.space_name,
            "Push target loaded"
        );
        Ok(config)
    }
}

//! Configuration.
//!
//! Read from `.branchflow.toml` in the working copy (or a path given on the
//! command line). Every field is optional; a missing file means defaults.
//!
//! ```toml
//! base_branch = "main"
//! remote = "origin"
//! session_ttl_hours = 72
//! merge_method = "rebase"   # or "squash"
//!
//! [poll]
//! max_attempts = 30
//! initial_delay_secs = 5
//! max_delay_secs = 60
//! backoff_multiplier = 2.0
//!
//! [commit_identity]
//! name = "Release Bot"
//! email = "release@example.com"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git::CommitIdentity;
use crate::persistence::MAX_SESSION_TTL_HOURS;
use crate::platform::{MergeMethod, PollConfig};
use crate::validation::validate_branch_name;

/// File name looked up in the working copy root.
pub const CONFIG_FILE_NAME: &str = ".branchflow.toml";

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Where sessions are stored. Defaults to `.git/branchflow` in the
    /// working copy.
    pub state_dir: Option<PathBuf>,

    pub base_branch: String,

    pub remote: String,

    /// Lifetime of a new session. Fixed at creation.
    pub session_ttl_hours: u32,

    pub merge_method: MergeMethod,

    pub poll: PollSettings,

    /// Identity for commits made by `ship -m`. Falls back to git's own
    /// configuration.
    pub commit_identity: Option<IdentitySettings>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            state_dir: None,
            base_branch: "main".to_string(),
            remote: "origin".to_string(),
            session_ttl_hours: 72,
            merge_method: MergeMethod::default(),
            poll: PollSettings::default(),
            commit_identity: None,
        }
    }
}

/// Check-run polling, in whole seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    pub backoff_multiplier: f64,
}

impl Default for PollSettings {
    fn default() -> Self {
        let poll = PollConfig::DEFAULT;
        PollSettings {
            max_attempts: poll.max_attempts,
            initial_delay_secs: poll.initial_delay.as_secs(),
            max_delay_secs: poll.max_delay.as_secs(),
            backoff_multiplier: poll.backoff_multiplier,
        }
    }
}

impl PollSettings {
    pub fn to_poll_config(&self) -> PollConfig {
        PollConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            max_delay: Duration::from_secs(self.max_delay_secs),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentitySettings {
    pub name: String,
    pub email: String,
}

impl From<&IdentitySettings> for CommitIdentity {
    fn from(settings: &IdentitySettings) -> Self {
        CommitIdentity {
            name: settings.name.clone(),
            email: settings.email.clone(),
        }
    }
}

impl Config {
    /// Loads and validates a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Config::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Config::default())
        }
    }

    /// Loads `.branchflow.toml` from the working copy root, if present.
    pub fn discover(workdir: &Path) -> Result<Self, ConfigError> {
        Config::load_or_default(&workdir.join(CONFIG_FILE_NAME))
    }

    /// The session store directory for a working copy.
    pub fn state_dir_for(&self, workdir: &Path) -> PathBuf {
        match &self.state_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => workdir.join(dir),
            None => workdir.join(".git").join("branchflow"),
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.session_ttl_hours))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl_hours == 0 || self.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            return Err(ConfigError::Invalid(format!(
                "session_ttl_hours must be between 1 and {}",
                MAX_SESSION_TTL_HOURS
            )));
        }
        validate_branch_name(&self.base_branch)
            .map_err(|e| ConfigError::Invalid(format!("base_branch: {}", e)))?;
        if self.remote.is_empty() {
            return Err(ConfigError::Invalid("remote must not be empty".to_string()));
        }
        if self.poll.backoff_multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "poll.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

//! Application-level configuration loading with explicit reload support.

use std::{
    env, fs,
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, PoisonError, RwLock},
};

use chrono::Duration;
use chrono_tz::Tz;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "MAPVOTE_CONFIG_PATH";
const ADMIN_TOKEN_ENV: &str = "MAPVOTE_ADMIN_TOKEN";
const CRCON_BASE_URL_ENV: &str = "CRCON_BASE_URL";
const CRCON_API_TOKEN_ENV: &str = "CRCON_API_TOKEN";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_VOTE_DURATION_MINUTES: u32 = 60;
const DEFAULT_MAPVOTE_COOLDOWN: u32 = 2;
const DEFAULT_CANDIDATE_COUNT: usize = crate::state::pool::DEFAULT_CANDIDATE_COUNT;
const DEFAULT_TIMEZONE: Tz = chrono_tz::Australia::Sydney;
const DEFAULT_SCHEDULER_RELOAD_MINUTES: u64 = 60;
const DEFAULT_MATCH_WATCH_INTERVAL_SECS: u64 = 25;
const DEFAULT_PUSH_TIMEOUT_SECS: u64 = 10;

/// Failures while (re)reading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config `{path}`")]
    Read {
        /// Path of the file.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid JSON.
    #[error("failed to parse config `{path}`")]
    Parse {
        /// Path of the file.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

/// Connection settings for the remote game-server administration API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrconConfig {
    /// Base URL of the API, without the `/api` suffix.
    pub base_url: String,
    /// Bearer token sent with every command.
    pub api_token: Option<String>,
}

#[derive(Debug, Clone)]
/// Immutable snapshot of the runtime configuration.
pub struct AppConfig {
    /// Directory holding the JSON collections.
    pub data_dir: PathBuf,
    /// How long a round stays open.
    pub vote_duration_minutes: u32,
    /// Cooldown applied to a winner when the round does not carry its own.
    pub mapvote_cooldown: u32,
    /// Default quorum for new rounds.
    pub minimum_votes: u32,
    /// Default number of options per round.
    pub candidate_count: usize,
    /// Time zone cron expressions are evaluated in.
    pub timezone: Tz,
    /// Period of the schedule reload, zero disables it.
    pub scheduler_reload_minutes: u64,
    /// Match watcher polling period, zero disables the watcher.
    pub match_watch_interval_secs: u64,
    /// Upper bound for a rotation push.
    pub push_timeout_secs: u64,
    /// Channel new rounds are posted to.
    pub vote_channel_id: Option<String>,
    /// Token required on admin routes, when set.
    pub admin_token: Option<String>,
    /// Game-server administration endpoint; pushes are disabled without one.
    pub crcon: Option<CrconConfig>,
}

impl AppConfig {
    /// Length of a round as a duration.
    pub fn vote_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.vote_duration_minutes))
    }

    /// Read and parse the configuration at `path`, applying environment overrides.
    pub fn read(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let raw =
            serde_json::from_str::<RawConfig>(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self::from(raw).with_env_overrides())
    }

    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load(path: &PathBuf) -> Self {
        match Self::read(path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(ConfigError::Read { source, .. }) if source.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default().with_env_overrides()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to load config; falling back to defaults"
                );
                Self::default().with_env_overrides()
            }
        }
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(token) = non_empty_env(ADMIN_TOKEN_ENV) {
            self.admin_token = Some(token);
        }
        if let Some(base_url) = non_empty_env(CRCON_BASE_URL_ENV) {
            let api_token = self.crcon.take().and_then(|crcon| crcon.api_token);
            self.crcon = Some(CrconConfig {
                base_url,
                api_token,
            });
        }
        if let (Some(crcon), Some(token)) = (self.crcon.as_mut(), non_empty_env(CRCON_API_TOKEN_ENV))
        {
            crcon.api_token = Some(token);
        }
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    data_dir: Option<PathBuf>,
    vote_duration_minutes: Option<u32>,
    mapvote_cooldown: Option<u32>,
    minimum_votes: Option<u32>,
    candidate_count: Option<usize>,
    timezone: Option<String>,
    scheduler_reload_minutes: Option<u64>,
    match_watch_interval_secs: Option<u64>,
    push_timeout_secs: Option<u64>,
    vote_channel_id: Option<String>,
    admin_token: Option<String>,
    crcon: Option<RawCrcon>,
}

#[derive(Debug, Deserialize)]
struct RawCrcon {
    base_url: String,
    #[serde(default)]
    api_token: Option<String>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let timezone = match value.timezone.as_deref() {
            None => DEFAULT_TIMEZONE,
            Some(name) => name.parse::<Tz>().unwrap_or_else(|err| {
                warn!(timezone = name, error = %err, "unknown time zone; using default");
                DEFAULT_TIMEZONE
            }),
        };

        Self {
            data_dir: value
                .data_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            vote_duration_minutes: value
                .vote_duration_minutes
                .unwrap_or(DEFAULT_VOTE_DURATION_MINUTES),
            mapvote_cooldown: value.mapvote_cooldown.unwrap_or(DEFAULT_MAPVOTE_COOLDOWN),
            minimum_votes: value.minimum_votes.unwrap_or(0),
            candidate_count: value
                .candidate_count
                .filter(|count| *count > 0)
                .unwrap_or(DEFAULT_CANDIDATE_COUNT),
            timezone,
            scheduler_reload_minutes: value
                .scheduler_reload_minutes
                .unwrap_or(DEFAULT_SCHEDULER_RELOAD_MINUTES),
            match_watch_interval_secs: value
                .match_watch_interval_secs
                .unwrap_or(DEFAULT_MATCH_WATCH_INTERVAL_SECS),
            push_timeout_secs: value
                .push_timeout_secs
                .unwrap_or(DEFAULT_PUSH_TIMEOUT_SECS),
            vote_channel_id: value.vote_channel_id,
            admin_token: value.admin_token.filter(|token| !token.is_empty()),
            crcon: value
                .crcon
                .filter(|crcon| !crcon.base_url.trim().is_empty())
                .map(|crcon| CrconConfig {
                    base_url: crcon.base_url,
                    api_token: crcon.api_token,
                }),
        }
    }
}

/// Shared, reloadable access to the current [`AppConfig`].
///
/// Readers grab a snapshot with [`ConfigHandle::current`] and keep it for the duration of one
/// operation; [`ConfigHandle::reload`] swaps the snapshot for subsequent operations.
#[derive(Clone)]
pub struct ConfigHandle {
    path: Option<Arc<PathBuf>>,
    current: Arc<RwLock<Arc<AppConfig>>>,
}

impl ConfigHandle {
    /// Load the configuration from the path resolved from the environment.
    pub fn load() -> Self {
        Self::from_file(resolve_config_path())
    }

    /// Load the configuration from `path`; reloads read the same file.
    pub fn from_file(path: PathBuf) -> Self {
        let config = AppConfig::load(&path);
        Self {
            path: Some(Arc::new(path)),
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Wrap a configuration that never reloads.
    pub fn fixed(config: AppConfig) -> Self {
        Self {
            path: None,
            current: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Snapshot of the active configuration.
    pub fn current(&self) -> Arc<AppConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Re-read the configuration file. On failure the active configuration is kept.
    pub fn reload(&self) -> Result<Arc<AppConfig>, ConfigError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(self.current());
        };

        let config = Arc::new(AppConfig::read(path)?);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = config.clone();
        info!(path = %path.display(), "configuration reloaded");
        Ok(config)
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

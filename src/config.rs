//! Application-level configuration loading, including gameplay timing knobs.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the library looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "CUP_RALLY_CONFIG_PATH";

/// Seconds the undo window stays open after a transition.
const DEFAULT_UNDO_WINDOW_SECS: u64 = 5;
/// Capacity of every per-game broadcast channel.
const DEFAULT_CHANNEL_CAPACITY: usize = 16;
/// How many recent UI event ids a subscription remembers for deduplication.
const DEFAULT_RECENT_EVENTS_CAPACITY: usize = 32;
/// Seconds a planned transition may spend on persistence before being aborted.
const DEFAULT_TRANSITION_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Duration the undo window stays open after each applied transition.
    pub undo_window: Duration,
    /// Capacity of the per-game state and UI broadcast channels.
    pub channel_capacity: usize,
    /// Bound on the per-subscription recent-event dedup ring.
    pub recent_events_capacity: usize,
    /// Upper bound on the persistence work of a single transition.
    pub transition_timeout: Duration,
}

impl AppConfig {
    /// Load the configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), ?config, "loaded configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            undo_window: Duration::from_secs(DEFAULT_UNDO_WINDOW_SECS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            recent_events_capacity: DEFAULT_RECENT_EVENTS_CAPACITY,
            transition_timeout: Duration::from_secs(DEFAULT_TRANSITION_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    undo_window_secs: Option<u64>,
    channel_capacity: Option<usize>,
    recent_events_capacity: Option<usize>,
    transition_timeout_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        Self {
            undo_window: value
                .undo_window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.undo_window),
            channel_capacity: value.channel_capacity.unwrap_or(defaults.channel_capacity),
            recent_events_capacity: value
                .recent_events_capacity
                .unwrap_or(defaults.recent_events_capacity),
            transition_timeout: value
                .transition_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.transition_timeout),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

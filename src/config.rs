use log::{info, warn};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-oss:20b";

/// Process-wide settings, read once at startup and handed to the
/// client, history store and relay.
#[derive(Debug, Clone)]
pub struct Config {
    pub ollama_enabled: bool,
    pub ollama_host: String,
    pub ollama_port: u16,
    pub ollama_model: String,
    pub ollama_timeout: Duration,
    pub num_predict: u32,
    pub history_max_turns: usize,
    pub bind_host: String,
    pub bind_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_enabled: false,
            ollama_host: "127.0.0.1".to_string(),
            ollama_port: 11434,
            ollama_model: DEFAULT_MODEL.to_string(),
            ollama_timeout: Duration::from_secs(90),
            num_predict: 256,
            history_max_turns: 16,
            bind_host: "127.0.0.1".to_string(),
            bind_port: 8000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unparsable values
    /// fall back to their defaults with a warning.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let timeout_secs = parse_or(&lookup, "OLLAMA_TIMEOUT_SECONDS", defaults.ollama_timeout.as_secs());

        Self {
            ollama_enabled: lookup("OLLAMA_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.ollama_enabled),
            ollama_host: non_empty(&lookup, "OLLAMA_HOST").unwrap_or(defaults.ollama_host),
            ollama_port: parse_or(&lookup, "OLLAMA_PORT", defaults.ollama_port),
            ollama_model: non_empty(&lookup, "OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            ollama_timeout: Duration::from_secs(timeout_secs),
            num_predict: parse_or(&lookup, "OLLAMA_NUM_PREDICT", defaults.num_predict),
            history_max_turns: parse_or(&lookup, "HISTORY_MAX_TURNS", defaults.history_max_turns),
            bind_host: non_empty(&lookup, "RELAY_HOST").unwrap_or(defaults.bind_host),
            bind_port: parse_or(&lookup, "RELAY_PORT", defaults.bind_port),
        }
    }

    pub fn ollama_base_url(&self) -> String {
        format!("http://{}:{}", self.ollama_host, self.ollama_port)
    }

    pub fn log_summary(&self) {
        info!("[CFG] OLLAMA_ENABLED={}", self.ollama_enabled);
        info!("[CFG] OLLAMA_HOST={}", self.ollama_host);
        info!("[CFG] OLLAMA_PORT={}", self.ollama_port);
        info!("[CFG] OLLAMA_MODEL={}", self.ollama_model);
        info!("[CFG] TIMEOUT={}s", self.ollama_timeout.as_secs());
        info!("[CFG] NUM_PREDICT={}", self.num_predict);
        info!("[CFG] HISTORY_MAX_TURNS={}", self.history_max_turns);
    }
}

pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

//! Relay configuration.
//!
//! Values are layered, later layers winning: built-in defaults, an optional
//! TOML file, `PEERDROP_*` environment variables, then command-line flags.
//!
//! ```toml
//! listen_addr = "0.0.0.0:8787"
//! max_message_bytes = 262144
//! rate_limit_messages = 120
//! rate_limit_window_secs = 10
//! idle_room_ttl_secs = 1800
//! sweep_interval_secs = 60
//! log_events = false
//!
//! [session]
//! min_ttl_minutes = 10
//! max_ttl_minutes = 30
//! default_ttl_minutes = 15
//! max_code_attempts = 5
//! ```

use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::{Context, Result, bail};
use peerdrop_session::SessionStoreConfig;
use serde::{Deserialize, Serialize};

use crate::ConnectionLimits;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub listen_addr: String,
    pub max_message_bytes: usize,
    pub rate_limit_messages: usize,
    pub rate_limit_window_secs: u64,
    pub idle_room_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    pub log_events: bool,
    pub session: SessionSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub min_ttl_minutes: i64,
    pub max_ttl_minutes: i64,
    pub default_ttl_minutes: i64,
    pub max_code_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8787".to_string(),
            max_message_bytes: 262_144,
            rate_limit_messages: 120,
            rate_limit_window_secs: 10,
            idle_room_ttl_secs: 30 * 60,
            sweep_interval_secs: 60,
            log_events: false,
            session: SessionSection::default(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = SessionStoreConfig::default();
        Self {
            min_ttl_minutes: defaults.min_ttl_minutes,
            max_ttl_minutes: defaults.max_ttl_minutes,
            default_ttl_minutes: defaults.default_ttl_minutes,
            max_code_attempts: defaults.max_code_attempts,
        }
    }
}

impl RelayConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| {
            format!("Failed to read config file: {}", path.display())
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Applies `PEERDROP_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Applies `PEERDROP_*` overrides read through `lookup`.
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(addr) = lookup("PEERDROP_LISTEN_ADDR") {
            self.listen_addr = addr;
        }
        override_parsed(
            &lookup,
            "PEERDROP_MAX_MESSAGE_BYTES",
            &mut self.max_message_bytes,
        )?;
        override_parsed(
            &lookup,
            "PEERDROP_RATE_LIMIT_MESSAGES",
            &mut self.rate_limit_messages,
        )?;
        override_parsed(
            &lookup,
            "PEERDROP_RATE_LIMIT_WINDOW_SECS",
            &mut self.rate_limit_window_secs,
        )?;
        override_parsed(
            &lookup,
            "PEERDROP_IDLE_ROOM_TTL_SECS",
            &mut self.idle_room_ttl_secs,
        )?;
        override_parsed(
            &lookup,
            "PEERDROP_SWEEP_INTERVAL_SECS",
            &mut self.sweep_interval_secs,
        )?;
        override_parsed(&lookup, "PEERDROP_LOG_EVENTS", &mut self.log_events)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_message_bytes == 0 {
            bail!("max_message_bytes must be greater than zero");
        }
        if self.rate_limit_messages == 0 || self.rate_limit_window_secs == 0 {
            bail!("rate limit messages and window must be greater than zero");
        }
        if self.idle_room_ttl_secs == 0 || self.sweep_interval_secs == 0 {
            bail!("idle room TTL and sweep interval must be greater than zero");
        }
        let s = &self.session;
        if s.min_ttl_minutes <= 0
            || s.min_ttl_minutes > s.default_ttl_minutes
            || s.default_ttl_minutes > s.max_ttl_minutes
        {
            bail!(
                "session TTLs must satisfy 0 < min ({}) <= default ({}) <= max ({})",
                s.min_ttl_minutes,
                s.default_ttl_minutes,
                s.max_ttl_minutes
            );
        }
        if s.max_code_attempts == 0 {
            bail!("session max_code_attempts must be greater than zero");
        }
        Ok(())
    }

    pub fn limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_message_bytes: self.max_message_bytes,
            rate_limit_messages: self.rate_limit_messages,
            rate_limit_window: Duration::from_secs(self.rate_limit_window_secs),
        }
    }

    pub fn session_store_config(&self) -> SessionStoreConfig {
        SessionStoreConfig {
            min_ttl_minutes: self.session.min_ttl_minutes,
            max_ttl_minutes: self.session.max_ttl_minutes,
            default_ttl_minutes: self.session.default_ttl_minutes,
            max_code_attempts: self.session.max_code_attempts,
        }
    }

    pub fn idle_room_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_room_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn override_parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw.trim().parse().map_err(|e| {
            anyhow::anyhow!("Invalid value '{}' for {}: {}", raw, key, e)
        })?;
    }
    Ok(())
}

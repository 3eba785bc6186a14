//! Run configuration.
//!
//! Everything that used to be process-wide (the debug toggle, default
//! timeouts) lives in a [`RunConfig`] value that is passed into console
//! devices and test contexts explicitly, so two runs in one process do not
//! see each other's settings.

mod inventory;

pub use inventory::{DeviceConfig, Inventory};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Prefix for the environment variables read by [`RunConfig::from_env`].
pub const ENV_PREFIX: &str = "CONSOLEBENCH";

/// Default await deadline in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default deadline for a session to come up, in seconds.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;

/// Default rolling buffer cap in bytes.
const DEFAULT_MAX_BUFFER_SIZE: usize = 256 * 1024;

/// Settings shared by every device and step of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Mirror every send/await to the diagnostic sink.
    pub debug: bool,

    /// Deadline for awaits and commands that do not pass their own.
    #[serde(with = "duration_secs")]
    pub default_timeout: Duration,

    /// Deadline for a session to report it is live.
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,

    /// Inter-character delay for targets that drop fast input bursts.
    #[serde(with = "opt_duration_secs", skip_serializing_if = "Option::is_none")]
    pub char_delay: Option<Duration>,

    /// Rolling buffer cap in bytes.
    pub max_buffer_size: usize,

    /// Remove terminal escape sequences before matching.
    pub strip_ansi: bool,

    /// Appended by `emit`.
    pub line_terminator: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            debug: false,
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            char_delay: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            strip_ansi: true,
            line_terminator: "\n".to_string(),
        }
    }
}

impl RunConfig {
    /// Defaults overlaid with `CONSOLEBENCH_DEBUG` and
    /// `CONSOLEBENCH_TIMEOUT` (seconds).
    ///
    /// This is the only place the crate reads the environment; call it once
    /// while wiring a run and pass the result around.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(debug) = env_var("DEBUG") {
            config.debug = matches!(
                debug.to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(secs) = env_var("TIMEOUT").and_then(|v| v.parse::<f64>().ok()) {
            if secs.is_finite() && secs > 0.0 {
                config.default_timeout = Duration::from_secs_f64(secs);
            }
        }
        config
    }

    /// Builder-style debug toggle.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Builder-style default timeout.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Durations as (fractional) seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(d)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert!(!config.debug);
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert!(config.strip_ansi);
        assert_eq!(config.line_terminator, "\n");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: RunConfig = toml::from_str("debug = true\ndefault_timeout = 2.5\n").unwrap();
        assert!(config.debug);
        assert_eq!(config.default_timeout, Duration::from_millis(2500));
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
        assert_eq!(config.char_delay, None);
    }

    #[test]
    fn test_char_delay_roundtrip_field() {
        let config: RunConfig = toml::from_str("char_delay = 0.05").unwrap();
        assert_eq!(config.char_delay, Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_negative_duration_rejected() {
        assert!(toml::from_str::<RunConfig>("default_timeout = -1.0").is_err());
    }
}

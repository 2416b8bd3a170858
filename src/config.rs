//! Configuration loading
//!
//! Settings are resolved in priority order: compiled defaults, then the TOML
//! config file, then `PHONO_*` environment variables, then command-line
//! overrides applied by the caller.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Player configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Command channel capacity (also bounds the enqueue burst size)
    pub queue_capacity: usize,

    /// Per-session attempt limit
    pub max_attempts: u32,

    /// Linear backoff base between attempts, in milliseconds
    pub retry_base_ms: u64,

    /// Size of each pooled transfer buffer in bytes
    pub transfer_buffer_size: usize,

    /// Grace period before force-killing a child process, in milliseconds
    pub child_grace_ms: u64,

    /// Transcoder binary
    pub ffmpeg_bin: String,

    /// PCM sink binary
    pub ffplay_bin: String,

    /// Remote metadata probe binary
    pub ytdlp_bin: String,

    /// Startup volume passed to the sink process (0-100)
    pub volume: u8,

    /// Resolver cache TTL in seconds; 0 disables caching
    pub resolver_cache_ttl_secs: u64,

    /// Progress log boundary in bytes
    pub progress_log_bytes: u64,

    /// Progress log boundary in seconds of audio
    pub progress_log_interval_secs: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_attempts: 3,
            retry_base_ms: 200,
            transfer_buffer_size: 80 * 1024,
            child_grace_ms: 2000,
            ffmpeg_bin: "ffmpeg".to_string(),
            ffplay_bin: "ffplay".to_string(),
            ytdlp_bin: "yt-dlp".to_string(),
            volume: 100,
            resolver_cache_ttl_secs: 300,
            progress_log_bytes: 1024 * 1024,
            progress_log_interval_secs: 5,
        }
    }
}

impl PlayerConfig {
    /// Load configuration: defaults, then config file, then environment.
    ///
    /// `cli_path` overrides the default config file location
    /// (`<config_dir>/phono/config.toml`). A missing default file is fine;
    /// a missing explicit file is an error.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match cli_path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                toml::from_str(&text)
                    .map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => {
                    let text = std::fs::read_to_string(&path).map_err(|e| {
                        Error::Config(format!("cannot read {}: {e}", path.display()))
                    })?;
                    toml::from_str(&text)
                        .map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))?
                }
                _ => Self::default(),
            },
        };

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply `PHONO_*` environment overrides for the externally visible knobs
    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("PHONO_FFMPEG") {
            self.ffmpeg_bin = v;
        }
        if let Ok(v) = std::env::var("PHONO_FFPLAY") {
            self.ffplay_bin = v;
        }
        if let Ok(v) = std::env::var("PHONO_YTDLP") {
            self.ytdlp_bin = v;
        }
        if let Ok(v) = std::env::var("PHONO_VOLUME") {
            match v.parse::<u8>() {
                Ok(vol) => self.volume = vol,
                Err(_) => warn!("ignoring invalid PHONO_VOLUME: {v}"),
            }
        }
        if let Ok(v) = std::env::var("PHONO_CACHE_TTL_SECS") {
            match v.parse::<u64>() {
                Ok(ttl) => self.resolver_cache_ttl_secs = ttl,
                Err(_) => warn!("ignoring invalid PHONO_CACHE_TTL_SECS: {v}"),
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be positive".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be positive".into()));
        }
        if self.transfer_buffer_size == 0 {
            return Err(Error::Config("transfer_buffer_size must be positive".into()));
        }
        if self.volume > 100 {
            return Err(Error::Config("volume must be within 0-100".into()));
        }
        Ok(())
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn child_grace(&self) -> Duration {
        Duration::from_millis(self.child_grace_ms)
    }

    /// Resolver cache TTL; `None` when caching is disabled
    pub fn resolver_cache_ttl(&self) -> Option<Duration> {
        if self.resolver_cache_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.resolver_cache_ttl_secs))
        }
    }

    pub fn progress_log_interval(&self) -> Duration {
        Duration::from_secs(self.progress_log_interval_secs)
    }
}

/// Default config file path for the platform
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("phono").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_capacity, 256);
        assert_eq!(config.retry_base(), Duration::from_millis(200));
        assert_eq!(config.child_grace(), Duration::from_secs(2));
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let config = PlayerConfig {
            resolver_cache_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.resolver_cache_ttl().is_none());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: PlayerConfig = toml::from_str("volume = 40\nffmpeg_bin = \"/opt/ffmpeg\"").unwrap();
        assert_eq!(config.volume, 40);
        assert_eq!(config.ffmpeg_bin, "/opt/ffmpeg");
        assert_eq!(config.max_attempts, 3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = PlayerConfig {
            volume: 130,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}

use crate::core::cache::CachePolicy;
use crate::core::conversion::Precision;
use crate::core::service::Credential;
use anyhow::{Context, Result, bail};
use chrono::Duration;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const LISTEN_ADDR_ENV: &str = "RATEKEEPER_LISTEN_ADDR";

/// Longest duration any cache setting may express (ten years).
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: "127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// The provider quotes rial; dividing by this yields toman.
    pub scale_factor: f64,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            base_url: "https://api.navasan.tech".to_string(),
            api_key_env: "NAVASAN_API_KEY".to_string(),
            scale_factor: 10.0,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub retry_base_secs: u64,
    pub retry_ceiling_secs: u64,
    pub history_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: 24 * 60 * 60,
            retry_base_secs: 5,
            retry_ceiling_secs: 5 * 60,
            history_limit: 10,
        }
    }
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        let secs = |n: u64| Duration::seconds(n.min(MAX_DURATION_SECS) as i64);
        CachePolicy {
            ttl: secs(self.ttl_secs),
            retry_base: secs(self.retry_base_secs),
            retry_ceiling: secs(self.retry_ceiling_secs),
            history_limit: self.history_limit,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct ConversionConfig {
    pub precision: Precision,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub cache: CacheConfig,
    pub conversion: ConversionConfig,
}

impl AppConfig {
    /// Loads the default config file, falling back to built-in defaults when it does not exist.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default().with_env_overrides());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "ratekeeper", "ratekeeper")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = if config_str.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&config_str).with_context(|| {
                format!("Failed to parse config file: {}", path.as_ref().display())
            })?
        };
        debug!("Successfully loaded config");
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(addr) = std::env::var(LISTEN_ADDR_ENV)
            && !addr.trim().is_empty()
        {
            self.server.listen_addr = addr;
        }
        self
    }

    /// The upstream credential, read from `provider.api_key_env` each time it is used.
    pub fn credential(&self) -> Credential {
        Credential::from_env(self.provider.api_key_env.clone())
    }

    pub fn validate(&self) -> Result<()> {
        let scale = self.provider.scale_factor;
        if !scale.is_finite() || scale <= 0.0 {
            bail!("provider.scale_factor must be a positive number, got {scale}");
        }
        if self.provider.timeout_secs == 0 {
            bail!("provider.timeout_secs cannot be 0");
        }
        if self.provider.api_key_env.trim().is_empty() {
            bail!("provider.api_key_env cannot be empty");
        }
        if self.cache.ttl_secs == 0 {
            bail!("cache.ttl_secs cannot be 0");
        }
        if self.cache.ttl_secs > MAX_DURATION_SECS
            || self.cache.retry_ceiling_secs > MAX_DURATION_SECS
        {
            bail!("cache durations cannot exceed {MAX_DURATION_SECS} seconds");
        }
        if self.cache.history_limit == 0 {
            bail!("cache.history_limit cannot be 0");
        }
        if self.cache.retry_base_secs > self.cache.retry_ceiling_secs {
            bail!("cache.retry_base_secs cannot exceed cache.retry_ceiling_secs");
        }
        Ok(())
    }
}

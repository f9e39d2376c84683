//! Service configuration
//!
//! Loads an optional TOML file (by default `config.toml` in the XDG config
//! directory for `mandi`), applies environment overrides and validates the
//! result. Every field has a default, so an empty or missing file is valid.

use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::aggregate::SourcePlan;
use crate::data::sample::{SOURCE_AGMARKNET, SOURCE_COMMODITY_ONLINE, SOURCE_GOV_API};
use crate::refresh::RefreshConfig;

/// Environment variable overriding `gov_api.api_key`
pub const ENV_GOV_API_KEY: &str = "MANDI_GOV_API_KEY";

/// Environment variable overriding `server.bind`
pub const ENV_BIND: &str = "MANDI_BIND";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config or data file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`AppConfig`]
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The geography file is not valid JSON
    #[error("Failed to parse geography file {path}: {source}")]
    Geography {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// One or more settings are out of range
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// The shared HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub fetch: FetchConfig,
    pub gov_api: GovApiConfig,
    pub feeds: Vec<FeedConfig>,
    pub refresh: RefreshConfig,
    pub geo: GeoConfig,
    /// Optional JSON file replacing the built-in states/districts table
    pub geography_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP server listens on
    pub bind: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound on a single synchronous upstream fetch
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// data.gov.in settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GovApiConfig {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    /// Maximum rows requested per call
    pub limit: u32,
    pub ttl_secs: u64,
}

/// One scraped JSON feed
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedConfig {
    /// Cache key, also used to pick the sample dataset
    pub key: String,
    pub url: String,
    /// `Source` label for rows without their own
    pub label: String,
    #[serde(default = "default_feed_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    /// Radius for nearby-mandi search
    pub radius_km: f64,
}

fn default_feed_ttl() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8001".to_string(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: concat!("mandi/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for GovApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://api.data.gov.in/resource/9ef84268-d588-465a-a308-a864a43d0070"
                .to_string(),
            api_key: String::new(),
            limit: 5000,
            ttl_secs: 3600,
        }
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self { radius_km: 100.0 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            fetch: FetchConfig::default(),
            gov_api: GovApiConfig::default(),
            feeds: vec![
                FeedConfig {
                    key: SOURCE_AGMARKNET.to_string(),
                    url: "http://127.0.0.1:8002/agmarknet".to_string(),
                    label: "Agmarknet".to_string(),
                    ttl_secs: default_feed_ttl(),
                },
                FeedConfig {
                    key: SOURCE_COMMODITY_ONLINE.to_string(),
                    url: "http://127.0.0.1:8002/commodity-online".to_string(),
                    label: "CommodityOnline".to_string(),
                    ttl_secs: default_feed_ttl(),
                },
            ],
            refresh: RefreshConfig::default(),
            geo: GeoConfig::default(),
            geography_file: None,
        }
    }
}

impl AppConfig {
    /// Default config file location (`~/.config/mandi/config.toml` on Linux)
    pub fn default_path() -> Option<PathBuf> {
        let project_dirs = ProjectDirs::from("", "", "mandi")?;
        Some(project_dirs.config_dir().join("config.toml"))
    }

    /// Loads configuration
    ///
    /// An explicit `path` must exist. Without one, the default path is used
    /// when present, otherwise built-in defaults. Environment overrides are
    /// applied before validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(default_path) => Self::from_file(&default_path)?,
                None => Self::default(),
            },
        };

        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML config file without validating it
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies overrides from a variable lookup (the process environment in production)
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(api_key) = lookup(ENV_GOV_API_KEY).filter(|v| !v.trim().is_empty()) {
            self.gov_api.api_key = api_key.trim().to_string();
        }
        if let Some(bind) = lookup(ENV_BIND).filter(|v| !v.trim().is_empty()) {
            self.server.bind = bind.trim().to_string();
        }
    }

    /// Checks every setting, reporting all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut issues: Vec<String> = Vec::new();

        if self.server.bind.parse::<SocketAddr>().is_err() {
            issues.push(format!("server.bind '{}' is not a socket address", self.server.bind));
        }
        if self.fetch.timeout_secs == 0 {
            issues.push("fetch.timeout_secs must be > 0".into());
        }

        if self.gov_api.enabled {
            if self.gov_api.url.trim().is_empty() {
                issues.push("gov_api.url must not be empty".into());
            }
            if self.gov_api.limit == 0 {
                issues.push("gov_api.limit must be > 0".into());
            }
            if self.gov_api.ttl_secs == 0 {
                issues.push("gov_api.ttl_secs must be > 0".into());
            }
        }

        let mut seen: HashSet<&str> = HashSet::new();
        if self.gov_api.enabled {
            seen.insert(SOURCE_GOV_API);
        }
        for feed in &self.feeds {
            if feed.key.trim().is_empty() {
                issues.push("feeds[].key must not be empty".into());
            } else if !seen.insert(feed.key.as_str()) {
                issues.push(format!("feed key '{}' is used more than once", feed.key));
            }
            if feed.url.trim().is_empty() {
                issues.push(format!("feed '{}' must have a url", feed.key));
            }
            if feed.ttl_secs == 0 {
                issues.push(format!("feed '{}' ttl_secs must be > 0", feed.key));
            }
        }

        if self.refresh.enabled && self.refresh.interval_secs == 0 {
            issues.push("refresh.interval_secs must be > 0 when refresh is enabled".into());
        }
        if self.geo.radius_km.is_nan() || self.geo.radius_km <= 0.0 {
            issues.push("geo.radius_km must be > 0".into());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /// Sources to aggregate, government feed first, then feeds in file order
    pub fn source_plan(&self) -> Vec<SourcePlan> {
        let mut plan = Vec::with_capacity(self.feeds.len() + 1);
        if self.gov_api.enabled {
            plan.push(SourcePlan::new(
                SOURCE_GOV_API,
                Duration::from_secs(self.gov_api.ttl_secs),
            ));
        }
        plan.extend(
            self.feeds
                .iter()
                .map(|feed| SourcePlan::new(&feed.key, Duration::from_secs(feed.ttl_secs))),
        );
        plan
    }
}

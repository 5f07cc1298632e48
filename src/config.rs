use anyhow::{bail, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure for repomirror
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    /// GitLab instance and group being mirrored
    #[serde(default)]
    pub source: SourceConfig,

    /// GitHub organization receiving the mirrors
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Webhook listener
    #[serde(default)]
    pub hooks: HooksConfig,

    /// Full synchronization behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Source side (GitLab) configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SourceConfig {
    /// Base URL of the GitLab instance, e.g. `https://gitlab.example.com`
    pub url: String,

    /// Group whose public projects are mirrored
    pub organization: String,

    /// Optional API token sent as `PRIVATE-TOKEN`
    #[serde(default)]
    pub token: Option<String>,

    /// Where the GitLab repositories live on local disk
    #[serde(default)]
    pub storage: StorageConfig,
}

/// On-disk repository storage of the GitLab instance
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub layout: StorageKind,

    #[serde(default = "default_storage_root")]
    pub root: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// `@hashed/ab/cd/<sha256>.git`
    #[default]
    Hashed,
    /// `<namespace>/<path>.git`
    Legacy,
}

/// Mirror side (GitHub) configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MirrorConfig {
    /// REST API endpoint, `None` for api.github.com
    #[serde(default)]
    pub api_url: Option<String>,

    /// Host used in push URLs
    #[serde(default = "default_push_host")]
    pub push_host: String,

    /// Target organization, defaults to the source organization
    #[serde(default)]
    pub organization: Option<String>,

    /// Token with `repo` and `delete_repo` scope. Falls back to `GITHUB_TOKEN`.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Webhook listener configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HooksConfig {
    /// Socket address to bind, e.g. `127.0.0.1:8090`
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Shared secret GitLab sends in `X-Gitlab-Token`
    #[serde(default)]
    pub secret: String,
}

/// Synchronization configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SyncConfig {
    /// Maximum parallel mirror operations during a full sync
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Timeout for a single mirror operation in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Periodic full sync interval ("30m", "6h", "1d", or "off")
    #[serde(default = "default_interval")]
    pub interval: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact", "pretty", "json"
}

// Default value functions
fn default_storage_root() -> String {
    "/var/opt/gitlab/git-data/repositories".to_string()
}
fn default_push_host() -> String {
    "github.com".to_string()
}
fn default_user_agent() -> String {
    format!("repomirror/{}", env!("CARGO_PKG_VERSION"))
}
fn default_listen() -> String {
    "127.0.0.1:8090".to_string()
}
fn default_max_parallel() -> usize {
    4
}
fn default_timeout() -> u64 {
    300
}
fn default_interval() -> String {
    "6h".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

// Default implementations
impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            organization: String::new(),
            token: None,
            storage: StorageConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            layout: StorageKind::default(),
            root: default_storage_root(),
        }
    }
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            push_host: default_push_host(),
            organization: None,
            token: None,
            user_agent: default_user_agent(),
        }
    }
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            secret: String::new(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            timeout: default_timeout(),
            interval: default_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Periodic full sync interval, `None` when disabled
    pub fn interval(&self) -> Result<Option<Duration>> {
        match self.interval.trim() {
            "" | "off" | "never" => Ok(None),
            other => match parse_duration(other)? {
                0 => bail!("sync.interval must be positive, use \"off\" to disable"),
                secs => Ok(Some(Duration::from_secs(secs))),
            },
        }
    }
}

/// Parse duration strings like "30m", "6h", "1d" into seconds
pub fn parse_duration(duration_str: &str) -> Result<u64> {
    let duration_str = duration_str.trim().to_lowercase();

    if let Some(value) = duration_str.strip_suffix('s') {
        value.parse::<u64>().context("Invalid seconds value")
    } else if let Some(value) = duration_str.strip_suffix('m') {
        value.parse::<u64>().map(|v| v * 60).context("Invalid minutes value")
    } else if let Some(value) = duration_str.strip_suffix('h') {
        value.parse::<u64>().map(|v| v * 3600).context("Invalid hours value")
    } else if let Some(value) = duration_str.strip_suffix('d') {
        value.parse::<u64>().map(|v| v * 86400).context("Invalid days value")
    } else {
        // Try to parse as raw seconds
        duration_str
            .parse::<u64>()
            .context("Invalid duration format. Use format like '30m', '6h', '1d'")
    }
}

impl Config {
    /// Load configuration from a specific file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        // Expand environment variables in paths and secrets
        config.expand_vars()?;

        Ok(config)
    }

    /// Load from `path`, or from the default location when `None`
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::load(&Self::default_config_path()?),
        }
    }

    /// Get the default configuration file path (XDG compliant)
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Failed to get user config directory")?;

        Ok(config_dir.join("repomirror").join("config.yml"))
    }

    /// Expand `${VAR}` and `~` references so tokens can live in the environment
    pub fn expand_vars(&mut self) -> Result<()> {
        self.source.storage.root = shellexpand::full(&self.source.storage.root)
            .context("Failed to expand source.storage.root")?
            .into_owned();

        self.source.token = expand_optional(self.source.token.take(), "source.token")?;
        self.mirror.token = expand_optional(self.mirror.token.take(), "mirror.token")?;

        self.hooks.secret = shellexpand::env(&self.hooks.secret)
            .context("Failed to expand hooks.secret")?
            .into_owned();

        Ok(())
    }

    /// Organization on the mirror side
    pub fn mirror_organization(&self) -> &str {
        self.mirror
            .organization
            .as_deref()
            .filter(|org| !org.is_empty())
            .unwrap_or(&self.source.organization)
    }

    /// Homepage prefix for mirror repositories, e.g. `https://gitlab.example.com`
    pub fn source_homepage(&self) -> &str {
        self.source.url.trim_end_matches('/')
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.hooks
            .listen
            .parse()
            .with_context(|| format!("Invalid hooks.listen address: {}", self.hooks.listen))
    }

    /// Reject configurations the daemon cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.source.url.starts_with("http://") || self.source.url.starts_with("https://")) {
            bail!("source.url must be an http(s) URL, got {:?}", self.source.url);
        }
        if self.source.organization.trim().is_empty() {
            bail!("source.organization must be set");
        }
        if let Some(api_url) = &self.mirror.api_url {
            if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
                bail!("mirror.api_url must be an http(s) URL, got {:?}", api_url);
            }
        }
        if self.mirror.push_host.trim().is_empty() {
            bail!("mirror.push_host must be set");
        }
        let has_token = self.mirror.token.as_deref().is_some_and(|t| !t.is_empty())
            || std::env::var("GITHUB_TOKEN").is_ok_and(|t| !t.is_empty());
        if !has_token {
            bail!("mirror.token must be set (or GITHUB_TOKEN exported)");
        }
        if self.hooks.secret.is_empty() {
            bail!("hooks.secret must be set");
        }
        self.listen_addr()?;
        if self.sync.max_parallel == 0 {
            bail!("sync.max_parallel must be at least 1");
        }
        if self.sync.timeout == 0 {
            bail!("sync.timeout must be at least 1 second");
        }
        self.sync.interval().context("Invalid sync.interval")?;

        Ok(())
    }
}

fn expand_optional(value: Option<String>, field: &str) -> Result<Option<String>> {
    value
        .map(|v| {
            shellexpand::env(&v)
                .map(|expanded| expanded.into_owned())
                .with_context(|| format!("Failed to expand {}", field))
        })
        .transpose()
}

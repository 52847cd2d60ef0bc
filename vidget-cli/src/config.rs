use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;
use vidget_engine::dns::parse_name_server;
use vidget_engine::{ProxyConfig, RetryPolicy, TransportConfig};

use crate::cli::Args;
use crate::error::{AppError, Result};

/// Transport settings as written in the config file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TransportSection {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    /// Overall per-request timeout, 0 disables it
    pub timeout_secs: u64,
    /// 0 disables TCP keep-alive
    pub keep_alive_secs: u64,
    pub dns: Option<String>,
    pub proxy: Option<String>,
    pub use_system_proxy: bool,
    pub user_agent: Option<String>,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            read_timeout_secs: 30,
            timeout_secs: 0,
            keep_alive_secs: 30,
            dns: None,
            proxy: None,
            use_system_proxy: true,
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySection {
    /// Retries after the first attempt
    pub retries: u32,
    pub delay_ms: u64,
    pub max_jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            retries: 3,
            delay_ms: 1000,
            max_jitter_ms: 1000,
        }
    }
}

/// Configuration file contents, with command-line overrides applied on top.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub transport: TransportSection,
    pub retry: RetrySection,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("vidget").join("config.toml"))
    }

    /// Load `explicit` (which must exist) or the default file when present.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            AppError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::parse(&content)
            .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Command-line flags win over file values.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(retries) = args.retries {
            self.retry.retries = retries;
        }
        if let Some(delay) = args.retry_delay {
            self.retry.delay_ms = delay;
        }
        if let Some(secs) = args.connect_timeout {
            self.transport.connect_timeout_secs = secs;
        }
        if let Some(secs) = args.read_timeout {
            self.transport.read_timeout_secs = secs;
        }
        if let Some(secs) = args.keep_alive {
            self.transport.keep_alive_secs = secs;
        }
        if let Some(dns) = &args.dns {
            self.transport.dns = Some(dns.clone());
        }
        if let Some(proxy) = &args.proxy {
            self.transport.proxy = Some(proxy.clone());
        }
    }

    pub fn transport_config(&self) -> Result<TransportConfig> {
        let section = &self.transport;
        let mut config = TransportConfig {
            connect_timeout: Duration::from_secs(section.connect_timeout_secs),
            read_timeout: Duration::from_secs(section.read_timeout_secs),
            timeout: Duration::from_secs(section.timeout_secs),
            keep_alive: (section.keep_alive_secs > 0)
                .then(|| Duration::from_secs(section.keep_alive_secs)),
            use_system_proxy: section.use_system_proxy,
            ..TransportConfig::default()
        };
        if let Some(user_agent) = &section.user_agent {
            config.user_agent = user_agent.clone();
        }
        if let Some(dns) = &section.dns {
            config = config.with_dns_server(parse_name_server(dns)?);
        }
        if let Some(proxy) = &section.proxy {
            config = config.with_proxy(ProxyConfig::from_url(proxy)?);
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_retries(self.retry.retries, Duration::from_millis(self.retry.delay_ms))
            .with_max_jitter(Duration::from_millis(self.retry.max_jitter_ms))
    }
}

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::client::{Coordinator, CoordinatorBuilder};
use crate::fetch::Fetcher;
use crate::protocol::{build_url, EMS_RESOURCE_PATH};
use crate::types::EcuId;
use crate::{Error, Result};

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

fn scan_interval_default() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn timeout_default() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn connect_timeout_default() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn verify_ssl_default() -> bool {
    true
}

/// Persisted settings of one Homevolt installation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub hosts: Vec<String>,
    pub main_host: Option<String>,
    /// Explicit `ems.json` URLs, parallel to `hosts`. Derived when empty.
    #[serde(default)]
    pub resources: Vec<String>,
    pub ecu_id: Option<EcuId>,
    #[serde(default)]
    pub entry_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "verify_ssl_default")]
    pub verify_ssl: bool,
    #[serde(default = "scan_interval_default")]
    pub scan_interval: u64,
    /// Read timeout in seconds.
    #[serde(default = "timeout_default")]
    pub timeout: u64,
    #[serde(default = "connect_timeout_default")]
    pub connect_timeout: u64,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading config");
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn main_host(&self) -> &str {
        self.main_host
            .as_deref()
            .or_else(|| self.hosts.first().map(String::as_str))
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.hosts.is_empty() {
            return Err(Error::Config("at least one host is required".to_string()));
        }
        let mut seen: Vec<&str> = Vec::new();
        for host in &self.hosts {
            validate_host(host, &seen)?;
            seen.push(host);
        }
        if !self.resources.is_empty() && self.resources.len() != self.hosts.len() {
            return Err(Error::Config(format!(
                "{} resources configured for {} hosts",
                self.resources.len(),
                self.hosts.len()
            )));
        }
        if let Some(main) = &self.main_host
            && !self.hosts.contains(main)
        {
            return Err(Error::Config(format!("main host {main} is not a configured host")));
        }
        if self.scan_interval == 0 {
            return Err(Error::Config("scan_interval must be positive".to_string()));
        }
        Ok(())
    }

    /// Coordinator builder preloaded with these settings; add callbacks and build.
    pub fn coordinator_builder(&self) -> CoordinatorBuilder {
        let mut builder = Coordinator::builder(self.entry_id.clone())
            .main_host(self.main_host())
            .scan_interval(Duration::from_secs(self.scan_interval));

        for (i, host) in self.hosts.iter().enumerate() {
            builder = match self.resources.get(i) {
                Some(url) => builder.resource(host.clone(), url.clone()),
                None => builder.host(host.clone()),
            };
        }
        if let Some(id) = &self.ecu_id {
            builder = builder.ecu_id(id.clone());
        }

        let username = self.username.clone();
        let password = self.password.clone();
        let verify_ssl = self.verify_ssl;
        let read_timeout = Duration::from_secs(self.timeout);
        let connect_timeout = Duration::from_secs(self.connect_timeout);
        builder.fetcher(move |mut f| {
            if let Some(u) = username {
                f = f.username(u);
            }
            if let Some(p) = password {
                f = f.password(p);
            }
            f.verify_ssl(verify_ssl)
                .read_timeout(read_timeout)
                .connect_timeout(connect_timeout)
        })
    }

    pub fn coordinator(&self) -> Result<Coordinator> {
        self.coordinator_builder().build()
    }
}

/// Non-empty and free of whitespace.
pub fn is_valid_host(host: &str) -> bool {
    !host.is_empty() && !host.contains(char::is_whitespace)
}

pub fn construct_resource_url(host: &str) -> String {
    build_url(host, EMS_RESOURCE_PATH)
}

/// Check a host typed by the user against the already configured ones and
/// return its `ems.json` URL.
pub fn validate_host(host: &str, existing: &[&str]) -> Result<String> {
    if !is_valid_host(host) {
        return Err(Error::InvalidHost(host.to_string()));
    }
    if existing.contains(&host) {
        return Err(Error::DuplicateHost(host.to_string()));
    }
    Ok(construct_resource_url(host))
}

/// Fetch a resource once the way setup does, to confirm it is a Homevolt.
///
/// 401 surfaces as [`Error::Unauthorized`], other failures as the fetch or
/// validation error.
pub async fn probe_host(fetcher: &Fetcher, resource_url: &str) -> Result<()> {
    fetcher.fetch_snapshot(resource_url).await?;
    Ok(())
}

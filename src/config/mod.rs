use anyhow::{bail, Context, Result};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable overriding `sources.playlist_url`
pub const PLAYLIST_URL_ENV: &str = "M3U_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub web: WebConfig,
    pub storage: StorageConfig,
    pub sources: SourcesConfig,
    pub ingestion: IngestionConfig,
    /// Extra display names per guide channel id, merged after the built-in table
    pub alias_fixups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
    /// `host[:port]` written into the guide DOCTYPE when a run is not
    /// triggered by an HTTP request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_host: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub cache_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub playlist_url: String,
    /// Guide feeds; their position decides the reconciliation order
    pub epg_urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub horizon_days: u64,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub filter_timeout_secs: u64,
    pub accept_invalid_certs: bool,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_cron: Option<String>,
    pub run_on_startup: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_host: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache"),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            playlist_url: "https://no-m3u-url-provided".to_string(),
            epg_urls: [
                "https://iptvx.one/epg/epg.xml.gz",
                "http://www.teleguide.info/download/new3/xmltv.xml.gz",
                "http://programtv.ru/xmltv.xml.gz",
                "http://epg.it999.ru/edem.xml.gz",
                "https://raw.githubusercontent.com/dp247/Freeview-EPG/master/epg.xml",
                "http://downloads.epg.today/free/FreeRu-Cis.xml.gz",
                "http://downloads.epg.today/free/wefree.xml.gz",
            ]
            .iter()
            .map(|u| u.to_string())
            .collect(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            horizon_days: 7,
            connect_timeout_secs: 5,
            request_timeout_secs: 300,
            filter_timeout_secs: 600,
            accept_invalid_certs: false,
            user_agent: format!("epg-merger/{}", env!("CARGO_PKG_VERSION")),
            update_cron: None,
            run_on_startup: false,
        }
    }
}

impl Config {
    /// Load the configuration from `path`, writing the defaults there first
    /// if the file does not exist yet.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, contents)
                .with_context(|| format!("Failed to write default config to {}", path.display()))?;
            Ok(default_config)
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(PLAYLIST_URL_ENV) {
            if !url.trim().is_empty() {
                self.sources.playlist_url = url.trim().to_string();
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.sources.playlist_url)
            .with_context(|| format!("Invalid playlist URL '{}'", self.sources.playlist_url))?;
        for epg_url in &self.sources.epg_urls {
            url::Url::parse(epg_url).with_context(|| format!("Invalid guide URL '{}'", epg_url))?;
        }
        if self.ingestion.update_cron.is_some() {
            self.update_schedule()?;
        }
        if self.ingestion.horizon_days == 0 {
            bail!("ingestion.horizon_days must be greater than zero");
        }
        if self.ingestion.filter_timeout_secs == 0 {
            bail!("ingestion.filter_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    /// Parsed `update_cron`, if one is configured
    pub fn update_schedule(&self) -> Result<Option<Schedule>> {
        match &self.ingestion.update_cron {
            Some(expression) => Ok(Some(Schedule::from_str(expression).with_context(|| {
                format!("Invalid cron expression '{}'", expression)
            })?)),
            None => Ok(None),
        }
    }

    /// Host written into the guide DOCTYPE when no request host is known
    pub fn public_host(&self) -> String {
        self.web
            .public_host
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.web.host, self.web.port))
    }
}

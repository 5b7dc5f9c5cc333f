use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub repo_source: RepoSource,
    #[serde(default)]
    pub repo_list: Option<PathBuf>,
    #[serde(default)]
    pub wiki_url: Option<String>,
    #[serde(default = "AppConfig::default_wiki_page")]
    pub wiki_page: String,
    pub output: PathBuf,
    pub template: PathBuf,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub endpoints: EndpointsConfig,
}

impl AppConfig {
    /// Loads `path`, then an optional `config/local` next to it, then
    /// `EASYFIX__*` environment variables.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = path.as_ref();
        let local = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("config/local");

        Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(File::with_name(local.to_string_lossy().as_ref()).required(false))
            .add_source(Environment::with_prefix("EASYFIX").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from_str(raw, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// Checks everything that must hold before the first network call.
    pub fn validate(&self) -> Result<()> {
        match self.repo_source {
            RepoSource::File if self.repo_list.is_none() => {
                return Err(AppError::invalid("repo_source = \"file\" requires repo_list"));
            }
            RepoSource::Wiki if self.wiki_url.is_none() => {
                return Err(AppError::invalid("repo_source = \"wiki\" requires wiki_url"));
            }
            _ => {}
        }

        if self.cache.backend == CacheBackendKind::Disk && self.cache.path.is_none() {
            return Err(AppError::invalid("disk cache backend requires cache.path"));
        }

        if self.http.max_attempts == 0 {
            return Err(AppError::invalid("http.max_attempts must be at least 1"));
        }

        if self.collector.max_concurrent_projects == 0 {
            return Err(AppError::invalid(
                "collector.max_concurrent_projects must be at least 1",
            ));
        }

        if !self.template.is_file() {
            return Err(AppError::invalid(format!(
                "template not found: {}",
                self.template.display()
            )));
        }

        Ok(())
    }

    fn default_wiki_page() -> String {
        "Easyfix".to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoSource {
    File,
    Wiki,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "GithubConfig::default_user_agent")]
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            username: None,
            api_key: None,
            user_agent: Self::default_user_agent(),
        }
    }
}

impl GithubConfig {
    fn default_user_agent() -> String {
        "fedora-gather-easyfix".to_string()
    }

    /// Both halves must be present for GitHub basic auth to be used.
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.username, &self.api_key) {
            (Some(user), Some(key)) => Some((user.clone(), key.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Disk,
    Null,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackendKind,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default = "CacheConfig::default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            ttl_secs: None,
            capacity: Self::default_capacity(),
            path: None,
        }
    }
}

impl CacheConfig {
    const fn default_capacity() -> usize {
        5000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "HttpConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "HttpConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "HttpConfig::default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "HttpConfig::default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "HttpConfig::default_jitter_frac")]
    pub jitter_frac: f32,
    #[serde(default = "HttpConfig::default_max_inflight")]
    pub max_inflight: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout_secs(),
            max_attempts: Self::default_max_attempts(),
            backoff_base_ms: Self::default_backoff_base_ms(),
            backoff_max_ms: Self::default_backoff_max_ms(),
            jitter_frac: Self::default_jitter_frac(),
            max_inflight: Self::default_max_inflight(),
        }
    }
}

impl HttpConfig {
    const fn default_timeout_secs() -> u64 {
        30
    }

    const fn default_max_attempts() -> u32 {
        3
    }

    const fn default_backoff_base_ms() -> u64 {
        500
    }

    const fn default_backoff_max_ms() -> u64 {
        30_000
    }

    const fn default_jitter_frac() -> f32 {
        0.2
    }

    const fn default_max_inflight() -> usize {
        8
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "CollectorConfig::default_max_concurrent_projects")]
    pub max_concurrent_projects: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_projects: Self::default_max_concurrent_projects(),
        }
    }
}

impl CollectorConfig {
    const fn default_max_concurrent_projects() -> usize {
        4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "EndpointsConfig::default_github_api")]
    pub github_api: String,
    #[serde(default = "EndpointsConfig::default_pagure")]
    pub pagure: String,
    #[serde(default = "EndpointsConfig::default_gitlab")]
    pub gitlab: String,
    #[serde(default = "EndpointsConfig::default_bugzilla")]
    pub bugzilla: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            github_api: Self::default_github_api(),
            pagure: Self::default_pagure(),
            gitlab: Self::default_gitlab(),
            bugzilla: Self::default_bugzilla(),
        }
    }
}

impl EndpointsConfig {
    fn default_github_api() -> String {
        "https://api.github.com/".to_string()
    }

    fn default_pagure() -> String {
        "https://pagure.io/".to_string()
    }

    fn default_gitlab() -> String {
        "https://gitlab.com/".to_string()
    }

    fn default_bugzilla() -> String {
        "https://bugzilla.redhat.com/".to_string()
    }
}

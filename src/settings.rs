use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use config::{Config, Environment, File, FileFormat};
use http::Uri;
use serde::{Deserialize, Serialize};

use crate::cache::VersionTag;
use crate::cli::{Cli, LogFormat};
use crate::worker::WorkerConfig;

const CONFIG_CANDIDATES: &[&str] = &["offcache.toml", "/etc/offcache/offcache.toml"];

/// Runtime configuration, loaded from a TOML file with `OFFCACHE__*`
/// environment overrides layered on top.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Origin the worker serves, e.g. `https://hub.example`.
    pub origin: String,

    /// Directory holding the on-disk caches.
    pub cache_dir: PathBuf,

    /// Deployment version. Changing it invalidates every existing cache on
    /// the next activation.
    pub version_tag: String,

    /// Path to the JSON asset manifest seeded into the static cache.
    pub manifest: PathBuf,

    /// Site-relative path of the page served when a navigation cannot be
    /// satisfied from network or cache.
    #[serde(default = "default_offline_path")]
    pub offline_path: String,

    #[serde(default = "default_max_dynamic_items")]
    pub max_dynamic_items: usize,

    #[serde(default = "default_max_image_items")]
    pub max_image_items: usize,

    /// Substrings that mark a cross-origin URL as an icon fetch worth
    /// caching, e.g. a favicon service host.
    #[serde(default = "default_icon_host_patterns")]
    pub icon_host_patterns: Vec<String>,

    /// Path extensions routed network-first instead of cache-first.
    #[serde(default = "default_data_extensions")]
    pub data_extensions: Vec<String>,

    /// Upstream fetch timeout in seconds. Zero disables the timeout.
    #[serde(default)]
    pub network_timeout: u64,

    #[serde(default = "default_log_format")]
    pub log: LogFormat,
}

fn default_offline_path() -> String {
    "/offline.html".to_string()
}

fn default_max_dynamic_items() -> usize {
    50
}

fn default_max_image_items() -> usize {
    100
}

fn default_icon_host_patterns() -> Vec<String> {
    vec!["favicons".to_string()]
}

fn default_data_extensions() -> Vec<String> {
    vec![".json".to_string()]
}

fn default_log_format() -> LogFormat {
    LogFormat::Json
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = resolve_config_path(cli.config.as_deref())?;

        let mut builder = Config::builder();
        if let Some(path) = &path {
            builder = builder.add_source(
                File::from(path.clone())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            Environment::with_prefix("OFFCACHE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("icon_host_patterns")
                .with_list_parse_key("data_extensions"),
        );

        let mut settings: Settings = builder
            .build()
            .context("failed to assemble configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        if let Some(path) = &path {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            settings.apply_base_dir(base);
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Resolves relative paths against the directory the config file lives
    /// in, so the daemon behaves the same regardless of cwd.
    fn apply_base_dir(&mut self, base: &Path) {
        if self.cache_dir.is_relative() {
            self.cache_dir = base.join(&self.cache_dir);
        }
        if self.manifest.is_relative() {
            self.manifest = base.join(&self.manifest);
        }
    }

    pub fn validate(&self) -> Result<()> {
        let origin: Uri = self
            .origin
            .parse()
            .with_context(|| format!("origin '{}' is not a valid uri", self.origin))?;
        ensure!(
            origin.scheme().is_some() && origin.authority().is_some(),
            "origin '{}' must include a scheme and host",
            self.origin
        );
        ensure!(!self.version_tag.is_empty(), "version_tag must not be empty");
        ensure!(
            !self.version_tag.contains(char::is_whitespace),
            "version_tag must not contain whitespace"
        );
        ensure!(
            self.max_dynamic_items > 0,
            "max_dynamic_items must be at least 1"
        );
        ensure!(
            self.max_image_items > 0,
            "max_image_items must be at least 1"
        );
        ensure!(
            self.offline_path.starts_with('/'),
            "offline_path '{}' must start with '/'",
            self.offline_path
        );
        for ext in &self.data_extensions {
            ensure!(
                ext.starts_with('.') && ext.len() > 1,
                "data extension '{ext}' must start with '.'"
            );
        }
        Ok(())
    }

    pub fn origin(&self) -> Result<Uri> {
        self.origin
            .parse()
            .with_context(|| format!("origin '{}' is not a valid uri", self.origin))
    }

    pub fn version_tag(&self) -> VersionTag {
        VersionTag::new(&self.version_tag)
    }

    pub fn network_timeout(&self) -> Option<Duration> {
        match self.network_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn worker_config(&self) -> Result<WorkerConfig> {
        Ok(WorkerConfig {
            origin: self.origin()?,
            offline_path: self.offline_path.clone(),
            max_dynamic_items: self.max_dynamic_items,
            max_image_items: self.max_image_items,
            icon_host_patterns: self.icon_host_patterns.clone(),
            data_extensions: self.data_extensions.clone(),
            network_timeout: self.network_timeout(),
        })
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if !path.exists() {
            bail!("config file {} does not exist", path.display());
        }
        return Ok(Some(path.to_path_buf()));
    }
    for candidate in CONFIG_CANDIDATES {
        let path = Path::new(candidate);
        if path.exists() {
            return Ok(Some(path.to_path_buf()));
        }
    }
    Ok(None)
}

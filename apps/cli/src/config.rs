use std::path::{Path, PathBuf};
use std::time::Duration;

use complaintkit_client::DEFAULT_BASE_URL;
use complaintkit_submit::SubmitConfig;
use complaintkit_transfer::ValidationPolicy;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides the configured API base URL.
pub const BASE_URL_ENV: &str = "COMPLAINTKIT_BASE_URL";

/// Persistent client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds. 0 disables it.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub strict_mime_types: bool,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_event_buffer() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            strict_mime_types: false,
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Load config from `path`, or from the platform default location.
    /// A missing file is created with defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(config_path);
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            tracing::debug!(path = %path.display(), "config loaded");
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(&path)?;
            Ok(config)
        }
    }

    /// Save config to `path`, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, &content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "config saved");
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
    }

    pub fn policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            strict_mime_types: self.strict_mime_types,
            ..ValidationPolicy::default()
        }
    }

    pub fn submit_config(&self) -> SubmitConfig {
        SubmitConfig {
            policy: self.policy(),
            event_buffer: self.event_buffer,
            ..SubmitConfig::default()
        }
    }

    /// Base URL to use: the command-line flag wins, then the environment,
    /// then the config file.
    pub fn resolve_base_url(&self, flag: Option<&str>, env: Option<&str>) -> String {
        flag.or(env.filter(|v| !v.trim().is_empty()))
            .unwrap_or(&self.base_url)
            .to_string()
    }
}

fn config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".config")
                .join("complaintkit")
                .join("client.toml");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("complaintkit")
                .join("client.toml");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata)
                .join("complaintkit")
                .join("client.toml");
        }
    }

    PathBuf::from("/tmp/complaintkit/client.toml")
}

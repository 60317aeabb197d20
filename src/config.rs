use crate::error::{ProxyError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "meta/llama-3.1-405b-instruct";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Names reported by `/api/v1/models`.
    #[serde(default = "default_models")]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upstream: UpstreamConfig::default(),
            models: default_models(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_base_url() -> String {
    "https://integrate.api.nvidia.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "NVIDIA_API_KEY".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_models() -> Vec<String> {
    vec![
        "meta/llama-3.1-405b-instruct".to_string(),
        "meta/llama-3.1-70b-instruct".to_string(),
        "meta/llama-3.1-8b-instruct".to_string(),
    ]
}

impl ProxyConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file, then apply environment overrides.
    /// Priority: explicit path > CWD > XDG config > home dir > built-in defaults.
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::load(path)?,
            None => match config_search_paths().into_iter().find(|p| p.exists()) {
                Some(candidate) => {
                    tracing::info!(path = %candidate.display(), "Loading config");
                    Self::load(&candidate)?
                }
                None => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay `NVIDIA_BASE_URL` and `PORT` from the given lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("NVIDIA_BASE_URL").filter(|u| !u.is_empty()) {
            self.upstream.base_url = url;
        }

        if let Some(port) = lookup("PORT") {
            self.port = port.trim().parse().map_err(|_| {
                ProxyError::config(format!("PORT must be a port number, got '{}'", port))
            })?;
        }

        Ok(())
    }

    /// Read the upstream credential from the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.upstream.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("ooba-nim-proxy.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("ooba-nim-proxy").join("config.toml"));
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("ooba-nim-proxy").join("config.toml"));
        paths.push(home.join(".ooba-nim-proxy.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

//! Fleet configuration: built-in defaults, an optional TOML file, then the
//! environment (`.env` files included).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::CONTAINER_PORT;

/// Default cap on concurrently deployed workloads.
pub const DEFAULT_MAX_CONCURRENT: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Hub credential used when a request carries none.
    pub hf_token: Option<String>,
    /// Default GPU class; auto-detected when unset.
    pub gpu_type: Option<String>,
    pub max_concurrent_models: u32,
    /// Directory holding `<class>.yaml` resource profiles.
    pub profiles_dir: PathBuf,
    /// Where optimized scratch profiles are written.
    pub scratch_dir: PathBuf,
    /// Base URL of the model hub used for validation.
    pub hub_url: String,
    /// Model server image.
    pub image: String,
    /// Host model cache mounted into every container.
    pub cache_dir: Option<PathBuf>,
    /// Host port used when a request names none, and for redeploys.
    pub default_port: u16,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            hf_token: None,
            gpu_type: None,
            max_concurrent_models: DEFAULT_MAX_CONCURRENT,
            profiles_dir: PathBuf::from("profiles"),
            scratch_dir: std::env::temp_dir(),
            hub_url: "https://huggingface.co".to_string(),
            image: "vllm/vllm-openai:latest".to_string(),
            cache_dir: dirs::home_dir().map(|h| h.join(".cache").join("huggingface")),
            default_port: CONTAINER_PORT,
        }
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load defaults (or `path`), then apply the process environment.
    ///
    /// `.env` in the working directory and `$HOME/.env` are loaded first;
    /// neither overrides variables already present in the process.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        load_env_files();
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("HF_TOKEN") {
            self.hf_token = Some(token);
        }
        if let Some(gpu) = non_empty("GPU_TYPE") {
            self.gpu_type = Some(gpu.trim().to_string());
        }
        if let Some(raw) = lookup("MAX_CONCURRENT_MODELS") {
            self.max_concurrent_models = parse_max_concurrent(&raw);
        }
        if let Some(dir) = non_empty("BLACKBOX_PROFILES_DIR") {
            self.profiles_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("BLACKBOX_SCRATCH_DIR") {
            self.scratch_dir = PathBuf::from(dir);
        }
        if let Some(url) = non_empty("HF_ENDPOINT") {
            self.hub_url = url.trim_end_matches('/').to_string();
        }
        if let Some(image) = non_empty("BLACKBOX_IMAGE") {
            self.image = image;
        }
        if let Some(home) = non_empty("HF_HOME") {
            self.cache_dir = Some(PathBuf::from(home));
        }
        if let Some(port) = non_empty("BLACKBOX_DEFAULT_PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) if p > 0 => self.default_port = p,
                _ => warn!(value = %port, "invalid BLACKBOX_DEFAULT_PORT, keeping {}", self.default_port),
            }
        }
        if self.max_concurrent_models == 0 {
            self.max_concurrent_models = DEFAULT_MAX_CONCURRENT;
        }
    }
}

/// Parse the concurrency cap; anything but a positive integer yields the default.
pub fn parse_max_concurrent(raw: &str) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => {
            debug!(value = %raw, "invalid MAX_CONCURRENT_MODELS, using default");
            DEFAULT_MAX_CONCURRENT
        }
    }
}

fn load_env_files() {
    if let Ok(path) = dotenvy::dotenv() {
        debug!(path = ?path, "loaded .env");
    }
    if let Some(home) = dirs::home_dir() {
        let home_env = home.join(".env");
        if home_env.is_file() && dotenvy::from_path(&home_env).is_ok() {
            debug!(path = ?home_env, "loaded home .env");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = FleetConfig::default();
        assert_eq!(config.max_concurrent_models, 3);
        assert_eq!(config.default_port, 8000);
        assert!(config.hf_token.is_none());
        assert_eq!(config.hub_url, "https://huggingface.co");
    }

    #[test]
    fn max_concurrent_falls_back() {
        assert_eq!(parse_max_concurrent("5"), 5);
        assert_eq!(parse_max_concurrent(" 2 "), 2);
        assert_eq!(parse_max_concurrent("0"), 3);
        assert_eq!(parse_max_concurrent("-4"), 3);
        assert_eq!(parse_max_concurrent("lots"), 3);
        assert_eq!(parse_max_concurrent(""), 3);
    }

    #[test]
    fn env_overrides_fields() {
        let mut config = FleetConfig::default();
        config.apply_env(lookup(&[
            ("HF_TOKEN", "hf_abc"),
            ("GPU_TYPE", "A100"),
            ("MAX_CONCURRENT_MODELS", "7"),
            ("BLACKBOX_PROFILES_DIR", "/etc/blackbox/profiles"),
            ("HF_ENDPOINT", "https://hub.internal/"),
        ]));
        assert_eq!(config.hf_token.as_deref(), Some("hf_abc"));
        assert_eq!(config.gpu_type.as_deref(), Some("A100"));
        assert_eq!(config.max_concurrent_models, 7);
        assert_eq!(config.profiles_dir, PathBuf::from("/etc/blackbox/profiles"));
        assert_eq!(config.hub_url, "https://hub.internal");
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut config = FleetConfig {
            hf_token: Some("from-file".to_string()),
            ..FleetConfig::default()
        };
        config.apply_env(lookup(&[("HF_TOKEN", "  "), ("MAX_CONCURRENT_MODELS", "abc")]));
        assert_eq!(config.hf_token.as_deref(), Some("from-file"));
        assert_eq!(config.max_concurrent_models, 3);
    }

    #[test]
    fn parse_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blackbox.toml");
        std::fs::write(
            &path,
            r#"
max_concurrent_models = 2
profiles_dir = "/srv/profiles"
gpu_type = "L40"
"#,
        )
        .unwrap();

        let config = FleetConfig::from_file(&path).unwrap();
        assert_eq!(config.max_concurrent_models, 2);
        assert_eq!(config.profiles_dir, PathBuf::from("/srv/profiles"));
        assert_eq!(config.gpu_type.as_deref(), Some("L40"));
        // Unspecified fields keep their defaults.
        assert_eq!(config.default_port, 8000);
    }

    #[test]
    fn zero_cap_in_file_is_corrected_by_apply_env() {
        let mut config = FleetConfig {
            max_concurrent_models: 0,
            ..FleetConfig::default()
        };
        config.apply_env(lookup(&[]));
        assert_eq!(config.max_concurrent_models, 3);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = FleetConfig::from_file(Path::new("/nonexistent/blackbox.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

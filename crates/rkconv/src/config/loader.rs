use std::path::{Path, PathBuf};

use crate::config::conversion::ConversionConfig;
use crate::config::schema::{ServiceConfig, CONFIG_VERSION};
use crate::error::ConfigError;

/// Serialization format of a config file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            _ => Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content, format)
}

pub fn load_config_from_str(
    content: &str,
    format: ConfigFormat,
) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_config(&config)?;

    Ok(config)
}

/// Loads the config at `path`, writing a default YAML config there first
/// when the file does not exist.
pub fn load_or_init_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    if path.exists() {
        return load_config(path);
    }

    let config = ServiceConfig::default();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let content = serde_yaml::to_string(&config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    log::info!("Wrote default config to {}", path.display());

    Ok(config)
}

/// `~/.config/rkconv/config.yaml` on Linux, the platform equivalent elsewhere.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rkconv")
        .join("config.yaml")
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.version != CONFIG_VERSION {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.max_workers == 0 {
        return Err(ConfigError::Validation {
            message: "max_workers must be at least 1".to_string(),
        });
    }

    if config.executor.program.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "executor.program must not be empty".to_string(),
        });
    }

    if config.executor.progress_prefix.is_empty() {
        return Err(ConfigError::InvalidProgressPrefix {
            prefix: String::new(),
            reason: "prefix must not be empty".to_string(),
        });
    }

    for ext in &config.allowed_extensions {
        if !ext.starts_with('.') {
            return Err(ConfigError::Validation {
                message: format!("allowed extension '{}' must start with '.'", ext),
            });
        }
    }

    ConversionConfig::default()
        .merge(&config.defaults)
        .map_err(|e| ConfigError::Validation {
            message: format!("defaults: {}", e),
        })?;

    Ok(())
}

#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for hops
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/hops/config.toml)
//! - Environment variables
//! - CLI flags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use hops_errors::{ConfigError, Error};
use hops_macho::BackendStrategy;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    #[serde(default)]
    pub macho: MachOConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
}

/// Path configuration
///
/// Unset paths fall back through the accessor methods below.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfig {
    pub prefix: Option<PathBuf>,
    pub cellar: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub logs: Option<PathBuf>,
}

/// Cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Log directories untouched this long are swept.
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
    /// Cache directories removed by name regardless of age.
    #[serde(default = "default_scratch_dirs")]
    pub scratch_dirs: Vec<String>,
}

/// Mach-O backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MachOConfig {
    #[serde(default)]
    pub backend: BackendStrategy,
    /// Developer mode: malformed binaries fail loudly instead of being
    /// skipped.
    #[serde(default)]
    pub strict: bool,
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorChoice {
    Always,
    #[default]
    Auto,
    Never,
}

impl ColorChoice {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Auto => "auto",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for ColorChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColorChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "auto" => Ok(Self::Auto),
            "never" => Ok(Self::Never),
            other => Err(format!(
                "unknown color choice '{other}' (expected always, auto or never)"
            )),
        }
    }
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            color: ColorChoice::Auto,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            log_retention_days: 14,
            scratch_dirs: default_scratch_dirs(),
        }
    }
}

// Default value functions for serde

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_log_retention_days() -> u32 {
    14
}

fn default_scratch_dirs() -> Vec<String> {
    vec!["java_cache".to_string(), "npm_cache".to_string()]
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::ReadFailed {
            path: "config directory".to_string(),
            message: "no system config directory".to_string(),
        })?;
        Ok(config_dir.join("hops").join("config.toml"))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ReadFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseFailed {
                path: path.display().to_string(),
                message: e.to_string(),
            })
            .map_err(Into::into)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// If path is provided, loads from that file.
    /// If path is None, uses the default loading behavior.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // HOPS_COLOR
        if let Ok(color) = std::env::var("HOPS_COLOR") {
            self.general.color = color.parse().map_err(|_| ConfigError::InvalidValue {
                field: "HOPS_COLOR".to_string(),
                value: color,
            })?;
        }

        // HOPS_MACHO_BACKEND
        if let Ok(backend) = std::env::var("HOPS_MACHO_BACKEND") {
            self.macho.backend = backend.parse().map_err(|_| ConfigError::InvalidValue {
                field: "HOPS_MACHO_BACKEND".to_string(),
                value: backend,
            })?;
        }

        // HOPS_DEVELOPER
        if let Ok(developer) = std::env::var("HOPS_DEVELOPER") {
            self.macho.strict = match developer.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "HOPS_DEVELOPER".to_string(),
                        value: developer,
                    }
                    .into())
                }
            };
        }

        // HOPS_PREFIX
        if let Ok(prefix) = std::env::var("HOPS_PREFIX") {
            self.paths.prefix = Some(PathBuf::from(prefix));
        }

        // HOPS_CACHE
        if let Ok(cache) = std::env::var("HOPS_CACHE") {
            self.paths.cache = Some(PathBuf::from(cache));
        }

        Ok(())
    }

    /// Get the installation prefix (with default)
    #[must_use]
    pub fn prefix(&self) -> PathBuf {
        self.paths
            .prefix
            .clone()
            .unwrap_or_else(|| PathBuf::from("/opt/hops"))
    }

    /// Get the cellar path (with default under the prefix)
    #[must_use]
    pub fn cellar_path(&self) -> PathBuf {
        self.paths
            .cellar
            .clone()
            .unwrap_or_else(|| self.prefix().join("Cellar"))
    }

    /// Get the download cache path (with default)
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.paths.cache.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map_or_else(|| self.prefix().join("cache"), |d| d.join("hops"))
        })
    }

    /// Get the build log path (with default)
    #[must_use]
    pub fn logs_path(&self) -> PathBuf {
        self.paths.logs.clone().unwrap_or_else(|| {
            dirs::home_dir().map_or_else(
                || self.prefix().join("logs"),
                |d| d.join("Library").join("Logs").join("hops"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.general.color, ColorChoice::Auto);
        assert_eq!(config.cleanup.log_retention_days, 14);
        assert_eq!(config.cleanup.scratch_dirs, vec!["java_cache", "npm_cache"]);
        assert_eq!(config.macho.backend, BackendStrategy::Native);
        assert!(!config.macho.strict);
        assert_eq!(config.prefix(), PathBuf::from("/opt/hops"));
        assert_eq!(config.cellar_path(), PathBuf::from("/opt/hops/Cellar"));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [paths]
            prefix = "/usr/local"

            [macho]
            backend = "verified"
            "#,
        )
        .unwrap();

        assert_eq!(config.prefix(), PathBuf::from("/usr/local"));
        assert_eq!(config.cellar_path(), PathBuf::from("/usr/local/Cellar"));
        assert_eq!(config.macho.backend, BackendStrategy::Verified);
        assert_eq!(config.cleanup.log_retention_days, 14);
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        assert!(toml::from_str::<Config>("[macho]\nbackend = \"wat\"\n").is_err());
        assert!(toml::from_str::<Config>("general =42\n").is_err());
    }

    #[tokio::test]
    async fn load_from_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let written = Config {
            paths: PathConfig {
                prefix: Some(PathBuf::from("/opt/test")),
                ..PathConfig::default()
            },
            ..Config::default()
        };
        std::fs::write(&path, toml::to_string(&written).unwrap()).unwrap();

        let loaded = Config::load_from_file(&path).await.unwrap();
        assert_eq!(loaded.prefix(), PathBuf::from("/opt/test"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let err = Config::load_from_file(Path::new("/nonexistent/config.toml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }

    #[test]
    fn color_choice_parses() {
        assert_eq!("always".parse::<ColorChoice>().unwrap(), ColorChoice::Always);
        assert_eq!("auto".parse::<ColorChoice>().unwrap(), ColorChoice::Auto);
        assert_eq!("never".parse::<ColorChoice>().unwrap(), ColorChoice::Never);
        assert!("sometimes".parse::<ColorChoice>().is_err());
    }
}

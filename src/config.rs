use crate::core::policy::{PolicyConfig, PolicyError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Invalid similarity_policy: {0}")]
    Policy(#[from] PolicyError),

    #[error("Could not find home directory")]
    NoHomeDirectory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub supported_formats: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub recursive: bool,
    pub max_workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            supported_formats: ["jpg", "jpeg", "png", "heic", "webp", "tif", "tiff"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            exclude_patterns: Vec::new(),
            recursive: false,
            max_workers: num_cpus::get(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scan: ScanConfig,
    /// Left unset, similar grouping refuses to run rather than pick a policy.
    pub similarity_policy: Option<PolicyConfig>,
    pub database_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Load from `path`. With no explicit path, the default location is
    /// tried and a missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Ok(path) => (path, false),
                Err(_) => return Ok(Self::default()),
            },
        };

        if !explicit && !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan.max_workers == 0 {
            return Err(ConfigError::Invalid("scan.max_workers must be at least 1".to_string()));
        }
        if self.scan.supported_formats.is_empty() {
            return Err(ConfigError::Invalid(
                "scan.supported_formats must not be empty".to_string(),
            ));
        }
        for pattern in &self.scan.exclude_patterns {
            glob::Pattern::new(pattern)
                .map_err(|e| ConfigError::Invalid(format!("exclude pattern {pattern:?}: {e}")))?;
        }
        if let Some(policy) = &self.similarity_policy {
            policy.validate()?;
        }
        Ok(())
    }

    fn app_dir() -> Result<PathBuf, ConfigError> {
        let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(home_dir.join("Documents").join("Pruner"))
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::app_dir()?.join("config.json"))
    }

    /// Configured database file, or `~/Documents/Pruner/pruner.db`.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::app_dir()?.join("pruner.db")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.scan.recursive);
        assert!(config.scan.max_workers >= 1);
        assert!(config.scan.supported_formats.contains(&"heic".to_string()));
        assert!(config.similarity_policy.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "scan": { "recursive": true, "exclude_patterns": ["**/.thumbnails/*"] },
                "similarity_policy": { "policy": "perceptual", "threshold": 6 },
                "database_path": "/tmp/pruner-test.db"
            }"#,
        )
        .unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert!(config.scan.recursive);
        assert_eq!(config.scan.supported_formats, ScanConfig::default().supported_formats);
        assert_eq!(
            config.similarity_policy,
            Some(PolicyConfig::Perceptual { threshold: 6 })
        );
        assert_eq!(
            config.database_path().unwrap(),
            PathBuf::from("/tmp/pruner-test.db")
        );
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = EngineConfig::load(Some(&temp_dir.path().join("missing.json")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            EngineConfig::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{ "scan": { "max_workers": 0 } }"#).unwrap();
        assert!(matches!(
            EngineConfig::load(Some(&path)),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_bad_exclude_pattern_rejected() {
        let mut config = EngineConfig::default();
        config.scan.exclude_patterns = vec!["[".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_negative_heuristic_window_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "similarity_policy": { "policy": "heuristic", "time_window_secs": -5 } }"#,
        )
        .unwrap();
        assert!(matches!(
            EngineConfig::load(Some(&path)),
            Err(ConfigError::Policy(_))
        ));
    }
}

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::extraction::{ConfidenceThresholds, PromptVersion};

/// Application-level constants
pub const APP_NAME: &str = "Acquaplan Tagger";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const MANIFEST_FILENAME: &str = "acquaplan_manifest.jsonl";
/// Completion cache for local sources (archive and contributors).
pub const LOCAL_CACHE_FILENAME: &str = "processed_files.json";
pub const DRIVE_CACHE_FILENAME: &str = "drive_processed_files.json";

pub const CONFIG_FILENAME: &str = "acquaplan.toml";

pub const ENV_OLLAMA_URL: &str = "ACQUAPLAN_OLLAMA_URL";
pub const ENV_VISION_MODEL: &str = "ACQUAPLAN_VISION_MODEL";
pub const ENV_DRIVE_TOKEN: &str = "ACQUAPLAN_DRIVE_TOKEN";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "acquaplan_lib=info,acquaplan=info,warn"
}

/// Filter for `--verbose`.
pub fn verbose_log_filter() -> &'static str {
    "acquaplan_lib=debug,acquaplan=debug,info"
}

/// ~/.config/acquaplan/ (platform config dir). None if it cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("acquaplan"))
}

pub fn default_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILENAME))
}

/// Manifest in the home directory, falling back to the working directory.
pub fn default_manifest_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(MANIFEST_FILENAME)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid settings: {0}")]
    Invalid(String),
}

// ──────────────────────────────────────────────
// Settings
// ──────────────────────────────────────────────

/// Runtime settings. Every field has a default, so an empty or missing
/// file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ollama_url: String,
    pub vision_model: String,
    pub timeout_secs: u64,
    /// Pull the vision model when it is not installed.
    pub auto_pull: bool,
    pub prompt_version: PromptVersion,
    pub min_keywords: usize,
    pub max_keywords: usize,
    pub manifest_path: Option<PathBuf>,
    pub exiftool_path: PathBuf,
    pub drive_page_size: u32,
    /// OAuth bearer token for Drive. Normally supplied via the environment.
    pub drive_token: Option<String>,
    pub thresholds: ConfidenceThresholds,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            vision_model: "llama3.2-vision:11b".to_string(),
            timeout_secs: 300,
            auto_pull: false,
            prompt_version: PromptVersion::default(),
            min_keywords: 30,
            max_keywords: 80,
            manifest_path: None,
            exiftool_path: PathBuf::from("exiftool"),
            drive_page_size: 50,
            drive_token: None,
            thresholds: ConfidenceThresholds::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`.
    /// An explicit path must exist; a missing default file yields defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(p) if !p.exists() => return Err(ConfigError::NotFound(p.to_path_buf())),
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => {
                    tracing::debug!("No config file, using defaults");
                    Self::default()
                }
            },
        };
        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Config loaded");
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply `ACQUAPLAN_*` overrides. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_OLLAMA_URL) {
            self.ollama_url = url;
        }
        if let Some(model) = get(ENV_VISION_MODEL) {
            self.vision_model = model;
        }
        if let Some(token) = get(ENV_DRIVE_TOKEN) {
            self.drive_token = Some(token);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vision_model.trim().is_empty() {
            return Err(ConfigError::Invalid("vision_model is empty".into()));
        }
        if self.min_keywords > self.max_keywords {
            return Err(ConfigError::Invalid(format!(
                "min_keywords ({}) is greater than max_keywords ({})",
                self.min_keywords, self.max_keywords
            )));
        }
        let t = &self.thresholds;
        for (name, value) in [
            ("habitat", t.habitat),
            ("species", t.species),
            ("archaeology", t.archaeology),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "threshold {name} must be within 0.0..=1.0, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.manifest_path
            .clone()
            .unwrap_or_else(default_manifest_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_tagger_conventions() {
        let s = Settings::default();
        assert_eq!(s.ollama_url, "http://localhost:11434");
        assert_eq!(s.prompt_version, PromptVersion::V13);
        assert_eq!((s.min_keywords, s.max_keywords), (30, 80));
        assert_eq!(s.drive_page_size, 50);
        assert_eq!(s.thresholds, ConfidenceThresholds::default());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = Settings::from_toml(
            r#"
            vision_model = "llava:13b"
            prompt_version = "legacy"
            manifest_path = "/dados/manifest.jsonl"

            [thresholds]
            archaeology = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(s.vision_model, "llava:13b");
        assert_eq!(s.prompt_version, PromptVersion::Legacy);
        assert_eq!(s.manifest_path(), PathBuf::from("/dados/manifest.jsonl"));
        assert_eq!(s.thresholds.archaeology, 0.8);
        assert_eq!(s.thresholds.habitat, 0.6);
        assert_eq!(s.timeout_secs, 300);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            (ENV_OLLAMA_URL, "http://gpu-box:11434"),
            (ENV_VISION_MODEL, ""),
            (ENV_DRIVE_TOKEN, "ya29.token"),
        ]
        .into_iter()
        .collect();
        let mut s = Settings::default();
        s.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(s.ollama_url, "http://gpu-box:11434");
        assert_eq!(s.vision_model, "llama3.2-vision:11b");
        assert_eq!(s.drive_token.as_deref(), Some("ya29.token"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let s = Settings {
            min_keywords: 90,
            ..Settings::default()
        };
        assert!(matches!(s.validate(), Err(ConfigError::Invalid(_))));

        let mut s = Settings::default();
        s.thresholds.species = 1.5;
        assert!(matches!(s.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_reports_missing_and_broken_files() {
        assert!(matches!(
            Settings::load(Some(Path::new("/no/acquaplan.toml"))),
            Err(ConfigError::NotFound(_))
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "timeout_secs = \"soon\"").unwrap();
        assert!(matches!(
            Settings::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn default_manifest_lives_in_home() {
        assert!(default_manifest_path().ends_with(MANIFEST_FILENAME));
    }
}

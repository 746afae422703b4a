/// Configuration module for symdex.
///
/// Controls which files the walker selects and how route files are found.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::Glob;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::indexer::languages::Language;

/// File looked up when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "symdex.json";

// ── Default value functions ──────────────────────────────────────────

fn default_true() -> bool {
    true
}

fn default_languages() -> Vec<Language> {
    Language::all().to_vec()
}

fn default_max_file_bytes() -> u64 {
    2 * 1024 * 1024
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Index test files (`*_test.go`, `*Test.php`, `test_*.py`, ...).
    #[serde(default)]
    pub include_tests: bool,

    #[serde(default = "default_true")]
    pub respect_gitignore: bool,

    #[serde(default = "default_languages")]
    pub languages: Vec<Language>,

    /// Glob patterns, matched against paths relative to the walked root.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Directory names skipped on top of the built-in lists.
    #[serde(default)]
    pub extra_skip_dirs: Vec<String>,

    /// Route files to parse. When empty and `discover_routes` is on,
    /// `routes/{web,api,console,channels}.php` under each root are used.
    #[serde(default)]
    pub route_files: Vec<PathBuf>,

    #[serde(default = "default_true")]
    pub discover_routes: bool,

    #[serde(default)]
    pub go: GoConfig,

    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GoConfig {
    /// Keep only exported (capitalised) declarations.
    #[serde(default)]
    pub exported_only: bool,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            include_tests: false,
            respect_gitignore: default_true(),
            languages: default_languages(),
            exclude: Vec::new(),
            extra_skip_dirs: Vec::new(),
            route_files: Vec::new(),
            discover_routes: default_true(),
            go: GoConfig::default(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_FILE`].
    /// A missing file yields the defaults; so does a file that is not valid
    /// JSON, with a warning.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_FILE
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let mut cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");

        if cfg.languages.is_empty() {
            cfg.languages = default_languages();
        }
        cfg.languages.dedup();

        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_file_bytes > 0, "max_file_bytes must be positive");
        anyhow::ensure!(
            !self.languages.is_empty(),
            "at least one language must be enabled"
        );
        for pattern in &self.exclude {
            Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {pattern}"))?;
        }
        anyhow::ensure!(
            self.extra_skip_dirs.iter().all(|d| !d.contains(['/', '\\'])),
            "extra_skip_dirs takes directory names, not paths"
        );
        Ok(())
    }

    #[must_use]
    pub fn is_enabled(&self, language: Language) -> bool {
        self.languages.contains(&language)
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.include_tests);
        assert!(config.respect_gitignore);
        assert!(config.discover_routes);
        assert!(!config.go.exported_only);
        assert_eq!(config.max_file_bytes, 2 * 1024 * 1024);
        assert_eq!(config.languages.len(), 4);
        assert!(config.is_enabled(Language::Markdown));
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"include_tests": true, "languages": ["go", "php"], "go": {"exported_only": true}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.include_tests);
        assert_eq!(config.languages, vec![Language::Go, Language::Php]);
        assert!(config.go.exported_only);
        // Other fields should have defaults
        assert!(config.respect_gitignore);
        assert_eq!(config.max_file_bytes, 2 * 1024 * 1024);
        assert!(!config.is_enabled(Language::Python));
    }

    #[test]
    fn test_validate_ok() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_bad_glob() {
        let mut config = Config::default();
        config.exclude = vec!["src/[".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_empty_languages() {
        let mut config = Config::default();
        config.languages = vec![];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_skip_dir_paths() {
        let mut config = Config::default();
        config.extra_skip_dirs = vec!["gen/proto".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        let config = Config::load(missing.to_str().unwrap()).unwrap();
        assert!(config.discover_routes);

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let config = Config::load(broken.to_str().unwrap()).unwrap();
        assert_eq!(config.languages.len(), 4);
    }

    #[test]
    fn test_serialization_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symdex.json");
        let mut config = Config::default();
        config.exclude = vec!["**/generated/**".to_string()];
        config.route_files = vec![PathBuf::from("routes/web.php")];
        config.save(path.to_str().unwrap()).unwrap();

        let parsed = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(parsed.exclude, config.exclude);
        assert_eq!(parsed.route_files, config.route_files);
        assert_eq!(parsed.languages, config.languages);
    }
}

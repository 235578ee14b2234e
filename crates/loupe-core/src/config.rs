//! Configuration
//!
//! All engine options with their defaults, loadable from `loupe.toml`.
//! The loaded record is immutable; invalid patterns and unknown
//! languages are rejected synchronously at load time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Workspace-relative directory holding the index artifacts
pub const DATA_DIR: &str = ".code-intel";

/// Database file name inside [`DATA_DIR`]
pub const DB_FILE: &str = "index.db";

/// Merkle/mtime cache file name inside [`DATA_DIR`]
pub const CACHE_FILE: &str = "cache.json";

/// Configuration error
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// A glob pattern failed to compile
    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
    /// A language id has no registered adapter
    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
    /// The configured embedding model has no implementation
    #[error("Unknown embedding model: {0}")]
    UnknownEmbeddingModel(String),
    /// A remote embedder was configured without credentials
    #[error("Missing API key: set {0} to use the remote embedder")]
    MissingApiKey(&'static str),
}

/// Default query option overrides carried in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct QueryDefaults {
    pub max_tokens: usize,
    pub graph_depth: usize,
    pub max_fan_out: usize,
    pub confidence_threshold: f32,
    pub rerank: String,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            graph_depth: 2,
            max_fan_out: 10,
            confidence_threshold: 0.5,
            rerank: "none".to_string(),
        }
    }
}

/// Engine configuration, with defaults for every field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct IndexConfig {
    /// Where `index.db` lives
    pub db_path: PathBuf,
    /// Merkle/mtime cache location
    pub cache_path: PathBuf,
    /// Embedding model identifier; changing it wipes all vectors
    pub embedding_model: String,
    /// Uniform vector dimension for the index
    pub embedding_dimensions: usize,
    /// Enabled language adapters
    pub languages: Vec<String>,
    /// File selection globs
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Include vendor code; external symbol content is elided
    pub index_external_deps: bool,
    /// Defaults for retrieval
    pub default_query_options: QueryDefaults,
    /// Refresh the index opportunistically on query
    pub auto_refresh: bool,
    /// Minimum interval between auto-refresh scans
    pub auto_refresh_cooldown_ms: u64,
    /// Skip auto-refresh when the workspace exceeds this many files
    pub auto_refresh_max_files: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DATA_DIR).join(DB_FILE),
            cache_path: PathBuf::from(DATA_DIR).join(CACHE_FILE),
            embedding_model: "hash-v1".to_string(),
            embedding_dimensions: 256,
            languages: vec![
                "typescript".to_string(),
                "javascript".to_string(),
                "python".to_string(),
            ],
            include_patterns: vec![
                "**/*.ts".to_string(),
                "**/*.tsx".to_string(),
                "**/*.js".to_string(),
                "**/*.jsx".to_string(),
                "**/*.mjs".to_string(),
                "**/*.py".to_string(),
            ],
            exclude_patterns: vec![
                "**/node_modules/**".to_string(),
                "**/dist/**".to_string(),
                "**/build/**".to_string(),
                "**/.git/**".to_string(),
                "**/vendor/**".to_string(),
                "**/__pycache__/**".to_string(),
                "**/.code-intel/**".to_string(),
            ],
            index_external_deps: false,
            default_query_options: QueryDefaults::default(),
            auto_refresh: false,
            auto_refresh_cooldown_ms: 30_000,
            auto_refresh_max_files: 20_000,
        }
    }
}

impl IndexConfig {
    /// Load from a TOML file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate patterns and languages; called on load and before first use
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            globset::Glob::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })?;
        }
        for language in &self.languages {
            if !matches!(
                language.as_str(),
                "typescript" | "javascript" | "python"
            ) {
                return Err(ConfigError::UnknownLanguage(language.clone()));
            }
        }
        Ok(())
    }

    /// Anchor relative artifact paths under the given workspace root
    pub fn rooted_at(mut self, root: &Path) -> Self {
        if self.db_path.is_relative() {
            self.db_path = root.join(&self.db_path);
        }
        if self.cache_path.is_relative() {
            self.cache_path = root.join(&self.cache_path);
        }
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = IndexConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_query_options.max_tokens, 8000);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let config = IndexConfig {
            include_patterns: vec!["src/[".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_unknown_language_rejected() {
        let config = IndexConfig {
            languages: vec!["cobol".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownLanguage(_))
        ));
    }

    #[test]
    fn test_load_missing_file_yields_defaults() {
        let config = IndexConfig::load(Path::new("/nonexistent/loupe.toml")).unwrap();
        assert_eq!(config.embedding_dimensions, 256);
    }

    #[test]
    fn test_load_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loupe.toml");
        std::fs::write(&path, "embedding_model = \"custom\"\nauto_refresh = true\n").unwrap();

        let config = IndexConfig::load(&path).unwrap();
        assert_eq!(config.embedding_model, "custom");
        assert!(config.auto_refresh);
        // Unspecified fields keep their defaults
        assert_eq!(config.auto_refresh_cooldown_ms, 30_000);
    }

    #[test]
    fn test_rooted_at_anchors_relative_paths() {
        let config = IndexConfig::default().rooted_at(Path::new("/work/repo"));
        assert!(config.db_path.starts_with("/work/repo"));
        assert!(config.cache_path.starts_with("/work/repo"));
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::VigilError;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct VigilConfig {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub memory: MemoryConfig,
    pub constraints: ConstraintConfig,
    pub detection: DetectionConfig,
    pub recovery: RecoveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub log_level: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `local` (ONNX), `openai`, or `hashing`.
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Output dimension for `openai` and `hashing`. `local` is fixed at 384.
    pub dimensions: usize,
    pub max_input_chars: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    /// `sqlite` or `qdrant`.
    pub backend: String,
    /// SQLite database path, or `:memory:`.
    pub db_path: String,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub collection_prefix: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub duplicate_threshold: f64,
    pub type_fetch_limit: usize,
    pub default_search_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ConstraintConfig {
    pub violation_similarity: f64,
}

/// Upper bound for `detection.cooldown_minutes` (one week).
pub const MAX_COOLDOWN_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DetectionConfig {
    pub similarity_threshold: f64,
    pub blocker_min_repetitions: usize,
    pub idle_threshold_minutes: f64,
    pub error_min_repetitions: usize,
    pub error_query: String,
    pub error_search_limit: usize,
    pub cooldown_minutes: i64,
    pub ignored_dirs: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RecoveryConfig {
    pub default_max_suggestions: usize,
    pub relevance_weight: f64,
    pub recency_weight: f64,
    pub success_weight: f64,
    pub default_success_rate: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            log_level: "info".into(),
            host: "127.0.0.1".into(),
            port: 7331,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_vigil_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            api_key: None,
            base_url: None,
            dimensions: 384,
            max_input_chars: 8000,
            timeout_secs: 30,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: "sqlite".into(),
            db_path: ":memory:".into(),
            url: None,
            api_key: None,
            collection_prefix: "vigil".into(),
            timeout_secs: 30,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            duplicate_threshold: 0.85,
            type_fetch_limit: 100,
            default_search_limit: 5,
        }
    }
}

impl Default for ConstraintConfig {
    fn default() -> Self {
        Self {
            violation_similarity: 0.5,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            blocker_min_repetitions: 3,
            idle_threshold_minutes: 20.0,
            error_min_repetitions: 5,
            error_query: "error failed exception bug".into(),
            error_search_limit: 20,
            cooldown_minutes: 10,
            ignored_dirs: [
                "node_modules",
                ".git",
                "dist",
                "build",
                ".next",
                "coverage",
                "target",
                ".vigil",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            default_max_suggestions: 5,
            relevance_weight: 0.5,
            recency_weight: 0.3,
            success_weight: 0.2,
            default_success_rate: 0.5,
        }
    }
}

/// Returns `~/.vigil/`, or `./.vigil` when no home directory is available.
pub fn default_vigil_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vigil")
}

/// Returns the default config file path: `~/.vigil/config.toml`
pub fn default_config_path() -> PathBuf {
    default_vigil_dir().join("config.toml")
}

impl VigilConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            VigilConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VIGIL_LOG_LEVEL") {
            self.server.log_level = val;
        }
        if let Ok(val) = std::env::var("VIGIL_TRANSPORT") {
            self.server.transport = val;
        }
        if let Ok(val) = std::env::var("VIGIL_EMBEDDING_PROVIDER") {
            self.embedding.provider = val;
        }
        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.embedding.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("VIGIL_INDEX_BACKEND") {
            self.index.backend = val;
        }
        if let Ok(val) = std::env::var("VIGIL_INDEX_DB") {
            self.index.db_path = val;
        }
        if let Ok(val) = std::env::var("QDRANT_URL") {
            self.index.url = Some(val);
        }
        if let Ok(val) = std::env::var("QDRANT_API_KEY") {
            self.index.api_key = Some(val);
        }
    }

    /// Check that required credentials and endpoints are present and thresholds are sane.
    pub fn validate(&self) -> Result<(), VigilError> {
        match self.embedding.provider.as_str() {
            "openai" => {
                if self.embedding.api_key.as_deref().map_or(true, str::is_empty) {
                    return Err(VigilError::config(
                        "embedding.provider = \"openai\" requires an API key (embedding.api_key or OPENAI_API_KEY)",
                    ));
                }
            }
            "local" | "hashing" => {}
            other => {
                return Err(VigilError::config(format!(
                    "unknown embedding provider: {other}. Supported: local, openai, hashing"
                )))
            }
        }
        if self.embedding.dimensions == 0 {
            return Err(VigilError::config("embedding.dimensions must be > 0"));
        }
        if self.embedding.max_input_chars == 0 {
            return Err(VigilError::config("embedding.max_input_chars must be > 0"));
        }

        match self.index.backend.as_str() {
            "qdrant" => {
                if self.index.url.as_deref().map_or(true, str::is_empty) {
                    return Err(VigilError::config(
                        "index.backend = \"qdrant\" requires index.url (or QDRANT_URL)",
                    ));
                }
            }
            "sqlite" => {}
            other => {
                return Err(VigilError::config(format!(
                    "unknown index backend: {other}. Supported: sqlite, qdrant"
                )))
            }
        }

        for (name, value) in [
            ("memory.duplicate_threshold", self.memory.duplicate_threshold),
            ("constraints.violation_similarity", self.constraints.violation_similarity),
            ("detection.similarity_threshold", self.detection.similarity_threshold),
            ("recovery.default_success_rate", self.recovery.default_success_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(VigilError::config(format!(
                    "{name} must be between 0.0 and 1.0, got {value}"
                )));
            }
        }

        let detection = &self.detection;
        let idle = detection.idle_threshold_minutes;
        if !idle.is_finite() || idle < 0.0 {
            return Err(VigilError::config(format!(
                "detection.idle_threshold_minutes must be a non-negative number, got {idle}"
            )));
        }
        if !(0..=MAX_COOLDOWN_MINUTES).contains(&detection.cooldown_minutes) {
            return Err(VigilError::config(format!(
                "detection.cooldown_minutes must be between 0 and {MAX_COOLDOWN_MINUTES}, got {}",
                detection.cooldown_minutes
            )));
        }
        for (name, value) in [
            ("detection.blocker_min_repetitions", detection.blocker_min_repetitions),
            ("detection.error_min_repetitions", detection.error_min_repetitions),
            ("detection.error_search_limit", detection.error_search_limit),
        ] {
            if value == 0 {
                return Err(VigilError::config(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }

    /// Resolve the SQLite index path, expanding `~` if needed. `None` means in-memory.
    pub fn resolved_index_path(&self) -> Option<PathBuf> {
        if self.index.db_path == ":memory:" {
            None
        } else {
            Some(expand_tilde(&self.index.db_path))
        }
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

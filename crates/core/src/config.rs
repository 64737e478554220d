//! Configuration management for Groundwork.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - Config file (`.groundwork/config.yaml` in the workspace, or `GROUNDWORK_CONFIG`)
//! - Environment variables
//! - Command-line flags (`with_overrides`)
//!
//! Feature switches for the retrieval engine live in [`RetrievalConfig`] and are
//! handed to each component's constructor; nothing reads them from ambient state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Embedding providers the knowledge crate knows how to build.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["ollama", "trigram"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .groundwork/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// SQLite database path; defaults to `.groundwork/index.sqlite`
    pub database: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    pub json_logs: bool,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Language-model gateway settings
    pub llm: LlmSettings,

    /// Embedding gateway settings
    pub embedding: EmbeddingSettings,

    /// Retrieval engine feature settings
    pub retrieval: RetrievalConfig,
}

/// Language-model gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Provider name ("ollama" or "mock")
    pub provider: String,

    /// Base URL of the inference service
    pub endpoint: String,

    /// Model used for query expansion
    pub chat_model: String,

    /// Model used for reranking; falls back to `chat_model`
    pub rerank_model: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            rerank_model: None,
            timeout_secs: 120,
        }
    }
}

impl LlmSettings {
    /// Model used by the reranker.
    pub fn rerank_model(&self) -> &str {
        self.rerank_model.as_deref().unwrap_or(&self.chat_model)
    }
}

/// Embedding gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Provider name: "ollama" or "trigram"
    pub provider: String,

    /// Base URL of the embedding service
    pub endpoint: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Expected vector length
    pub dimensions: usize,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            timeout_secs: 60,
        }
    }
}

/// Retrieval engine feature settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Run the LLM reranker after diversity selection
    pub rerank_enabled: bool,

    /// Maximum candidates sent to the reranker in one prompt
    pub rerank_pool_size: usize,

    /// Default MMR trade-off; 1.0 is pure relevance, 0.0 pure diversity
    pub mmr_lambda: f32,

    /// Chunk size in characters
    pub chunk_size: usize,

    /// Overlap between consecutive windows of one block
    pub chunk_overlap: usize,

    /// Ask the LLM for alternate phrasings of each query
    pub query_expansion: bool,

    /// Deadline for one storage session, in seconds
    pub store_timeout_secs: u64,

    /// Upper bound on concurrently open storage sessions
    pub max_concurrent_sessions: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rerank_enabled: false,
            rerank_pool_size: 50,
            mmr_lambda: 0.7,
            chunk_size: 300,
            chunk_overlap: 100,
            query_expansion: true,
            store_timeout_secs: 30,
            max_concurrent_sessions: 8,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    database: Option<PathBuf>,
    llm: Option<LlmSettings>,
    embedding: Option<EmbeddingSettings>,
    retrieval: Option<RetrievalConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            database: None,
            log_level: None,
            json_logs: false,
            verbose: false,
            no_color: false,
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the workspace config file and the environment.
    ///
    /// Environment variables:
    /// - `GROUNDWORK_WORKSPACE`, `GROUNDWORK_CONFIG`, `GROUNDWORK_DATABASE`
    /// - `OLLAMA_URL`, `GROUNDWORK_CHAT_MODEL`
    /// - `GROUNDWORK_RERANK`, `GROUNDWORK_RERANK_POOL`
    /// - `GROUNDWORK_CHUNK_SIZE`, `GROUNDWORK_CHUNK_OVERLAP`
    /// - `RUST_LOG`, `NO_COLOR`
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`AppConfig::load`], with explicit workspace/config-file paths taking
    /// precedence over the environment.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("GROUNDWORK_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }
        if let Some(workspace) = workspace {
            config.workspace = workspace;
        }

        if let Ok(config_file) = std::env::var("GROUNDWORK_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }
        if config_file.is_some() {
            config.config_file = config_file;
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.groundwork_dir().join("config.yaml"));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::Config(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        config.apply_env()?;

        Ok(config)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(database) = std::env::var("GROUNDWORK_DATABASE") {
            self.database = Some(PathBuf::from(database));
        }

        if let Ok(url) = std::env::var("OLLAMA_URL") {
            let url = url.trim_end_matches('/').to_string();
            self.llm.endpoint = url.clone();
            self.embedding.endpoint = url;
        }

        if let Ok(model) = std::env::var("GROUNDWORK_CHAT_MODEL") {
            self.llm.chat_model = model;
        }

        if let Ok(flag) = std::env::var("GROUNDWORK_RERANK") {
            self.retrieval.rerank_enabled = parse_flag(&flag);
        }

        if let Some(pool) = env_usize("GROUNDWORK_RERANK_POOL")? {
            self.retrieval.rerank_pool_size = pool;
        }

        if let Some(size) = env_usize("GROUNDWORK_CHUNK_SIZE")? {
            self.retrieval.chunk_size = size;
        }

        if let Some(overlap) = env_usize("GROUNDWORK_CHUNK_OVERLAP")? {
            self.retrieval.chunk_overlap = overlap;
        }

        self.log_level = std::env::var("RUST_LOG").ok().or(self.log_level.take());

        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Merge YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(database) = config_file.database {
            result.database = Some(database);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
            if let Some(json) = logging.json {
                result.json_logs = json;
            }
        }

        if let Some(llm) = config_file.llm {
            result.llm = llm;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(retrieval) = config_file.retrieval {
            result.retrieval = retrieval;
        }

        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    pub fn with_overrides(
        mut self,
        database: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(database) = database {
            self.database = Some(database);
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Get the path to the .groundwork directory.
    pub fn groundwork_dir(&self) -> PathBuf {
        self.workspace.join(".groundwork")
    }

    /// Ensure the .groundwork directory exists.
    pub fn ensure_groundwork_dir(&self) -> AppResult<()> {
        let dir = self.groundwork_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| {
                AppError::Config(format!("Failed to create .groundwork directory: {}", e))
            })?;
        }
        Ok(())
    }

    /// Resolved SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.workspace.join(path),
            None => self.groundwork_dir().join("index.sqlite"),
        }
    }

    /// Validate the configuration before any component is built.
    pub fn validate(&self) -> AppResult<()> {
        let retrieval = &self.retrieval;

        if retrieval.chunk_size == 0 {
            return Err(AppError::Config("chunk_size must be positive".to_string()));
        }

        if retrieval.chunk_overlap >= retrieval.chunk_size {
            return Err(AppError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                retrieval.chunk_overlap, retrieval.chunk_size
            )));
        }

        if !(0.0..=1.0).contains(&retrieval.mmr_lambda) {
            return Err(AppError::Config(format!(
                "mmr_lambda must be within [0, 1], got {}",
                retrieval.mmr_lambda
            )));
        }

        if retrieval.rerank_pool_size == 0 {
            return Err(AppError::Config(
                "rerank_pool_size must be positive".to_string(),
            ));
        }

        if retrieval.max_concurrent_sessions == 0 {
            return Err(AppError::Config(
                "max_concurrent_sessions must be positive".to_string(),
            ));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        let provider = self.embedding.provider.as_str();
        if !KNOWN_EMBEDDING_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        Ok(())
    }
}

/// Interpret an environment flag ("1", "true", "yes", "on").
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_usize(name: &str) -> AppResult<Option<usize>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{} must be an integer: {}", name, e))),
        Err(_) => Ok(None),
    }
}

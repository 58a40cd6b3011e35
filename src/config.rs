use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub daily: DailyConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Writable state: snapshot, checkpoint, daily index, subscriptions.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory holding `quran.json`, `names.json` and `hadith.json`.
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
    /// Read-only snapshot shipped with the application.
    #[serde(default)]
    pub bundled_snapshot: Option<PathBuf>,
    /// Collection name, used for snapshot file names.
    #[serde(default = "default_index_name")]
    pub index_name: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            corpus_dir: default_corpus_dir(),
            bundled_snapshot: None,
            index_name: default_index_name(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_corpus_dir() -> PathBuf {
    PathBuf::from("./corpus")
}
fn default_index_name() -> String {
    "reminder".to_string()
}

impl DataConfig {
    /// The working collection. `index` builds it, `serve` and `search` load
    /// it, and on first load it is copied from `bundled_snapshot` if set.
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.idx.zst", self.index_name))
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.join("index-checkpoint.json")
    }

    pub fn daily_path(&self) -> PathBuf {
        self.data_dir.join("daily.json")
    }

    pub fn push_marker_path(&self) -> PathBuf {
        self.data_dir.join("last-push.json")
    }

    pub fn subscriptions_path(&self) -> PathBuf {
        self.data_dir.join("push_subscriptions.json")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Dimensionality of the hash provider when `embedding.dims` is unset.
pub const DEFAULT_HASH_DIMS: usize = 384;

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,
    #[serde(default = "default_context_budget")]
    pub context_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            query_limit: default_query_limit(),
            context_budget: default_context_budget(),
        }
    }
}

fn default_query_limit() -> usize {
    25
}
fn default_context_budget() -> usize {
    reminder_core::context::DEFAULT_CONTEXT_BUDGET
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Run the checkpointed indexer in the background when serving.
    #[serde(default)]
    pub on_start: bool,
    #[serde(default = "default_quran_stride")]
    pub quran_stride: u32,
    #[serde(default = "default_hadith_stride")]
    pub hadith_stride: u32,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            on_start: false,
            quran_stride: default_quran_stride(),
            hadith_stride: default_hadith_stride(),
        }
    }
}

fn default_quran_stride() -> u32 {
    50
}
fn default_hadith_stride() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_base: default_api_base(),
            model: default_llm_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DailyConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_max_redraws")]
    pub max_redraws: usize,
    #[serde(default = "default_continuation_steps")]
    pub continuation_steps: usize,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            max_redraws: default_max_redraws(),
            continuation_steps: default_continuation_steps(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    3600
}
fn default_max_redraws() -> usize {
    1000
}
fn default_continuation_steps() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionsConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

fn default_max_entries() -> usize {
    reminder_core::session::DEFAULT_MAX_ENTRIES
}

#[derive(Debug, Deserialize, Clone)]
pub struct PushConfig {
    /// `log` records notifications; `webhook` POSTs them to each endpoint.
    #[serde(default = "default_notifier")]
    pub notifier: String,
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            notifier: default_notifier(),
            send_delay_ms: default_send_delay_ms(),
        }
    }
}

fn default_notifier() -> String {
    "log".to_string()
}
fn default_send_delay_ms() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Config {
    /// All defaults, for commands run without a config file and for tests.
    pub fn minimal() -> Self {
        Self {
            data: DataConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            indexing: IndexingConfig::default(),
            llm: LlmConfig::default(),
            daily: DailyConfig::default(),
            sessions: SessionsConfig::default(),
            push: PushConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    check(config)?;
    Ok(())
}

fn check(config: &Config) -> std::result::Result<(), ConfigError> {
    let invalid = |field: &'static str, rule: &'static str| ConfigError::Invalid { field, rule };

    if config.retrieval.query_limit < 1 {
        return Err(invalid("retrieval.query_limit", ">= 1"));
    }
    if config.retrieval.context_budget == 0 {
        return Err(invalid("retrieval.context_budget", "> 0"));
    }
    if config.indexing.quran_stride == 0 {
        return Err(invalid("indexing.quran_stride", "> 0"));
    }
    if config.indexing.hadith_stride == 0 {
        return Err(invalid("indexing.hadith_stride", "> 0"));
    }
    if config.embedding.batch_size == 0 {
        return Err(invalid("embedding.batch_size", "> 0"));
    }
    if config.daily.interval_secs == 0 {
        return Err(invalid("daily.interval_secs", "> 0"));
    }
    if config.daily.max_redraws == 0 {
        return Err(invalid("daily.max_redraws", "> 0"));
    }
    if config.sessions.max_entries < 2 {
        return Err(invalid("sessions.max_entries", ">= 2"));
    }

    match config.embedding.provider.as_str() {
        "hash" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.dims.unwrap_or(0) == 0 {
                return Err(ConfigError::RequiredFor {
                    field: "embedding.dims",
                    provider: config.embedding.provider.clone(),
                });
            }
            if config.embedding.model.is_none() {
                return Err(ConfigError::RequiredFor {
                    field: "embedding.model",
                    provider: config.embedding.provider.clone(),
                });
            }
        }
        other => {
            return Err(ConfigError::Unknown {
                kind: "embedding provider",
                value: other.to_string(),
                expected: "hash, openai, ollama, or local",
            })
        }
    }

    match config.llm.provider.as_str() {
        "openai" | "echo" => {}
        other => {
            return Err(ConfigError::Unknown {
                kind: "llm provider",
                value: other.to_string(),
                expected: "openai or echo",
            })
        }
    }

    match config.push.notifier.as_str() {
        "log" | "webhook" => {}
        other => {
            return Err(ConfigError::Unknown {
                kind: "push notifier",
                value: other.to_string(),
                expected: "log or webhook",
            })
        }
    }

    Ok(())
}

use crate::llm::{LlmSettings, Provider};
use clap::{Parser, ValueEnum};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Run mode
    #[arg(long, value_enum, env = "APP_MODE")]
    pub mode: Option<RunMode>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Enable rate limiting
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Directory of corpus documents to index
    #[arg(long, env = "CORPUS_DIR")]
    pub corpus_dir: Option<String>,

    /// Question set for benchmark mode (JSON array or one question per line)
    #[arg(long, env = "BENCHMARK_QUESTIONS")]
    pub questions_file: Option<String>,

    /// Benchmark worker count
    #[arg(long, env = "BENCHMARK_CONCURRENCY")]
    pub concurrency: Option<usize>,
}

/// What the binary does after loading configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Serve the HTTP API
    #[default]
    Serve,
    /// Replay the question set and persist performance results
    Benchmark,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: RunMode,
    pub server: ServerConfig,
    pub resilience: ResilienceConfig,
    pub retrieval: RetrievalSettings,
    pub composer: ComposerSettings,
    pub generator: GeneratorSettings,
    pub indexing: IndexingSettings,
    pub embedding: EmbeddingSettings,
    pub cache: CacheSettings,
    pub benchmark: BenchmarkSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub requests_per_second: f32,
    pub burst_size: f32,
    pub request_timeout_secs: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            rate_limit_enabled: false,
            requests_per_second: 5.0,
            burst_size: 10.0,
            request_timeout_secs: 30,
        }
    }
}

impl ResilienceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub max_items: usize,
    pub top_k: usize,
    pub hops: usize,
    pub hop_decay: f32,
    pub community_top_k: usize,
    pub global_min_words: usize,
    pub global_keywords: Vec<String>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        let defaults = crate::rag::retrieval::RetrieverConfig::default();
        Self {
            max_items: 20,
            top_k: defaults.top_k,
            hops: defaults.hops,
            hop_decay: defaults.hop_decay,
            community_top_k: defaults.community_top_k,
            global_min_words: defaults.global_min_words,
            global_keywords: defaults.global_keywords,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerSettings {
    pub token_budget: usize,
    /// `cl100k` or `words`
    pub tokenizer: String,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            token_budget: 2000,
            tokenizer: "cl100k".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    pub corpus_dir: String,
    /// `llm` or `external_nlp`
    pub extractor: String,
    pub nlp_url: Option<String>,
    pub chunk_size: usize,
    pub community_resolution: f64,
    pub community_levels: u32,
    pub summary_concurrency: usize,
    /// Periodic reindex interval; 0 disables it
    pub reindex_interval_secs: u64,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self {
            corpus_dir: "./data/corpus".to_string(),
            extractor: "llm".to_string(),
            nlp_url: None,
            chunk_size: 2000,
            community_resolution: 1.0,
            community_levels: 2,
            summary_concurrency: num_cpus::get().clamp(1, 8),
            reindex_interval_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// `fastembed` or `lexical`
    pub provider: String,
    /// Vector size for the lexical embedder
    pub dimensions: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "fastembed".to_string(),
            dimensions: 384,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            max_capacity: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkSettings {
    pub questions_file: Option<String>,
    pub concurrency: usize,
    pub metrics_dir: String,
    pub data_dir: String,
    /// When set, questions are also POSTed to this URL
    pub endpoint_url: Option<String>,
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            questions_file: None,
            concurrency: 4,
            metrics_dir: "./performance-metrics".to_string(),
            data_dir: "./benchmark-data".to_string(),
            endpoint_url: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder();

        // 1. Defaults
        builder = builder.add_source(Config::try_from(&AppConfig::default())?);

        // 2. Config file: explicit path must exist, ./config.yaml is optional
        match &cli.config {
            Some(path) => {
                builder = builder.add_source(File::from(Path::new(path)).required(true));
            }
            None => {
                builder = builder.add_source(File::with_name("config.yaml").required(false));
            }
        }

        // 3. Environment variables, e.g. GRAPHRAG_SERVER__PORT=9000
        builder = builder.add_source(
            Environment::with_prefix("GRAPHRAG")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("retrieval.global_keywords")
                .try_parsing(true),
        );

        // 4. CLI flags (and their env fallbacks) win
        if let Some(mode) = cli.mode {
            let mode = match mode {
                RunMode::Serve => "serve",
                RunMode::Benchmark => "benchmark",
            };
            builder = builder.set_override("mode", mode)?;
        }
        if let Some(host) = cli.host {
            builder = builder.set_override("server.host", host)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", i64::from(port))?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(dir) = cli.corpus_dir {
            builder = builder.set_override("indexing.corpus_dir", dir)?;
        }
        if let Some(file) = cli.questions_file {
            builder = builder.set_override("benchmark.questions_file", file)?;
        }
        if let Some(c) = cli.concurrency {
            builder = builder.set_override("benchmark.concurrency", c as u64)?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings that would make every answer empty or reorder hop scores.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.retrieval.max_items == 0 {
            return Err(config::ConfigError::Message(
                "retrieval.max_items must be at least 1".to_string(),
            ));
        }
        let decay = self.retrieval.hop_decay;
        if !decay.is_finite() || !(0.0..=1.0).contains(&decay) {
            return Err(config::ConfigError::Message(format!(
                "retrieval.hop_decay must be within [0, 1], got {decay}"
            )));
        }
        Ok(())
    }

    pub fn corpus_dir(&self) -> PathBuf {
        PathBuf::from(&self.indexing.corpus_dir)
    }
}

pub fn load_llm_settings() -> Result<LlmSettings, String> {
    let base_url = std::env::var("LLM_BASE_URL")
        .map_err(|_| "Missing required env var: LLM_BASE_URL".to_string())?;
    if base_url.trim().is_empty() {
        return Err("LLM_BASE_URL cannot be empty".to_string());
    }

    let model = std::env::var("LLM_MODEL")
        .map_err(|_| "Missing required env var: LLM_MODEL".to_string())?;
    if model.trim().is_empty() {
        return Err("LLM_MODEL cannot be empty".to_string());
    }

    let api_key = std::env::var("LLM_API_KEY")
        .ok()
        .filter(|s| !s.trim().is_empty());

    // Auto-detect provider from base URL
    let mut provider = Provider::detect_from_url(&base_url);

    // Azure needs the deployment name in the URL
    if let Provider::AzureOpenAI { .. } = &provider
        && let Ok(deployment) = std::env::var("AZURE_DEPLOYMENT_NAME")
    {
        provider = Provider::AzureOpenAI {
            deployment_name: deployment,
            api_version: std::env::var("AZURE_API_VERSION")
                .unwrap_or_else(|_| "2024-08-01-preview".to_string()),
        };
    }

    let request_timeout_secs = std::env::var("LLM_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60);

    Ok(LlmSettings {
        base_url,
        api_key,
        model,
        provider,
        request_timeout_secs,
    })
}

//! Configuration for the pipeline and the server.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CLARIFAI_*)
//! 2. Config file (.clarifai/config.yaml)
//! 3. Defaults
//!
//! Config file discovery:
//! - Searches current directory and parents for .clarifai/config.yaml
//! - `journal_dir` in the config file is relative to the project root
//!
//! Credentials (`OPENAI_API_KEY`, `SERPER_API_KEY`) are only read from the
//! environment and are kept out of `ResolvedConfig`.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::RetryPolicy;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingCredential(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Pipeline configuration
// ============================================================================

/// Per-run pipeline settings, read-only once a run starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Model used to extract claims from segments
    #[serde(default = "default_small_model")]
    pub extract_claims_model: String,

    /// Model used to verify claims
    #[serde(default = "default_small_model")]
    pub verify_claims_model: String,

    /// Model used to detect biases in segments
    #[serde(default = "default_small_model")]
    pub extract_biases_model: String,

    /// Model used to write the final report
    #[serde(default = "default_aggregate_model", alias = "agregate_model")]
    pub aggregate_model: String,

    #[serde(default)]
    pub segmentation_mode: SegmentationMode,

    #[serde(default)]
    pub claim_verification_source: VerificationSource,

    /// Maximum segment length in characters
    #[serde(default = "default_chunk_size")]
    pub segments_chunk_size: usize,
}

fn default_small_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_aggregate_model() -> String {
    "gpt-4o".to_string()
}
fn default_chunk_size() -> usize {
    1000
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            extract_claims_model: default_small_model(),
            verify_claims_model: default_small_model(),
            extract_biases_model: default_small_model(),
            aggregate_model: default_aggregate_model(),
            segmentation_mode: SegmentationMode::default(),
            claim_verification_source: VerificationSource::default(),
            segments_chunk_size: default_chunk_size(),
        }
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segments_chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "segments_chunk_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How the input is cut into segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    #[default]
    Recursive,
    /// Accepted for compatibility; segmentation falls back to fixed-size chunks
    Semantic,
}

impl std::str::FromStr for SegmentationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recursive" => Ok(Self::Recursive),
            "semantic" => Ok(Self::Semantic),
            other => Err(ConfigError::Invalid(format!(
                "unknown segmentation mode '{}'",
                other
            ))),
        }
    }
}

/// Where claims get verified.
///
/// Only "web" selects web verification; any other value means the model's
/// own knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum VerificationSource {
    #[default]
    Llm,
    Web,
}

impl From<&str> for VerificationSource {
    fn from(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("web") {
            Self::Web
        } else {
            Self::Llm
        }
    }
}

impl From<String> for VerificationSource {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

// ============================================================================
// Execution and server settings
// ============================================================================

/// Limits applied to every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Per-node timeout in seconds (default: 300 = 5 min)
    #[serde(default = "default_node_timeout")]
    pub node_timeout_seconds: u64,

    /// Maximum input size in bytes (default: 1MB)
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,

    /// Timeout of a single model or search request in seconds (default: 90)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

fn default_node_timeout() -> u64 {
    300
}
fn default_request_timeout() -> u64 {
    90
}
fn default_max_input_bytes() -> usize {
    1_048_576
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            node_timeout_seconds: default_node_timeout(),
            max_input_bytes: default_max_input_bytes(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl ExecutionLimits {
    pub fn node_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.node_timeout_seconds)
    }

    /// Per-request timeout, capped so that `max_attempts` requests fit in
    /// one node timeout
    pub fn request_timeout(&self, max_attempts: u32) -> std::time::Duration {
        let share = self.node_timeout() / max_attempts.max(1);
        std::time::Duration::from_secs(self.request_timeout_seconds).min(share)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_address")]
    pub address: String,
}

fn default_address() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub pipeline: Option<Configuration>,
    #[serde(default)]
    pub server: Option<ServerSettings>,
    #[serde(default)]
    pub limits: Option<ExecutionLimits>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub journal_dir: Option<String>,
}

/// Resolved configuration
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedConfig {
    pub pipeline: Configuration,
    pub server: ServerSettings,
    pub limits: ExecutionLimits,
    pub retry: RetryPolicy,
    /// Run journal directory (journaling is off when unset)
    pub journal_dir: Option<PathBuf>,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Apply `CLARIFAI_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CLARIFAI_EXTRACT_CLAIMS_MODEL") {
            self.pipeline.extract_claims_model = v;
        }
        if let Some(v) = lookup("CLARIFAI_VERIFY_CLAIMS_MODEL") {
            self.pipeline.verify_claims_model = v;
        }
        if let Some(v) = lookup("CLARIFAI_EXTRACT_BIASES_MODEL") {
            self.pipeline.extract_biases_model = v;
        }
        if let Some(v) = lookup("CLARIFAI_AGGREGATE_MODEL") {
            self.pipeline.aggregate_model = v;
        }
        if let Some(v) = lookup("CLARIFAI_SEGMENTATION_MODE") {
            self.pipeline.segmentation_mode = v.parse()?;
        }
        if let Some(v) = lookup("CLARIFAI_VERIFICATION_SOURCE") {
            self.pipeline.claim_verification_source = VerificationSource::from(v);
        }
        if let Some(v) = lookup("CLARIFAI_CHUNK_SIZE") {
            self.pipeline.segments_chunk_size = v.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("CLARIFAI_CHUNK_SIZE is not a number: {}", v))
            })?;
        }
        if let Some(v) = lookup("CLARIFAI_ADDRESS") {
            self.server.address = v;
        }
        if let Some(v) = lookup("CLARIFAI_JOURNAL_DIR") {
            self.journal_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }
}

/// Credentials for the external services, read from the environment
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub openai_base_url: Option<String>,
    pub serper_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"<redacted>")
            .field("openai_base_url", &self.openai_base_url)
            .field(
                "serper_api_key",
                &self.serper_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment
    pub fn from_env(pipeline: &Configuration) -> Result<Self, ConfigError> {
        Self::from_lookup(pipeline, |key| std::env::var(key).ok())
    }

    /// Read credentials with a custom lookup.
    ///
    /// `SERPER_API_KEY` is required only when web verification is configured.
    pub fn from_lookup<F>(pipeline: &Configuration, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openai_api_key =
            non_empty("OPENAI_API_KEY").ok_or(ConfigError::MissingCredential("OPENAI_API_KEY"))?;
        let serper_api_key = non_empty("SERPER_API_KEY");

        if pipeline.claim_verification_source == VerificationSource::Web
            && serper_api_key.is_none()
        {
            return Err(ConfigError::MissingCredential("SERPER_API_KEY"));
        }

        Ok(Self {
            openai_api_key,
            openai_base_url: non_empty("OPENAI_BASE_URL"),
            serper_api_key,
        })
    }
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".clarifai").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a path that may be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Merge a config file over the defaults
fn resolve_file(config_path: &Path, file: ConfigFile) -> ResolvedConfig {
    // Project root is the parent of .clarifai/
    let base_dir = config_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."));

    ResolvedConfig {
        pipeline: file.pipeline.unwrap_or_default(),
        server: file.server.unwrap_or_default(),
        limits: file.limits.unwrap_or_default(),
        retry: file.retry.unwrap_or_default(),
        journal_dir: file.journal_dir.map(|dir| resolve_path(base_dir, &dir)),
        config_file: Some(config_path.to_path_buf()),
    }
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig, ConfigError> {
    let mut config = match find_config_file() {
        Some(config_path) => {
            let file = load_config_file(&config_path)?;
            resolve_file(&config_path, file)
        }
        None => ResolvedConfig::default(),
    };

    config.apply_env(|key| std::env::var(key).ok())?;
    config.pipeline.validate()?;

    Ok(config)
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> anyhow::Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

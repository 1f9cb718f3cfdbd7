use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use loraforge_core::batch::BatchConfig;
use loraforge_core::instructions::{GenerationBrief, TargetSchema};
use loraforge_llm::gemini::{DEFAULT_API_URL, DEFAULT_MODEL};
use loraforge_llm::ApiCredential;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: '{value}'")]
    Invalid { var: &'static str, value: String },
}

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub credential: ApiCredential,
    pub api_url: String,
    pub model: String,
    pub batch: BatchConfig,
    pub brief: GenerationBrief,
    /// Where the JSONL export is written.
    pub export_path: PathBuf,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default                                            |
    /// |---------------------------|----------------------------------------------------|
    /// | `MODEL_API_KEY`           | required                                           |
    /// | `MODEL_API_URL`           | `https://generativelanguage.googleapis.com/v1beta` |
    /// | `MODEL_NAME`              | `gemini-2.5-flash`                                 |
    /// | `BATCH_TARGET_TOTAL`      | `10`                                               |
    /// | `BATCH_CHUNK_SIZE`        | `5`                                                |
    /// | `BATCH_MAX_CONCURRENCY`   | `5`                                                |
    /// | `BATCH_CALL_TIMEOUT_SECS` | `120`                                              |
    /// | `BATCH_MAX_RETRIES`       | `1`                                                |
    /// | `BATCH_HINT_LIMIT`        | `50`                                               |
    /// | `GENERATION_CONCEPT`      | required                                           |
    /// | `GENERATION_SCHEMA`       | `dense_training`                                   |
    /// | `GENERATION_STYLE`        | unset                                              |
    /// | `EXPORT_PATH`             | `prompts.jsonl`                                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("MODEL_API_KEY").ok_or(ConfigError::Missing("MODEL_API_KEY"))?;
        let credential =
            ApiCredential::new(api_key).map_err(|_| ConfigError::Missing("MODEL_API_KEY"))?;

        let api_url = get("MODEL_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let model = get("MODEL_NAME").unwrap_or_else(|| DEFAULT_MODEL.into());

        let defaults = BatchConfig::default();
        let batch = BatchConfig {
            target_total: parse_or(&get, "BATCH_TARGET_TOTAL", defaults.target_total)?,
            chunk_size: parse_or(&get, "BATCH_CHUNK_SIZE", defaults.chunk_size)?,
            max_concurrency: parse_or(&get, "BATCH_MAX_CONCURRENCY", defaults.max_concurrency)?,
            call_timeout: Duration::from_secs(parse_or(
                &get,
                "BATCH_CALL_TIMEOUT_SECS",
                defaults.call_timeout.as_secs(),
            )?),
            max_retries: parse_or(&get, "BATCH_MAX_RETRIES", defaults.max_retries)?,
            hint_limit: parse_or(&get, "BATCH_HINT_LIMIT", defaults.hint_limit)?,
        };

        let concept = get("GENERATION_CONCEPT").ok_or(ConfigError::Missing("GENERATION_CONCEPT"))?;
        let schema = match get("GENERATION_SCHEMA") {
            Some(value) => TargetSchema::from_str(&value).map_err(|_| ConfigError::Invalid {
                var: "GENERATION_SCHEMA",
                value,
            })?,
            None => TargetSchema::default(),
        };
        let mut brief = GenerationBrief::new(concept, schema);
        if let Some(style) = get("GENERATION_STYLE") {
            brief = brief.with_style(style);
        }

        let export_path = get("EXPORT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("prompts.jsonl"));

        Ok(Self {
            credential,
            api_url,
            model,
            batch,
            brief,
            export_path,
        })
    }
}

fn parse_or<G, T>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(var) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

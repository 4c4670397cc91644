use anyhow::{Context, Result};
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding the parquet artifacts. Env: `INPUT_DIR`.
    pub input_dir: PathBuf,
    /// LanceDB connection URI. Env: `LANCEDB_URI`.
    pub lancedb_uri: String,
    /// Address the HTTP server binds to. Env: `BIND_ADDR`.
    pub bind_addr: String,
    /// Token budget for context building and model calls. Env: `MAX_TOKENS`.
    pub max_tokens: usize,
    /// Sampling temperature for model calls. Env: `TEMPERATURE`.
    pub temperature: f32,
    /// Ollama endpoint. Env: `OLLAMA_BASE_URL`.
    pub ollama_base_url: String,
    /// Chat model name. Env: `CHAT_MODEL`.
    pub chat_model: String,
    /// Embedding model name. Env: `EMBEDDING_MODEL`.
    pub embedding_model: String,
    /// Whether to load the covariate (claims) table. Env: `LOAD_COVARIATES`.
    pub load_covariates: bool,
}

impl Settings {
    /// Load settings from the environment, applying defaults when unset.
    /// A set-but-unparsable value is an error, not a silent default.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            input_dir: PathBuf::from(env_or("INPUT_DIR", "./output")),
            lancedb_uri: env_or("LANCEDB_URI", "./lancedb"),
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000"),
            max_tokens: parse_or(std::env::var("MAX_TOKENS").ok(), "MAX_TOKENS", 12_000)?,
            temperature: parse_or(std::env::var("TEMPERATURE").ok(), "TEMPERATURE", 0.0)?,
            ollama_base_url: env_or("OLLAMA_BASE_URL", "http://localhost:11434"),
            chat_model: env_or("CHAT_MODEL", "llama3"),
            embedding_model: env_or("EMBEDDING_MODEL", "llama3"),
            load_covariates: parse_or(
                std::env::var("LOAD_COVARIATES").ok(),
                "LOAD_COVARIATES",
                false,
            )?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid {key} '{raw}': {e}"))
            .context("Failed to parse settings"),
        None => Ok(default),
    }
}

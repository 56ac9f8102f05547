use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;

const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
const DEFAULT_CHAT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_VISION_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

fn default_max_file_size() -> usize {
    // 10 MB in bytes
    10 * 1024 * 1024
}

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub api_base: String,
    pub chat_model: String,
    pub vision_model: String,
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub summary_cache_capacity: u64,
    pub upload_dir: PathBuf,
}

impl Config {
    pub fn new() -> Result<Self> {
        // Load .env file first
        dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("GROQ_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .context("Failed to load GROQ_API_KEY")?;

        let string_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Config {
            api_key,
            api_base: string_or("LLM_API_BASE", DEFAULT_API_BASE),
            chat_model: string_or("CHAT_MODEL", DEFAULT_CHAT_MODEL),
            vision_model: string_or("VISION_MODEL", DEFAULT_VISION_MODEL),
            host: string_or("HOST", "127.0.0.1"),
            port: parse_or(&lookup, "PORT", 4000)?,
            max_file_size: parse_or(&lookup, "MAX_FILE_SIZE", default_max_file_size())?,
            summary_cache_capacity: parse_or(&lookup, "SUMMARY_CACHE_CAPACITY", 64)?,
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        })
    }

    /// Creates `upload_dir` (and its parents) if it does not exist yet.
    pub fn ensure_upload_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.upload_dir).with_context(|| {
            format!("Failed to create upload directory {}", self.upload_dir.display())
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

// Keeps the API key out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_base", &self.api_base)
            .field("chat_model", &self.chat_model)
            .field("vision_model", &self.vision_model)
            .field("bind", &self.bind_address())
            .field("max_file_size", &self.max_file_size)
            .field("summary_cache_capacity", &self.summary_cache_capacity)
            .field("upload_dir", &self.upload_dir)
            .finish_non_exhaustive()
    }
}

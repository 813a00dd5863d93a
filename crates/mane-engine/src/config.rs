use std::env;
use std::time::Duration;

use anyhow::bail;

pub const DEFAULT_CHAT_API_BASE: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GENERATION_MODEL: &str = "flux-kontext-pro";

const DEFAULT_TIMEOUT_S: f64 = 90.0;
const MIN_TIMEOUT_S: f64 = 5.0;
const MAX_TIMEOUT_S: f64 = 300.0;

/// Immutable engine configuration, constructed once at the edge and passed
/// to the pipeline. Deep call chains never read process environment.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub chat_api_key: String,
    pub chat_api_base: String,
    pub generation_api_key: String,
    pub analysis_model: String,
    pub vision_model: String,
    pub generation_model: String,
    pub request_timeout: Duration,
}

impl EngineConfig {
    /// Resolves configuration from environment variables. All network calls
    /// need `MANE_API_KEY`; the generation key falls back to the chat key
    /// when `MANE_GENERATION_API_KEY` is not set separately.
    pub fn from_env() -> anyhow::Result<Self> {
        let Some(chat_api_key) = non_empty_env("MANE_API_KEY") else {
            bail!("MANE_API_KEY not set");
        };
        let generation_api_key =
            non_empty_env("MANE_GENERATION_API_KEY").unwrap_or_else(|| chat_api_key.clone());

        Ok(Self {
            chat_api_base: non_empty_env("MANE_CHAT_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_CHAT_API_BASE.to_string()),
            analysis_model: non_empty_env("MANE_ANALYSIS_MODEL")
                .unwrap_or_else(|| DEFAULT_ANALYSIS_MODEL.to_string()),
            vision_model: non_empty_env("MANE_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            generation_model: non_empty_env("MANE_GENERATION_MODEL")
                .unwrap_or_else(|| DEFAULT_GENERATION_MODEL.to_string()),
            request_timeout: clamp_timeout(
                non_empty_env("MANE_REQUEST_TIMEOUT_S").and_then(|raw| raw.parse::<f64>().ok()),
            ),
            chat_api_key,
            generation_api_key,
        })
    }

    /// Offline configuration for the dry-run backend; no keys required.
    pub fn dryrun() -> Self {
        Self {
            chat_api_key: String::new(),
            chat_api_base: DEFAULT_CHAT_API_BASE.to_string(),
            generation_api_key: String::new(),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            generation_model: "dryrun-style-1".to_string(),
            request_timeout: clamp_timeout(None),
        }
    }
}

fn clamp_timeout(seconds: Option<f64>) -> Duration {
    let seconds = seconds
        .filter(|value| value.is_finite())
        .unwrap_or(DEFAULT_TIMEOUT_S)
        .clamp(MIN_TIMEOUT_S, MAX_TIMEOUT_S);
    Duration::from_secs_f64(seconds)
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

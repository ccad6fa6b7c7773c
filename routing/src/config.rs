//! Router runtime configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `ROUTER_MATH_MODEL`)
//! 2. Values from an optional TOML file
//! 3. Built-in defaults
//!
//! ## Backends
//!
//! | Category         | Tool         | Default model                |
//! |------------------|--------------|------------------------------|
//! | math_code        | `math_code`  | claude-3-5-sonnet-20240620   |
//! | vision_language  | `vl_mode`    | gpt-4o                       |
//! | light            | `light_mode` | gpt-4o                       |

use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::classifier::TaskCategory;
use crate::error::RouterError;
use crate::registry::{BackendProfile, BackendRegistry};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MATH_MODEL: &str = "claude-3-5-sonnet-20240620";
const DEFAULT_VISION_MODEL: &str = "gpt-4o";
const DEFAULT_LIGHT_MODEL: &str = "gpt-4o";
const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TEMPERATURE: f32 = 0.4;
const DEFAULT_TIMEOUT_SECS: u64 = 300;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

const ENV_BASE_URL: &str = "ROUTER_BASE_URL";
const ENV_API_KEY: &str = "ROUTER_API_KEY";
const ENV_MATH_MODEL: &str = "ROUTER_MATH_MODEL";
const ENV_VISION_MODEL: &str = "ROUTER_VISION_MODEL";
const ENV_LIGHT_MODEL: &str = "ROUTER_LIGHT_MODEL";
const ENV_MAX_TOKENS: &str = "ROUTER_MAX_TOKENS";
const ENV_TEMPERATURE: &str = "ROUTER_TEMPERATURE";
const ENV_TIMEOUT_SECS: &str = "ROUTER_TIMEOUT_SECS";
const ENV_MAX_ATTEMPTS: &str = "ROUTER_MAX_ATTEMPTS";
const ENV_BACKOFF_BASE_MS: &str = "ROUTER_BACKOFF_BASE_MS";
const ENV_BACKOFF_MAX_MS: &str = "ROUTER_BACKOFF_MAX_MS";

/// OpenAI-compatible endpoint the chat gateway talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token. Empty means no `Authorization` header.
    pub api_key: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
        }
    }
}

/// Per-category model assignment plus shared sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub math_model: String,
    pub vision_model: String,
    pub light_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            math_model: DEFAULT_MATH_MODEL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            light_model: DEFAULT_LIGHT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ModelConfig {
    pub fn model_for(&self, category: TaskCategory) -> &str {
        match category {
            TaskCategory::MathCode => &self.math_model,
            TaskCategory::VisionLanguage => &self.vision_model,
            TaskCategory::Light => &self.light_model,
        }
    }
}

/// Attempt budget and exponential backoff schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per request, first try included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BACKOFF_BASE_MS,
            max_delay_ms: DEFAULT_BACKOFF_MAX_MS,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
        }
    }

    /// Delay before retry `retry` (1 for the first retry): `base * 2^(retry-1)`, capped.
    pub fn backoff_for_retry(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        let delay_ms = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(format!(
                "max_delay_ms ({}) must be >= base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            ));
        }
        Ok(())
    }
}

/// Top-level configuration, built once at startup and passed down read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub api: ApiConfig,
    pub models: ModelConfig,
    pub retry: RetryPolicy,
}

impl RouterConfig {
    /// Defaults overlaid with environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// TOML file overlaid with environment overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        Ok(config)
    }

    /// `from_file` when a path is given, `from_env` otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Self::from_env(),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(v) = env::var(ENV_BASE_URL) {
            self.api.base_url = v;
        }
        if let Ok(v) = env::var(ENV_API_KEY) {
            self.api.api_key = v;
        }
        if let Ok(v) = env::var(ENV_MATH_MODEL) {
            self.models.math_model = v;
        }
        if let Ok(v) = env::var(ENV_VISION_MODEL) {
            self.models.vision_model = v;
        }
        if let Ok(v) = env::var(ENV_LIGHT_MODEL) {
            self.models.light_model = v;
        }
        override_parsed(ENV_MAX_TOKENS, &mut self.models.max_tokens)?;
        override_parsed(ENV_TEMPERATURE, &mut self.models.temperature)?;
        override_parsed(ENV_TIMEOUT_SECS, &mut self.models.timeout_secs)?;
        override_parsed(ENV_MAX_ATTEMPTS, &mut self.retry.max_attempts)?;
        override_parsed(ENV_BACKOFF_BASE_MS, &mut self.retry.base_delay_ms)?;
        override_parsed(ENV_BACKOFF_MAX_MS, &mut self.retry.max_delay_ms)?;
        Ok(())
    }

    /// Validate all sub-configs.
    pub fn validate(&self) -> Result<(), String> {
        if self.api.base_url.trim().is_empty() {
            return Err("api.base_url must not be empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.models.temperature) {
            return Err(format!(
                "temperature must be in [0, 2], got {}",
                self.models.temperature
            ));
        }
        if self.models.max_tokens == 0 {
            return Err("max_tokens must be > 0".to_string());
        }
        if self.models.timeout_secs == 0 {
            return Err("timeout_secs must be > 0".to_string());
        }
        self.retry.validate()
    }

    /// Profiles for every category.
    pub fn profiles(&self) -> Vec<BackendProfile> {
        TaskCategory::ALL
            .into_iter()
            .map(|category| {
                BackendProfile::new(category, self.models.model_for(category))
                    .with_max_tokens(self.models.max_tokens)
                    .with_temperature(self.models.temperature)
                    .with_timeout(Duration::from_secs(self.models.timeout_secs))
            })
            .collect()
    }

    /// Validated backend registry.
    pub fn registry(&self) -> Result<BackendRegistry, RouterError> {
        self.validate().map_err(RouterError::Configuration)?;
        BackendRegistry::new(self.profiles())
    }
}

fn override_parsed<T>(var: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Ok(raw) = env::var(var) {
        *slot = raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {var}: {raw:?}"))?;
    }
    Ok(())
}

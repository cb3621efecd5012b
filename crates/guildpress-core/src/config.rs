use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CONFIG_PATH: &str = "./guildpress.json";
pub const DEFAULT_DB_PATH: &str = "./data/discord.db";

/// Top-level config (guildpress.json + GUILDPRESS_* env overrides).
///
/// JSON keys are camelCase; env overrides are flattened and lowercased
/// by figment (e.g. GUILDPRESS_AI_APIKEY -> ai.apikey), so multi-word
/// fields carry a lowercase alias alongside their camelCase name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildpressConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    /// Bot token. Required for `scrape`.
    #[serde(default)]
    pub token: String,
    /// Target guild id. One guild per run.
    #[serde(default, alias = "guildid")]
    pub guild_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperConfig {
    /// Inter-request sleep in milliseconds.
    #[serde(default = "default_delay_ms", alias = "delaybetweenrequests")]
    pub delay_between_requests: u64,
    #[serde(default = "default_backoff_multiplier", alias = "backoffmultiplier")]
    pub backoff_multiplier: f64,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            delay_between_requests: default_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    /// Required for `process run`.
    #[serde(default, alias = "apikey")]
    pub api_key: String,
    /// Chat-completion endpoint base, without trailing slash.
    #[serde(default = "default_ai_base_url", alias = "baseurl")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Max messages per LLM call.
    #[serde(default = "default_batch_size", alias = "batchsize")]
    pub batch_size: usize,
    /// Max estimated prompt tokens per LLM call.
    #[serde(default = "default_max_tokens_per_batch", alias = "maxtokensperbatch")]
    pub max_tokens_per_batch: usize,
    /// Per-call output token cap.
    #[serde(default = "default_max_tokens", alias = "maxtokens")]
    pub max_tokens: u32,
    /// Total attempts per LLM call, including the first.
    #[serde(default = "default_retry_attempts", alias = "retryattempts")]
    pub retry_attempts: u32,
    /// Base backoff delay in milliseconds.
    #[serde(default = "default_retry_delay_ms", alias = "retrydelayms")]
    pub retry_delay_ms: u64,
    /// When set, memoized rows older than this many days are reprocessed.
    #[serde(default, alias = "reprocessafterdays")]
    pub reprocess_after_days: Option<u32>,
    /// USD per 1000 prompt tokens, for cost reporting.
    #[serde(default, alias = "inputcostper1k")]
    pub input_cost_per_1k: f64,
    /// USD per 1000 completion tokens.
    #[serde(default, alias = "outputcostper1k")]
    pub output_cost_per_1k: f64,
    #[serde(default)]
    pub stages: StagesConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_ai_base_url(),
            model: default_model(),
            batch_size: default_batch_size(),
            max_tokens_per_batch: default_max_tokens_per_batch(),
            max_tokens: default_max_tokens(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            reprocess_after_days: None,
            input_cost_per_1k: 0.0,
            output_cost_per_1k: 0.0,
            stages: StagesConfig::default(),
        }
    }
}

/// Per-stage inclusion toggles for `process run --all`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default)]
    pub filter: StageToggle,
    #[serde(default)]
    pub categorize: StageToggle,
    #[serde(default)]
    pub summarize: StageToggle,
    #[serde(default)]
    pub extract: StageToggle,
    #[serde(default)]
    pub format: StageToggle,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            filter: StageToggle::default(),
            categorize: StageToggle::default(),
            summarize: StageToggle::default(),
            extract: StageToggle::default(),
            format: StageToggle::default(),
        }
    }
}

impl StagesConfig {
    pub fn enabled(&self, stage: crate::types::Stage) -> bool {
        use crate::types::Stage;
        match stage {
            Stage::Filter => self.filter.enabled,
            Stage::Categorize => self.categorize.enabled,
            Stage::Summarize => self.summarize.enabled,
            Stage::Extract => self.extract.enabled,
            Stage::Format => self.format.enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageToggle {
    #[serde(default = "bool_true")]
    pub enabled: bool,
}

impl Default for StageToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyConfig {
    /// When true, usernames are replaced with stable aliases before
    /// any content is sent to the LLM.
    #[serde(default = "bool_true", alias = "anonymizeinprompts")]
    pub anonymize_in_prompts: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            anonymize_in_prompts: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportConfig {
    #[serde(default = "default_export_dir", alias = "outputdir")]
    pub output_dir: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_export_dir(),
        }
    }
}

/// Prompt templates directory. When unset, the compiled-in templates
/// are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default)]
    pub dir: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_delay_ms() -> u64 {
    100
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_batch_size() -> usize {
    20
}
fn default_max_tokens_per_batch() -> usize {
    8000
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    1000
}
fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_export_dir() -> String {
    "./exports".to_string()
}

impl GuildpressConfig {
    /// Load config from a JSON file with GUILDPRESS_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. GUILDPRESS_CONFIG env var
    ///   3. ./guildpress.json
    ///
    /// A missing file is not an error: defaults plus env overrides
    /// still produce a usable config for `db` and `export` commands.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("GUILDPRESS_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

        let config: GuildpressConfig = Figment::new()
            .merge(Json::file(&path))
            .merge(Env::prefixed("GUILDPRESS_").split("_"))
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        Ok(config)
    }

    /// Fail fast before any network or store write when credentials
    /// needed for scraping are absent.
    pub fn require_discord(&self) -> crate::error::Result<()> {
        if self.discord.token.is_empty() {
            return Err(ConfigError::Missing("discord.token"));
        }
        if self.discord.guild_id.is_empty() {
            return Err(ConfigError::Missing("discord.guildId"));
        }
        Ok(())
    }

    /// Fail fast when the LLM credentials are absent.
    pub fn require_ai(&self) -> crate::error::Result<()> {
        if self.ai.api_key.is_empty() {
            return Err(ConfigError::Missing("ai.apiKey"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = GuildpressConfig::default();
        assert_eq!(config.scraper.delay_between_requests, 100);
        assert_eq!(config.database.path, DEFAULT_DB_PATH);
        assert!(config.privacy.anonymize_in_prompts);
        assert!(config.ai.stages.enabled(crate::types::Stage::Filter));
    }

    #[test]
    fn camel_case_keys_parse() {
        let json = r#"{
            "discord": {"token": "t", "guildId": "g1"},
            "ai": {"apiKey": "k", "maxTokensPerBatch": 500, "stages": {"extract": {"enabled": false}}},
            "privacy": {"anonymizeInPrompts": false}
        }"#;
        let config: GuildpressConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.discord.guild_id, "g1");
        assert_eq!(config.ai.max_tokens_per_batch, 500);
        assert!(!config.privacy.anonymize_in_prompts);
        assert!(!config.ai.stages.enabled(crate::types::Stage::Extract));
        assert!(config.ai.stages.enabled(crate::types::Stage::Filter));
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let config = GuildpressConfig::default();
        assert!(config.require_discord().is_err());
        assert!(config.require_ai().is_err());
    }
}

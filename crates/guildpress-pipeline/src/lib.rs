//! The staged processing engine: select candidates from the store,
//! batch them under token and count caps, prompt the LLM, validate,
//! and memoize results, stage by stage, in dependency order.

use std::sync::Arc;

use chrono::NaiveDate;

use guildpress_ai::{
    AiError, ChatClient, CompletionRequest, CompletionResponse, PromptStore, RetryPolicy,
    UsageTracker,
};
use guildpress_core::config::{GuildpressConfig, StagesConfig};
use guildpress_store::{MessageQuery, Store};

mod categorize;
mod engine;
mod enrich;
pub mod error;
mod extract;
mod filter;
mod format;
pub mod report;
mod summarize;

pub use engine::{pipeline_status, reset_stage, run_all, run_stage, StageStatus};
pub use error::PipelineError;
pub use report::{BatchFailure, StageReport};

/// Everything a stage run needs, threaded explicitly so tests can spin
/// up parallel instances with a scripted chat client.
pub struct PipelineContext {
    pub store: Arc<Store>,
    pub chat: Arc<dyn ChatClient>,
    pub prompts: PromptStore,
    pub usage: UsageTracker,
    pub settings: PipelineSettings,
}

/// The slice of config the pipeline consumes.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub model: String,
    pub max_tokens: u32,
    pub batch_size: usize,
    pub max_tokens_per_batch: usize,
    pub retry: RetryPolicy,
    pub reprocess_after_days: Option<u32>,
    pub anonymize: bool,
    pub guild_id: String,
    pub stages: StagesConfig,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl PipelineContext {
    pub fn new(store: Arc<Store>, chat: Arc<dyn ChatClient>, config: &GuildpressConfig) -> Self {
        let prompts = PromptStore::new(config.prompts.dir.as_ref().map(Into::into));
        Self {
            store,
            chat,
            prompts,
            usage: UsageTracker::new(),
            settings: PipelineSettings {
                model: config.ai.model.clone(),
                max_tokens: config.ai.max_tokens,
                batch_size: config.ai.batch_size,
                max_tokens_per_batch: config.ai.max_tokens_per_batch,
                retry: RetryPolicy {
                    max_attempts: config.ai.retry_attempts,
                    base_delay_ms: config.ai.retry_delay_ms,
                    multiplier: config.scraper.backoff_multiplier,
                },
                reprocess_after_days: config.ai.reprocess_after_days,
                anonymize: config.privacy.anonymize_in_prompts,
                guild_id: config.discord.guild_id.clone(),
                stages: config.ai.stages.clone(),
                input_cost_per_1k: config.ai.input_cost_per_1k,
                output_cost_per_1k: config.ai.output_cost_per_1k,
            },
        }
    }

    /// One retried, usage-tracked LLM call.
    pub(crate) async fn complete(&self, prompt: String) -> Result<CompletionResponse, AiError> {
        let req = CompletionRequest {
            model: self.settings.model.clone(),
            prompt,
            max_tokens: self.settings.max_tokens,
        };
        let resp = guildpress_ai::retry::with_retry(&self.settings.retry, |_| {
            self.chat.complete(&req)
        })
        .await?;
        self.usage.record(&resp.model, resp.tokens_in, resp.tokens_out);
        Ok(resp)
    }
}

/// Invocation bounds shared by every stage.
#[derive(Debug, Clone, Default)]
pub struct StageOptions {
    pub channel_id: Option<String>,
    pub since: Option<NaiveDate>,
    pub until: Option<NaiveDate>,
    pub limit: Option<i64>,
    /// Reprocess entities that already have memoized results.
    pub force: bool,
    /// Select and batch, but call nothing and write nothing.
    pub dry_run: bool,
}

impl StageOptions {
    pub(crate) fn message_query(&self) -> MessageQuery {
        MessageQuery {
            channel_id: self.channel_id.clone(),
            since: self.since.map(|d| format!("{d}T00:00:00")),
            until: self.until.map(|d| format!("{d}T23:59:59.999Z")),
            limit: self.limit,
        }
    }
}

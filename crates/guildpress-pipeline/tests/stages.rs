//! Stage engine behavior against an in-memory store and a scripted
//! chat client: filter -> categorize flow, summary keying, retry
//! exhaustion, anonymization, memoization, and dry runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use guildpress_ai::{AiError, ChatClient, CompletionRequest, CompletionResponse};
use guildpress_core::config::GuildpressConfig;
use guildpress_core::types::{
    ChannelRecord, EntityType, ExtractType, GuildRecord, MessageRecord, Stage, UserRecord,
};
use guildpress_pipeline::{run_stage, PipelineContext, StageOptions};
use guildpress_store::{StageResultWrite, Store};

/// Scripted chat client. Responses are picked by sniffing which stage
/// schema the prompt asks for; `fail_with` turns every call into an
/// API error instead.
#[derive(Default)]
struct StubChat {
    filter: Value,
    categorize: Value,
    summary: Value,
    extracts: Value,
    format: Value,
    fail_with: Option<u16>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl ChatClient for StubChat {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(req.prompt.clone());

        if let Some(status) = self.fail_with {
            return Err(AiError::Api {
                status,
                message: "stubbed failure".into(),
            });
        }

        let json = if req.prompt.contains("\"decisions\"") {
            self.filter.clone()
        } else if req.prompt.contains("\"categorizations\"") {
            self.categorize.clone()
        } else if req.prompt.contains("\"extracts\"") {
            self.extracts.clone()
        } else if req.prompt.contains("\"formatted\"") {
            self.format.clone()
        } else {
            self.summary.clone()
        };

        Ok(CompletionResponse {
            json,
            model: "stub-model".into(),
            tokens_in: 10,
            tokens_out: 5,
        })
    }
}

fn seed_store() -> Arc<Store> {
    let store = Store::open_in_memory().unwrap();
    store
        .upsert_guild(&GuildRecord {
            id: "g1".into(),
            name: "Test Guild".into(),
            icon_url: None,
            member_count: Some(5),
        })
        .unwrap();
    store
        .upsert_channel(&ChannelRecord {
            id: "C1".into(),
            guild_id: "g1".into(),
            name: "general".into(),
            kind: 0,
            parent_id: None,
            position: Some(0),
            topic: None,
            last_scraped_message_id: None,
            last_scraped_at: None,
            message_count: 0,
        })
        .unwrap();
    store
        .upsert_user(&UserRecord {
            id: "90001234".into(),
            username: "alice".into(),
            global_name: None,
            discriminator: "0".into(),
            avatar_url: None,
            is_bot: false,
        })
        .unwrap();
    Arc::new(store)
}

fn seed_message(store: &Store, id: &str, ts: &str, content: &str) {
    store
        .upsert_message(&MessageRecord {
            id: id.into(),
            channel_id: "C1".into(),
            author_id: "90001234".into(),
            content: content.into(),
            clean_content: content.into(),
            timestamp: ts.into(),
            edited_timestamp: None,
            message_type: 0,
            reference_id: None,
            thread_id: None,
            has_embeds: false,
            has_attachments: false,
            reaction_count: 0,
        })
        .unwrap();
}

fn mark_filter_kept(store: &Store, id: &str) {
    store
        .record_stage_result(&StageResultWrite {
            entity_type: EntityType::Message,
            entity_id: id,
            stage: Stage::Filter,
            result: &json!({"keep": true}),
            model_used: "seed",
            tokens_in: None,
            tokens_out: None,
        })
        .unwrap();
}

fn config() -> GuildpressConfig {
    let mut config = GuildpressConfig::default();
    config.discord.guild_id = "g1".into();
    config.ai.retry_attempts = 3;
    config.ai.retry_delay_ms = 1;
    config.privacy.anonymize_in_prompts = false;
    config
}

fn context(store: Arc<Store>, chat: Arc<StubChat>, config: &GuildpressConfig) -> PipelineContext {
    PipelineContext::new(store, chat, config)
}

#[tokio::test]
async fn filter_then_categorize_processes_only_kept() {
    let store = seed_store();
    seed_message(&store, "1", "2024-06-15T10:00:00Z", "first real question");
    seed_message(&store, "2", "2024-06-15T11:00:00Z", "lol");
    seed_message(&store, "3", "2024-06-15T12:00:00Z", "release feedback");

    let stub = Arc::new(StubChat {
        filter: json!({"decisions": [
            {"id": "1", "keep": true, "quality_score": 0.8},
            {"id": "2", "keep": false, "reason": "noise"},
            {"id": "3", "keep": true},
        ]}),
        categorize: json!({"categorizations": [
            {"id": "1", "primary_topic": "A", "sentiment": "positive",
             "urgency": "low", "marketing_relevance": "high"},
            {"id": "3", "primary_topic": "B", "sentiment": "neutral",
             "urgency": "low", "marketing_relevance": "medium"},
        ]}),
        ..Default::default()
    });
    let ctx = context(store.clone(), stub.clone(), &config());

    let report = run_stage(&ctx, Stage::Filter, &StageOptions::default())
        .await
        .unwrap();
    assert_eq!(report.kept, 2);
    assert_eq!(report.discarded, 1);
    assert!(report.errors.is_empty());

    let report = run_stage(&ctx, Stage::Categorize, &StageOptions::default())
        .await
        .unwrap();
    assert_eq!(report.candidates, 2);
    assert_eq!(report.processed, 2);
    assert_eq!(report.topics.get("A"), Some(&1));
    assert_eq!(report.topics.get("B"), Some(&1));

    for (id, expected) in [("1", true), ("2", false), ("3", true)] {
        let row = store
            .get_stage_result(EntityType::Message, id, Stage::Categorize)
            .unwrap();
        assert_eq!(row.is_some(), expected, "categorize row presence for {id}");
    }
}

#[tokio::test]
async fn memoized_messages_cost_no_further_calls() {
    let store = seed_store();
    seed_message(&store, "1", "2024-06-15T10:00:00Z", "hello there");

    let stub = Arc::new(StubChat {
        filter: json!({"decisions": [{"id": "1", "keep": true}]}),
        ..Default::default()
    });
    let ctx = context(store, stub.clone(), &config());

    run_stage(&ctx, Stage::Filter, &StageOptions::default())
        .await
        .unwrap();
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

    // Second run: nothing unprocessed, no LLM call.
    let report = run_stage(&ctx, Stage::Filter, &StageOptions::default())
        .await
        .unwrap();
    assert_eq!(report.candidates, 0);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

    // Forced run re-filters.
    let opts = StageOptions {
        force: true,
        ..Default::default()
    };
    run_stage(&ctx, Stage::Filter, &opts).await.unwrap();
    assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn daily_summary_keys_on_channel_and_date() {
    let store = seed_store();
    for i in 1..=5 {
        let ts = format!("2024-06-15T0{i}:00:00Z");
        seed_message(&store, &i.to_string(), &ts, "substantive chat");
        mark_filter_kept(&store, &i.to_string());
    }

    let stub = Arc::new(StubChat {
        summary: json!({"summary": {"headline": "Busy day", "key_points": ["a", "b"]}}),
        ..Default::default()
    });
    let ctx = context(store.clone(), stub.clone(), &config());

    let date = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
    let opts = StageOptions {
        since: Some(date),
        until: Some(date),
        ..Default::default()
    };
    let report = run_stage(&ctx, Stage::Summarize, &opts).await.unwrap();

    let dailies = store
        .stage_results(EntityType::DailySummary, Stage::Summarize)
        .unwrap();
    assert_eq!(dailies.len(), 1);
    assert_eq!(dailies[0].entity_id, "C1:2024-06-15");
    assert_eq!(dailies[0].result["message_count"], json!(5));

    // The containing week (Monday 2024-06-10) was rolled up too.
    let weeklies = store
        .stage_results(EntityType::WeeklySummary, Stage::Summarize)
        .unwrap();
    assert_eq!(weeklies.len(), 1);
    assert_eq!(weeklies[0].entity_id, "g1:week:2024-06-10");
    assert_eq!(report.summaries_written, 2);

    // Re-running the same day is a no-op.
    let calls_before = stub.calls.load(Ordering::SeqCst);
    run_stage(&ctx, Stage::Summarize, &opts).await.unwrap();
    assert_eq!(stub.calls.load(Ordering::SeqCst), calls_before);
}

#[tokio::test]
async fn retry_exhaustion_records_batch_error() {
    let store = seed_store();
    seed_message(&store, "1", "2024-06-15T10:00:00Z", "will never be judged");

    let stub = Arc::new(StubChat {
        fail_with: Some(429),
        ..Default::default()
    });
    let ctx = context(store.clone(), stub.clone(), &config());

    let report = run_stage(&ctx, Stage::Filter, &StageOptions::default())
        .await
        .unwrap();

    // retry_attempts = 3 total calls, then the batch is recorded failed.
    assert_eq!(stub.calls.load(Ordering::SeqCst), 3);
    assert_eq!(report.processed, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].error.contains("429"));
    assert_eq!(report.errors[0].ids, vec!["1".to_string()]);

    // Nothing was persisted; the message is still a candidate.
    assert!(store
        .get_stage_result(EntityType::Message, "1", Stage::Filter)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn anonymized_prompts_still_key_original_ids() {
    let store = seed_store();
    seed_message(
        &store,
        "777",
        "2024-06-15T10:00:00Z",
        "ping @alice about the beta",
    );

    let mut cfg = config();
    cfg.privacy.anonymize_in_prompts = true;
    let stub = Arc::new(StubChat {
        filter: json!({"decisions": [{"id": "777", "keep": true}]}),
        ..Default::default()
    });
    let ctx = context(store.clone(), stub.clone(), &cfg);

    run_stage(&ctx, Stage::Filter, &StageOptions::default())
        .await
        .unwrap();

    let prompts = stub.prompts.lock().unwrap();
    assert!(prompts[0].contains("User_A"));
    assert!(!prompts[0].contains("alice"));
    // The original message id still reaches the model and the store.
    assert!(prompts[0].contains("777"));
    assert!(store
        .get_stage_result(EntityType::Message, "777", Stage::Filter)
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn dry_run_selects_but_never_calls_or_writes() {
    let store = seed_store();
    seed_message(&store, "1", "2024-06-15T10:00:00Z", "content");

    let stub = Arc::new(StubChat::default());
    let ctx = context(store.clone(), stub.clone(), &config());

    let opts = StageOptions {
        dry_run: true,
        ..Default::default()
    };
    let report = run_stage(&ctx, Stage::Filter, &opts).await.unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.batches, 1);
    assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    assert!(store
        .get_stage_result(EntityType::Message, "1", Stage::Filter)
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn extract_applies_type_defaults_and_memoizes() {
    let store = seed_store();
    seed_message(&store, "42", "2024-06-15T10:00:00Z", "I love this tool");
    mark_filter_kept(&store, "42");
    store
        .record_stage_result(&StageResultWrite {
            entity_type: EntityType::Message,
            entity_id: "42",
            stage: Stage::Categorize,
            result: &json!({"primary_topic": "praise", "marketing_relevance": "high"}),
            model_used: "seed",
            tokens_in: None,
            tokens_out: None,
        })
        .unwrap();

    let stub = Arc::new(StubChat {
        extracts: json!({"extracts": [
            {"id": "42", "type": "quote", "content": "I love this tool", "relevance_score": 0.9}
        ]}),
        format: json!({"formatted": "“I love this tool” — community member"}),
        ..Default::default()
    });
    let ctx = context(store.clone(), stub.clone(), &config());

    let report = run_stage(&ctx, Stage::Extract, &StageOptions::default())
        .await
        .unwrap();
    // All three sub-extractors returned the stubbed item.
    assert_eq!(report.extracts_by_type.len(), 3);

    let quotes = store.list_extracts(Some(ExtractType::Quote), 10).unwrap();
    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes[0].sentiment, "positive");
    assert!(quotes[0].requires_permission);
    assert_eq!(quotes[0].topics, vec!["praise".to_string()]);

    let announcements = store
        .list_extracts(Some(ExtractType::Announcement), 10)
        .unwrap();
    assert_eq!(announcements[0].sentiment, "neutral");
    assert!(!announcements[0].requires_permission);

    // The source message is memoized and leaves the candidate pool.
    assert!(store
        .get_stage_result(EntityType::Message, "42", Stage::Extract)
        .unwrap()
        .is_some());
    let rerun = run_stage(&ctx, Stage::Extract, &StageOptions::default())
        .await
        .unwrap();
    assert_eq!(rerun.candidates, 0);

    // Format fills in channel-ready copy for everything pending.
    let report = run_stage(&ctx, Stage::Format, &StageOptions::default())
        .await
        .unwrap();
    assert_eq!(report.processed, 3);
    assert!(store.pending_format_extracts(10).unwrap().is_empty());
}

#[tokio::test]
async fn malformed_response_fails_batch_without_poisoning_run() {
    let store = seed_store();
    seed_message(&store, "1", "2024-06-15T10:00:00Z", "hello");

    // Missing required "keep" field.
    let stub = Arc::new(StubChat {
        filter: json!({"decisions": [{"id": "1"}]}),
        ..Default::default()
    });
    let ctx = context(store.clone(), stub.clone(), &config());

    let report = run_stage(&ctx, Stage::Filter, &StageOptions::default())
        .await
        .unwrap();
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.processed, 0);
    // Validation failures are terminal for the batch: one call, no retry.
    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
}

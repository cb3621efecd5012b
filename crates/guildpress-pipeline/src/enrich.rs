use guildpress_ai::{Anonymizer, PromptMessage};
use guildpress_store::MessageWithAuthor;

/// Build the prompt payload for one message row. Clean content is
/// preferred; raw content fills in when it is empty.
pub(crate) fn prompt_message(row: &MessageWithAuthor) -> PromptMessage {
    let content = if row.message.clean_content.is_empty() {
        row.message.content.clone()
    } else {
        row.message.clean_content.clone()
    };
    PromptMessage {
        id: row.message.id.clone(),
        author_id: row.message.author_id.clone(),
        author_name: row.author.username.clone(),
        author_global_name: row.author.global_name.clone(),
        content,
        timestamp: row.message.timestamp.clone(),
        channel_name: None,
        reaction_count: row.message.reaction_count,
        has_embeds: row.message.has_embeds,
        has_attachments: row.message.has_attachments,
    }
}

/// Prompt payload for a batch. Anonymization is scoped to the batch:
/// a fresh alias mapping per prompt, stable within it.
pub(crate) fn prepare_batch(rows: &[MessageWithAuthor], anonymize: bool) -> Vec<PromptMessage> {
    let mut messages: Vec<PromptMessage> = rows.iter().map(prompt_message).collect();
    if anonymize {
        let mut anonymizer = Anonymizer::new();
        anonymizer.anonymize_messages(&mut messages, true);
    }
    messages
}

/// Token estimate for batching: the JSON encoding the prompt will carry.
pub(crate) fn estimate_row(row: &MessageWithAuthor) -> usize {
    let as_prompt = prompt_message(row);
    serde_json::to_string(&as_prompt)
        .map(|s| guildpress_ai::budget::estimate_tokens(&s))
        .unwrap_or(1)
}

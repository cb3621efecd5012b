use std::collections::HashMap;

use serde::Serialize;

/// The message shape the pipeline serializes into prompts. Built from
/// store rows by the stage engine; the `id` always stays the original
/// Discord id so results key back onto real rows.
#[derive(Debug, Clone, Serialize)]
pub struct PromptMessage {
    pub id: String,
    pub author_id: String,
    pub author_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_global_name: Option<String>,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    pub reaction_count: i64,
    pub has_embeds: bool,
    pub has_attachments: bool,
}

/// Session-scoped username -> alias mapper.
///
/// Aliases are handed out in sequence `User_A … User_Z, User_A1 …` and
/// are stable within one mapper instance, which the pipeline scopes to
/// a single prompt: the same author appearing twice in a batch gets the
/// same alias, while a new batch starts fresh.
#[derive(Debug, Default)]
pub struct Anonymizer {
    aliases: HashMap<String, String>,
    next: usize,
}

impl Anonymizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for a username, allocating the next one on first sight.
    pub fn alias(&mut self, username: &str) -> String {
        if let Some(existing) = self.aliases.get(username) {
            return existing.clone();
        }
        let alias = alias_for_index(self.next);
        self.next += 1;
        self.aliases.insert(username.to_string(), alias.clone());
        alias
    }

    pub fn reset(&mut self) {
        self.aliases.clear();
        self.next = 0;
    }

    /// Replace author identity in-place across a batch. Usernames and
    /// global names become aliases, author ids collapse to
    /// `anon_<last4>`, and with `anonymize_content` set, `@name`
    /// mentions inside the text are rewritten through the same mapping.
    pub fn anonymize_messages(&mut self, messages: &mut [PromptMessage], anonymize_content: bool) {
        // Allocate aliases for every author first so content rewriting
        // sees the complete mapping regardless of message order. A
        // global name is the same person as the username, so it maps to
        // the username's alias rather than consuming a slot of its own.
        for msg in messages.iter() {
            let alias = self.alias(&msg.author_name);
            if let Some(global) = &msg.author_global_name {
                self.aliases
                    .entry(global.clone())
                    .or_insert_with(|| alias.clone());
            }
        }

        let mapping: Vec<(String, String)> = self
            .aliases
            .iter()
            .map(|(name, alias)| (name.clone(), alias.clone()))
            .collect();

        for msg in messages.iter_mut() {
            let alias = self.alias(&msg.author_name.clone());
            if anonymize_content {
                for (name, mapped) in &mapping {
                    let needle = format!("@{name}");
                    if msg.content.contains(&needle) {
                        msg.content = msg.content.replace(&needle, &format!("@{mapped}"));
                    }
                }
            }
            msg.author_global_name = msg.author_global_name.as_ref().map(|_| alias.clone());
            msg.author_name = alias;
            msg.author_id = format!("anon_{}", id_suffix(&msg.author_id));
        }
    }
}

fn alias_for_index(index: usize) -> String {
    let letter = (b'A' + (index % 26) as u8) as char;
    let round = index / 26;
    if round == 0 {
        format!("User_{letter}")
    } else {
        format!("User_{letter}{round}")
    }
}

fn id_suffix(id: &str) -> &str {
    let start = id.len().saturating_sub(4);
    // Snowflake ids are ASCII digits, so byte slicing is safe.
    &id[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: &str, author_id: &str, author: &str, content: &str) -> PromptMessage {
        PromptMessage {
            id: id.into(),
            author_id: author_id.into(),
            author_name: author.into(),
            author_global_name: None,
            content: content.into(),
            timestamp: "2024-06-15T10:00:00Z".into(),
            channel_name: None,
            reaction_count: 0,
            has_embeds: false,
            has_attachments: false,
        }
    }

    #[test]
    fn same_user_same_alias_distinct_users_distinct() {
        let mut anon = Anonymizer::new();
        assert_eq!(anon.alias("alice"), "User_A");
        assert_eq!(anon.alias("bob"), "User_B");
        assert_eq!(anon.alias("alice"), "User_A");
    }

    #[test]
    fn sequence_wraps_past_z() {
        let mut anon = Anonymizer::new();
        for i in 0..26 {
            anon.alias(&format!("user{i}"));
        }
        assert_eq!(anon.alias("one-more"), "User_A1");
        assert_eq!(anon.alias("another"), "User_B1");
    }

    #[test]
    fn reset_clears_state() {
        let mut anon = Anonymizer::new();
        anon.alias("alice");
        anon.reset();
        assert_eq!(anon.alias("bob"), "User_A");
    }

    #[test]
    fn batch_rewrite_preserves_ids() {
        let mut anon = Anonymizer::new();
        let mut batch = vec![
            msg("1001", "9991234", "alice", "ping @bob are you there"),
            msg("1002", "8885678", "bob", "yes @alice"),
            msg("1003", "9991234", "alice", "great"),
        ];
        anon.anonymize_messages(&mut batch, true);

        assert_eq!(batch[0].author_name, "User_A");
        assert_eq!(batch[1].author_name, "User_B");
        assert_eq!(batch[2].author_name, "User_A");
        assert_eq!(batch[0].author_id, "anon_1234");
        assert_eq!(batch[1].author_id, "anon_5678");
        assert_eq!(batch[0].content, "ping @User_B are you there");
        assert_eq!(batch[1].content, "yes @User_A");

        // Message ids are untouched; results must key on real rows.
        assert_eq!(batch[0].id, "1001");

        let serialized = serde_json::to_string(&batch).unwrap();
        assert!(!serialized.contains("alice"));
        assert!(!serialized.contains("bob"));
    }

    #[test]
    fn global_name_shares_the_username_alias() {
        let mut anon = Anonymizer::new();
        let mut batch = vec![
            PromptMessage {
                author_global_name: Some("Alice Vega".into()),
                ..msg("1", "9991234", "alice", "thanks @Alice Vega!")
            },
            msg("2", "8885678", "bob", "seconding @alice"),
        ];
        anon.anonymize_messages(&mut batch, true);

        // One person, one alias, across username, global name, and
        // in-content mentions of either.
        assert_eq!(batch[0].author_name, "User_A");
        assert_eq!(batch[0].author_global_name.as_deref(), Some("User_A"));
        assert_eq!(batch[0].content, "thanks @User_A!");
        assert_eq!(batch[1].content, "seconding @User_A");

        // The global name did not consume an alias slot: the next
        // distinct author is still User_B.
        assert_eq!(batch[1].author_name, "User_B");

        let serialized = serde_json::to_string(&batch).unwrap();
        assert!(!serialized.contains("alice"));
        assert!(!serialized.contains("Alice Vega"));
    }

    #[test]
    fn content_left_alone_when_disabled() {
        let mut anon = Anonymizer::new();
        let mut batch = vec![msg("1", "123456", "alice", "cc @bob")];
        anon.anonymize_messages(&mut batch, false);
        assert_eq!(batch[0].content, "cc @bob");
        assert_eq!(batch[0].author_name, "User_A");
    }
}

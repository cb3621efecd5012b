use std::time::Duration;

use async_stream::try_stream;
use futures_util::Stream;

use crate::error::ScrapeError;
use crate::source::{MessageBundle, MessageSource, PageRequest};

/// Upstream page size cap.
pub const PAGE_SIZE: u8 = 100;

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Resume point: walk forward from this id (exclusive).
    pub after: Option<String>,
    /// Walk backward from this id (exclusive) instead of from newest.
    pub before: Option<String>,
    /// Total message cap across all pages.
    pub limit: Option<usize>,
    /// Sleep between underlying requests, milliseconds.
    pub delay_ms: u64,
}

/// Lazily walk a channel's history as a finite stream of bundles.
///
/// With `after` set the walk is incremental: pages move oldest to
/// newest from the cursor. Otherwise pages move newest to oldest,
/// anchored by `before` updated to the oldest id of each batch. Within
/// every page, bundles are yielded in descending timestamp order. The
/// walk ends on an empty page, a short page, or once `limit` bundles
/// have been yielded.
pub fn fetch_messages<'a, S>(
    source: &'a S,
    channel_id: &'a str,
    opts: FetchOptions,
) -> impl Stream<Item = Result<MessageBundle, ScrapeError>> + 'a
where
    S: MessageSource + ?Sized,
{
    try_stream! {
        let incremental = opts.after.is_some();
        let mut after = opts.after.clone();
        let mut before = opts.before.clone();
        let mut yielded = 0usize;
        let mut first = true;

        loop {
            let page_size = match opts.limit {
                Some(limit) => {
                    let remaining = limit.saturating_sub(yielded);
                    if remaining == 0 {
                        break;
                    }
                    remaining.min(usize::from(PAGE_SIZE)) as u8
                }
                None => PAGE_SIZE,
            };

            if !first {
                tokio::time::sleep(Duration::from_millis(opts.delay_ms)).await;
            }
            first = false;

            let page = PageRequest {
                after: after.clone(),
                before: before.clone(),
                limit: page_size,
            };
            let mut batch = source.fetch_page(channel_id, &page).await?;
            if batch.is_empty() {
                break;
            }

            // Newest first within the page, whatever the source returned.
            batch.sort_by(|a, b| b.message.timestamp.cmp(&a.message.timestamp));

            if incremental {
                after = batch.iter().map(|b| b.message.id.clone()).max();
            } else {
                before = batch.iter().map(|b| b.message.id.clone()).min();
            }

            let batch_len = batch.len();
            for item in batch {
                yield item;
                yielded += 1;
                if opts.limit.is_some_and(|limit| yielded >= limit) {
                    break;
                }
            }
            if opts.limit.is_some_and(|limit| yielded >= limit) {
                break;
            }
            // A short page means the history is exhausted.
            if batch_len < usize::from(page_size) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PageRequest;
    use async_trait::async_trait;
    use futures_util::TryStreamExt;
    use guildpress_core::types::{GuildRecord, MessageRecord, UserRecord};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bundle(id: u64) -> MessageBundle {
        MessageBundle {
            message: MessageRecord {
                id: format!("{id:04}"),
                channel_id: "c1".into(),
                author_id: "u1".into(),
                content: format!("msg {id}"),
                clean_content: format!("msg {id}"),
                timestamp: format!("2024-06-15T00:00:{:02}.{:03}Z", id / 1000, id % 1000),
                edited_timestamp: None,
                message_type: 0,
                reference_id: None,
                thread_id: None,
                has_embeds: false,
                has_attachments: false,
                reaction_count: 0,
            },
            author: UserRecord {
                id: "u1".into(),
                username: "alice".into(),
                global_name: None,
                discriminator: "0".into(),
                avatar_url: None,
                is_bot: false,
            },
            embeds: vec![],
            attachments: vec![],
            reactions: vec![],
        }
    }

    /// In-memory history with Discord pagination semantics: `after`
    /// returns the oldest messages past the cursor, `before` the newest
    /// ones under it, both newest-first within the page.
    struct FixtureSource {
        /// Ascending by id.
        history: Vec<MessageBundle>,
        pages_served: AtomicUsize,
    }

    impl FixtureSource {
        fn new(ids: impl IntoIterator<Item = u64>) -> Self {
            let mut history: Vec<MessageBundle> = ids.into_iter().map(bundle).collect();
            history.sort_by(|a, b| a.message.id.cmp(&b.message.id));
            Self {
                history,
                pages_served: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MessageSource for FixtureSource {
        async fn fetch_guild(&self, guild_id: &str) -> Result<GuildRecord, ScrapeError> {
            Ok(GuildRecord {
                id: guild_id.into(),
                name: "fixture".into(),
                icon_url: None,
                member_count: None,
            })
        }

        async fn list_text_channels(
            &self,
            _guild_id: &str,
        ) -> Result<Vec<guildpress_core::types::ChannelRecord>, ScrapeError> {
            Ok(vec![])
        }

        async fn fetch_page(
            &self,
            _channel_id: &str,
            page: &PageRequest,
        ) -> Result<Vec<MessageBundle>, ScrapeError> {
            self.pages_served.fetch_add(1, Ordering::SeqCst);
            let limit = usize::from(page.limit);
            let mut selected: Vec<MessageBundle> = match (&page.after, &page.before) {
                (Some(after), _) => self
                    .history
                    .iter()
                    .filter(|b| b.message.id.as_str() > after.as_str())
                    .take(limit)
                    .cloned()
                    .collect(),
                (None, Some(before)) => {
                    let older: Vec<_> = self
                        .history
                        .iter()
                        .filter(|b| b.message.id.as_str() < before.as_str())
                        .cloned()
                        .collect();
                    older[older.len().saturating_sub(limit)..].to_vec()
                }
                (None, None) => {
                    let len = self.history.len();
                    self.history[len.saturating_sub(limit)..].to_vec()
                }
            };
            selected.reverse();
            Ok(selected)
        }
    }

    fn ids(bundles: &[MessageBundle]) -> Vec<String> {
        bundles.iter().map(|b| b.message.id.clone()).collect()
    }

    #[tokio::test]
    async fn cold_scrape_pages_backward_through_everything() {
        let source = FixtureSource::new(1..=250);
        let all: Vec<MessageBundle> =
            fetch_messages(&source, "c1", FetchOptions::default())
                .try_collect()
                .await
                .unwrap();

        assert_eq!(all.len(), 250);
        // Three pages: 100 + 100 + 50.
        assert_eq!(source.pages_served.load(Ordering::SeqCst), 3);
        // Newest first overall on a cold walk.
        assert_eq!(all[0].message.id, "0250");
        assert_eq!(all.last().unwrap().message.id, "0001");
    }

    #[tokio::test]
    async fn incremental_walks_forward_from_cursor() {
        let source = FixtureSource::new(1..=250);
        let opts = FetchOptions {
            after: Some("0200".into()),
            ..Default::default()
        };
        let all: Vec<MessageBundle> = fetch_messages(&source, "c1", opts)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(all.len(), 50);
        let got = ids(&all);
        assert!(got.iter().all(|id| id.as_str() > "0200"));
        // Page order is oldest chunk first; within the page newest first.
        assert_eq!(got[0], "0250");
    }

    #[tokio::test]
    async fn empty_upstream_ends_immediately() {
        let source = FixtureSource::new(1..=10);
        let opts = FetchOptions {
            after: Some("0010".into()),
            ..Default::default()
        };
        let all: Vec<MessageBundle> = fetch_messages(&source, "c1", opts)
            .try_collect()
            .await
            .unwrap();
        assert!(all.is_empty());
        assert_eq!(source.pages_served.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn limit_caps_the_walk() {
        let source = FixtureSource::new(1..=250);
        let opts = FetchOptions {
            limit: Some(120),
            ..Default::default()
        };
        let all: Vec<MessageBundle> = fetch_messages(&source, "c1", opts)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 120);
        // 100 then a 20-message page.
        assert_eq!(source.pages_served.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn within_page_order_is_descending_time() {
        let source = FixtureSource::new(1..=30);
        let all: Vec<MessageBundle> =
            fetch_messages(&source, "c1", FetchOptions::default())
                .try_collect()
                .await
                .unwrap();
        for pair in all.windows(2) {
            assert!(pair[0].message.timestamp >= pair[1].message.timestamp);
        }
    }
}

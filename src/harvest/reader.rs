//! Feed page reader: every card on the current results page, read,
//! harvested and written to the store one card at a time.

use std::collections::HashSet;

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, trace, warn};

use super::links::card_author_id;
use super::session::ThreadOutcome;
use super::Harvester;
use crate::browser::Renderer;
use crate::db::{self, Actor, Comment, Database, Post};
use crate::error::HarvestError;
use crate::timestamp::normalize_timestamp_on;

/// Card fields readable from the results page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardMetadata {
    pub post_id: String,
    pub top_label: String,
    pub author_id: String,
    pub display_name: String,
    pub avatar_url: String,
    pub source_client: String,
}

/// Everything one card contributes to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRecords {
    pub actors: Vec<Actor>,
    pub post: Post,
    pub comments: Vec<Comment>,
}

/// Tally of one results page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageReport {
    /// Cards with a post id.
    pub cards_seen: usize,
    pub cards_persisted: usize,
    pub cards_failed: usize,
    pub comments_captured: usize,
}

/// Build the store records for a card. Actors without an id are left out;
/// comment authors are deduplicated by id. Timestamps that cannot be
/// normalized are kept as rendered.
#[must_use]
pub fn assemble_records(meta: CardMetadata, outcome: ThreadOutcome, today: NaiveDate) -> CardRecords {
    let normalize = |raw: &str| {
        normalize_timestamp_on(raw, today).unwrap_or_else(|e| {
            trace!(error = %e, "Keeping raw timestamp");
            raw.to_string()
        })
    };

    let mut actors = Vec::new();
    let mut actor_ids = HashSet::new();
    if !meta.author_id.is_empty() {
        actor_ids.insert(meta.author_id.clone());
        actors.push(Actor {
            id: meta.author_id.clone(),
            display_name: meta.display_name,
            avatar_url: meta.avatar_url,
        });
    }

    let (timestamp, content) = outcome
        .detail
        .map(|detail| (normalize(&detail.timestamp), detail.content))
        .unwrap_or_default();

    let harvested = outcome.thread.into_comments();
    let mut comments = Vec::with_capacity(harvested.len());
    for comment in harvested {
        if !comment.author_id.is_empty() && actor_ids.insert(comment.author_id.clone()) {
            actors.push(Actor {
                id: comment.author_id.clone(),
                display_name: comment.display_name,
                avatar_url: comment.avatar_url,
            });
        }
        comments.push(Comment {
            post_id: meta.post_id.clone(),
            author_id: comment.author_id,
            timestamp: normalize(&comment.raw_timestamp),
            content: comment.content,
        });
    }

    CardRecords {
        actors,
        post: Post {
            id: meta.post_id,
            author_id: meta.author_id,
            top_label: meta.top_label,
            source_client: meta.source_client,
            timestamp,
            content,
        },
        comments,
    }
}

/// Write a card's records, post before its comments.
///
/// # Errors
///
/// Returns `HarvestError::Storage` for the first batch that fails. Batches
/// committed before it stay committed.
pub async fn persist_card(db: &Database, records: &CardRecords) -> Result<(), HarvestError> {
    let pool = db.pool();
    db::put_actors(pool, &records.actors)
        .await
        .map_err(|e| HarvestError::storage(&e))?;
    db::put_posts(pool, std::slice::from_ref(&records.post))
        .await
        .map_err(|e| HarvestError::storage(&e))?;
    db::put_comments(pool, &records.comments)
        .await
        .map_err(|e| HarvestError::storage(&e))?;
    Ok(())
}

impl<R: Renderer> Harvester<'_, R> {
    /// Read every feed card on the current page and persist each one.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Browser` if the card list itself cannot be read.
    /// Per-card failures are logged and counted instead.
    pub async fn read_page(&self, db: &Database) -> Result<PageReport, HarvestError> {
        let items = self.renderer.find_all(&self.selectors.feed_item).await?;
        debug!(cards = items.len(), "Reading results page");

        let mut report = PageReport::default();
        for item in &items {
            if self.cancel.is_cancelled() {
                debug!("Page read cancelled");
                break;
            }

            let Some((meta, card_feed)) = self.read_card(item).await else {
                continue;
            };
            report.cards_seen += 1;

            let outcome = match &card_feed {
                Some(card_feed) => self.harvest_card_thread(card_feed, &meta.post_id).await,
                None => ThreadOutcome::default(),
            };
            report.comments_captured += outcome.thread.comments().len();

            let post_id = meta.post_id.clone();
            let records = assemble_records(meta, outcome, Local::now().date_naive());
            match persist_card(db, &records).await {
                Ok(()) => {
                    info!(
                        post_id = %post_id,
                        comments = records.comments.len(),
                        "Card stored"
                    );
                    report.cards_persisted += 1;
                }
                Err(e) => {
                    error!(post_id = %post_id, error = %e, "Failed to store card");
                    report.cards_failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Card metadata plus the card body node, or `None` when the item has no post id.
    async fn read_card(&self, item: &R::Node) -> Option<(CardMetadata, Option<R::Node>)> {
        let selectors = self.selectors;
        let post_id = self
            .renderer
            .attribute(item, &selectors.post_id_attr)
            .await
            .ok()
            .flatten()
            .filter(|id| !id.is_empty())?;

        let mut meta = CardMetadata {
            top_label: self
                .text_within(item, &selectors.card_top)
                .await
                .unwrap_or_default(),
            post_id,
            ..CardMetadata::default()
        };

        let card = self.renderer.find_within(item, &selectors.card).await.ok().flatten();
        let Some(card) = card else {
            debug!(post_id = %meta.post_id, "Card has no body");
            return Some((meta, None));
        };
        let card_feed = self
            .renderer
            .find_within(&card, &selectors.card_feed)
            .await
            .ok()
            .flatten();
        let Some(card_feed) = card_feed else {
            warn!(post_id = %meta.post_id, "Card has no feed section");
            return Some((meta, None));
        };

        self.read_author(&card_feed, &mut meta).await;
        meta.source_client = self.read_source_client(&card_feed, &meta.post_id).await;

        Some((meta, Some(card_feed)))
    }

    async fn read_author(&self, card_feed: &R::Node, meta: &mut CardMetadata) {
        let selectors = self.selectors;

        match self.renderer.find_within(card_feed, &selectors.avatar).await {
            Ok(Some(avatar)) => {
                match self.attribute_within(&avatar, &selectors.link, "href").await {
                    Some(href) => meta.author_id = card_author_id(&href).unwrap_or_default(),
                    None => warn!(post_id = %meta.post_id, "Card has no author link"),
                }
                match self.attribute_within(&avatar, &selectors.image, "src").await {
                    Some(src) => meta.avatar_url = src,
                    None => warn!(post_id = %meta.post_id, "Card has no avatar image"),
                }
            }
            _ => warn!(post_id = %meta.post_id, "Card has no avatar"),
        }

        match self.renderer.find_within(card_feed, &selectors.name).await {
            Ok(Some(name)) => {
                meta.display_name = self
                    .renderer
                    .attribute(&name, &selectors.nick_name_attr)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default();
            }
            _ => warn!(post_id = %meta.post_id, "Card has no display name"),
        }
    }

    /// The source block holds the post link and, when present, a trailing
    /// client link whose text is the source client.
    async fn read_source_client(&self, card_feed: &R::Node, post_id: &str) -> String {
        let selectors = self.selectors;

        let Ok(Some(source)) = self.renderer.find_within(card_feed, &selectors.source).await else {
            warn!(post_id, "Card has no source block");
            return String::new();
        };
        let links = self
            .renderer
            .find_all_within(&source, &selectors.link)
            .await
            .unwrap_or_default();
        match links.as_slice() {
            [_, .., client] => self.renderer.text(client).await.unwrap_or_default(),
            _ => String::new(),
        }
    }
}

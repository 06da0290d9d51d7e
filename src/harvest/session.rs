//! Thread harvesting session: one post's detail context, opened from its
//! feed card, read, harvested and torn down.

use tracing::{debug, warn};

use super::links::resource_identity;
use super::list::ThreadState;
use super::Harvester;
use crate::browser::{sleep_or_cancel, wait_until, Renderer, WaitCondition};
use crate::error::HarvestError;

/// Post fields only available in the detail context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDetail {
    /// Raw timestamp text as rendered.
    pub timestamp: String,
    pub content: String,
}

/// Result of a session. `detail` is `None` when the detail context never
/// materialized, in which case the thread is empty.
#[derive(Debug, Default)]
pub struct ThreadOutcome {
    pub detail: Option<PostDetail>,
    pub thread: ThreadState,
}

impl<R: Renderer> Harvester<'_, R> {
    /// Open the detail context of the card, harvest it and return to the
    /// originating context. Failures are logged and yield an empty outcome.
    pub async fn harvest_card_thread(&self, card_feed: &R::Node, post_id: &str) -> ThreadOutcome {
        let selectors = self.selectors;

        let anchor = match self.renderer.find_within(card_feed, &selectors.source).await {
            Ok(Some(source)) => self
                .renderer
                .find_within(&source, &selectors.link)
                .await
                .ok()
                .flatten(),
            _ => None,
        };
        let Some(anchor) = anchor else {
            warn!(post_id, "Card has no detail link");
            return ThreadOutcome::default();
        };
        let Some(href) = self.renderer.attribute(&anchor, "href").await.ok().flatten() else {
            warn!(post_id, "Detail link has no href");
            return ThreadOutcome::default();
        };
        let identity = resource_identity(&href).to_string();

        let (origin, preexisting) = match (
            self.renderer.current_context_id().await,
            self.renderer.open_contexts().await,
        ) {
            (Ok(origin), Ok(preexisting)) => (origin, preexisting),
            (Err(e), _) | (_, Err(e)) => {
                warn!(post_id, error = %e, "Failed to read open contexts");
                return ThreadOutcome::default();
            }
        };

        if let Err(e) = self.renderer.send_key_enter(&anchor).await {
            warn!(post_id, error = %e, "Failed to open detail context");
            return ThreadOutcome::default();
        }

        let outcome = self.visit_detail(&preexisting, &identity, post_id).await;
        self.restore_origin(&origin, &preexisting).await;
        outcome
    }

    async fn visit_detail(
        &self,
        preexisting: &[String],
        identity: &str,
        post_id: &str,
    ) -> ThreadOutcome {
        let selectors = self.selectors;
        let config = self.config;

        if !sleep_or_cancel(config.context_settle, self.cancel).await {
            return ThreadOutcome::default();
        }

        let opened = match self.renderer.open_contexts().await {
            Ok(contexts) => contexts
                .into_iter()
                .rev()
                .find(|id| !preexisting.contains(id)),
            Err(e) => {
                warn!(post_id, error = %e, "Failed to list contexts");
                None
            }
        };
        let Some(detail) = opened else {
            warn!(post_id, "Detail context did not open");
            return ThreadOutcome::default();
        };
        if let Err(e) = self.renderer.switch_to_context(&detail).await {
            warn!(post_id, context = %detail, error = %e, "Failed to switch to detail context");
            return ThreadOutcome::default();
        }

        let loaded = WaitCondition::AttributeContains {
            selector: selectors.detail_time.clone(),
            attribute: "href".to_string(),
            needle: identity.to_string(),
        };
        match wait_until(
            self.renderer,
            &loaded,
            config.detail_timeout,
            config.poll_interval,
            self.cancel,
        )
        .await
        {
            Ok(()) => {}
            Err(HarvestError::Cancelled) => return ThreadOutcome::default(),
            Err(e) => {
                warn!(post_id, link = %identity, error = %e, "Detail context did not load, skipping comments");
                return ThreadOutcome::default();
            }
        }

        let timestamp = self.page_text(&selectors.detail_time, post_id).await;
        let content = self.page_text(&selectors.detail_text, post_id).await;
        debug!(post_id, timestamp = %timestamp, "Reading comment thread");

        let thread = self.harvest_thread(ThreadState::new()).await;
        ThreadOutcome {
            detail: Some(PostDetail { timestamp, content }),
            thread,
        }
    }

    /// Text of the first page-level match, empty (and logged) when absent.
    async fn page_text(&self, selector: &str, post_id: &str) -> String {
        match self.renderer.find_one(selector).await {
            Ok(Some(node)) => self.renderer.text(&node).await.unwrap_or_default(),
            Ok(None) => {
                warn!(post_id, selector, "Detail context has no such node");
                String::new()
            }
            Err(e) => {
                warn!(post_id, selector, error = %e, "Lookup failed");
                String::new()
            }
        }
    }

    /// Close every context opened since `preexisting` was taken and focus `origin`.
    async fn restore_origin(&self, origin: &str, preexisting: &[String]) {
        if let Ok(current) = self.renderer.current_context_id().await {
            if current != origin {
                if let Err(e) = self.renderer.close_current_context().await {
                    warn!(context = %current, error = %e, "Failed to close detail context");
                }
            }
        }

        if let Ok(open) = self.renderer.open_contexts().await {
            for stray in open.iter().filter(|id| !preexisting.contains(id)) {
                debug!(context = %stray, "Closing leftover context");
                if self.renderer.switch_to_context(stray).await.is_ok() {
                    if let Err(e) = self.renderer.close_current_context().await {
                        warn!(context = %stray, error = %e, "Failed to close leftover context");
                    }
                }
            }
        }

        if let Err(e) = self.renderer.switch_to_context(origin).await {
            warn!(context = %origin, error = %e, "Failed to return to originating context");
        }
    }
}

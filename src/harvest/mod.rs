//! Harvesting pipeline.
//!
//! Leaf first:
//! - [`list`]: virtualized comment list harvester (poll loop, dedup, stall recovery)
//! - [`session`]: opens a post's detail context and runs the list harvester in it
//! - [`reader`]: reads every feed card on a results page and persists it
//! - [`pagination`]: search bootstrap and the results page loop
//!
//! All stages share one [`Harvester`], which borrows the renderer, the
//! selectors, the tunables and the cancellation token.

pub mod comment;
pub mod links;
pub mod list;
pub mod pagination;
pub mod reader;
pub mod session;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::browser::Renderer;
use crate::constants::Selectors;

pub use list::{HarvestedComment, Phase, PollSignals, StallAction, StallTimers, ThreadState};
pub use pagination::CrawlSummary;
pub use reader::{CardRecords, PageReport};
pub use session::{PostDetail, ThreadOutcome};

/// Timing and scrolling tunables for the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestConfig {
    pub poll_interval: Duration,
    pub stall_threshold: Duration,
    /// Initial refresh threshold; doubles every time a refresh fires.
    pub refresh_threshold: Duration,
    pub scroll_step_px: i64,
    pub jostle_step_px: i64,
    pub retry_delay: Duration,
    pub refresh_cooldown: Duration,
    pub context_settle: Duration,
    pub detail_timeout: Duration,
    pub search_timeout: Duration,
    pub page_timeout: Duration,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            stall_threshold: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(120),
            scroll_step_px: 200,
            jostle_step_px: 500,
            retry_delay: Duration::from_millis(1000),
            refresh_cooldown: Duration::from_secs(5),
            context_settle: Duration::from_millis(2000),
            detail_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(10),
            page_timeout: Duration::from_secs(15),
        }
    }
}

/// Drives the pipeline against one renderer.
pub struct Harvester<'a, R: Renderer> {
    renderer: &'a R,
    selectors: &'a Selectors,
    config: &'a HarvestConfig,
    cancel: &'a CancellationToken,
}

impl<'a, R: Renderer> Harvester<'a, R> {
    #[must_use]
    pub fn new(
        renderer: &'a R,
        selectors: &'a Selectors,
        config: &'a HarvestConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            renderer,
            selectors,
            config,
            cancel,
        }
    }

    /// Text of the first `selector` match inside `node`, if any.
    async fn text_within(&self, node: &R::Node, selector: &str) -> Option<String> {
        match self.renderer.find_within(node, selector).await {
            Ok(Some(found)) => self.renderer.text(&found).await.ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(selector, error = %e, "Lookup failed");
                None
            }
        }
    }

    /// Attribute of the first `selector` match inside `node`, if any.
    async fn attribute_within(
        &self,
        node: &R::Node,
        selector: &str,
        attribute: &str,
    ) -> Option<String> {
        match self.renderer.find_within(node, selector).await {
            Ok(Some(found)) => self
                .renderer
                .attribute(&found, attribute)
                .await
                .ok()
                .flatten(),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(selector, error = %e, "Lookup failed");
                None
            }
        }
    }
}

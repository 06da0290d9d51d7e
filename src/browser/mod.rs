//! Abstraction over the live browser.
//!
//! The harvesting logic only talks to a [`Renderer`]: it locates nodes by
//! CSS selector, reads their attributes and text, and drives the page with
//! clicks, key presses, scrolls and context switches. [`chromium`] backs it
//! with a real Chromium attached over DevTools; `scripted` (built for tests
//! and under the `test-support` feature) replays canned page states.

pub mod chromium;
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::HarvestError;

pub use chromium::ChromiumRenderer;
#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedRenderer;

/// Read and drive a rendered page.
///
/// A lookup that matches nothing is `Ok(None)` / an empty vector, never an
/// error. Errors are reserved for a broken browser connection.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Handle to a node in the current context.
    type Node: Send + Sync;

    async fn find_one(&self, selector: &str) -> Result<Option<Self::Node>, HarvestError>;
    async fn find_all(&self, selector: &str) -> Result<Vec<Self::Node>, HarvestError>;
    async fn find_within(
        &self,
        node: &Self::Node,
        selector: &str,
    ) -> Result<Option<Self::Node>, HarvestError>;
    async fn find_all_within(
        &self,
        node: &Self::Node,
        selector: &str,
    ) -> Result<Vec<Self::Node>, HarvestError>;

    async fn attribute(
        &self,
        node: &Self::Node,
        name: &str,
    ) -> Result<Option<String>, HarvestError>;
    /// Visible text of the node, empty when it has none.
    async fn text(&self, node: &Self::Node) -> Result<String, HarvestError>;

    async fn click(&self, node: &Self::Node) -> Result<(), HarvestError>;
    async fn send_key_enter(&self, node: &Self::Node) -> Result<(), HarvestError>;
    /// Scroll the current context by the given pixel deltas. Positive `dy` is forward.
    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), HarvestError>;
    async fn refresh_page(&self) -> Result<(), HarvestError>;

    async fn current_context_id(&self) -> Result<String, HarvestError>;
    /// Ids of all open contexts, oldest first.
    async fn open_contexts(&self) -> Result<Vec<String>, HarvestError>;
    async fn switch_to_context(&self, id: &str) -> Result<(), HarvestError>;
    async fn close_current_context(&self) -> Result<(), HarvestError>;
    async fn navigate(&self, url: &str) -> Result<(), HarvestError>;
}

/// Condition polled by [`wait_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    /// A node matching the selector exists.
    Present { selector: String },
    /// Some node matching the selector has text containing `needle`.
    TextContains { selector: String, needle: String },
    /// The first node matching the selector has `attribute` containing `needle`.
    AttributeContains {
        selector: String,
        attribute: String,
        needle: String,
    },
}

impl WaitCondition {
    fn describe(&self) -> String {
        match self {
            Self::Present { selector } => format!("{selector} to appear"),
            Self::TextContains { selector, needle } => {
                format!("{selector} to contain text {needle:?}")
            }
            Self::AttributeContains {
                selector,
                attribute,
                needle,
            } => format!("{selector}[{attribute}] to contain {needle:?}"),
        }
    }

    async fn holds<R: Renderer + ?Sized>(&self, renderer: &R) -> Result<bool, HarvestError> {
        match self {
            Self::Present { selector } => Ok(renderer.find_one(selector).await?.is_some()),
            Self::TextContains { selector, needle } => {
                for node in renderer.find_all(selector).await? {
                    if renderer.text(&node).await?.contains(needle.as_str()) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::AttributeContains {
                selector,
                attribute,
                needle,
            } => {
                let Some(node) = renderer.find_one(selector).await? else {
                    return Ok(false);
                };
                Ok(renderer
                    .attribute(&node, attribute)
                    .await?
                    .is_some_and(|value| value.contains(needle.as_str())))
            }
        }
    }
}

/// Poll `condition` every `poll` until it holds or `timeout` elapses.
///
/// Browser errors during a poll count as "not yet".
///
/// # Errors
///
/// Returns `HarvestError::Timeout` when the deadline passes and
/// `HarvestError::Cancelled` when `cancel` fires first.
pub async fn wait_until<R: Renderer + ?Sized>(
    renderer: &R,
    condition: &WaitCondition,
    timeout: Duration,
    poll: Duration,
    cancel: &CancellationToken,
) -> Result<(), HarvestError> {
    let started = Instant::now();
    loop {
        match condition.holds(renderer).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => tracing::debug!(error = %e, "Wait condition poll failed"),
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(HarvestError::Timeout {
                what: condition.describe(),
                elapsed,
            });
        }

        let pause = poll.min(timeout - elapsed);
        if !sleep_or_cancel(pause, cancel).await {
            return Err(HarvestError::Cancelled);
        }
    }
}

/// Sleep for `duration`. Returns `false` if `cancel` fired first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::scripted::{Frame, ScriptContext, ScriptNode};
    use super::*;

    fn page_with_link(href: &str) -> ScriptedRenderer {
        let frame = Frame::new().with(
            "a.time",
            ScriptNode::new().attr("href", href).text("23-11-05 14:07"),
        );
        ScriptedRenderer::new(ScriptContext::new(vec![frame]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_attribute_present() {
        let renderer = page_with_link("https://weibo.com/123/AbCd");
        let cancel = CancellationToken::new();
        let condition = WaitCondition::AttributeContains {
            selector: "a.time".to_string(),
            attribute: "href".to_string(),
            needle: "weibo.com/123/AbCd".to_string(),
        };

        let result = wait_until(
            &renderer,
            &condition,
            Duration::from_secs(5),
            Duration::from_millis(100),
            &cancel,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_times_out() {
        let renderer = page_with_link("https://weibo.com/123/Other");
        let cancel = CancellationToken::new();
        let condition = WaitCondition::TextContains {
            selector: "a.time".to_string(),
            needle: "nowhere".to_string(),
        };

        let err = wait_until(
            &renderer,
            &condition,
            Duration::from_secs(5),
            Duration::from_millis(100),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HarvestError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_cancelled() {
        let renderer = page_with_link("https://weibo.com/123/Other");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let condition = WaitCondition::Present {
            selector: ".missing".to_string(),
        };

        let err = wait_until(
            &renderer,
            &condition,
            Duration::from_secs(5),
            Duration::from_millis(100),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(err.is_cancelled());
    }
}

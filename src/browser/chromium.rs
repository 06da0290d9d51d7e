//! [`Renderer`] backed by a running Chromium reached over the DevTools protocol.
//!
//! The harvester attaches to an existing browser (started with
//! `--remote-debugging-port`) so the operator's logged-in session is reused.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::Renderer;
use crate::error::HarvestError;

/// Chromium session with one "current" page that all lookups run against.
pub struct ChromiumRenderer {
    browser: Mutex<Browser>,
    current: Mutex<Option<Page>>,
    handler_task: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Attach to the browser behind `debug_url` and adopt its first page.
    ///
    /// # Errors
    ///
    /// Returns an error if the DevTools endpoint is unreachable or no page
    /// can be opened.
    pub async fn connect(debug_url: &str) -> Result<Self> {
        info!(url = %debug_url, "Connecting to browser");

        let (mut browser, mut handler) = Browser::connect(debug_url)
            .await
            .with_context(|| format!("Failed to connect to browser at {debug_url}"))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        browser
            .fetch_targets()
            .await
            .context("Failed to fetch browser targets")?;

        let existing = browser.pages().await.context("Failed to list pages")?;
        let page = match existing.into_iter().next() {
            Some(page) => page,
            None => browser
                .new_page("about:blank")
                .await
                .context("Failed to open a page")?,
        };
        info!(page_id = %page.target_id().as_ref(), "Attached to browser page");

        Ok(Self {
            browser: Mutex::new(browser),
            current: Mutex::new(Some(page)),
            handler_task,
        })
    }

    async fn page(&self) -> Result<Page, HarvestError> {
        self.current
            .lock()
            .await
            .clone()
            .ok_or_else(|| HarvestError::Browser("no current page".to_string()))
    }

    async fn pages(&self) -> Result<Vec<Page>, HarvestError> {
        let mut browser = self.browser.lock().await;
        browser.fetch_targets().await.map_err(HarvestError::browser)?;
        browser.pages().await.map_err(HarvestError::browser)
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    type Node = Element;

    async fn find_one(&self, selector: &str) -> Result<Option<Element>, HarvestError> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Element>, HarvestError> {
        let page = self.page().await?;
        page.find_elements(selector)
            .await
            .map_err(HarvestError::browser)
    }

    async fn find_within(
        &self,
        node: &Element,
        selector: &str,
    ) -> Result<Option<Element>, HarvestError> {
        Ok(self
            .find_all_within(node, selector)
            .await?
            .into_iter()
            .next())
    }

    async fn find_all_within(
        &self,
        node: &Element,
        selector: &str,
    ) -> Result<Vec<Element>, HarvestError> {
        node.find_elements(selector)
            .await
            .map_err(HarvestError::browser)
    }

    async fn attribute(&self, node: &Element, name: &str) -> Result<Option<String>, HarvestError> {
        node.attribute(name).await.map_err(HarvestError::browser)
    }

    async fn text(&self, node: &Element) -> Result<String, HarvestError> {
        Ok(node
            .inner_text()
            .await
            .map_err(HarvestError::browser)?
            .unwrap_or_default())
    }

    async fn click(&self, node: &Element) -> Result<(), HarvestError> {
        node.click().await.map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn send_key_enter(&self, node: &Element) -> Result<(), HarvestError> {
        node.press_key("Enter")
            .await
            .map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), HarvestError> {
        let page = self.page().await?;
        page.evaluate(format!("window.scrollBy({dx}, {dy})"))
            .await
            .map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn refresh_page(&self) -> Result<(), HarvestError> {
        let page = self.page().await?;
        page.reload().await.map_err(HarvestError::browser)?;
        Ok(())
    }

    async fn current_context_id(&self) -> Result<String, HarvestError> {
        Ok(self.page().await?.target_id().as_ref().to_string())
    }

    async fn open_contexts(&self) -> Result<Vec<String>, HarvestError> {
        Ok(self
            .pages()
            .await?
            .iter()
            .map(|page| page.target_id().as_ref().to_string())
            .collect())
    }

    async fn switch_to_context(&self, id: &str) -> Result<(), HarvestError> {
        let page = self
            .pages()
            .await?
            .into_iter()
            .find(|page| page.target_id().as_ref() == id)
            .ok_or_else(|| HarvestError::NodeNotFound(format!("context {id}")))?;

        if let Err(e) = page.bring_to_front().await {
            warn!(context = %id, "Failed to bring page to front: {e}");
        }
        *self.current.lock().await = Some(page);
        Ok(())
    }

    async fn close_current_context(&self) -> Result<(), HarvestError> {
        let page = self
            .current
            .lock()
            .await
            .take()
            .ok_or_else(|| HarvestError::Browser("no current page".to_string()))?;
        page.close().await.map_err(HarvestError::browser)
    }

    async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        let page = self.page().await?;
        page.goto(url).await.map_err(HarvestError::browser)?;
        Ok(())
    }
}

//! Search bootstrap and the results page loop.

use serde::Serialize;
use tracing::{debug, info, warn};

use super::reader::PageReport;
use super::Harvester;
use crate::browser::{wait_until, Renderer, WaitCondition};
use crate::db::Database;
use crate::error::HarvestError;

/// Totals over a whole crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlSummary {
    pub pages: usize,
    pub cards_seen: usize,
    pub cards_persisted: usize,
    pub cards_failed: usize,
    pub comments_captured: usize,
}

impl CrawlSummary {
    fn absorb(&mut self, report: &PageReport) {
        self.cards_seen += report.cards_seen;
        self.cards_persisted += report.cards_persisted;
        self.cards_failed += report.cards_failed;
        self.comments_captured += report.comments_captured;
    }
}

impl<R: Renderer> Harvester<'_, R> {
    /// Open the results for `keyword` and crawl every reachable page.
    ///
    /// # Errors
    ///
    /// Returns an error if the first results page never shows the keyword
    /// or the crawl is cancelled before it starts.
    pub async fn search_and_crawl(
        &self,
        db: &Database,
        base_url: &str,
        keyword: &str,
    ) -> Result<CrawlSummary, HarvestError> {
        self.search(base_url, keyword).await?;
        Ok(self.crawl(db, keyword).await)
    }

    /// Navigate to the results page for `keyword` and wait for it to show
    /// content mentioning one of its words.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::Timeout` when no word appears in time,
    /// `HarvestError::Cancelled` on cancellation and `HarvestError::Browser`
    /// when navigation fails.
    pub async fn search(&self, base_url: &str, keyword: &str) -> Result<(), HarvestError> {
        let url = format!("{base_url}{}", urlencoding::encode(keyword));
        info!(url = %url, "Opening search results");
        self.renderer.navigate(&url).await?;

        if self.await_keyword(keyword, self.config.search_timeout).await? {
            Ok(())
        } else {
            Err(HarvestError::Timeout {
                what: format!("results for {keyword:?}"),
                elapsed: self.config.search_timeout,
            })
        }
    }

    /// Read the current results page and every page after it until no next
    /// page is reachable or the crawl is cancelled.
    pub async fn crawl(&self, db: &Database, keyword: &str) -> CrawlSummary {
        let mut summary = CrawlSummary::default();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            summary.pages += 1;
            match self.read_page(db).await {
                Ok(report) => {
                    info!(
                        page = summary.pages,
                        cards = report.cards_seen,
                        stored = report.cards_persisted,
                        failed = report.cards_failed,
                        comments = report.comments_captured,
                        "Results page done"
                    );
                    summary.absorb(&report);
                }
                Err(e) => warn!(page = summary.pages, error = %e, "Failed to read results page"),
            }

            if self.cancel.is_cancelled() {
                break;
            }
            match self.advance_page(keyword).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(pages = summary.pages, "No further results page");
                    break;
                }
                Err(e) => {
                    if !e.is_cancelled() {
                        warn!(error = %e, "Failed to advance to the next page");
                    }
                    break;
                }
            }
        }

        summary
    }

    /// Press the "next page" control and wait for the new page's content.
    /// `Ok(false)` when there is no control or the content never shows up.
    async fn advance_page(&self, keyword: &str) -> Result<bool, HarvestError> {
        let Some(next) = self.renderer.find_one(&self.selectors.next_page).await? else {
            debug!("No next page control");
            return Ok(false);
        };
        self.renderer.send_key_enter(&next).await?;
        self.await_keyword(keyword, self.config.page_timeout).await
    }

    /// Wait, one word at a time, for a feed content paragraph to contain a
    /// word of `keyword`. Each word gets the full `timeout`.
    async fn await_keyword(
        &self,
        keyword: &str,
        timeout: std::time::Duration,
    ) -> Result<bool, HarvestError> {
        for word in keyword.split_whitespace() {
            let condition = WaitCondition::TextContains {
                selector: self.selectors.feed_content.clone(),
                needle: word.to_string(),
            };
            match wait_until(
                self.renderer,
                &condition,
                timeout,
                self.config.poll_interval,
                self.cancel,
            )
            .await
            {
                Ok(()) => return Ok(true),
                Err(HarvestError::Cancelled) => return Err(HarvestError::Cancelled),
                Err(e) => debug!(word, error = %e, "Keyword not found on page"),
            }
        }
        Ok(false)
    }
}

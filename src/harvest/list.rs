//! Virtualized comment list harvester.
//!
//! The detail context renders comments through a recycling scroller: only a
//! window of rows exists at any time and rows are reused as the list
//! scrolls. Each poll reads the window, captures rows it has not seen, looks
//! for an end-of-list signal, nudges the scroll position forward and applies
//! stall recovery when nothing new shows up.
//!
//! Dedup runs on two independent keys: the row's content fingerprint and its
//! slot index in the list. A new fingerprint at an already captured index is
//! held back and only captured when the same pairing is seen again on a
//! later poll, so a row read mid-recycle is not stored under the wrong slot.
//! Rows still held back when the list ends are captured then.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::comment::parse_comment;
use super::links::comment_author_id;
use super::Harvester;
use crate::browser::{sleep_or_cancel, Renderer};

/// A comment captured from the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestedComment {
    /// Empty when the author link could not be resolved.
    pub author_id: String,
    pub display_name: String,
    pub avatar_url: String,
    pub raw_timestamp: String,
    pub content: String,
    pub slot_index: u32,
}

/// Per-thread harvesting state, owned by the caller and returned by value.
#[derive(Debug, Default)]
pub struct ThreadState {
    seen_indices: HashSet<u32>,
    fingerprints: HashSet<String>,
    /// Rows held back, keyed by fingerprint.
    deferred: HashMap<String, HarvestedComment>,
    comments: Vec<HarvestedComment>,
    termination: Option<String>,
}

impl ThreadState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn seen_index_count(&self) -> usize {
        self.seen_indices.len()
    }

    /// Captured comments in capture order.
    #[must_use]
    pub fn comments(&self) -> &[HarvestedComment] {
        &self.comments
    }

    #[must_use]
    pub fn into_comments(self) -> Vec<HarvestedComment> {
        self.comments
    }

    /// Text of the first end-of-list signal seen, if any.
    #[must_use]
    pub fn termination(&self) -> Option<&str> {
        self.termination.as_deref()
    }

    fn knows(&self, fingerprint: &str) -> bool {
        self.fingerprints.contains(fingerprint)
    }

    /// Number of rows currently held back.
    #[must_use]
    pub fn deferred_count(&self) -> usize {
        self.deferred.len()
    }

    /// Whether a row with a new fingerprint may be captured now. If not, it
    /// is held back until seen again at the same slot.
    fn admit(&mut self, comment: &HarvestedComment, fingerprint: &str) -> bool {
        let slot_index = comment.slot_index;
        if !self.seen_indices.contains(&slot_index) {
            self.deferred.remove(fingerprint);
            return true;
        }
        if self
            .deferred
            .get(fingerprint)
            .is_some_and(|held| held.slot_index == slot_index)
        {
            self.deferred.remove(fingerprint);
            return true;
        }
        self.deferred.insert(fingerprint.to_string(), comment.clone());
        false
    }

    /// Capture every row still held back, in slot order. Returns how many
    /// were captured.
    fn release_deferred(&mut self) -> usize {
        let mut held: Vec<(String, HarvestedComment)> = self.deferred.drain().collect();
        held.sort_by_key(|(_, comment)| comment.slot_index);

        let mut released = 0;
        for (fingerprint, comment) in held {
            if !self.knows(&fingerprint) {
                self.capture(comment, fingerprint);
                released += 1;
            }
        }
        released
    }

    pub(super) fn capture(&mut self, comment: HarvestedComment, fingerprint: String) {
        self.seen_indices.insert(comment.slot_index);
        self.fingerprints.insert(fingerprint);
        self.comments.push(comment);
    }

    /// First signal wins.
    fn record_termination(&mut self, signal: &str) {
        if self.termination.is_none() {
            self.termination = Some(signal.to_string());
        }
    }
}

/// Loop state after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Scanning,
    /// The list reported a load failure and a retry was requested.
    Retrying,
    Terminal,
}

/// What one poll observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSignals {
    pub window_empty: bool,
    pub captured: usize,
    pub end_marker: bool,
    pub load_failed: bool,
    pub composer_prompt: bool,
}

/// Decide the phase after a poll. `signalled_before` is whether a
/// termination signal was recorded by an earlier poll.
#[must_use]
pub fn next_phase(signalled_before: bool, signals: &PollSignals) -> Phase {
    if signals.end_marker || signals.composer_prompt {
        Phase::Terminal
    } else if signals.load_failed {
        Phase::Retrying
    } else if signals.captured == 0 && (signals.window_empty || signalled_before) {
        Phase::Terminal
    } else {
        Phase::Scanning
    }
}

/// Recovery step chosen by [`StallTimers::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallAction {
    /// Reload the context.
    Refresh,
    /// Scroll backward to make the list re-render.
    Jostle,
}

/// The two stall clocks: time since the last capture and time since the
/// last refresh. The refresh threshold doubles every time it fires.
#[derive(Debug, Clone)]
pub struct StallTimers {
    stall_threshold: Duration,
    refresh_threshold: Duration,
    last_progress: Instant,
    last_refresh: Instant,
}

impl StallTimers {
    #[must_use]
    pub fn new(stall_threshold: Duration, refresh_threshold: Duration, now: Instant) -> Self {
        Self {
            stall_threshold,
            refresh_threshold,
            last_progress: now,
            last_refresh: now,
        }
    }

    #[must_use]
    pub fn refresh_threshold(&self) -> Duration {
        self.refresh_threshold
    }

    /// A capture resets both clocks.
    pub fn record_progress(&mut self, now: Instant) {
        self.last_progress = now;
        self.last_refresh = now;
    }

    /// Remove a pause from both clocks so it does not count as stall time.
    pub fn exclude(&mut self, pause: Duration) {
        self.last_progress += pause;
        self.last_refresh += pause;
    }

    pub fn evaluate(&mut self, now: Instant) -> Option<StallAction> {
        if now.duration_since(self.last_refresh) > self.refresh_threshold {
            self.refresh_threshold = self.refresh_threshold.saturating_mul(2);
            self.last_refresh = now;
            Some(StallAction::Refresh)
        } else if now.duration_since(self.last_progress) > self.stall_threshold {
            self.last_progress = now;
            Some(StallAction::Jostle)
        } else {
            None
        }
    }

    /// Restart the refresh clock once the post-refresh cooldown is over.
    pub fn mark_refreshed(&mut self, now: Instant) {
        self.last_refresh = now;
    }

    /// Restart the progress clock once the post-jostle wait is over.
    pub fn mark_jostled(&mut self, now: Instant) {
        self.last_progress = now;
    }
}

impl<R: Renderer> Harvester<'_, R> {
    /// Harvest the comment list in the current context until a termination
    /// signal or cancellation. On cancellation the partial state is returned.
    pub async fn harvest_thread(&self, mut state: ThreadState) -> ThreadState {
        let config = self.config;
        let mut timers = StallTimers::new(
            config.stall_threshold,
            config.refresh_threshold,
            Instant::now(),
        );
        let mut polls: u64 = 0;

        loop {
            if self.cancel.is_cancelled() {
                debug!(comments = state.comments.len(), "Comment harvest cancelled");
                return state;
            }
            polls += 1;

            let signalled_before = state.termination.is_some();
            let mut signals = self.scan_window(&mut state).await;
            if signals.captured > 0 {
                timers.record_progress(Instant::now());
            }
            self.check_markers(&mut state, &mut signals).await;

            let phase = next_phase(signalled_before, &signals);
            trace!(poll = polls, ?signals, ?phase, "Comment poll");

            match phase {
                Phase::Terminal => {
                    let released = state.release_deferred();
                    info!(
                        comments = state.comments.len(),
                        slots = state.seen_indices.len(),
                        polls,
                        released,
                        signal = state.termination.as_deref().unwrap_or(""),
                        "Comment list exhausted"
                    );
                    return state;
                }
                Phase::Retrying => {
                    if !sleep_or_cancel(config.retry_delay, self.cancel).await {
                        return state;
                    }
                    timers.exclude(config.retry_delay);
                }
                Phase::Scanning => {}
            }

            if let Err(e) = self.renderer.scroll_by(0, config.scroll_step_px).await {
                warn!(error = %e, "Failed to scroll comment list");
            }

            match timers.evaluate(Instant::now()) {
                Some(StallAction::Refresh) => {
                    info!(
                        next_threshold_secs = timers.refresh_threshold().as_secs(),
                        "No new comments, refreshing"
                    );
                    if let Err(e) = self.renderer.refresh_page().await {
                        warn!(error = %e, "Failed to refresh detail context");
                    }
                    if !sleep_or_cancel(config.refresh_cooldown, self.cancel).await {
                        return state;
                    }
                    timers.mark_refreshed(Instant::now());
                }
                Some(StallAction::Jostle) => {
                    debug!("No new comments, scrolling back");
                    if let Err(e) = self.renderer.scroll_by(0, -config.jostle_step_px).await {
                        warn!(error = %e, "Failed to scroll comment list back");
                    }
                    if !sleep_or_cancel(config.retry_delay, self.cancel).await {
                        return state;
                    }
                    timers.mark_jostled(Instant::now());
                }
                None => {}
            }

            if !sleep_or_cancel(config.poll_interval, self.cancel).await {
                return state;
            }
        }
    }

    async fn scan_window(&self, state: &mut ThreadState) -> PollSignals {
        let items = match self.renderer.find_all(&self.selectors.list_item).await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Failed to read comment window");
                Vec::new()
            }
        };

        let mut signals = PollSignals {
            window_empty: items.is_empty(),
            ..PollSignals::default()
        };
        for item in &items {
            if self.scan_row(item, state).await {
                signals.captured += 1;
            }
        }
        signals
    }

    /// Capture one rendered row if it is new. Returns whether it was captured.
    async fn scan_row(&self, item: &R::Node, state: &mut ThreadState) -> bool {
        let selectors = self.selectors;

        let text = match self.renderer.text(item).await {
            Ok(text) => text,
            Err(e) => {
                debug!(error = %e, "Failed to read comment row");
                return false;
            }
        };
        let Some(parsed) = parse_comment(&text) else {
            trace!(text = %text, "Row is not a comment");
            return false;
        };
        let fingerprint = parsed.fingerprint();
        if state.knows(&fingerprint) {
            return false;
        }

        let scroller = self
            .renderer
            .find_within(item, &selectors.scroller_item)
            .await
            .ok()
            .flatten();
        let slot_index = match &scroller {
            Some(scroller) => self
                .renderer
                .attribute(scroller, &selectors.slot_index_attr)
                .await
                .ok()
                .flatten()
                .and_then(|value| value.trim().parse::<u32>().ok()),
            None => None,
        };
        let Some(slot_index) = slot_index else {
            warn!(author = %parsed.display_name, "Comment row has no slot index");
            return false;
        };

        let avatar_url = self
            .attribute_within(item, &selectors.comment_avatar, "src")
            .await
            .unwrap_or_default();
        let author_id = match &scroller {
            Some(scroller) => self
                .attribute_within(scroller, &selectors.link, "href")
                .await
                .and_then(|href| comment_author_id(&href)),
            None => None,
        }
        .unwrap_or_default();

        let comment = HarvestedComment {
            author_id,
            display_name: parsed.display_name,
            avatar_url,
            raw_timestamp: parsed.raw_timestamp,
            content: parsed.content,
            slot_index,
        };
        if !state.admit(&comment, &fingerprint) {
            trace!(slot_index, "Slot already captured, holding row back");
            return false;
        }

        trace!(slot_index, author = %comment.display_name, "Captured comment");
        state.capture(comment, fingerprint);
        true
    }

    /// Look for the end-of-list marker, then the tip texts under the list.
    async fn check_markers(&self, state: &mut ThreadState, signals: &mut PollSignals) {
        let selectors = self.selectors;

        if let Ok(Some(bottom)) = self.renderer.find_one(&selectors.list_bottom).await {
            let text = self.renderer.text(&bottom).await.unwrap_or_default();
            state.record_termination(&text);
            signals.end_marker = true;
            return;
        }

        let tips = self
            .renderer
            .find_all(&selectors.tip_text)
            .await
            .unwrap_or_default();
        for tip in &tips {
            let Ok(text) = self.renderer.text(tip).await else {
                continue;
            };
            if text.contains(selectors.load_failed_text.as_str()) {
                debug!(tip = %text, "Comment list failed to load, retrying");
                if let Err(e) = self.renderer.click(tip).await {
                    warn!(error = %e, "Failed to click retry");
                }
                signals.load_failed = true;
                return;
            }
            if text.contains(selectors.composer_prompt_text.as_str()) {
                state.record_termination(&text);
                signals.composer_prompt = true;
                return;
            }
        }
    }
}

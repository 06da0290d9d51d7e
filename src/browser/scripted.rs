//! In-memory [`Renderer`] that replays a scripted sequence of page states.
//!
//! A [`ScriptContext`] is a list of [`Frame`]s. Each forward scroll moves
//! the open context one frame ahead (stopping at the last), which is enough
//! to simulate a windowed list re-rendering as it is scrolled. Selectors are
//! matched by exact string against the keys nodes were registered under,
//! searching descendants in document order.
//!
//! Every interaction is recorded so tests can assert on what the harvester did.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::Renderer;
use crate::error::HarvestError;

/// What pressing Enter on a node does.
#[derive(Debug, Clone)]
pub enum EnterAction {
    /// Open a new context (tab) with the given script. Focus does not move.
    OpenContext(ScriptContext),
    /// Advance the current context to its next frame.
    AdvanceFrame,
}

/// A scripted node: attributes, text and keyed children.
#[derive(Debug, Clone, Default)]
pub struct ScriptNode {
    attributes: BTreeMap<String, String>,
    text: String,
    children: Vec<(String, ScriptNode)>,
    on_enter: Option<EnterAction>,
}

impl ScriptNode {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    #[must_use]
    pub fn child(mut self, selector: &str, node: ScriptNode) -> Self {
        self.children.push((selector.to_string(), node));
        self
    }

    #[must_use]
    pub fn on_enter(mut self, action: EnterAction) -> Self {
        self.on_enter = Some(action);
        self
    }

    fn collect<'a>(children: &'a [(String, ScriptNode)], selector: &str, out: &mut Vec<&'a Self>) {
        for (key, node) in children {
            if key == selector {
                out.push(node);
            }
            Self::collect(&node.children, selector, out);
        }
    }
}

/// One rendered state of a context.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    nodes: Vec<(String, ScriptNode)>,
}

impl Frame {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, selector: &str, node: ScriptNode) -> Self {
        self.nodes.push((selector.to_string(), node));
        self
    }
}

/// The frames a context steps through.
#[derive(Debug, Clone, Default)]
pub struct ScriptContext {
    frames: Vec<Frame>,
}

impl ScriptContext {
    #[must_use]
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }
}

#[derive(Debug)]
struct OpenContext {
    id: String,
    script: ScriptContext,
    cursor: usize,
}

impl OpenContext {
    fn frame(&self) -> Option<&Frame> {
        self.script.frames.get(self.cursor)
    }

    fn advance(&mut self) {
        if self.cursor + 1 < self.script.frames.len() {
            self.cursor += 1;
        }
    }
}

#[derive(Debug, Default)]
struct State {
    contexts: Vec<OpenContext>,
    current: Option<String>,
    next_id: usize,
    scrolls: Vec<(i64, i64)>,
    refreshes: usize,
    clicks: Vec<String>,
    navigations: Vec<String>,
}

impl State {
    fn open(&mut self, script: ScriptContext) -> String {
        let id = format!("ctx-{}", self.next_id);
        self.next_id += 1;
        self.contexts.push(OpenContext {
            id: id.clone(),
            script,
            cursor: 0,
        });
        id
    }

    fn current_mut(&mut self) -> Result<&mut OpenContext, HarvestError> {
        let id = self
            .current
            .clone()
            .ok_or_else(|| HarvestError::Browser("no current context".to_string()))?;
        self.contexts
            .iter_mut()
            .find(|ctx| ctx.id == id)
            .ok_or_else(|| HarvestError::Browser(format!("context {id} is closed")))
    }

    fn current_frame(&mut self) -> Result<Frame, HarvestError> {
        Ok(self.current_mut()?.frame().cloned().unwrap_or_default())
    }
}

/// Scripted stand-in for a live browser.
#[derive(Debug)]
pub struct ScriptedRenderer {
    state: Mutex<State>,
}

impl ScriptedRenderer {
    /// Start with a single open context running `initial`.
    #[must_use]
    pub fn new(initial: ScriptContext) -> Self {
        let mut state = State::default();
        let id = state.open(initial);
        state.current = Some(id);
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every `scroll_by` call, in order.
    #[must_use]
    pub fn scrolls(&self) -> Vec<(i64, i64)> {
        self.lock().scrolls.clone()
    }

    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.lock().refreshes
    }

    /// Text of every clicked node, in order.
    #[must_use]
    pub fn clicks(&self) -> Vec<String> {
        self.lock().clicks.clone()
    }

    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    #[must_use]
    pub fn open_context_count(&self) -> usize {
        self.lock().contexts.len()
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    type Node = ScriptNode;

    async fn find_one(&self, selector: &str) -> Result<Option<ScriptNode>, HarvestError> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ScriptNode>, HarvestError> {
        let frame = self.lock().current_frame()?;
        let mut found = Vec::new();
        ScriptNode::collect(&frame.nodes, selector, &mut found);
        Ok(found.into_iter().cloned().collect())
    }

    async fn find_within(
        &self,
        node: &ScriptNode,
        selector: &str,
    ) -> Result<Option<ScriptNode>, HarvestError> {
        Ok(self
            .find_all_within(node, selector)
            .await?
            .into_iter()
            .next())
    }

    async fn find_all_within(
        &self,
        node: &ScriptNode,
        selector: &str,
    ) -> Result<Vec<ScriptNode>, HarvestError> {
        let mut found = Vec::new();
        ScriptNode::collect(&node.children, selector, &mut found);
        Ok(found.into_iter().cloned().collect())
    }

    async fn attribute(
        &self,
        node: &ScriptNode,
        name: &str,
    ) -> Result<Option<String>, HarvestError> {
        Ok(node.attributes.get(name).cloned())
    }

    async fn text(&self, node: &ScriptNode) -> Result<String, HarvestError> {
        Ok(node.text.clone())
    }

    async fn click(&self, node: &ScriptNode) -> Result<(), HarvestError> {
        self.lock().clicks.push(node.text.clone());
        Ok(())
    }

    async fn send_key_enter(&self, node: &ScriptNode) -> Result<(), HarvestError> {
        let mut state = self.lock();
        match &node.on_enter {
            Some(EnterAction::OpenContext(script)) => {
                state.open(script.clone());
            }
            Some(EnterAction::AdvanceFrame) => state.current_mut()?.advance(),
            None => {}
        }
        Ok(())
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> Result<(), HarvestError> {
        let mut state = self.lock();
        state.scrolls.push((dx, dy));
        if dy > 0 {
            state.current_mut()?.advance();
        }
        Ok(())
    }

    async fn refresh_page(&self) -> Result<(), HarvestError> {
        let mut state = self.lock();
        state.refreshes += 1;
        state.current_mut()?.cursor = 0;
        Ok(())
    }

    async fn current_context_id(&self) -> Result<String, HarvestError> {
        self.lock()
            .current
            .clone()
            .ok_or_else(|| HarvestError::Browser("no current context".to_string()))
    }

    async fn open_contexts(&self) -> Result<Vec<String>, HarvestError> {
        Ok(self.lock().contexts.iter().map(|ctx| ctx.id.clone()).collect())
    }

    async fn switch_to_context(&self, id: &str) -> Result<(), HarvestError> {
        let mut state = self.lock();
        if !state.contexts.iter().any(|ctx| ctx.id == id) {
            return Err(HarvestError::NodeNotFound(format!("context {id}")));
        }
        state.current = Some(id.to_string());
        Ok(())
    }

    async fn close_current_context(&self) -> Result<(), HarvestError> {
        let mut state = self.lock();
        let id = state
            .current
            .take()
            .ok_or_else(|| HarvestError::Browser("no current context".to_string()))?;
        state.contexts.retain(|ctx| ctx.id != id);
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), HarvestError> {
        let mut state = self.lock();
        state.navigations.push(url.to_string());
        state.current_mut()?.cursor = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_frame(text: &str) -> Frame {
        Frame::new().with(
            ".row",
            ScriptNode::new()
                .attr("data-index", "0")
                .child(".body", ScriptNode::new().text(text)),
        )
    }

    #[tokio::test]
    async fn test_forward_scroll_advances_and_saturates() {
        let renderer =
            ScriptedRenderer::new(ScriptContext::new(vec![list_frame("one"), list_frame("two")]));

        let body = |r: &ScriptedRenderer| {
            let frame = r.lock().current_frame().unwrap();
            let mut found = Vec::new();
            ScriptNode::collect(&frame.nodes, ".body", &mut found);
            found[0].text.clone()
        };

        assert_eq!(body(&renderer), "one");
        renderer.scroll_by(0, 200).await.unwrap();
        assert_eq!(body(&renderer), "two");
        renderer.scroll_by(0, 200).await.unwrap();
        assert_eq!(body(&renderer), "two");
        renderer.scroll_by(0, -500).await.unwrap();
        assert_eq!(body(&renderer), "two");

        renderer.refresh_page().await.unwrap();
        assert_eq!(body(&renderer), "one");
        assert_eq!(renderer.refresh_count(), 1);
        assert_eq!(renderer.scrolls(), vec![(0, 200), (0, 200), (0, -500)]);
    }

    #[tokio::test]
    async fn test_enter_opens_context_without_moving_focus() {
        let detail = ScriptContext::new(vec![list_frame("detail")]);
        let link = ScriptNode::new().on_enter(EnterAction::OpenContext(detail));
        let renderer = ScriptedRenderer::new(ScriptContext::new(vec![
            Frame::new().with("a", link)
        ]));

        let origin = renderer.current_context_id().await.unwrap();
        let node = renderer.find_one("a").await.unwrap().unwrap();
        renderer.send_key_enter(&node).await.unwrap();

        let contexts = renderer.open_contexts().await.unwrap();
        assert_eq!(contexts, vec!["ctx-0".to_string(), "ctx-1".to_string()]);
        assert_eq!(renderer.current_context_id().await.unwrap(), origin);

        renderer.switch_to_context("ctx-1").await.unwrap();
        let row = renderer.find_one(".row").await.unwrap().unwrap();
        let body = renderer.find_within(&row, ".body").await.unwrap().unwrap();
        assert_eq!(renderer.text(&body).await.unwrap(), "detail");

        renderer.close_current_context().await.unwrap();
        assert!(renderer.current_context_id().await.is_err());
        assert_eq!(renderer.open_context_count(), 1);
        renderer.switch_to_context(&origin).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_nodes_are_none() {
        let renderer = ScriptedRenderer::new(ScriptContext::new(vec![list_frame("x")]));
        assert!(renderer.find_one(".absent").await.unwrap().is_none());
        let row = renderer.find_one(".row").await.unwrap().unwrap();
        assert!(renderer.find_within(&row, ".absent").await.unwrap().is_none());
        assert_eq!(
            renderer.attribute(&row, "data-index").await.unwrap(),
            Some("0".to_string())
        );
        assert!(renderer.attribute(&row, "href").await.unwrap().is_none());
    }
}

//! In-memory fake of the UI scope: a tiny declarative DOM with click
//! behaviors, enough to exercise every navigation component without a
//! browser.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use exporter_core::TabularArtifact;
use exporter_engine::{DatasetSink, DriverError, Query, Rect, SinkError, UiNode, UiScope};

pub type NodeId = u64;

/// Declarative reaction to a click, applied to the shared DOM.
#[derive(Clone)]
pub enum ClickEffect {
    SetAttr {
        id: NodeId,
        name: &'static str,
        value: &'static str,
    },
    Reveal(NodeId),
    Hide(NodeId),
    SetUrl(&'static str),
    Run(fn(&mut FakeDom)),
}

pub struct FakeNode {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub role: Option<&'static str>,
    pub label: Option<String>,
    pub input_label: Option<String>,
    pub text: String,
    pub hooks: Vec<String>,
    pub attrs: HashMap<String, String>,
    pub visible: bool,
    pub rect: Rect,
    pub on_click: Vec<ClickEffect>,
    pub fail_click: bool,
}

/// Chainable node description for test setup.
pub struct NodeSpec(FakeNode);

pub fn node() -> NodeSpec {
    NodeSpec(FakeNode {
        id: 0,
        parent: None,
        role: None,
        label: None,
        input_label: None,
        text: String::new(),
        hooks: Vec::new(),
        attrs: HashMap::new(),
        visible: true,
        rect: Rect {
            x: 0.0,
            y: 0.0,
            width: 20.0,
            height: 20.0,
        },
        on_click: Vec::new(),
        fail_click: false,
    })
}

impl NodeSpec {
    pub fn role(mut self, role: &'static str) -> Self {
        self.0.role = Some(role);
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.0.label = Some(label.to_string());
        self
    }

    pub fn input_label(mut self, label: &str) -> Self {
        self.0.input_label = Some(label.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.0.text = text.to_string();
        self
    }

    pub fn hook(mut self, hook: &str) -> Self {
        self.0.hooks.push(hook.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.0.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.0.visible = false;
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.0.rect.x = x;
        self.0.rect.y = y;
        self
    }

    pub fn parent(mut self, id: NodeId) -> Self {
        self.0.parent = Some(id);
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.0.on_click.push(effect);
        self
    }

    pub fn fail_click(mut self) -> Self {
        self.0.fail_click = true;
        self
    }
}

#[derive(Default)]
pub struct FakeDom {
    pub nodes: Vec<FakeNode>,
    pub url: String,
    pub clicks: Vec<NodeId>,
    pub fills: Vec<(NodeId, String)>,
    pub keys: Vec<String>,
    pub scrolls: usize,
    /// `(scroll count threshold, node)` pairs revealed by scrolling.
    pub scroll_reveals: Vec<(usize, NodeId)>,
    pub frame_roots: Vec<NodeId>,
    pub downloads: HashMap<NodeId, Vec<u8>>,
    download_dir: Option<tempfile::TempDir>,
}

impl FakeDom {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn add(&mut self, spec: NodeSpec) -> NodeId {
        let mut node = spec.0;
        node.id = self.nodes.len() as NodeId;
        let id = node.id;
        self.nodes.push(node);
        id
    }

    pub fn clicks_on(&self, id: NodeId) -> usize {
        self.clicks.iter().filter(|&&c| c == id).count()
    }

    fn is_under(&self, mut id: NodeId, root: NodeId) -> bool {
        while let Some(parent) = self.nodes[id as usize].parent {
            if parent == root {
                return true;
            }
            id = parent;
        }
        false
    }

    fn matches(&self, node: &FakeNode, query: &Query) -> bool {
        match query {
            Query::Css(css) => css_matches(node, css),
            Query::CssWithText { css, text } => css_matches(node, css) && text.matches(&node.text),
            Query::Text(text) => text.matches(&node.text),
            Query::Role { role, name } => {
                node.role == Some(role.as_str())
                    && name.matches(node.label.as_deref().unwrap_or(&node.text))
            }
            Query::LabeledInput(text) => {
                node.input_label.as_deref().is_some_and(|l| text.matches(l))
            }
        }
    }

    fn select(&self, root: Option<NodeId>, query: &Query) -> Vec<UiNode> {
        let mut hits: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| match root {
                Some(r) => self.is_under(n.id, r),
                // The top-level document does not see into frame subtrees.
                None => !self.frame_roots.iter().any(|&r| self.is_under(n.id, r)),
            })
            .filter(|n| self.matches(n, query))
            .map(|n| n.id)
            .collect();
        if matches!(query, Query::Text(_)) {
            // Innermost matches only, like a real text locator.
            let all = hits.clone();
            hits.retain(|&id| !all.iter().any(|&other| other != id && self.is_under(other, id)));
        }
        hits.into_iter()
            .map(|id| {
                let n = &self.nodes[id as usize];
                UiNode {
                    id,
                    visible: n.visible,
                    rect: Some(n.rect),
                    text: n.text.clone(),
                }
            })
            .collect()
    }

    fn apply(&mut self, effect: ClickEffect) {
        match effect {
            ClickEffect::SetAttr { id, name, value } => {
                self.nodes[id as usize]
                    .attrs
                    .insert(name.to_string(), value.to_string());
            }
            ClickEffect::Reveal(id) => self.nodes[id as usize].visible = true,
            ClickEffect::Hide(id) => self.nodes[id as usize].visible = false,
            ClickEffect::SetUrl(url) => self.url = url.to_string(),
            ClickEffect::Run(f) => f(self),
        }
    }
}

fn css_matches(node: &FakeNode, css: &str) -> bool {
    css.split(',')
        .map(str::trim)
        .any(|part| node.hooks.iter().any(|h| h == part))
}

#[derive(Clone)]
pub struct FakeScope {
    pub dom: Arc<Mutex<FakeDom>>,
    root: Option<NodeId>,
}

impl FakeScope {
    pub fn new(dom: FakeDom) -> Self {
        Self {
            dom: Arc::new(Mutex::new(dom)),
            root: None,
        }
    }
}

#[async_trait]
impl UiScope for FakeScope {
    async fn query(&self, query: &Query) -> Result<Vec<UiNode>, DriverError> {
        Ok(self.dom.lock().unwrap().select(self.root, query))
    }

    async fn query_within(
        &self,
        node: &UiNode,
        query: &Query,
    ) -> Result<Vec<UiNode>, DriverError> {
        Ok(self.dom.lock().unwrap().select(Some(node.id), query))
    }

    async fn click(&self, node: &UiNode) -> Result<(), DriverError> {
        let mut dom = self.dom.lock().unwrap();
        if dom.nodes[node.id as usize].fail_click {
            return Err(DriverError::Backend("click refused".to_string()));
        }
        dom.clicks.push(node.id);
        let effects = dom.nodes[node.id as usize].on_click.clone();
        for effect in effects {
            dom.apply(effect);
        }
        Ok(())
    }

    async fn fill(&self, node: &UiNode, text: &str) -> Result<(), DriverError> {
        let mut dom = self.dom.lock().unwrap();
        dom.fills.push((node.id, text.to_string()));
        Ok(())
    }

    async fn attr(&self, node: &UiNode, name: &str) -> Result<Option<String>, DriverError> {
        let dom = self.dom.lock().unwrap();
        Ok(dom.nodes[node.id as usize].attrs.get(name).cloned())
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.dom.lock().unwrap().keys.push(key.to_string());
        Ok(())
    }

    async fn scroll_container(&self, _pixels: i64) -> Result<(), DriverError> {
        let mut dom = self.dom.lock().unwrap();
        dom.scrolls += 1;
        let due: Vec<NodeId> = dom
            .scroll_reveals
            .iter()
            .filter(|(threshold, _)| dom.scrolls >= *threshold)
            .map(|&(_, id)| id)
            .collect();
        for id in due {
            dom.nodes[id as usize].visible = true;
        }
        Ok(())
    }

    async fn frames(&self) -> Result<Vec<Box<dyn UiScope>>, DriverError> {
        if self.root.is_some() {
            return Ok(Vec::new());
        }
        let roots = self.dom.lock().unwrap().frame_roots.clone();
        Ok(roots
            .into_iter()
            .map(|root| {
                Box::new(FakeScope {
                    dom: self.dom.clone(),
                    root: Some(root),
                }) as Box<dyn UiScope>
            })
            .collect())
    }

    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.dom.lock().unwrap().url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.dom.lock().unwrap().url.clone())
    }

    async fn settle(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn download(&self, node: &UiNode) -> Result<PathBuf, DriverError> {
        let mut dom = self.dom.lock().unwrap();
        let bytes = dom
            .downloads
            .get(&node.id)
            .cloned()
            .ok_or_else(|| DriverError::Download("no bytes registered".to_string()))?;
        if dom.download_dir.is_none() {
            dom.download_dir =
                Some(tempfile::TempDir::new().map_err(|e| DriverError::Download(e.to_string()))?);
        }
        let dir = dom.download_dir.as_ref().unwrap().path().to_path_buf();
        let path = dir.join(format!("dl_{}.csv", node.id));
        std::fs::write(&path, bytes).map_err(|e| DriverError::Download(e.to_string()))?;
        Ok(path)
    }
}

/// Records writes; optionally refuses a configured tab.
#[derive(Default)]
pub struct FakeSink {
    pub writes: Mutex<Vec<(String, TabularArtifact)>>,
    pub fail_tabs: Vec<String>,
}

#[async_trait]
impl DatasetSink for FakeSink {
    async fn overwrite_tab(
        &self,
        tab: &str,
        artifact: &TabularArtifact,
    ) -> Result<(), SinkError> {
        if self.fail_tabs.iter().any(|t| t == tab) {
            return Err(SinkError::new(format!("refused write to '{tab}'")));
        }
        self.writes
            .lock()
            .unwrap()
            .push((tab.to_string(), artifact.clone()));
        Ok(())
    }
}

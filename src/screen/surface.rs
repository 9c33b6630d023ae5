//! Render surface bound by the window hosting a screen
//!
//! Managers only talk to a surface through captured [`NodeId`]s, never "the
//! last child", so overlapping transitions cannot remove the wrong node.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub enum NodeContent {
    Color(String),
    Image { src: String },
    Video { src: String },
    Html(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderNode {
    pub content: NodeContent,
    pub style: String,
}

impl RenderNode {
    pub fn new(content: NodeContent, style: impl Into<String>) -> Self {
        Self {
            content,
            style: style.into(),
        }
    }
}

pub trait RenderSurface: Send {
    fn mount(&mut self, node: RenderNode) -> NodeId;

    fn update(&mut self, node: NodeId, content: NodeContent);

    fn set_style(&mut self, node: NodeId, style: &str);

    fn remove(&mut self, node: NodeId);
}

#[derive(Debug, Default)]
pub struct SurfaceState {
    next_id: u64,
    pub nodes: BTreeMap<NodeId, RenderNode>,
    pub mount_count: usize,
    pub removed: Vec<NodeId>,
}

/// In-memory surface; clones share the same state so a test can keep a
/// handle after binding one to a manager.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    label: String,
    state: Arc<Mutex<SurfaceState>>,
}

impl RecordingSurface {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: Arc::default(),
        }
    }

    pub fn mount_count(&self) -> usize {
        self.state.lock().map(|s| s.mount_count).unwrap_or(0)
    }

    pub fn nodes(&self) -> Vec<(NodeId, RenderNode)> {
        self.state
            .lock()
            .map(|s| s.nodes.iter().map(|(id, n)| (*id, n.clone())).collect())
            .unwrap_or_default()
    }

    pub fn removed(&self) -> Vec<NodeId> {
        self.state.lock().map(|s| s.removed.clone()).unwrap_or_default()
    }
}

impl RenderSurface for RecordingSurface {
    fn mount(&mut self, node: RenderNode) -> NodeId {
        let Ok(mut state) = self.state.lock() else {
            return NodeId(u64::MAX);
        };
        let id = NodeId(state.next_id);
        state.next_id += 1;
        state.mount_count += 1;
        debug!(surface = %self.label, node = id.0, content = ?node.content, "Mounted node");
        state.nodes.insert(id, node);
        id
    }

    fn update(&mut self, node: NodeId, content: NodeContent) {
        if let Ok(mut state) = self.state.lock()
            && let Some(existing) = state.nodes.get_mut(&node)
        {
            existing.content = content;
        }
    }

    fn set_style(&mut self, node: NodeId, style: &str) {
        if let Ok(mut state) = self.state.lock()
            && let Some(existing) = state.nodes.get_mut(&node)
        {
            existing.style = style.to_string();
        }
    }

    fn remove(&mut self, node: NodeId) {
        if let Ok(mut state) = self.state.lock()
            && state.nodes.remove(&node).is_some()
        {
            debug!(surface = %self.label, node = node.0, "Removed node");
            state.removed.push(node);
        }
    }
}

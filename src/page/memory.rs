//! In-memory page model
//!
//! A deterministic stand-in for a rendered chat page: blocks live in an arena
//! keyed by [`NodeId`], the container keeps them in document order, and
//! layout is a simple stack where each block is as tall as its markup has
//! lines.

use super::{ContentSource, OverflowAnchor, Presentation, ScrollSource};
use crate::error::{Error, Result};
use crate::session::Notifier;
use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Height of one markup line in offset units
pub const DEFAULT_LINE_HEIGHT: f64 = 24.0;

/// Height of the visible part of the container
const DEFAULT_VIEWPORT_HEIGHT: f64 = 600.0;

/// Handle to a block in a [`MemoryDocument`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Node {
    markup: Bytes,
    attributes: BTreeMap<String, String>,
    overflow_anchor: OverflowAnchor,
}

/// Rendered container of blocks with a scroll position
pub struct MemoryDocument {
    /// Every live or detached node
    nodes: HashMap<NodeId, Node>,
    /// Attached nodes in document order
    order: Vec<NodeId>,
    next_id: u64,
    scroll_offset: f64,
    line_height: f64,
    viewport_height: f64,
    notifier: Option<Notifier>,
}

impl MemoryDocument {
    /// Create an empty document with default layout metrics
    pub fn new() -> Self {
        Self::with_layout(DEFAULT_LINE_HEIGHT, DEFAULT_VIEWPORT_HEIGHT)
    }

    /// Create an empty document with explicit layout metrics
    pub fn with_layout(line_height: f64, viewport_height: f64) -> Self {
        MemoryDocument {
            nodes: HashMap::new(),
            order: Vec::new(),
            next_id: 0,
            scroll_offset: 0.0,
            line_height,
            viewport_height,
            notifier: None,
        }
    }

    fn create(&mut self, markup: Bytes) -> NodeId {
        self.next_id += 1;
        let id = NodeId(self.next_id);
        self.nodes.insert(
            id,
            Node {
                markup,
                attributes: BTreeMap::new(),
                overflow_anchor: OverflowAnchor::Auto,
            },
        );
        id
    }

    /// Append a block at the end of the container
    pub fn append(&mut self, markup: impl Into<Bytes>) -> NodeId {
        let id = self.create(markup.into());
        self.order.push(id);
        trace!("Appended block {}", id);
        self.notify_content();
        id
    }

    /// Append a prompt block followed by its answer
    pub fn append_pair(
        &mut self,
        prompt: impl Into<Bytes>,
        answer: impl Into<Bytes>,
    ) -> (NodeId, NodeId) {
        (self.append(prompt), self.append(answer))
    }

    /// Number of attached blocks
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check if the container has no blocks
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Number of blocks built but not attached to the container
    pub fn detached_len(&self) -> usize {
        self.nodes.len() - self.order.len()
    }

    /// Markup of every attached block, in order
    pub fn markups(&self) -> Vec<Bytes> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id).map(|n| n.markup.clone()))
            .collect()
    }

    /// Markup of a block
    pub fn markup(&self, node: NodeId) -> Option<&Bytes> {
        self.nodes.get(&node).map(|n| &n.markup)
    }

    /// Attribute value of a block
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(&node)
            .and_then(|n| n.attributes.get(name))
            .map(String::as_str)
    }

    /// Scroll anchoring participation of a block
    pub fn overflow_anchor(&self, node: NodeId) -> Option<OverflowAnchor> {
        self.nodes.get(&node).map(|n| n.overflow_anchor)
    }

    /// Rendered height of a block
    pub fn height(&self, node: NodeId) -> Option<f64> {
        self.nodes.get(&node).map(|n| self.layout_height(&n.markup))
    }

    fn layout_height(&self, markup: &Bytes) -> f64 {
        let lines = markup.iter().filter(|&&b| b == b'\n').count() + 1;
        lines as f64 * self.line_height
    }

    /// Total height of all attached blocks
    pub fn content_height(&self) -> f64 {
        self.order
            .iter()
            .filter_map(|id| self.height(*id))
            .sum()
    }

    /// Largest reachable scroll offset
    pub fn max_scroll_offset(&self) -> f64 {
        (self.content_height() - self.viewport_height).max(0.0)
    }

    /// Scroll as far down as possible
    pub fn scroll_to_bottom(&mut self) {
        let bottom = self.max_scroll_offset();
        self.set_offset(bottom);
    }

    fn set_offset(&mut self, offset: f64) {
        let clamped = offset.clamp(0.0, self.max_scroll_offset());
        if clamped != self.scroll_offset {
            self.scroll_offset = clamped;
            trace!("Scrolled to {}", clamped);
            if let Some(notifier) = &self.notifier {
                notifier.scrolled();
            }
        }
    }

    fn notify_content(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.content_changed();
        }
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentSource for MemoryDocument {
    type Node = NodeId;

    fn is_ready(&self) -> bool {
        !self.order.is_empty()
    }

    fn blocks(&self) -> Vec<NodeId> {
        self.order.clone()
    }

    fn serialize(&self, node: &NodeId) -> Result<Bytes> {
        self.nodes
            .get(node)
            .map(|n| n.markup.clone())
            .ok_or_else(|| Error::DetachedNode(node.to_string()))
    }

    fn deserialize(&mut self, markup: &Bytes) -> Result<NodeId> {
        if markup.is_empty() {
            return Err(Error::Deserialization("empty markup".to_string()));
        }
        Ok(self.create(markup.clone()))
    }

    fn discard(&mut self, node: NodeId) {
        if self.order.contains(&node) {
            trace!("Not discarding attached block {}", node);
            return;
        }
        if self.nodes.remove(&node).is_some() {
            trace!("Discarded detached block {}", node);
        }
    }

    fn apply_presentation(&mut self, node: &NodeId, presentation: &Presentation) {
        if let Some(n) = self.nodes.get_mut(node) {
            for (name, value) in &presentation.attributes {
                n.attributes.insert(name.clone(), value.clone());
            }
            n.overflow_anchor = presentation.overflow_anchor;
        }
    }

    fn remove(&mut self, node: &NodeId) {
        let Some(pos) = self.order.iter().position(|id| id == node) else {
            return;
        };
        self.order.remove(pos);
        self.nodes.remove(node);
        trace!("Removed block {}", node);
        self.notify_content();

        // Shrinking content may pull the scroll position back into range
        let offset = self.scroll_offset;
        self.set_offset(offset);
    }

    fn insert_at_head(&mut self, node: NodeId) {
        if !self.nodes.contains_key(&node) || self.order.contains(&node) {
            trace!("Ignoring head insert of {}", node);
            return;
        }
        self.order.insert(0, node);
        trace!("Inserted block {} at head", node);
        self.notify_content();
    }

    fn offset_top(&self, node: &NodeId) -> Option<f64> {
        let pos = self.order.iter().position(|id| id == node)?;
        let above: f64 = self.order[..pos]
            .iter()
            .filter_map(|id| self.height(*id))
            .sum();
        Some(above - self.scroll_offset)
    }

    fn observe(&mut self, notifier: Notifier) {
        self.notifier = Some(notifier);
    }
}

impl ScrollSource for MemoryDocument {
    fn scroll_offset(&self) -> f64 {
        self.scroll_offset
    }

    fn set_scroll_offset(&mut self, offset: f64) {
        self.set_offset(offset);
    }
}

/// A [`MemoryDocument`] shared between a page driver and a session
#[derive(Clone, Default)]
pub struct SharedDocument(Arc<Mutex<MemoryDocument>>);

impl SharedDocument {
    /// Wrap a document
    pub fn new(document: MemoryDocument) -> Self {
        SharedDocument(Arc::new(Mutex::new(document)))
    }

    /// Lock the document for direct access
    pub fn lock(&self) -> MutexGuard<'_, MemoryDocument> {
        self.0.lock()
    }
}

impl ContentSource for SharedDocument {
    type Node = NodeId;

    fn is_ready(&self) -> bool {
        self.0.lock().is_ready()
    }

    fn blocks(&self) -> Vec<NodeId> {
        self.0.lock().blocks()
    }

    fn serialize(&self, node: &NodeId) -> Result<Bytes> {
        self.0.lock().serialize(node)
    }

    fn deserialize(&mut self, markup: &Bytes) -> Result<NodeId> {
        self.0.lock().deserialize(markup)
    }

    fn discard(&mut self, node: NodeId) {
        self.0.lock().discard(node)
    }

    fn apply_presentation(&mut self, node: &NodeId, presentation: &Presentation) {
        self.0.lock().apply_presentation(node, presentation)
    }

    fn remove(&mut self, node: &NodeId) {
        self.0.lock().remove(node)
    }

    fn insert_at_head(&mut self, node: NodeId) {
        self.0.lock().insert_at_head(node)
    }

    fn offset_top(&self, node: &NodeId) -> Option<f64> {
        self.0.lock().offset_top(node)
    }

    fn observe(&mut self, notifier: Notifier) {
        self.0.lock().observe(notifier)
    }
}

impl ScrollSource for SharedDocument {
    fn scroll_offset(&self) -> f64 {
        self.0.lock().scroll_offset()
    }

    fn set_scroll_offset(&mut self, offset: f64) {
        self.0.lock().set_scroll_offset(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_layout() {
        let mut doc = MemoryDocument::with_layout(10.0, 100.0);
        assert!(!doc.is_ready());

        let a = doc.append("one line");
        let b = doc.append("two\nlines");
        let c = doc.append("x");

        assert!(doc.is_ready());
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.height(b), Some(20.0));
        assert_eq!(doc.content_height(), 40.0);
        assert_eq!(doc.offset_top(&a), Some(0.0));
        assert_eq!(doc.offset_top(&c), Some(30.0));
    }

    #[test]
    fn test_scroll_is_clamped() {
        let mut doc = MemoryDocument::with_layout(10.0, 25.0);
        for _ in 0..5 {
            doc.append("block");
        }
        // 50 tall, 25 visible
        doc.set_scroll_offset(1000.0);
        assert_eq!(doc.scroll_offset(), 25.0);
        doc.set_scroll_offset(-3.0);
        assert_eq!(doc.scroll_offset(), 0.0);

        doc.scroll_to_bottom();
        let first = doc.blocks()[0];
        assert_eq!(doc.offset_top(&first), Some(-25.0));
    }

    #[test]
    fn test_remove_reclamps_scroll() {
        let mut doc = MemoryDocument::with_layout(10.0, 20.0);
        let ids: Vec<_> = (0..4).map(|i| doc.append(format!("b{}", i))).collect();
        doc.scroll_to_bottom();
        assert_eq!(doc.scroll_offset(), 20.0);

        doc.remove(&ids[0]);
        assert_eq!(doc.scroll_offset(), 10.0);
        assert!(doc.markup(ids[0]).is_none());
        assert_eq!(doc.offset_top(&ids[0]), None);
    }

    #[test]
    fn test_discard_releases_only_detached_nodes() {
        let mut doc = MemoryDocument::new();
        let live = doc.append("live");
        let detached = doc.deserialize(&Bytes::from_static(b"restored")).unwrap();
        assert_eq!(doc.detached_len(), 1);

        doc.discard(live);
        assert_eq!(doc.markups(), vec!["live"]);

        doc.discard(detached);
        assert_eq!(doc.detached_len(), 0);
        assert!(doc.markup(detached).is_none());

        // Discarded handles can no longer be inserted
        doc.insert_at_head(detached);
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_deserialize_creates_detached_node() {
        let mut doc = MemoryDocument::new();
        let existing = doc.append("live");

        let detached = doc.deserialize(&Bytes::from_static(b"restored")).unwrap();
        assert_eq!(doc.len(), 1);
        assert_eq!(doc.offset_top(&detached), None);

        doc.insert_at_head(detached);
        assert_eq!(doc.blocks(), vec![detached, existing]);

        // A second insert of an attached node is ignored
        doc.insert_at_head(detached);
        assert_eq!(doc.len(), 2);

        assert!(doc.deserialize(&Bytes::new()).is_err());
    }

    #[test]
    fn test_presentation() {
        let mut doc = MemoryDocument::new();
        let node = doc.append("block");
        assert_eq!(doc.overflow_anchor(node), Some(OverflowAnchor::Auto));

        doc.apply_presentation(&node, &Presentation::restored("data-cached"));
        assert_eq!(doc.attribute(node, "data-cached"), Some("true"));
        assert_eq!(doc.overflow_anchor(node), Some(OverflowAnchor::None));
    }

    #[test]
    fn test_serialize_detached_fails() {
        let mut doc = MemoryDocument::new();
        let node = doc.append("gone");
        doc.remove(&node);
        assert!(matches!(doc.serialize(&node), Err(Error::DetachedNode(_))));
    }

    #[test]
    fn test_shared_document_delegates() {
        let shared = SharedDocument::default();
        let node = shared.lock().append("shared");

        let mut handle = shared.clone();
        assert!(handle.is_ready());
        assert_eq!(handle.blocks(), vec![node]);
        handle.remove(&node);
        assert!(shared.lock().is_empty());
    }
}

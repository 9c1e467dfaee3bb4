//! Page collaborators
//!
//! The limiter never touches a document directly. It talks to a
//! [`ContentSource`] for the ordered list of rendered blocks and to a
//! [`ScrollSource`] for the scroll offset of the container holding them.

mod memory;

pub use memory::{MemoryDocument, NodeId, SharedDocument, DEFAULT_LINE_HEIGHT};

use crate::error::Result;
use crate::session::Notifier;
use bytes::Bytes;
use std::fmt::Debug;

/// Participation of a block in the host's automatic scroll anchoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowAnchor {
    /// Host decides (may pick the block as scroll anchor)
    #[default]
    Auto,
    /// Block is never used as scroll anchor
    None,
}

/// Presentation applied to a block when it is reinserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    /// Attributes to set (name, value)
    pub attributes: Vec<(String, String)>,
    /// Scroll anchoring participation
    pub overflow_anchor: OverflowAnchor,
}

impl Presentation {
    /// Presentation for a block restored from the cache: tagged with
    /// `attribute="true"` and excluded from scroll anchoring so the host
    /// does not correct the scroll position a second time.
    pub fn restored(attribute: &str) -> Self {
        Presentation {
            attributes: vec![(attribute.to_string(), "true".to_string())],
            overflow_anchor: OverflowAnchor::None,
        }
    }
}

/// Ordered list of rendered content blocks
pub trait ContentSource {
    /// Stable handle to a rendered block
    type Node: Clone + Debug;

    /// Whether the content container exists yet
    fn is_ready(&self) -> bool {
        true
    }

    /// Currently rendered blocks, in document order
    fn blocks(&self) -> Vec<Self::Node>;

    /// Serialize a rendered block into opaque markup
    fn serialize(&self, node: &Self::Node) -> Result<Bytes>;

    /// Build a detached block from markup produced by [`serialize`](Self::serialize)
    fn deserialize(&mut self, markup: &Bytes) -> Result<Self::Node>;

    /// Release a detached block that will never be inserted
    fn discard(&mut self, node: Self::Node);

    /// Apply presentation attributes to a block
    fn apply_presentation(&mut self, node: &Self::Node, presentation: &Presentation);

    /// Remove a block from the container
    fn remove(&mut self, node: &Self::Node);

    /// Insert a block before the current first block
    fn insert_at_head(&mut self, node: Self::Node);

    /// Distance from the top of the viewport to the top of the block.
    /// `None` if the block is not attached.
    fn offset_top(&self, node: &Self::Node) -> Option<f64>;

    /// Start reporting block and scroll changes to `notifier`
    fn observe(&mut self, notifier: Notifier);
}

/// Scroll position of the container holding the blocks
pub trait ScrollSource {
    /// Current scroll offset from the top
    fn scroll_offset(&self) -> f64;

    /// Set the scroll offset
    fn set_scroll_offset(&mut self, offset: f64);
}

/// Everything the limiter needs from a page
pub trait Page: ContentSource + ScrollSource {}

impl<T: ContentSource + ScrollSource> Page for T {}

//! turnlimit - Bounded conversation turns with scroll-stable reveal
//!
//! This library keeps a chat page's rendered prompt/answer pairs under a
//! fixed limit. Older pairs are moved into an in-memory cache and brought
//! back a batch at a time when the viewer scrolls up, with the scroll offset
//! corrected so the visible content does not jump.

pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod page;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cache::{CachedPair, PairCache};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::limiter::Limiter;
    pub use crate::page::{ContentSource, Page, ScrollSource};
    pub use crate::session::{PageEvent, Session, SessionHandle};
}

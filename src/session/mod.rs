//! Page session runtime
//!
//! Wires a [`Limiter`] to the page's change notifications: waits until the
//! content source is ready, then debounces content-changed and scroll events
//! and runs eviction or restoration when each trigger fires. Everything runs
//! on one task, so the two managers never interleave.

mod trigger;

pub use trigger::CoalescingTrigger;

use crate::cache::CacheStats;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::limiter::{Limiter, LimiterStats, ReentrancyGuard};
use crate::page::Page;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tracing::{debug, info, trace};

/// Notification from the page to its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// Blocks were added to or removed from the container
    ContentChanged,
    /// The container's scroll offset changed
    Scrolled,
    /// Stop the session
    Shutdown,
}

/// Dispatch layer handed to the page.
///
/// Content-changed notifications raised while the limiter's guard is held
/// (i.e. during restoration) are dropped. Holds only a weak reference to the
/// session channel, so a page outliving its session is harmless.
#[derive(Debug, Clone)]
pub struct Notifier {
    guard: ReentrancyGuard,
    tx: WeakUnboundedSender<PageEvent>,
}

impl Notifier {
    /// Create a notifier gated by `guard` and feeding `tx`
    pub fn new(guard: ReentrancyGuard, tx: &UnboundedSender<PageEvent>) -> Self {
        Notifier {
            guard,
            tx: tx.downgrade(),
        }
    }

    /// Report a content change. Returns whether it was delivered.
    pub fn content_changed(&self) -> bool {
        if self.guard.is_suspended() {
            trace!("Content change during restoration ignored");
            return false;
        }
        self.send(PageEvent::ContentChanged)
    }

    /// Report a scroll. Returns whether it was delivered.
    pub fn scrolled(&self) -> bool {
        self.send(PageEvent::Scrolled)
    }

    fn send(&self, event: PageEvent) -> bool {
        match self.tx.upgrade() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }
}

/// Control handle for a running session. Dropping it ends the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<PageEvent>,
}

impl SessionHandle {
    /// Ask the session to stop
    pub fn shutdown(&self) {
        let _ = self.tx.send(PageEvent::Shutdown);
    }
}

/// Totals returned when a session ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub limiter: LimiterStats,
    pub cache: CacheStats,
}

/// One limiter driven by page events
pub struct Session<P: Page> {
    limiter: Limiter<P>,
    events: UnboundedReceiver<PageEvent>,
    tx: WeakUnboundedSender<PageEvent>,
    content_delay: Duration,
    scroll_delay: Duration,
    ready_poll_interval: Duration,
}

impl<P: Page> Session<P> {
    /// Create a session over `page`
    pub fn new(page: P, config: &Config) -> (Self, SessionHandle) {
        let (tx, events) = mpsc::unbounded_channel();

        let session = Session {
            limiter: Limiter::new(page, &config.limiter),
            events,
            tx: tx.downgrade(),
            content_delay: Duration::from_millis(config.timing.content_debounce_ms),
            scroll_delay: Duration::from_millis(config.timing.scroll_debounce_ms),
            ready_poll_interval: Duration::from_millis(config.timing.ready_poll_interval_ms),
        };

        (session, SessionHandle { tx })
    }

    /// Run until shut down or until every handle is dropped.
    ///
    /// Fails with [`Error::NotReady`] if the session ends before the content
    /// source ever became ready.
    pub async fn run(mut self) -> Result<SessionReport> {
        self.wait_until_ready().await?;

        let Some(tx) = self.tx.upgrade() else {
            return Ok(self.report());
        };
        let notifier = Notifier::new(self.limiter.guard().clone(), &tx);
        drop(tx);
        self.limiter.page_mut().observe(notifier);

        let mut content_trigger = CoalescingTrigger::new(self.content_delay);
        let mut scroll_trigger = CoalescingTrigger::new(self.scroll_delay);

        info!(
            "Content source ready, keeping {} pairs (debounce {:?} / {:?})",
            self.limiter.config().max_pairs,
            content_trigger.delay(),
            scroll_trigger.delay()
        );

        // Trim whatever was rendered before we started observing
        content_trigger.schedule();

        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(PageEvent::ContentChanged) => content_trigger.schedule(),
                    Some(PageEvent::Scrolled) => scroll_trigger.schedule(),
                    Some(PageEvent::Shutdown) | None => break,
                },
                _ = content_trigger.fired() => {
                    self.limiter.on_content_changed();
                }
                _ = scroll_trigger.fired() => {
                    let offset = self.limiter.page().scroll_offset();
                    self.limiter.on_scroll(offset);
                }
            }
        }

        let report = self.report();
        info!(
            "Session ended: {} pairs evicted, {} restored, {} cached",
            report.limiter.pairs_evicted, report.limiter.pairs_restored, report.cache.pair_count
        );
        Ok(report)
    }

    /// Poll the content source until it is ready
    async fn wait_until_ready(&mut self) -> Result<()> {
        if self.limiter.page().is_ready() {
            return Ok(());
        }

        let mut poll = tokio::time::interval(self.ready_poll_interval);
        poll.tick().await;

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if self.limiter.page().is_ready() {
                        return Ok(());
                    }
                    debug!("Waiting for content blocks...");
                }
                event = self.events.recv() => match event {
                    Some(PageEvent::Shutdown) | None => {
                        return Err(Error::NotReady(
                            "session closed before any content appeared".to_string(),
                        ));
                    }
                    Some(_) => {}
                },
            }
        }
    }

    fn report(&self) -> SessionReport {
        SessionReport {
            limiter: self.limiter.stats(),
            cache: self.limiter.cache().stats(),
        }
    }
}

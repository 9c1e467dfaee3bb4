//! Scroll-stable reinsertion of cached pairs

use super::guard::ReentrancyGuard;
use crate::cache::PairCache;
use crate::page::{Page, Presentation};
use tracing::{debug, trace, warn};

/// Outcome of one restoration run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RestorationReport {
    /// Whether the scroll offset and cache state called for a reveal
    pub triggered: bool,
    /// Pairs reinserted at the head of the live sequence
    pub restored: usize,
    /// Cache entries dropped because they were incomplete or unreadable
    pub skipped: usize,
    /// Amount added to the scroll offset to keep content in place
    pub scroll_correction: f64,
}

/// Reveals cached pairs when the viewer scrolls near the top
#[derive(Debug, Clone)]
pub struct RestorationManager {
    batch_size: usize,
    near_top_threshold: f64,
    presentation: Presentation,
}

impl RestorationManager {
    /// Create a manager restoring up to `batch_size` pairs per run
    pub fn new(batch_size: usize, near_top_threshold: f64, presentation: Presentation) -> Self {
        RestorationManager {
            batch_size,
            near_top_threshold,
            presentation,
        }
    }

    /// Whether a run at `scroll_offset` would reveal anything
    pub fn should_restore(&self, scroll_offset: f64, cache: &PairCache) -> bool {
        scroll_offset <= self.near_top_threshold && !cache.is_empty()
    }

    /// Pop up to one batch of pairs off the cache and insert them above the
    /// current first block, then shift the scroll offset by however far that
    /// block moved down.
    ///
    /// Content-changed dispatch is suspended on `guard` for the whole run.
    pub fn run<P: Page>(
        &self,
        page: &mut P,
        cache: &mut PairCache,
        guard: &ReentrancyGuard,
        scroll_offset: f64,
    ) -> RestorationReport {
        let mut report = RestorationReport::default();

        if !self.should_restore(scroll_offset, cache) {
            trace!(
                "No reveal at offset {} with {} cached pairs",
                scroll_offset,
                cache.len()
            );
            return report;
        }
        report.triggered = true;

        let _suspension = guard.suspend();

        // Measure this same block again after insertion, not the new head
        let anchor = page.blocks().into_iter().next();
        let offset_before = anchor
            .as_ref()
            .and_then(|node| page.offset_top(node))
            .unwrap_or(0.0);

        for _ in 0..self.batch_size {
            let Some(pair) = cache.pop() else {
                break;
            };

            if !pair.is_complete() {
                warn!("Dropping incomplete cached pair {}", pair.fingerprint());
                report.skipped += 1;
                continue;
            }

            let prompt = match page.deserialize(&pair.prompt) {
                Ok(node) => node,
                Err(e) => {
                    warn!("Dropping unreadable cached pair {}: {}", pair.fingerprint(), e);
                    report.skipped += 1;
                    continue;
                }
            };
            let answer = match page.deserialize(&pair.answer) {
                Ok(node) => node,
                Err(e) => {
                    warn!("Dropping unreadable cached pair {}: {}", pair.fingerprint(), e);
                    page.discard(prompt);
                    report.skipped += 1;
                    continue;
                }
            };

            page.apply_presentation(&prompt, &self.presentation);
            page.apply_presentation(&answer, &self.presentation);

            page.insert_at_head(answer);
            page.insert_at_head(prompt);
            report.restored += 1;

            debug!("Prompt+answer pair {} reinserted", pair.fingerprint());
        }

        let offset_after = anchor
            .as_ref()
            .and_then(|node| page.offset_top(node))
            .unwrap_or(0.0);

        report.scroll_correction = offset_after - offset_before;
        if report.scroll_correction != 0.0 {
            let current = page.scroll_offset();
            page.set_scroll_offset(current + report.scroll_correction);
        }

        report
    }
}

//! Live sequence limiter
//!
//! Bounds the number of prompt/answer pairs rendered on a page. Old pairs
//! are trimmed into a [`PairCache`] as new content arrives and revealed again,
//! a batch at a time, when the viewer scrolls back up.

mod eviction;
mod guard;
mod restoration;

pub use eviction::{EvictionManager, EvictionReport};
pub use guard::{ReentrancyGuard, Suspension};
pub use restoration::{RestorationManager, RestorationReport};

use crate::cache::PairCache;
use crate::config::LimiterConfig;
use crate::page::{Page, Presentation};
use tracing::info;

/// Running totals for a limiter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterStats {
    /// Eviction runs that found pairs over the limit
    pub eviction_runs: u64,
    /// Restoration runs that passed the near-top and cache checks
    pub restoration_runs: u64,
    /// Pairs moved into the cache
    pub pairs_evicted: u64,
    /// Pairs moved back into the live sequence
    pub pairs_restored: u64,
    /// Pairs skipped in either direction
    pub pairs_skipped: u64,
    /// Restoration runs that shifted the scroll offset
    pub scroll_corrections: u64,
}

/// Owns a page handle, the pair cache and the configuration for one page session
pub struct Limiter<P: Page> {
    page: P,
    cache: PairCache,
    eviction: EvictionManager,
    restoration: RestorationManager,
    guard: ReentrancyGuard,
    config: LimiterConfig,
    stats: LimiterStats,
}

impl<P: Page> Limiter<P> {
    /// Create a limiter over `page`. The configuration is fixed from here on.
    pub fn new(page: P, config: &LimiterConfig) -> Self {
        Limiter {
            page,
            cache: PairCache::new(),
            eviction: EvictionManager::new(config.max_pairs),
            restoration: RestorationManager::new(
                config.reveal_batch_size,
                config.near_top_threshold,
                Presentation::restored(&config.restored_attribute),
            ),
            guard: ReentrancyGuard::new(),
            config: config.clone(),
            stats: LimiterStats::default(),
        }
    }

    /// React to blocks having been added to the page
    pub fn on_content_changed(&mut self) -> EvictionReport {
        let report = self.eviction.run(&mut self.page, &mut self.cache);

        if !report.is_noop() {
            self.stats.eviction_runs += 1;
            self.stats.pairs_evicted += report.evicted as u64;
            self.stats.pairs_skipped += report.skipped as u64;
            info!(
                "Evicted {} of {} excess pairs, {} cached",
                report.evicted,
                report.excess,
                self.cache.len()
            );
        }

        report
    }

    /// React to the viewer having scrolled to `scroll_offset`
    pub fn on_scroll(&mut self, scroll_offset: f64) -> RestorationReport {
        let report = self
            .restoration
            .run(&mut self.page, &mut self.cache, &self.guard, scroll_offset);

        if report.triggered {
            self.stats.restoration_runs += 1;
            self.stats.pairs_restored += report.restored as u64;
            self.stats.pairs_skipped += report.skipped as u64;
            if report.scroll_correction != 0.0 {
                self.stats.scroll_corrections += 1;
            }
            info!(
                "Revealed {} pairs, scroll corrected by {}, {} still cached",
                report.restored,
                report.scroll_correction,
                self.cache.len()
            );
        }

        report
    }

    /// The page being limited
    pub fn page(&self) -> &P {
        &self.page
    }

    /// Mutable page access for the external appender
    pub fn page_mut(&mut self) -> &mut P {
        &mut self.page
    }

    /// Evicted pairs, most recent first
    pub fn cache(&self) -> &PairCache {
        &self.cache
    }

    /// Guard held while restoration mutates the page
    pub fn guard(&self) -> &ReentrancyGuard {
        &self.guard
    }

    /// Configuration the limiter was built with
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Running totals
    pub fn stats(&self) -> LimiterStats {
        self.stats
    }

    /// Give back the page
    pub fn into_page(self) -> P {
        self.page
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedPair;
    use crate::page::{ContentSource, MemoryDocument, ScrollSource};

    fn limiter_with_pairs(n: usize, config: LimiterConfig) -> Limiter<MemoryDocument> {
        let mut doc = MemoryDocument::new();
        for i in 0..n {
            doc.append_pair(format!("prompt {}", i), format!("answer {}", i));
        }
        Limiter::new(doc, &config)
    }

    #[test]
    fn test_six_pairs_trimmed_to_two() {
        let mut limiter = limiter_with_pairs(6, LimiterConfig::default());

        let report = limiter.on_content_changed();

        assert_eq!(report.evicted, 4);
        assert_eq!(limiter.page().len(), 4);
        assert_eq!(limiter.page().markups()[0], "prompt 4");

        let cache = limiter.cache();
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(0), Some(&CachedPair::new("prompt 3", "answer 3")));
        assert_eq!(cache.get(3), Some(&CachedPair::new("prompt 0", "answer 0")));
    }

    #[test]
    fn test_reveal_pops_batch_from_front() {
        let mut limiter = limiter_with_pairs(7, LimiterConfig::default());
        limiter.on_content_changed();
        assert_eq!(limiter.cache().len(), 5);

        let report = limiter.on_scroll(50.0);

        assert_eq!(report.restored, 2);
        assert_eq!(limiter.cache().len(), 3);
        assert_eq!(
            limiter.page().markups(),
            vec![
                "prompt 3", "answer 3", "prompt 4", "answer 4", "prompt 5", "answer 5",
                "prompt 6", "answer 6"
            ]
        );
    }

    #[test]
    fn test_scroll_with_empty_cache_changes_nothing() {
        let mut limiter = limiter_with_pairs(2, LimiterConfig::default());
        limiter.on_content_changed();

        let before = limiter.page().markups();
        let report = limiter.on_scroll(10.0);

        assert!(!report.triggered);
        assert_eq!(limiter.page().markups(), before);
        assert!(limiter.cache().is_empty());
        assert_eq!(limiter.stats().restoration_runs, 0);
    }

    #[test]
    fn test_scroll_far_from_top_changes_nothing() {
        let mut limiter = limiter_with_pairs(4, LimiterConfig::default());
        limiter.on_content_changed();

        let report = limiter.on_scroll(500.0);

        assert!(!report.triggered);
        assert_eq!(limiter.cache().len(), 2);
        assert_eq!(limiter.page().len(), 4);
    }

    #[test]
    fn test_odd_block_count() {
        let mut doc = MemoryDocument::new();
        for i in 0..5 {
            doc.append(format!("block {}", i));
        }
        let mut limiter = Limiter::new(doc, &LimiterConfig::default());

        let report = limiter.on_content_changed();

        assert!(report.is_noop());
        assert_eq!(limiter.page().len(), 5);

        // With a limit of one pair only the first pair goes
        let config = LimiterConfig {
            max_pairs: 1,
            ..Default::default()
        };
        let mut limiter = Limiter::new(limiter.into_page(), &config);
        limiter.on_content_changed();
        assert_eq!(
            limiter.page().markups(),
            vec!["block 2", "block 3", "block 4"]
        );
    }

    #[test]
    fn test_evict_then_restore_roundtrip() {
        let mut limiter = limiter_with_pairs(3, LimiterConfig::default());
        let original = limiter.page().markups();

        limiter.on_content_changed();
        assert_eq!(limiter.page().len(), 4);
        limiter.on_scroll(0.0);

        assert_eq!(limiter.page().markups(), original);
        let first = limiter.page().blocks()[0];
        assert_eq!(limiter.page().attribute(first, "data-cached"), Some("true"));
        let last = limiter.page().blocks()[5];
        assert_eq!(limiter.page().attribute(last, "data-cached"), None);
    }

    #[test]
    fn test_pair_count_bounded_after_eviction() {
        for max_pairs in 0..4 {
            for pairs in 0..8 {
                let config = LimiterConfig {
                    max_pairs,
                    ..Default::default()
                };
                let mut limiter = limiter_with_pairs(pairs, config);
                limiter.on_content_changed();
                assert!(limiter.page().len() / 2 <= max_pairs);
                assert_eq!(limiter.cache().len(), pairs.saturating_sub(max_pairs));
            }
        }
    }

    #[test]
    fn test_restoration_scroll_invariant() {
        let mut doc = MemoryDocument::with_layout(20.0, 100.0);
        for i in 0..5 {
            doc.append_pair(format!("prompt\n{}", i), format!("answer\nwith\nlines\n{}", i));
        }
        let mut limiter = Limiter::new(doc, &LimiterConfig::default());
        limiter.on_content_changed();
        limiter.page_mut().set_scroll_offset(120.0);

        let anchor = limiter.page().blocks()[0];
        let before = limiter.page().offset_top(&anchor);
        // Next two pairs out of the cache are pair 2 and pair 1, 6 lines each
        let inserted = 2.0 * 6.0 * 20.0;

        let report = limiter.on_scroll(limiter.page().scroll_offset());

        assert_eq!(report.scroll_correction, inserted);
        assert_eq!(limiter.page().scroll_offset(), 120.0 + inserted);
        assert_eq!(limiter.page().offset_top(&anchor), before);
    }

    #[test]
    fn test_stats_accumulate() {
        let mut limiter = limiter_with_pairs(5, LimiterConfig::default());
        limiter.on_content_changed();
        limiter.on_content_changed();
        limiter.on_scroll(0.0);
        limiter.on_scroll(0.0);

        let stats = limiter.stats();
        assert_eq!(stats.eviction_runs, 1);
        assert_eq!(stats.pairs_evicted, 3);
        assert_eq!(stats.restoration_runs, 2);
        assert_eq!(stats.pairs_restored, 3);
        assert_eq!(stats.pairs_skipped, 0);
        assert!(limiter.cache().is_empty());
    }
}

//! Eviction of the oldest prompt/answer pairs

use crate::cache::{CachedPair, PairCache};
use crate::page::ContentSource;
use tracing::{debug, trace, warn};

/// Outcome of one eviction run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Pairs over the limit when the run started
    pub excess: usize,
    /// Pairs moved into the cache
    pub evicted: usize,
    /// Pairs skipped because a block was missing or unreadable
    pub skipped: usize,
}

impl EvictionReport {
    /// Whether the live sequence was already within the limit
    pub fn is_noop(&self) -> bool {
        self.excess == 0
    }
}

/// Keeps the live sequence at or below `max_pairs` pairs
#[derive(Debug, Clone)]
pub struct EvictionManager {
    max_pairs: usize,
}

impl EvictionManager {
    /// Create a manager retaining at most `max_pairs` pairs
    pub fn new(max_pairs: usize) -> Self {
        EvictionManager { max_pairs }
    }

    /// Pairs over the limit for a sequence of `block_count` blocks.
    /// A trailing unpaired block does not count.
    pub fn excess_pairs(&self, block_count: usize) -> usize {
        (block_count / 2).saturating_sub(self.max_pairs)
    }

    /// Move the oldest excess pairs from the live sequence into the cache.
    ///
    /// Pairs are taken oldest first from the block list as it stood when the
    /// run started, so the last pair evicted ends up at the front of the
    /// cache.
    pub fn run<C: ContentSource>(
        &self,
        content: &mut C,
        cache: &mut PairCache,
    ) -> EvictionReport {
        let blocks = content.blocks();
        let mut report = EvictionReport {
            excess: self.excess_pairs(blocks.len()),
            ..Default::default()
        };

        if report.is_noop() {
            trace!("{} blocks, nothing to evict", blocks.len());
            return report;
        }

        for i in 0..report.excess {
            let (Some(prompt), Some(answer)) = (blocks.get(i * 2), blocks.get(i * 2 + 1)) else {
                report.skipped += 1;
                continue;
            };

            let pair = match (content.serialize(prompt), content.serialize(answer)) {
                (Ok(p), Ok(a)) => CachedPair::new(p, a),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Skipping pair {} ({:?}, {:?}): {}", i, prompt, answer, e);
                    report.skipped += 1;
                    continue;
                }
            };

            cache.push(pair);
            content.remove(prompt);
            content.remove(answer);
            report.evicted += 1;

            debug!("Prompt+answer pair {} removed and cached", i);
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{MemoryDocument, NodeId};

    fn doc_with_pairs(n: usize) -> MemoryDocument {
        let mut doc = MemoryDocument::new();
        for i in 0..n {
            doc.append_pair(format!("prompt {}", i), format!("answer {}", i));
        }
        doc
    }

    #[test]
    fn test_excess_pairs() {
        let manager = EvictionManager::new(2);
        assert_eq!(manager.excess_pairs(0), 0);
        assert_eq!(manager.excess_pairs(4), 0);
        assert_eq!(manager.excess_pairs(5), 0);
        assert_eq!(manager.excess_pairs(6), 1);
        assert_eq!(manager.excess_pairs(12), 4);
    }

    #[test]
    fn test_evicts_oldest_pairs_in_order() {
        let mut doc = doc_with_pairs(6);
        let mut cache = PairCache::new();

        let report = EvictionManager::new(2).run(&mut doc, &mut cache);

        assert_eq!(
            report,
            EvictionReport {
                excess: 4,
                evicted: 4,
                skipped: 0
            }
        );
        assert_eq!(doc.len(), 4);
        assert_eq!(doc.markups()[0], "prompt 4");
        assert_eq!(doc.markups()[3], "answer 5");

        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get(0), Some(&CachedPair::new("prompt 3", "answer 3")));
        assert_eq!(cache.get(3), Some(&CachedPair::new("prompt 0", "answer 0")));
    }

    #[test]
    fn test_within_limit_is_noop() {
        let mut doc = doc_with_pairs(2);
        let mut cache = PairCache::new();

        let report = EvictionManager::new(2).run(&mut doc, &mut cache);

        assert!(report.is_noop());
        assert_eq!(doc.len(), 4);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_trailing_block_is_never_evicted() {
        let mut doc = doc_with_pairs(2);
        doc.append("prompt 2, answer pending");
        let mut cache = PairCache::new();

        let report = EvictionManager::new(1).run(&mut doc, &mut cache);

        assert_eq!(report.evicted, 1);
        assert_eq!(
            doc.markups(),
            vec!["prompt 1", "answer 1", "prompt 2, answer pending"]
        );
    }

    #[test]
    fn test_zero_limit_evicts_everything_paired() {
        let mut doc = doc_with_pairs(3);
        let mut cache = PairCache::new();

        EvictionManager::new(0).run(&mut doc, &mut cache);

        assert!(doc.is_empty());
        assert_eq!(cache.len(), 3);
    }

    /// Content source whose listing reports blocks that cannot be read
    struct Flaky {
        inner: MemoryDocument,
        unreadable: NodeId,
    }

    impl ContentSource for Flaky {
        type Node = NodeId;

        fn blocks(&self) -> Vec<NodeId> {
            self.inner.blocks()
        }

        fn serialize(&self, node: &NodeId) -> crate::Result<bytes::Bytes> {
            if *node == self.unreadable {
                return Err(crate::Error::Serialization("unreadable".to_string()));
            }
            self.inner.serialize(node)
        }

        fn deserialize(&mut self, markup: &bytes::Bytes) -> crate::Result<NodeId> {
            self.inner.deserialize(markup)
        }

        fn discard(&mut self, node: NodeId) {
            self.inner.discard(node)
        }

        fn apply_presentation(&mut self, node: &NodeId, p: &crate::page::Presentation) {
            self.inner.apply_presentation(node, p)
        }

        fn remove(&mut self, node: &NodeId) {
            self.inner.remove(node)
        }

        fn insert_at_head(&mut self, node: NodeId) {
            self.inner.insert_at_head(node)
        }

        fn offset_top(&self, node: &NodeId) -> Option<f64> {
            self.inner.offset_top(node)
        }

        fn observe(&mut self, notifier: crate::session::Notifier) {
            self.inner.observe(notifier)
        }
    }

    #[test]
    fn test_unreadable_pair_is_skipped() {
        let inner = doc_with_pairs(4);
        let unreadable = inner.blocks()[3];
        let mut flaky = Flaky { inner, unreadable };
        let mut cache = PairCache::new();

        let report = EvictionManager::new(1).run(&mut flaky, &mut cache);

        assert_eq!(report.excess, 3);
        assert_eq!(report.evicted, 2);
        assert_eq!(report.skipped, 1);
        // Pair 1 stays in place, untouched
        assert_eq!(
            flaky.inner.markups(),
            vec!["prompt 1", "answer 1", "prompt 3", "answer 3"]
        );
        assert_eq!(cache.get(0), Some(&CachedPair::new("prompt 2", "answer 2")));
        assert_eq!(cache.get(1), Some(&CachedPair::new("prompt 0", "answer 0")));
    }
}

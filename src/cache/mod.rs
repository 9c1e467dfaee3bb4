//! Evicted pair cache
//!
//! Holds serialized prompt/answer pairs that were trimmed from the live
//! sequence. Ordering is LIFO: the most recently evicted pair sits at the
//! front and is the first one handed back on reveal.

use bytes::Bytes;
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// A serialized prompt/answer pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPair {
    /// Serialized prompt block
    pub prompt: Bytes,
    /// Serialized answer block
    pub answer: Bytes,
}

impl CachedPair {
    /// Create a new cached pair
    pub fn new(prompt: impl Into<Bytes>, answer: impl Into<Bytes>) -> Self {
        CachedPair {
            prompt: prompt.into(),
            answer: answer.into(),
        }
    }

    /// Whether both halves carry content
    pub fn is_complete(&self) -> bool {
        !self.prompt.is_empty() && !self.answer.is_empty()
    }

    /// Total serialized size in bytes
    pub fn size(&self) -> usize {
        self.prompt.len() + self.answer.len()
    }

    /// Content fingerprint (BLAKE3 over prompt and answer)
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.prompt.len() as u64).to_le_bytes());
        hasher.update(&self.prompt);
        hasher.update(&self.answer);
        Fingerprint(*hasher.finalize().as_bytes())
    }
}

/// Short content hash used to identify a pair in logs
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..6] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}

/// LIFO cache of evicted pairs
#[derive(Debug, Default)]
pub struct PairCache {
    /// Front = most recently evicted
    pairs: VecDeque<CachedPair>,
    /// Sum of serialized sizes
    bytes: usize,
}

impl PairCache {
    /// Create an empty cache
    pub fn new() -> Self {
        PairCache::default()
    }

    /// Push a freshly evicted pair to the front
    pub fn push(&mut self, pair: CachedPair) {
        debug!(
            "Cached pair {} ({} bytes), {} pairs cached",
            pair.fingerprint(),
            pair.size(),
            self.pairs.len() + 1
        );
        self.bytes += pair.size();
        self.pairs.push_front(pair);
    }

    /// Pop the most recently evicted pair
    pub fn pop(&mut self) -> Option<CachedPair> {
        let pair = self.pairs.pop_front()?;
        self.bytes -= pair.size();
        Some(pair)
    }

    /// Look at the pair that would be popped next
    pub fn peek(&self) -> Option<&CachedPair> {
        self.pairs.front()
    }

    /// Pair at `index`, counting from the most recently evicted
    pub fn get(&self, index: usize) -> Option<&CachedPair> {
        self.pairs.get(index)
    }

    /// Number of cached pairs
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            pair_count: self.pairs.len(),
            cached_bytes: self.bytes,
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub pair_count: usize,
    pub cached_bytes: usize,
}

//! Re-entrancy guard between restoration and eviction
//!
//! Restoration grows the live sequence. Those insertions must not reach the
//! eviction trigger, or the pairs just revealed would be trimmed again on the
//! next run. The guard is a shared suspend counter: notification dispatch
//! checks it and drops content-changed events while any suspension is alive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared suspend/resume counter
#[derive(Debug, Clone, Default)]
pub struct ReentrancyGuard {
    depth: Arc<AtomicUsize>,
}

impl ReentrancyGuard {
    /// Create a guard with no active suspension
    pub fn new() -> Self {
        ReentrancyGuard::default()
    }

    /// Suspend dispatch until the returned value is dropped
    pub fn suspend(&self) -> Suspension {
        self.depth.fetch_add(1, Ordering::SeqCst);
        Suspension {
            depth: Arc::clone(&self.depth),
        }
    }

    /// Whether any suspension is alive
    pub fn is_suspended(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

/// Active suspension; resumes dispatch on drop
#[derive(Debug)]
#[must_use = "dispatch resumes as soon as the suspension is dropped"]
pub struct Suspension {
    depth: Arc<AtomicUsize>,
}

impl Drop for Suspension {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suspend_and_resume() {
        let guard = ReentrancyGuard::new();
        assert!(!guard.is_suspended());

        let suspension = guard.suspend();
        assert!(guard.is_suspended());

        drop(suspension);
        assert!(!guard.is_suspended());
    }

    #[test]
    fn test_nested_suspensions() {
        let guard = ReentrancyGuard::new();
        let observer = guard.clone();

        let outer = guard.suspend();
        let inner = guard.suspend();
        drop(outer);
        assert!(observer.is_suspended());

        drop(inner);
        assert!(!observer.is_suspended());
    }
}

//! Monotonic identifier allocation.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Allocates ids of the form `<prefix>_<epoch_millis>_<counter>`.
///
/// The counter is strictly increasing per allocator, so ids from one
/// allocator are unique even when several are minted in the same millisecond.
#[derive(Debug, Default)]
pub struct IdAllocator {
    counter: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    /// Mint a new id stamped with the current wall-clock milliseconds.
    pub fn next(&self, prefix: &str) -> String {
        self.next_at(prefix, Utc::now().timestamp_millis())
    }

    /// Mint a new id stamped with the given epoch milliseconds.
    pub fn next_at(&self, prefix: &str, epoch_millis: i64) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}_{}", prefix, epoch_millis, seq)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_format() {
        let ids = IdAllocator::new();
        assert_eq!(ids.next_at("act", 1_700_000_000_000), "act_1700000000000_1");
        assert_eq!(ids.next_at("act", 1_700_000_000_000), "act_1700000000000_2");
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn test_wall_clock_prefix() {
        let ids = IdAllocator::new();
        let id = ids.next("run");
        assert!(id.starts_with("run_"));
        assert!(id.ends_with("_1"));
    }

    #[test]
    fn test_unique_across_threads() {
        let ids = Arc::new(IdAllocator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    (0..250)
                        .map(|_| ids.next_at("act", 0))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "duplicate id allocated");
            }
        }
        assert_eq!(seen.len(), 1000);
    }
}

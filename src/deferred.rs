use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

/// At most one pending deadline per key; scheduling again replaces it.
#[derive(Debug)]
pub struct DeferredTasks<K> {
    pending: HashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone> DeferredTasks<K> {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Sets `key` to fire at `at`, replacing any earlier deadline.
    pub fn schedule(&mut self, key: K, at: Instant) {
        self.pending.insert(key, at);
    }

    /// Returns `true` if something was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Earliest pending deadline, for callers that want to sleep until it.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Removes and returns every key whose deadline is `<= now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(K, Instant)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, at)| (k.clone(), *at))
            .collect();
        due.sort_by_key(|(_, at)| *at);
        for (key, _) in &due {
            self.pending.remove(key);
        }
        due.into_iter().map(|(k, _)| k).collect()
    }

    /// Removes and returns everything pending regardless of deadline.
    pub fn drain(&mut self) -> Vec<K> {
        let mut all: Vec<(K, Instant)> = self.pending.drain().collect();
        all.sort_by_key(|(_, at)| *at);
        all.into_iter().map(|(k, _)| k).collect()
    }
}

impl<K: Eq + Hash + Clone> Default for DeferredTasks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_after_deadline() {
        let clock = ManualClock::new();
        let mut tasks = DeferredTasks::new();
        tasks.schedule("a", clock.now() + Duration::from_millis(100));

        clock.advance(Duration::from_millis(99));
        assert!(tasks.take_due(clock.now()).is_empty());

        clock.advance(Duration::from_millis(1));
        assert_eq!(tasks.take_due(clock.now()), vec!["a"]);
        assert_eq!(tasks.next_deadline(), None);
    }

    #[test]
    fn reschedule_replaces_deadline() {
        let clock = ManualClock::new();
        let mut tasks = DeferredTasks::new();
        tasks.schedule("a", clock.now() + Duration::from_millis(100));
        clock.advance(Duration::from_millis(80));
        tasks.schedule("a", clock.now() + Duration::from_millis(100));
        assert_eq!(tasks.next_deadline(), Some(clock.now() + Duration::from_millis(100)));

        clock.advance(Duration::from_millis(50));
        assert!(tasks.take_due(clock.now()).is_empty());
        clock.advance(Duration::from_millis(50));
        assert_eq!(tasks.take_due(clock.now()), vec!["a"]);
    }

    #[test]
    fn cancel_prevents_firing() {
        let clock = ManualClock::new();
        let mut tasks = DeferredTasks::new();
        tasks.schedule("a", clock.now());
        assert!(tasks.cancel(&"a"));
        assert!(!tasks.cancel(&"a"));
        assert!(tasks.take_due(clock.now()).is_empty());
    }

    #[test]
    fn due_tasks_come_out_earliest_first() {
        let clock = ManualClock::new();
        let mut tasks = DeferredTasks::new();
        let now = clock.now();
        tasks.schedule("late", now + Duration::from_millis(30));
        tasks.schedule("early", now + Duration::from_millis(10));
        tasks.schedule("later", now + Duration::from_millis(500));
        assert_eq!(tasks.next_deadline(), Some(now + Duration::from_millis(10)));

        clock.advance(Duration::from_millis(40));
        assert_eq!(tasks.take_due(clock.now()), vec!["early", "late"]);
        assert_eq!(tasks.drain(), vec!["later"]);
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let start = other.now();
        clock.advance(Duration::from_secs(2));
        assert_eq!(other.now() - start, Duration::from_secs(2));
    }
}

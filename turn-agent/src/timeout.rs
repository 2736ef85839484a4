use std::cmp::Ordering;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

#[derive(Debug)]
struct TimeoutItem<K> {
    deadline: Instant,
    key: K,
}

impl<K> Ord for TimeoutItem<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline.cmp(&other.deadline)
    }
}

impl<K> PartialOrd for TimeoutItem<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> PartialEq for TimeoutItem<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl<K> Eq for TimeoutItem<K> {}

/// Min-heap of deadlines. Several deadlines can be armed at once, the
/// earliest one is always at the top.
#[derive(Debug)]
pub struct TimeoutQueue<K> {
    timeouts: BinaryHeap<Reverse<TimeoutItem<K>>>,
}

impl<K> Default for TimeoutQueue<K> {
    fn default() -> Self {
        Self {
            timeouts: BinaryHeap::new(),
        }
    }
}

impl<K: PartialEq> TimeoutQueue<K> {
    pub fn add(&mut self, deadline: Instant, key: K) {
        self.timeouts.push(Reverse(TimeoutItem { deadline, key }));
    }

    pub fn remove(&mut self, key: &K) {
        self.timeouts.retain(|item| &item.0.key != key);
    }

    #[cfg(test)]
    pub fn contains(&self, key: &K) -> bool {
        self.timeouts.iter().any(|item| &item.0.key == key)
    }

    pub fn clear(&mut self) {
        self.timeouts.clear();
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.timeouts.is_empty()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timeouts.peek().map(|item| item.0.deadline)
    }

    /// Time left until the earliest deadline, zero if it already expired.
    #[cfg(test)]
    pub fn next_timeout(&self, instant: Instant) -> Option<std::time::Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(instant))
    }

    /// Pops every key whose deadline is not after `instant`, earliest first.
    pub fn check(&mut self, instant: Instant) -> Vec<K> {
        let mut expired = Vec::new();
        while let Some(item) = self.timeouts.peek() {
            if item.0.deadline > instant {
                break;
            }
            if let Some(Reverse(item)) = self.timeouts.pop() {
                expired.push(item.key);
            }
        }
        expired
    }
}

/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Keyed debounce scheduler.
//!
//! Rapid successive edits collapse into a single deferred action: each
//! `schedule` for a key supersedes the pending entry and restarts the delay.
//! The caller drives time explicitly through `due`, so event loops stay
//! single-threaded and tests never sleep.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

pub struct Debouncer<K, T> {
    delay: Duration,
    pending: HashMap<K, (Instant, T)>,
}

impl<K: Eq + Hash + Clone, T> Debouncer<K, T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Queue `value` under `key`, superseding any pending entry and pushing
    /// the deadline out to `now + delay`.
    pub fn schedule(&mut self, key: K, value: T, now: Instant) {
        self.pending.insert(key, (now + self.delay, value));
    }

    /// Drop the pending entry for `key`, if any.
    pub fn cancel(&mut self, key: &K) -> Option<T> {
        self.pending.remove(key).map(|(_, value)| value)
    }

    /// Remove and return every entry whose deadline has passed, oldest
    /// deadline first.
    pub fn due(&mut self, now: Instant) -> Vec<(K, T)> {
        let ready: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, (deadline, _))| *deadline <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut out: Vec<(K, Instant, T)> = ready
            .into_iter()
            .filter_map(|key| {
                let (deadline, value) = self.pending.remove(&key)?;
                Some((key, deadline, value))
            })
            .collect();
        out.sort_by_key(|(_, deadline, _)| *deadline);
        out.into_iter().map(|(key, _, value)| (key, value)).collect()
    }

    /// Earliest pending deadline, for event loops that want to sleep until
    /// the next flush.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(deadline, _)| *deadline).min()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_entry_fires_after_delay() {
        let mut d: Debouncer<&str, u32> = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.schedule("note", 1, t0);

        assert!(d.due(t0 + ms(99)).is_empty());
        assert_eq!(d.due(t0 + ms(100)), vec![("note", 1)]);
        assert!(d.is_empty());
    }

    #[test]
    fn test_reschedule_supersedes_and_restarts_delay() {
        let mut d: Debouncer<&str, u32> = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.schedule("note", 1, t0);
        d.schedule("note", 2, t0 + ms(50));

        // The first deadline has passed, but it was superseded.
        assert!(d.due(t0 + ms(120)).is_empty());
        assert_eq!(d.due(t0 + ms(150)), vec![("note", 2)]);
    }

    #[test]
    fn test_keys_are_independent() {
        let mut d: Debouncer<&str, u32> = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.schedule("a", 1, t0);
        d.schedule("b", 2, t0 + ms(30));

        assert_eq!(d.due(t0 + ms(100)), vec![("a", 1)]);
        assert_eq!(d.due(t0 + ms(130)), vec![("b", 2)]);
    }

    #[test]
    fn test_due_orders_by_deadline() {
        let mut d: Debouncer<&str, u32> = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.schedule("b", 2, t0 + ms(10));
        d.schedule("a", 1, t0);
        assert_eq!(d.due(t0 + ms(200)), vec![("a", 1), ("b", 2)]);
    }

    #[test]
    fn test_cancel_removes_pending() {
        let mut d: Debouncer<&str, u32> = Debouncer::new(ms(100));
        let t0 = Instant::now();
        d.schedule("note", 1, t0);
        assert_eq!(d.cancel(&"note"), Some(1));
        assert!(d.due(t0 + ms(500)).is_empty());
    }

    #[test]
    fn test_next_deadline_is_earliest() {
        let mut d: Debouncer<&str, u32> = Debouncer::new(ms(100));
        let t0 = Instant::now();
        assert!(d.next_deadline().is_none());
        d.schedule("a", 1, t0 + ms(50));
        d.schedule("b", 2, t0);
        assert_eq!(d.next_deadline(), Some(t0 + ms(100)));
    }
}

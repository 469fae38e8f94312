//! Deduplicating keyed work queue with at most one in-flight item per key.
//!
//! Semantics:
//! - `add` of a key that is already queued is a no-op.
//! - `add` of a key that is being processed marks it dirty; `done` re-queues
//!   it once.
//! - `get` waits for the next key; `try_get` never blocks.
//! - after `shutdown`, `add` is ignored and waiting `get`s return `None`.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

pub struct HydrationQueue<K> {
    state: Mutex<State<K>>,
    notify: Notify,
}

impl<K: Eq + Hash + Clone> Default for HydrationQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> HydrationQueue<K> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Next key without waiting. The caller owns it until [`Self::done`].
    pub fn try_get(&self) -> Option<K> {
        let mut state = self.lock();
        let key = state.queue.pop_front()?;
        state.dirty.remove(&key);
        state.processing.insert(key.clone());
        Some(key)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(key) = self.try_get() {
                return Some(key);
            }
            if self.lock().shutting_down {
                return None;
            }
            notified.await;
        }
    }

    /// Release `key`; re-queue it if it was added while in flight.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Keys waiting to be processed.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight(&self) -> usize {
        self.lock().processing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn duplicate_adds_collapse() {
        let queue = HydrationQueue::new();
        queue.add("a");
        queue.add("a");
        queue.add("b");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.try_get(), Some("a"));
        assert_eq!(queue.try_get(), Some("b"));
        assert_eq!(queue.try_get(), None);
    }

    #[test]
    fn key_added_while_processing_is_requeued_once_on_done() {
        let queue = HydrationQueue::new();
        queue.add("a");
        let key = queue.try_get().unwrap();

        queue.add("a");
        queue.add("a");
        assert_eq!(queue.try_get(), None, "no second in-flight copy");

        queue.done(&key);
        assert_eq!(queue.try_get(), Some("a"));
        queue.done(&"a");
        assert!(queue.is_empty());
        assert_eq!(queue.in_flight(), 0);
    }

    #[test]
    fn done_without_readd_does_not_requeue() {
        let queue = HydrationQueue::new();
        queue.add("a");
        let key = queue.try_get().unwrap();
        queue.done(&key);
        assert_eq!(queue.try_get(), None);
    }

    #[tokio::test]
    async fn get_waits_for_add() {
        let queue = Arc::new(HydrationQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.add("a");
        assert_eq!(waiter.await.unwrap(), Some("a"));
    }

    #[tokio::test]
    async fn shutdown_releases_waiters_and_ignores_adds() {
        let queue: Arc<HydrationQueue<&str>> = Arc::new(HydrationQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shutdown();
        assert_eq!(waiter.await.unwrap(), None);

        queue.add("a");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn two_consumers_never_hold_the_same_key() {
        let queue = Arc::new(HydrationQueue::new());
        queue.add("a");
        let first = queue.get().await.unwrap();
        queue.add("a");

        let second = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished(), "key must wait until the first is done");

        queue.done(&first);
        assert_eq!(second.await.unwrap(), Some("a"));
    }
}

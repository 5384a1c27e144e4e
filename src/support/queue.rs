//! Bounded message queue for inter-task communication

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

struct Inner<T> {
    items: VecDeque<T>,
    enabled: bool,
}

/// Multi-producer FIFO with a capacity limit and a timed, disableable take.
///
/// `push` never waits: it fails once the capacity is reached. `pop` waits
/// until an item is available, the timeout elapses or the queue is disabled.
/// Disabling wakes every waiter; items already queued stay in place and
/// become visible again once the queue is re-enabled.
pub struct MessageQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T> MessageQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                enabled: true,
            }),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Create a queue without a practical capacity limit.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Maximum number of items the queue can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items currently queued.
    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().unwrap().enabled
    }

    /// Enqueue an item. Returns `false` when the capacity has been reached.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.items.len() >= self.capacity {
            return false;
        }
        inner.items.push_back(item);
        drop(inner);
        self.notify.notify_one();
        true
    }

    /// Dequeue an item, waiting up to `timeout` (or forever with `None`).
    ///
    /// Returns `None` when the timeout elapses or while the queue is
    /// disabled.
    pub async fn pop(&self, timeout: Option<Duration>) -> Option<T> {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            // The notified future must exist before the state check so a
            // push or set_enable between check and await cannot be missed.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if !inner.enabled {
                    return None;
                }
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    let _ = tokio::time::timeout(deadline - now, notified).await;
                }
                None => notified.await,
            }
        }
    }

    /// Drop all queued items.
    pub fn clear(&self) {
        self.inner.lock().unwrap().items.clear();
    }

    /// Enable or disable the queue. Disabling wakes all waiting `pop` calls,
    /// which then return `None`.
    pub fn set_enable(&self, enabled: bool) {
        self.inner.lock().unwrap().enabled = enabled;
        self.notify.notify_waiters();
        // A waiter between notified() registration rounds also needs a permit.
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn push_pop_fifo() {
        let queue = MessageQueue::new(8);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(queue.push(3));
        assert_eq!(queue.pop(Some(Duration::from_millis(10))).await, Some(1));
        assert_eq!(queue.pop(Some(Duration::from_millis(10))).await, Some(2));
        assert_eq!(queue.pop(Some(Duration::from_millis(10))).await, Some(3));
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let queue = MessageQueue::new(3);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert!(queue.push(3));
        assert!(!queue.push(4));
        // After taking two items, two pushes succeed again.
        assert_eq!(queue.pop(Some(Duration::from_millis(10))).await, Some(1));
        assert_eq!(queue.pop(Some(Duration::from_millis(10))).await, Some(2));
        assert!(queue.push(5));
        assert!(queue.push(6));
        assert!(!queue.push(7));
    }

    #[tokio::test(start_paused = true)]
    async fn pop_times_out_on_empty_queue() {
        let queue: MessageQueue<u32> = MessageQueue::new(4);
        let started = tokio::time::Instant::now();
        assert_eq!(queue.pop(Some(Duration::from_millis(100))).await, None);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn disable_unblocks_waiters() {
        let queue: Arc<MessageQueue<u32>> = Arc::new(MessageQueue::new(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop(Some(Duration::from_secs(30))).await })
        };
        tokio::task::yield_now().await;
        queue.set_enable(false);
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn disabled_queue_keeps_items_for_reenable() {
        let queue = MessageQueue::new(4);
        assert!(queue.push(42));
        queue.set_enable(false);
        assert_eq!(queue.pop(Some(Duration::from_millis(10))).await, None);
        queue.set_enable(true);
        assert_eq!(queue.pop(Some(Duration::from_millis(10))).await, Some(42));
    }

    #[tokio::test]
    async fn clear_drops_items() {
        let queue = MessageQueue::new(4);
        queue.push(1);
        queue.push(2);
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.pop(Some(Duration::from_millis(10))).await, None);
    }

    #[tokio::test]
    async fn push_wakes_blocked_taker() {
        let queue: Arc<MessageQueue<u32>> = Arc::new(MessageQueue::new(4));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop(Some(Duration::from_secs(30))).await })
        };
        tokio::task::yield_now().await;
        assert!(queue.push(7));
        assert_eq!(waiter.await.unwrap(), Some(7));
    }
}

//! Thread-safe FIFO queue with a "became non-empty" wait.
//!
//! Used for the outward event queue (many producers, one polling consumer)
//! and for each connection's send queue (many producers, one send thread
//! that parks on `wait_not_empty` instead of spinning).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Unbounded FIFO queue safe for concurrent enqueue and dequeue.
pub struct SafeQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
}

impl<T> SafeQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    // A panic on another thread must not wedge the queue for everyone else.
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item and wake one waiter.
    ///
    /// Returns `false` (and drops the item) once the queue is closed.
    pub fn enqueue(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Pop the oldest item, if any. Never blocks on an empty queue.
    pub fn try_dequeue(&self) -> Option<T> {
        self.lock().items.pop_front()
    }

    /// Take every queued item at once, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.lock().items.drain(..).collect()
    }

    /// Block until the queue holds at least one item or is closed.
    ///
    /// Returns `false` if the queue was closed.
    pub fn wait_not_empty(&self) -> bool {
        let mut state = self.lock();
        while state.items.is_empty() && !state.closed {
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        !state.closed
    }

    /// Reject further items and wake every waiter.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_all();
    }

    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn clear(&self) {
        self.lock().items.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }
}

impl<T> Default for SafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_fifo_order() {
        let queue = SafeQueue::new();
        for i in 0..5 {
            assert!(queue.enqueue(i));
        }

        assert_eq!(queue.len(), 5);
        assert_eq!(queue.try_dequeue(), Some(0));
        assert_eq!(queue.drain(), vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
        assert_eq!(queue.try_dequeue(), None);
    }

    #[test]
    fn test_clear() {
        let queue = SafeQueue::new();
        queue.enqueue("a");
        queue.enqueue("b");
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.enqueue("c"));
    }

    #[test]
    fn test_closed_queue_rejects_items() {
        let queue = SafeQueue::new();
        queue.enqueue(1);
        queue.close();

        assert!(queue.is_closed());
        assert!(!queue.enqueue(2));
        assert!(!queue.wait_not_empty());
        // Items queued before close can still be drained.
        assert_eq!(queue.drain(), vec![1]);
    }

    #[test]
    fn test_wait_wakes_on_enqueue() {
        let queue = Arc::new(SafeQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                assert!(queue.wait_not_empty());
                queue.drain()
            })
        };

        thread::sleep(Duration::from_millis(20));
        queue.enqueue(42);
        assert_eq!(waiter.join().unwrap(), vec![42]);
    }

    #[test]
    fn test_wait_wakes_on_close() {
        let queue: Arc<SafeQueue<u8>> = Arc::new(SafeQueue::new());

        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_not_empty())
        };

        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_concurrent_producers() {
        let queue = Arc::new(SafeQueue::new());

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..1000 {
                        queue.enqueue(p * 1000 + i);
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }

        let mut items = queue.drain();
        assert_eq!(items.len(), 4000);
        items.sort_unstable();
        items.dedup();
        assert_eq!(items.len(), 4000);
    }
}

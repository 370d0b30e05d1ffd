//! Per-worker FIFO queue guarded by a mutex and condition variable

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    done: bool,
}

/// Unbounded FIFO shared between one owning worker and any number of thieves
///
/// The `try_*` variants never wait for the lock, which is what lets the
/// dispatcher and stealing workers skip a contended queue and move on.
#[derive(Debug)]
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    ready: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                done: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Push, waiting for the lock if necessary
    pub fn push(&self, item: T) {
        self.state.lock().items.push_back(item);
        self.ready.notify_one();
    }

    /// Push only if the lock is free; hands the item back otherwise
    pub fn try_push(&self, item: T) -> Result<(), T> {
        match self.state.try_lock() {
            Some(mut state) => {
                state.items.push_back(item);
                drop(state);
                self.ready.notify_one();
                Ok(())
            }
            None => Err(item),
        }
    }

    /// Pop, blocking until an item arrives
    ///
    /// Returns `None` once the queue is both empty and marked done.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.done {
            self.ready.wait(&mut state);
        }
        state.items.pop_front()
    }

    /// Pop only if the lock is free and an item is waiting
    pub fn try_pop(&self) -> Option<T> {
        self.state.try_lock()?.items.pop_front()
    }

    /// Mark the queue done and wake every waiter
    ///
    /// Items already queued are still handed out by [`WorkQueue::pop`].
    pub fn set_done(&self) {
        self.state.lock().done = true;
        self.ready.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.state.lock().done
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}

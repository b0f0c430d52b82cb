// Copyright 2019 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! One-shot timer facility backing retransmission, request timeouts, and
//! dedup-record eviction.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

type TimerCallback = Box<dyn FnOnce() + Send>;

struct TimerEntry {
    deadline: Instant,
    id: u64,
    callback: TimerCallback,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &TimerEntry) -> bool {
        self.id == other.id
    }
}

impl Eq for TimerEntry {}

// Reversed so that the earliest deadline surfaces first in the max-heap.
impl Ord for TimerEntry {
    fn cmp(&self, other: &TimerEntry) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &TimerEntry) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct TimerQueue {
    entries: BinaryHeap<TimerEntry>,
    cancelled: HashSet<u64>,
    next_id: u64,
    shutdown: bool,
}

struct TimerShared {
    queue: Mutex<TimerQueue>,
    wakeup: Condvar,
}

impl TimerShared {
    fn lock_queue(&self) -> MutexGuard<'_, TimerQueue> {
        match self.queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A facility for firing one-shot callbacks after a delay.
///
/// Callbacks run on a single worker thread, in deadline order. Dropping the
/// `Timer` stops the worker; entries that have not fired yet are discarded.
pub struct Timer {
    shared: Arc<TimerShared>,
    worker: Option<thread::JoinHandle<()>>,
}

impl Timer {
    /// Creates a new timer with its own worker thread.
    pub fn new() -> Timer {
        let shared = Arc::new(TimerShared {
            queue: Mutex::new(TimerQueue::default()),
            wakeup: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("coap-timer".into())
            .spawn(move || Timer::run(worker_shared))
            .expect("Failed to spawn timer thread");

        Timer {
            shared,
            worker: Some(worker),
        }
    }

    /// Schedules `callback` to fire once after `delay`.
    ///
    /// The returned handle can cancel the entry; dropping the handle leaves
    /// the entry scheduled.
    pub fn schedule<F>(&self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.lock_queue();
        let id = queue.next_id;
        queue.next_id += 1;
        queue.entries.push(TimerEntry {
            deadline: Instant::now() + delay,
            id,
            callback: Box::new(callback),
        });
        drop(queue);
        self.shared.wakeup.notify_one();

        TimerHandle {
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    fn run(shared: Arc<TimerShared>) {
        let mut queue = shared.lock_queue();
        loop {
            if queue.shutdown {
                return;
            }

            let now = Instant::now();
            let mut due: Vec<TimerCallback> = Vec::new();
            loop {
                match queue.entries.peek() {
                    Some(entry) if entry.deadline <= now => {}
                    _ => break,
                }
                match queue.entries.pop() {
                    Some(entry) => {
                        if !queue.cancelled.remove(&entry.id) {
                            due.push(entry.callback);
                        }
                    }
                    None => break,
                }
            }

            if !due.is_empty() {
                // Callbacks run unlocked so they may schedule further entries.
                drop(queue);
                for callback in due {
                    callback();
                }
                queue = shared.lock_queue();
                continue;
            }

            queue = match queue.entries.peek().map(|entry| entry.deadline) {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match shared.wakeup.wait_timeout(queue, wait) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match shared.wakeup.wait(queue) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Timer::new()
    }
}

impl Debug for Timer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let queue = self.shared.lock_queue();
        f.debug_struct("Timer")
            .field("entries", &queue.entries.len())
            .field("shutdown", &queue.shutdown)
            .finish()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shared.lock_queue().shutdown = true;
        self.wakeup_worker();

        if let Some(worker) = self.worker.take() {
            // The last reference can be dropped from a timer callback, in
            // which case the worker cannot join itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}

impl Timer {
    fn wakeup_worker(&self) {
        self.shared.wakeup.notify_one();
    }
}

/// Handle to a scheduled timer entry.
pub struct TimerHandle {
    id: u64,
    shared: Weak<TimerShared>,
}

impl TimerHandle {
    /// Cancels the entry. A no-op if the entry already fired or the timer is
    /// gone.
    pub fn cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            let mut queue = shared.lock_queue();
            if queue.entries.iter().any(|entry| entry.id == self.id) {
                queue.cancelled.insert(self.id);
            }
        }
    }
}

impl Debug for TimerHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerHandle").field("id", &self.id).finish()
    }
}

//! queue-based task system for the parallel traverser
//!
//! a fixed pool of workers, one FIFO queue per worker, round-robin
//! submission. a single liveness counter tracks queued tasks plus active
//! workers; `finish` blocks until it reaches zero. a failing task latches
//! the system into shutdown and forces the counter to zero so `finish`
//! observes the failure instead of hanging.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use crate::error::{Error, Result};

/// unit of work; a failure shuts the whole system down
pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

/// integer gauge signalling waiters whenever it reaches zero
struct WorkCount {
    value: Mutex<i64>,
    zero: Condvar,
}

impl WorkCount {
    fn new(init: i64) -> Self {
        Self {
            value: Mutex::new(init),
            zero: Condvar::new(),
        }
    }

    /// add `by` (may be negative), waking waiters on zero
    fn add(&self, by: i64) {
        let mut value = self.value.lock().unwrap();
        *value += by;
        if *value == 0 {
            self.zero.notify_all();
        }
    }

    fn set(&self, to: i64) {
        let mut value = self.value.lock().unwrap();
        *value = to;
        if *value == 0 {
            self.zero.notify_all();
        }
    }

    fn wait_zero(&self) {
        let mut value = self.value.lock().unwrap();
        while *value != 0 {
            value = self.zero.wait(value).unwrap();
        }
    }
}

struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    ready: Condvar,
}

struct Shared {
    queues: Vec<TaskQueue>,
    next: AtomicUsize,
    /// queued tasks + active workers
    total_work: WorkCount,
    shutdown: AtomicBool,
    failure: Mutex<Option<Error>>,
}

impl Shared {
    fn record_failure(&self, error: Error) {
        let mut slot = self.failure.lock().unwrap();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    /// raise shutdown, drop queued work and release `finish` waiters
    fn abort(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for queue in &self.queues {
            queue.tasks.lock().unwrap().clear();
            queue.ready.notify_all();
        }
        self.total_work.set(0);
    }
}

/// worker pool with per-worker FIFO queues
pub struct TaskSystem {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskSystem {
    /// create the task system with `max_workers` many threads (at least one)
    pub fn new(max_workers: usize) -> Self {
        let num_workers = max_workers.max(1);
        let shared = Arc::new(Shared {
            queues: (0..num_workers)
                .map(|_| TaskQueue {
                    tasks: Mutex::new(VecDeque::new()),
                    ready: Condvar::new(),
                })
                .collect(),
            next: AtomicUsize::new(0),
            // all workers start out active
            total_work: WorkCount::new(num_workers as i64),
            shutdown: AtomicBool::new(false),
            failure: Mutex::new(None),
        });
        let workers = (0..num_workers)
            .map(|idx| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || worker(&shared, idx))
            })
            .collect();
        Self {
            shared,
            workers: Mutex::new(workers),
        }
    }

    /// submit a task on the next queue in round-robin order
    ///
    /// submissions after shutdown are dropped.
    pub fn add<F>(&self, task: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let shared = &self.shared;
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        let idx = shared.next.fetch_add(1, Ordering::SeqCst) % shared.queues.len();
        let queue = &shared.queues[idx];
        let mut tasks = queue.tasks.lock().unwrap();
        shared.total_work.add(1);
        tasks.push_back(Box::new(task));
        queue.ready.notify_all();
    }

    /// wait until no tasks are queued and every worker is idle
    ///
    /// returns the first recorded failure, if any task failed meanwhile.
    pub fn finish(&self) -> Result<()> {
        self.shared.total_work.wait_zero();
        match self.shared.failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// initiate shutdown and wait for all workers to stop
    pub fn shutdown(&self) {
        self.shared.abort();
        let handles = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker(shared: &Shared, idx: usize) {
    let queue = &shared.queues[idx];
    while !shared.shutdown.load(Ordering::SeqCst) {
        let mut task = None;
        {
            let mut tasks = queue.tasks.lock().unwrap();
            if tasks.is_empty() {
                shared.total_work.add(-1); // suspend
                while tasks.is_empty() && !shared.shutdown.load(Ordering::SeqCst) {
                    tasks = queue.ready.wait(tasks).unwrap();
                }
                shared.total_work.add(1); // active again
            }
            if !shared.shutdown.load(Ordering::SeqCst) {
                if let Some(next) = tasks.pop_front() {
                    shared.total_work.add(-1);
                    task = Some(next);
                }
            }
        }
        if let Some(task) = task {
            match panic::catch_unwind(AssertUnwindSafe(task)) {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::error!(error = %error, "task failed, shutting down");
                    shared.record_failure(error);
                    break;
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::error!(panic = message, "task panicked, shutting down");
                    shared.record_failure(Error::TaskPanicked(message.to_string()));
                    break;
                }
            }
        }
    }
    // any worker leaving the loop releases `finish` waiters
    shared.abort();
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

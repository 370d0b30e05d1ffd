//! Work-stealing thread pool
//!
//! Every worker owns one [`WorkQueue`]. Submission starts at a round-robin
//! queue and walks the ring with non-blocking pushes, falling back to a
//! blocking push on the starting queue. Workers drain their own queue first,
//! steal from the others in ring order, and only then block on their own
//! queue.

use crate::config::DEFAULT_PUSH_ROUNDS;
use crate::error::{PortQueryError, Result};
use crate::pool::queue::WorkQueue;
use crossbeam_channel::{bounded, Receiver};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Upper bound on workers per pool
pub const MAX_THREADS: usize = 1024;

/// Pending result of a submitted job
#[derive(Debug)]
pub struct JobHandle<R> {
    receiver: Receiver<std::result::Result<R, String>>,
}

impl<R> JobHandle<R> {
    /// Block until the job finishes
    ///
    /// A panicking job yields [`PortQueryError::Job`] carrying the panic
    /// message; the worker that ran it keeps going.
    pub fn wait(self) -> Result<R> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(PortQueryError::Job(format!("job panicked: {}", message))),
            Err(_) => Err(PortQueryError::Job(
                "job was dropped before it ran".to_string(),
            )),
        }
    }

    /// The result, if the job has already finished
    pub fn try_wait(&self) -> Option<Result<R>> {
        match self.receiver.try_recv() {
            Ok(Ok(value)) => Some(Ok(value)),
            Ok(Err(message)) => Some(Err(PortQueryError::Job(format!(
                "job panicked: {}",
                message
            )))),
            Err(_) => None,
        }
    }
}

/// Fixed-size pool of worker threads with per-worker queues
pub struct ThreadPool {
    queues: Arc<[WorkQueue<Job>]>,
    workers: Vec<JoinHandle<()>>,
    next: AtomicUsize,
    push_rounds: usize,
}

impl ThreadPool {
    /// Spawn `threads` workers; `0` uses the number of logical CPUs
    pub fn new(threads: usize) -> Result<Self> {
        let count = if threads == 0 { num_cpus::get() } else { threads };
        if count > MAX_THREADS {
            return Err(PortQueryError::Config(format!(
                "threads must be at most {}, got {}",
                MAX_THREADS, count
            )));
        }
        let queues: Arc<[WorkQueue<Job>]> = (0..count).map(|_| WorkQueue::new()).collect();

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let worker_queues = Arc::clone(&queues);
            let spawned = thread::Builder::new()
                .name(format!("portquery-worker-{}", index))
                .spawn(move || run_worker(index, &worker_queues));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shutdown(&queues, workers);
                    return Err(e.into());
                }
            }
        }

        log::debug!("thread pool started with {} workers", count);
        Ok(Self {
            queues,
            workers,
            next: AtomicUsize::new(0),
            push_rounds: DEFAULT_PUSH_ROUNDS,
        })
    }

    /// Set how many non-blocking passes `submit` makes before blocking
    pub fn with_push_rounds(mut self, rounds: usize) -> Self {
        self.push_rounds = rounds.max(1);
        self
    }

    pub fn threads(&self) -> usize {
        self.queues.len()
    }

    pub fn push_rounds(&self) -> usize {
        self.push_rounds
    }

    /// Queue a job and return a handle to its result
    pub fn submit<F, R>(&self, f: F) -> JobHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (sender, receiver) = bounded(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| panic_message(payload.as_ref()));
            // the handle may already be gone
            let _ = sender.send(outcome);
        });
        self.dispatch(job);
        JobHandle { receiver }
    }

    fn dispatch(&self, mut job: Job) {
        let count = self.queues.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % count;

        for _ in 0..self.push_rounds {
            for offset in 0..count {
                match self.queues[(start + offset) % count].try_push(job) {
                    Ok(()) => return,
                    Err(returned) => job = returned,
                }
            }
        }
        self.queues[start].push(job);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        shutdown(&self.queues, std::mem::take(&mut self.workers));
    }
}

/// Mark every queue done and join the workers; queued jobs still run
fn shutdown(queues: &[WorkQueue<Job>], workers: Vec<JoinHandle<()>>) {
    for queue in queues {
        queue.set_done();
    }
    for worker in workers {
        if worker.join().is_err() {
            log::warn!("pool worker exited abnormally");
        }
    }
}

fn run_worker(index: usize, queues: &[WorkQueue<Job>]) {
    loop {
        if let Some(job) = steal(index, queues) {
            job();
            continue;
        }
        match queues[index].pop() {
            Some(job) => job(),
            // own queue is drained and done: one last sweep before exiting
            None => match steal(index, queues) {
                Some(job) => job(),
                None => return,
            },
        }
    }
}

/// Non-blocking pop from the worker's own queue, then the rest of the ring
fn steal(index: usize, queues: &[WorkQueue<Job>]) -> Option<Job> {
    let count = queues.len();
    (0..count).find_map(|offset| queues[(index + offset) % count].try_pop())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_submit_returns_value() {
        let pool = ThreadPool::new(2).unwrap();
        let handle = pool.submit(|| 6 * 7);
        assert_eq!(handle.wait().unwrap(), 42);
    }

    #[test]
    fn test_zero_threads_uses_cpu_count() {
        let pool = ThreadPool::new(0).unwrap();
        assert_eq!(pool.threads(), num_cpus::get());
        assert_eq!(pool.push_rounds(), DEFAULT_PUSH_ROUNDS);
        assert_eq!(pool.with_push_rounds(0).push_rounds(), 1);
    }

    #[test]
    fn test_oversized_pool_rejected() {
        let err = ThreadPool::new(MAX_THREADS + 1).err().unwrap();
        assert!(matches!(err, PortQueryError::Config(_)));
    }

    #[test]
    fn test_single_worker_runs_every_job() {
        let pool = ThreadPool::new(1).unwrap();
        let started = Instant::now();
        let handles: Vec<_> = (0..10)
            .map(|i| {
                pool.submit(move || {
                    thread::sleep(Duration::from_millis(5));
                    i
                })
            })
            .collect();

        let results: Vec<i32> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        assert_eq!(results, (0..10).collect::<Vec<_>>());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn test_panic_is_isolated() {
        let pool = ThreadPool::new(2).unwrap();
        let bad = pool.submit(|| -> u8 { panic!("probe exploded") });
        let good = pool.submit(|| 1u8);

        let err = bad.wait().unwrap_err();
        assert!(matches!(err, PortQueryError::Job(ref m) if m.contains("probe exploded")));
        assert_eq!(good.wait().unwrap(), 1);

        // workers survive and keep serving
        assert_eq!(pool.submit(|| "still alive").wait().unwrap(), "still alive");
    }

    #[test]
    fn test_drop_drains_queued_jobs() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = ThreadPool::new(3).unwrap().with_push_rounds(2);
            for _ in 0..500 {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        assert_eq!(counter.load(Ordering::SeqCst), 500);
    }

    #[test]
    fn test_jobs_spread_across_workers() {
        let pool = ThreadPool::new(4).unwrap();
        let handles: Vec<_> = (0..64)
            .map(|_| {
                pool.submit(|| {
                    thread::sleep(Duration::from_millis(2));
                    thread::current().name().map(str::to_string)
                })
            })
            .collect();

        let mut names: Vec<String> = handles
            .into_iter()
            .filter_map(|h| h.wait().unwrap())
            .collect();
        names.sort();
        names.dedup();
        assert!(names.len() > 1);
        assert!(names.iter().all(|n| n.starts_with("portquery-worker-")));
    }
}

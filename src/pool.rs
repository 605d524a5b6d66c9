//! Fixed-size worker pool draining the connection queue
//!
//! Workers are spawned once at startup and live for the pool's
//! lifetime. Each one loops: blocking-pop a unit of work, run the
//! handler synchronously, repeat. The loop exits only when the queue is
//! closed and drained, so shutdown lets in-flight work finish.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::queue::ConnQueue;

pub struct WorkerPool<T> {
    queue: Arc<ConnQueue<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Spawn `count` workers running `handler` on each dequeued item.
    /// `count = 0` sizes the pool to the CPU count.
    pub fn start<F>(count: usize, queue: Arc<ConnQueue<T>>, handler: F) -> Self
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let count = if count == 0 { num_cpus::get() } else { count };
        let handler = Arc::new(handler);
        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let worker = thread::Builder::new()
                .name(format!("fget-worker-{}", id))
                .spawn(move || {
                    while let Some(item) = queue.pop_wait() {
                        // A misbehaving handler must not take the worker down
                        if catch_unwind(AssertUnwindSafe(|| (*handler)(item))).is_err() {
                            eprintln!("worker {}: handler panicked, continuing", id);
                        }
                    }
                })
                .expect("failed to spawn worker thread");
            workers.push(worker);
        }
        WorkerPool { queue, workers }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and join every worker. Items already dequeued or
    /// still queued are processed before the workers exit.
    pub fn shutdown(self) {
        self.queue.close();
        for w in self.workers {
            let _ = w.join();
        }
    }
}

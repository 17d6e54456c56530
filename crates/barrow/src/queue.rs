//! Bounded work queue with a fixed worker pool.
//!
//! File paths are distributed to competing workers through a single shared
//! bounded channel; fast workers naturally pick up more files. The producer
//! blocks while the backlog is full, which keeps enumeration from racing
//! ahead of hashing and copying.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};

/// Backlog per worker; producers block once the queue holds four items per
/// worker.
const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// Worker count for the current machine: one per hardware thread, at
/// least one.
pub fn default_worker_count() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// Fixed pool of worker threads fed file paths through a bounded FIFO.
pub struct WorkQueue {
    sender: Option<Sender<PathBuf>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkQueue {
    /// Start `worker_count` workers, each running `work` on every file it
    /// takes from the queue.
    pub fn start<F>(worker_count: usize, work: F) -> Self
    where
        F: Fn(&Path) + Send + Sync + 'static,
    {
        let work = Arc::new(work);
        let (sender, receiver) = bounded::<PathBuf>(worker_count * QUEUE_DEPTH_PER_WORKER);

        let workers = (0..worker_count)
            .map(|_| {
                let receiver = receiver.clone();
                let work = Arc::clone(&work);
                thread::spawn(move || {
                    while let Ok(file) = receiver.recv() {
                        work(&file);
                    }
                })
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Queue one file, blocking while the queue is full.
    ///
    /// Files enqueued after `finalize` are dropped.
    pub fn enqueue(&self, file: PathBuf) {
        if let Some(sender) = &self.sender {
            // Fails only once every worker has exited.
            let _ = sender.send(file);
        }
    }

    /// Signal completion and wait for the workers to drain the queue.
    /// Idempotent.
    pub fn finalize(&mut self) {
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_every_item_is_processed_exactly_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_workers = Arc::clone(&seen);

        let mut queue = WorkQueue::start(4, move |file: &Path| {
            seen_by_workers.lock().unwrap().push(file.to_path_buf());
        });
        for i in 0..100 {
            queue.enqueue(PathBuf::from(format!("file-{i}")));
        }
        queue.finalize();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        let mut expected: Vec<PathBuf> =
            (0..100).map(|i| PathBuf::from(format!("file-{i}"))).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_producer_survives_slow_workers() {
        let processed = Arc::new(AtomicUsize::new(0));
        let processed_by_workers = Arc::clone(&processed);

        // One worker, queue depth 4: most enqueues block until the worker
        // catches up.
        let mut queue = WorkQueue::start(1, move |_: &Path| {
            thread::sleep(Duration::from_millis(1));
            processed_by_workers.fetch_add(1, Ordering::Relaxed);
        });
        for i in 0..50 {
            queue.enqueue(PathBuf::from(format!("slow-{i}")));
        }
        queue.finalize();

        assert_eq!(processed.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut queue = WorkQueue::start(2, |_: &Path| {});
        queue.enqueue(PathBuf::from("one"));
        queue.finalize();
        queue.finalize();
    }

    #[test]
    fn test_drop_without_finalize_joins_workers() {
        let processed = Arc::new(AtomicUsize::new(0));
        let processed_by_workers = Arc::clone(&processed);
        {
            let queue = WorkQueue::start(2, move |_: &Path| {
                processed_by_workers.fetch_add(1, Ordering::Relaxed);
            });
            for i in 0..10 {
                queue.enqueue(PathBuf::from(format!("drop-{i}")));
            }
        }
        assert_eq!(processed.load(Ordering::Relaxed), 10);
    }
}

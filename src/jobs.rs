//! Worker pool for data-parallel jobs (asset decoding)
//!
//! Workers pop jobs from a shared multi-consumer queue in submission order.
//! Jobs never touch actor or collision state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("thread pool is shut down")]
    ShutDown,
}

pub struct ThreadPool {
    sender: Option<flume::Sender<Job>>,
    should_quit: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    /// Spawn `threads` workers (at least one)
    pub fn new(threads: usize) -> Self {
        let threads = threads.max(1);
        let (sender, receiver) = flume::unbounded::<Job>();
        let should_quit = Arc::new(AtomicBool::new(false));

        let workers = (0..threads)
            .map(|index| {
                let receiver = receiver.clone();
                let should_quit = should_quit.clone();
                std::thread::Builder::new()
                    .name(format!("worker-{index}"))
                    .spawn(move || worker_loop(receiver, should_quit))
                    .unwrap_or_else(|e| panic!("failed to spawn worker thread: {e}"))
            })
            .collect();

        log::debug!("Thread pool started with {} workers", threads);

        Self {
            sender: Some(sender),
            should_quit,
            workers,
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    pub fn enqueue(&self, job: impl FnOnce() + Send + 'static) -> Result<(), JobError> {
        if self.should_quit.load(Ordering::Acquire) {
            return Err(JobError::ShutDown);
        }
        match &self.sender {
            Some(sender) => sender.send(Box::new(job)).map_err(|_| JobError::ShutDown),
            None => Err(JobError::ShutDown),
        }
    }

    /// Stop dequeuing and wait for running jobs to finish
    pub fn shutdown(&mut self) {
        self.should_quit.store(true, Ordering::Release);
        // Disconnecting wakes every idle worker
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::warn!("Worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: flume::Receiver<Job>, should_quit: Arc<AtomicBool>) {
    while let Ok(job) = receiver.recv() {
        if should_quit.load(Ordering::Acquire) {
            break;
        }
        job();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_every_job_runs_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = flume::unbounded();
        let pool = ThreadPool::new(3);
        for _ in 0..50 {
            let counter = counter.clone();
            let done_tx = done_tx.clone();
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = done_tx.send(());
            })
            .unwrap();
        }
        for _ in 0..50 {
            done_rx.recv().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[test]
    fn test_single_worker_preserves_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut pool = ThreadPool::new(1);
        for i in 0..10 {
            let order = order.clone();
            pool.enqueue(move || order.lock().unwrap().push(i)).unwrap();
        }
        let (done_tx, done_rx) = flume::bounded(1);
        pool.enqueue(move || {
            let _ = done_tx.send(());
        })
        .unwrap();
        done_rx.recv().unwrap();
        pool.shutdown();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_enqueue_after_shutdown_fails() {
        let mut pool = ThreadPool::new(2);
        pool.shutdown();
        assert_eq!(pool.enqueue(|| {}), Err(JobError::ShutDown));
        assert_eq!(pool.thread_count(), 0);
    }
}

//! Worker threads for FUSE callbacks
//!
//! fuser hands requests to the filesystem one at a time on the session
//! thread. Callbacks that may reach the naming service are pushed onto a
//! [`WorkerPool`] instead, so one slow lookup holds a single worker while
//! the session keeps reading requests for other users and names.
//!
//! The queue is bounded: when every worker is busy and the queue is full,
//! `execute` blocks the session thread until a slot frees up.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendError, Sender};

/// Default number of worker threads
pub const DEFAULT_WORKERS: usize = 8;

/// Queued jobs per worker before `execute` applies backpressure
const QUEUE_PER_WORKER: usize = 16;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of named worker threads fed by a bounded channel
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `threads` workers (at least one)
    pub fn new(threads: usize) -> io::Result<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = crossbeam_channel::bounded::<Job>(threads * QUEUE_PER_WORKER);

        let mut handles = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("lockerfs-worker-{}", i))
                .spawn(move || work(receiver))?;
            handles.push(handle);
        }

        log::debug!("started {} worker threads", threads);
        Ok(WorkerPool {
            sender: Some(sender),
            handles,
        })
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Queue `job`; runs it on the calling thread if the pool is shut down
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);
        match &self.sender {
            Some(sender) => {
                if let Err(SendError(job)) = sender.send(job) {
                    job();
                }
            }
            None => job(),
        }
    }
}

fn work(receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        // A panicking callback drops its reply (fuser answers EIO) and
        // must not take the worker with it.
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!("worker job panicked");
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets each worker drain the queue and exit
        self.sender.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

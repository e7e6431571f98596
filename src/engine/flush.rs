//! Background flush workers.
//!
//! A fixed-size pool of threads drains a single queue of flush jobs. Jobs
//! are idempotent per generation: each serializes one retired memtable to
//! its reserved generation and commits the published table under the
//! engine's write lock. A failed job logs and leaves the table set
//! untouched — the memtable stays readable in the flushing set and is
//! retried synchronously when the engine closes.

use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Arc, Mutex,
};
use std::thread::JoinHandle;

use tracing::{error, info};

use crate::memtable::Memtable;

use super::{EngineError, Shared};

/// One retired memtable and the generation reserved for its file.
pub(crate) struct FlushJob {
    pub generation: u64,
    pub memtable: Arc<Memtable>,
}

/// Fixed-size worker pool over a shared job queue.
#[derive(Debug)]
pub(crate) struct FlushPool {
    sender: Mutex<Option<Sender<FlushJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl FlushPool {
    /// Spawns `size` workers (at least one) against the engine state.
    pub fn start(size: usize, shared: Arc<Shared>) -> Self {
        let (sender, receiver) = channel::<FlushJob>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size.max(1))
            .filter_map(|index| {
                let receiver = Arc::clone(&receiver);
                let shared = Arc::clone(&shared);
                std::thread::Builder::new()
                    .name(format!("flush-{index}"))
                    .spawn(move || worker_loop(receiver, shared))
                    .map_err(|err| error!(%err, "failed to spawn flush worker"))
                    .ok()
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Enqueues a job; fails with `Closed` once the pool is shut down.
    pub fn submit(&self, job: FlushJob) -> Result<(), EngineError> {
        let sender = self.sender.lock()?;
        sender
            .as_ref()
            .ok_or(EngineError::Closed)?
            .send(job)
            .map_err(|_| EngineError::Closed)
    }

    /// Closes the queue and waits for the workers to drain it. Safe to
    /// call more than once.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        if let Ok(mut workers) = self.workers.lock() {
            for worker in workers.drain(..) {
                if worker.join().is_err() {
                    error!("flush worker panicked");
                }
            }
        }
    }
}

fn worker_loop(receiver: Arc<Mutex<Receiver<FlushJob>>>, shared: Arc<Shared>) {
    loop {
        // The guard is held only for the blocking recv itself.
        let job = match receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return,
        };
        match job {
            Ok(job) => {
                if let Err(err) = run(&shared, &job) {
                    // The table set is untouched on failure; the memtable
                    // stays readable in the flushing set for a retry.
                    error!(generation = job.generation, %err, "flush failed");
                }
            }
            // Queue closed and drained.
            Err(_) => return,
        }
    }
}

/// Serializes the memtable and commits the published table.
pub(crate) fn run(shared: &Shared, job: &FlushJob) -> Result<(), EngineError> {
    let cells = job.memtable.len();
    let table = shared.serialize(job.generation, job.memtable.iter_from(&[]))?;

    let mut tables = shared.tables.write()?;
    let current = Arc::clone(&tables);
    *tables = Arc::new(current.move_to_flushed(job.generation, table));
    drop(tables);

    info!(generation = job.generation, cells, "memtable flushed");
    Ok(())
}

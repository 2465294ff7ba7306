//! The remote-I/O worker pool.
//!
//! A fixed set of workers consumes one FIFO instruction queue. Each worker
//! owns a long-lived [`reqwest::Client`], reused across instructions to
//! amortize connection setup; clients are never shared between workers.
//! Instructions carry an opaque body and an optional completion signal.
//! The pool does not interpret instruction results: a failure is logged as
//! a warning and the per-instruction semantics stay with the caller.
//!
//! The pool is owned by the embedding runtime and handed down explicitly;
//! there is no process-global instance.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::Client;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Worker count used when the embedding runtime does not configure one.
pub const DEFAULT_WORKER_COUNT: usize = 10;

/// Boxed instruction body. Runs against the executing worker's HTTP
/// client; the returned error is opaque to the pool.
pub type InstructionFuture = BoxFuture<'static, anyhow::Result<()>>;

struct Instruction {
    run: Box<dyn FnOnce(Client) -> InstructionFuture + Send>,
    done: Option<oneshot::Sender<()>>,
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker count must be at least 1")]
    NoWorkers,
    #[error("worker pool is shut down")]
    Closed,
}

/// Fixed-size worker set executing queued remote-I/O instructions.
///
/// Dispatch is FIFO in submission order. Completion signals carry no
/// ordering guarantee across instructions; callers needing order must
/// sequence their submissions.
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<Instruction>,
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Starts a pool of `count` workers. Zero workers is rejected.
    pub fn start(count: usize) -> Result<Self, PoolError> {
        if count == 0 {
            return Err(PoolError::NoWorkers);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Mutex::new(rx));
        let mut workers = JoinSet::new();
        for id in 0..count {
            workers.spawn(Self::worker(id, Arc::clone(&queue)));
        }
        Ok(Self { tx, workers })
    }

    /// Enqueues an instruction and returns immediately.
    ///
    /// `done` is released once a worker has finished the instruction; the
    /// caller receives completion by awaiting the paired receiver.
    pub fn instruct<F>(&self, run: F, done: oneshot::Sender<()>) -> Result<(), PoolError>
    where
        F: FnOnce(Client) -> InstructionFuture + Send + 'static,
    {
        self.submit(Instruction {
            run: Box::new(run),
            done: Some(done),
        })
    }

    /// Enqueues an instruction and waits until a worker has finished it,
    /// turning an asynchronous submission into a synchronous call.
    pub async fn await_instruct<F>(&self, run: F) -> Result<(), PoolError>
    where
        F: FnOnce(Client) -> InstructionFuture + Send + 'static,
    {
        let (done, released) = oneshot::channel();
        self.instruct(run, done)?;
        released.await.map_err(|_| PoolError::Closed)
    }

    /// Stops the pool. Already-queued instructions are still executed;
    /// each worker exits once the queue is drained and is joined here.
    pub async fn shutdown(self) {
        let Self { tx, mut workers } = self;
        drop(tx);
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                if !err.is_cancelled() {
                    error!(%err, "worker task failed");
                }
            }
        }
    }

    fn submit(&self, instruction: Instruction) -> Result<(), PoolError> {
        self.tx.send(instruction).map_err(|_| PoolError::Closed)
    }

    async fn worker(id: usize, queue: Arc<Mutex<mpsc::UnboundedReceiver<Instruction>>>) {
        // the one client this worker reuses for its whole life; losing it
        // costs one worker, not the pool
        let client = match Client::builder().build() {
            Ok(client) => client,
            Err(err) => {
                error!(worker = id, %err, "failed to build http client, stopping worker");
                return;
            }
        };
        debug!(worker = id, "worker started");

        loop {
            // holding the lock while waiting keeps dispatch strictly FIFO:
            // exactly one worker pops the head at a time
            let next = queue.lock().await.recv().await;
            let Some(instruction) = next else {
                break;
            };
            if let Err(err) = (instruction.run)(client.clone()).await {
                warn!(worker = id, %err, "instruction finished with an error");
            }
            if let Some(done) = instruction.done {
                let _ = done.send(());
            }
        }
        debug!(worker = id, "worker stopped");
    }
}

//! Worker pool that runs provider queries off the caller's thread while
//! still handing back a synchronous result.
//!
//! A job submitted from one of the pool's own workers runs inline instead of
//! being queued, so a query that re-enters the service cannot wait on itself.

use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

/// Upper bound on how long a caller blocks waiting for one query.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_WORKERS: usize = 2;

type Job = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static ON_QUERY_WORKER: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("query did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("query panicked: {0}")]
    Panicked(String),

    #[error("query executor has shut down")]
    Closed,
}

pub struct QueryExecutor {
    sender: mpsc::Sender<Job>,
    timeout: Duration,
    _workers: Vec<thread::JoinHandle<()>>,
}

impl QueryExecutor {
    /// Spawn `workers` named threads sharing one job queue.
    ///
    /// # Errors
    /// Returns an error when the OS refuses to spawn a worker thread.
    pub fn new(workers: usize, timeout: Duration) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let handle = thread::Builder::new()
                .name(format!("packsmith-query-{index}"))
                .spawn(move || {
                    ON_QUERY_WORKER.with(|flag| flag.set(true));
                    loop {
                        let next = receiver.lock().recv();
                        match next {
                            Ok(job) => job(),
                            Err(_) => break,
                        }
                    }
                })?;
            handles.push(handle);
        }

        Ok(Self { sender, timeout, _workers: handles })
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `job` on a worker and block until it finishes, panics, or times out.
    ///
    /// # Errors
    /// Returns `TimedOut`, `Panicked`, or `Closed`; the job's own value is never inspected.
    pub fn run<T, F>(&self, job: F) -> Result<T, ExecutorError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if ON_QUERY_WORKER.with(Cell::get) {
            return catch_unwind(AssertUnwindSafe(job))
                .map_err(|payload| ExecutorError::Panicked(panic_message(payload.as_ref())));
        }

        let (result_tx, result_rx) = mpsc::sync_channel(1);
        let boxed: Job = Box::new(move || {
            let outcome = catch_unwind(AssertUnwindSafe(job));
            let _ = result_tx.send(outcome);
        });
        self.sender.send(boxed).map_err(|_| ExecutorError::Closed)?;

        match result_rx.recv_timeout(self.timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => Err(ExecutorError::Panicked(panic_message(payload.as_ref()))),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(ExecutorError::TimedOut(self.timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(ExecutorError::Closed),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

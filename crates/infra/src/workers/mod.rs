//! Background worker threads with graceful shutdown.

mod projection_worker;
mod quota_flush;

use std::sync::mpsc;
use std::thread;

pub use projection_worker::ProjectionWorker;
pub use quota_flush::QuotaFlushWorker;

/// Handle to control and join a background worker.
///
/// The worker's final output (`T`) is handed back on shutdown.
#[derive(Debug)]
pub struct WorkerHandle<T = ()> {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<T>>,
}

impl<T> WorkerHandle<T> {
    pub(crate) fn new(shutdown: mpsc::Sender<()>, join: thread::JoinHandle<T>) -> Self {
        Self {
            shutdown,
            join: Some(join),
        }
    }

    /// Request graceful shutdown and wait for the worker to stop.
    ///
    /// Returns `None` if the worker thread panicked.
    pub fn shutdown(mut self) -> Option<T> {
        let _ = self.shutdown.send(());
        self.join.take().and_then(|j| j.join().ok())
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(thread::JoinHandle::is_finished)
    }
}

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use super::WorkerHandle;
use crate::quota::TenantQuotaManager;

/// Periodically flushes quota counters to the manager's durable store.
///
/// A last flush runs on shutdown, so only usage recorded after that (or
/// during a crash) can be lost.
#[derive(Debug)]
pub struct QuotaFlushWorker;

impl QuotaFlushWorker {
    pub fn spawn(
        manager: Arc<TenantQuotaManager>,
        interval: Duration,
    ) -> io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let join = thread::Builder::new()
            .name("quota-flush".to_string())
            .spawn(move || {
                loop {
                    match shutdown_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => flush(&manager),
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                flush(&manager);
                debug!("quota flush worker stopped");
            })?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}

fn flush(manager: &TenantQuotaManager) {
    if let Err(err) = manager.flush() {
        warn!(error = %err, "quota flush failed");
    }
}

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::warn;

use chronicle_events::{Projection, ProjectionRunner, Subscription};

use super::WorkerHandle;

/// Feeds a live subscription into a projection on a background thread.
///
/// The runner's cursor makes redelivered envelopes harmless, so the handler
/// side is at-least-once safe. The runner is returned on shutdown.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    pub fn spawn<P>(
        name: &str,
        mut subscription: Subscription,
        mut runner: ProjectionRunner<P>,
    ) -> io::Result<WorkerHandle<ProjectionRunner<P>>>
    where
        P: Projection + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let worker = name.to_string();

        let join = thread::Builder::new().name(worker.clone()).spawn(move || {
            let tick = Duration::from_millis(50);
            loop {
                // Shutdown check (non-blocking)
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                match subscription.next_timeout(tick) {
                    Ok(envelope) => {
                        if let Err(err) = runner.apply(&envelope) {
                            warn!(worker = %worker, error = %err, "projection worker skipped event");
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            // Anything already queued still counts.
            if let Err(err) = runner.catch_up(&mut subscription) {
                warn!(worker = %worker, error = %err, "projection worker skipped event");
            }
            runner
        })?;

        Ok(WorkerHandle::new(shutdown_tx, join))
    }
}

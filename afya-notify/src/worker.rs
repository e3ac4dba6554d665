//! Background worker thread for the transport runtime
//!
//! Spawns a thread with its own single-threaded tokio runtime. Transport
//! sessions are spawned onto it through the [`Handle`], so every session
//! driver and every listener callback runs on this one thread while the
//! client API stays synchronous.

use std::future::Future;
use std::sync::mpsc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::error::{NotifyError, Result};

const WORKER_THREAD_NAME: &str = "afya-notify-worker";

/// Owns the worker thread and its runtime.
#[derive(Debug)]
pub(crate) struct RuntimeWorker {
    handle: Handle,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    thread_id: ThreadId,
}

impl RuntimeWorker {
    /// Start the worker and wait until its runtime is ready.
    pub(crate) fn spawn() -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!("Failed to create tokio runtime for notification worker: {}", e);
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                if ready_tx.send(Ok(rt.handle().clone())).is_err() {
                    return;
                }

                tracing::debug!("Notification worker started");
                rt.block_on(async {
                    // Resolves on explicit shutdown or when the owner is dropped
                    let _ = shutdown_rx.await;
                });
                tracing::debug!("Notification worker stopped");
            })
            .map_err(|e| NotifyError::RuntimeStartup(e.to_string()))?;

        let handle = ready_rx
            .recv()
            .map_err(|_| NotifyError::RuntimeStartup("worker exited during start-up".to_string()))?
            .map_err(NotifyError::RuntimeStartup)?;

        Ok(Self {
            handle,
            shutdown_tx: Some(shutdown_tx),
            thread_id: thread.thread().id(),
            thread: Some(thread),
        })
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Run `task` on the worker and block until it completes or `limit`
    /// elapses. Returns `false` without waiting when called from the worker
    /// thread itself, or when the task did not complete in time.
    pub(crate) fn run_until<F>(&self, task: F, limit: Duration) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if thread::current().id() == self.thread_id {
            return false;
        }

        let (tx, rx) = mpsc::channel();
        self.handle.spawn(async move {
            if tokio::time::timeout(limit, task).await.is_ok() {
                let _ = tx.send(());
            }
        });
        rx.recv().is_ok()
    }

    /// Stop the runtime and join the thread. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            // The last client handle may be released from inside a callback,
            // in which case the worker thread is the one running this code.
            if thread::current().id() == self.thread_id {
                tracing::debug!("Worker released from its own thread, not joining");
                return;
            }
            if thread.join().is_err() {
                tracing::error!("Notification worker panicked");
            }
        }
    }
}

impl Drop for RuntimeWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

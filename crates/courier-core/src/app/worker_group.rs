//! WorkerGroup - spawned loops sharing one shutdown signal.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Worker group handle.
/// - `request_shutdown()` で全ループに停止を通知
/// - `shutdown_and_join()` で全ループの終了を待つ
///
/// Loops are expected to finish the job in hand before they observe the
/// signal; nothing is aborted.
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn new() -> Self {
        let (shutdown_tx, _rx) = watch::channel(false);
        Self {
            shutdown_tx,
            joins: Vec::new(),
        }
    }

    /// Spawn a loop built from the shutdown receiver.
    pub fn spawn<F, Fut>(&mut self, make: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let rx = self.shutdown_tx.subscribe();
        self.joins.push(tokio::spawn(make(rx)));
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Stop taking new work. Does not wait.
    pub fn request_shutdown(&self) {
        // send_replace never fails, even with no receivers left
        self.shutdown_tx.send_replace(true);
    }

    /// Shutdown and wait for all loops.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                tracing::error!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

impl Default for WorkerGroup {
    fn default() -> Self {
        Self::new()
    }
}

/// Sleep for `pause` unless shutdown is signalled first.
///
/// Returns `true` when the loop should stop.
pub(crate) async fn idle(shutdown: &mut watch::Receiver<bool>, pause: std::time::Duration) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        _ = tokio::time::sleep(pause) => false,
    }
}

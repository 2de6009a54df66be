use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crawler_core::UrlTask;

/// Bounded FIFO queue of URL Tasks shared by the worker pool. Seeds are
/// enqueued with a blocking send at startup; everything discovered at
/// runtime is offered non-blocking so a full frontier sheds load instead
/// of stalling fetch progress.
pub struct Frontier {
    tx: mpsc::Sender<UrlTask>,
    rx: Mutex<mpsc::Receiver<UrlTask>>,
}

impl Frontier {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity);
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
        })
    }

    pub async fn enqueue_seed(&self, task: UrlTask) -> bool {
        self.tx.send(task).await.is_ok()
    }

    /// Non-blocking: returns false (and drops the task) if the frontier is full.
    pub fn try_enqueue_discovered(&self, task: UrlTask) -> bool {
        self.tx.try_send(task).is_ok()
    }

    pub async fn dequeue(&self) -> Option<UrlTask> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}

//! One-shot timers on the tokio runtime

use nextup_host_api::{HostError, HostResult, TimerFired, TimerHandle, TimerSubstrate};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Timer substrate spawning one sleeping task per armed timer
pub struct TokioTimer {
    next_id: AtomicU64,
    tasks: Arc<Mutex<HashMap<u64, JoinHandle<()>>>>,
    event_tx: mpsc::UnboundedSender<TimerFired>,
    event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<TimerFired>>>>,
}

impl TokioTimer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            next_id: AtomicU64::new(1),
            tasks: Arc::new(Mutex::new(HashMap::new())),
            event_tx: tx,
            event_rx: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// Number of timers that have neither fired nor been cancelled
    pub fn pending_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

impl Default for TokioTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerSubstrate for TokioTimer {
    fn arm(&self, delay: Duration) -> HostResult<TimerHandle> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| HostError::TimerFailed(e.to_string()))?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = TimerHandle::new(id);
        let tx = self.event_tx.clone();
        let tasks = self.tasks.clone();

        // Insert before the task can observe the map
        let mut guard = self.tasks.lock().unwrap();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            tasks.lock().unwrap().remove(&id);
            let _ = tx.send(TimerFired { handle });
        });
        guard.insert(id, task);

        debug!(timer = %handle, delay_ms = delay.as_millis() as u64, "Timer armed");
        Ok(handle)
    }

    fn cancel(&self, handle: &TimerHandle) {
        if let Some(task) = self.tasks.lock().unwrap().remove(&handle.id()) {
            task.abort();
            debug!(timer = %handle, "Timer cancelled");
        }
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TimerFired> {
        self.event_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once")
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for (_, task) in tasks.drain() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_after_delay() {
        let timer = TokioTimer::new();
        let mut rx = timer.subscribe();

        let handle = timer.arm(Duration::from_millis(10)).unwrap();
        assert_eq!(timer.pending_count(), 1);

        let fired = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fired.handle, handle);
        assert_eq!(timer.pending_count(), 0);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let timer = TokioTimer::new();
        let mut rx = timer.subscribe();

        let handle = timer.arm(Duration::from_millis(20)).unwrap();
        timer.cancel(&handle);
        assert_eq!(timer.pending_count(), 0);

        let result = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(result.is_err());

        // Unknown handles are ignored
        timer.cancel(&handle);
    }

    #[test]
    fn arm_outside_runtime_fails() {
        let timer = TokioTimer::new();
        assert!(matches!(
            timer.arm(Duration::from_secs(1)),
            Err(HostError::TimerFailed(_))
        ));
    }
}

//! Trailing debounce for viewport changes.
//!
//! Zoom and pan emit bursts of events. Each [`ViewportDebouncer::notify`]
//! aborts the pending timer and starts a new one, so the callback fires once
//! with the last viewport after the burst settles.
//!
//! Must be used from within a tokio runtime.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;

use crate::Viewport;

/// Callback invoked with the settled viewport.
pub type ViewportCallback = Arc<dyn Fn(Viewport) + Send + Sync>;

/// Collapses bursts of viewport changes into a single trailing call.
pub struct ViewportDebouncer {
    delay: Duration,
    callback: ViewportCallback,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ViewportDebouncer {
    pub fn new(delay: Duration, callback: ViewportCallback) -> Self {
        Self {
            delay,
            callback,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record a viewport change, restarting the timer.
    pub fn notify(&self, viewport: Viewport) {
        let callback = Arc::clone(&self.callback);
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!("[Debounce] viewport settled at zoom {}", viewport.zoom);
            callback(viewport);
        });

        let previous = match self.pending.lock() {
            Ok(mut pending) => pending.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drop the pending call, if any.
    pub fn cancel(&self) {
        let previous = match self.pending.lock() {
            Ok(mut pending) => pending.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(previous) = previous {
            previous.abort();
        }
    }
}

impl Drop for ViewportDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u8>>>, ViewportCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: ViewportCallback = Arc::new(move |vp: Viewport| {
            sink.lock().unwrap().push(vp.zoom);
        });
        (seen, callback)
    }

    fn viewport(zoom: u8) -> Viewport {
        Viewport::new(14.0488, 121.2799, zoom, 800, 600)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_fires_once_with_last_viewport() {
        let (seen, callback) = recorder();
        let debouncer = ViewportDebouncer::new(Duration::from_millis(250), callback);

        for zoom in 10..15 {
            debouncer.notify(viewport(zoom));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(seen.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*seen.lock().unwrap(), vec![14]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_fire_separately() {
        let (seen, callback) = recorder();
        let debouncer = ViewportDebouncer::new(Duration::from_millis(250), callback);

        debouncer.notify(viewport(11));
        tokio::time::sleep(Duration::from_millis(400)).await;
        debouncer.notify(viewport(12));
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(*seen.lock().unwrap(), vec![11, 12]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_call() {
        let (seen, callback) = recorder();
        let debouncer = ViewportDebouncer::new(Duration::from_millis(250), callback);

        debouncer.notify(viewport(13));
        debouncer.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(seen.lock().unwrap().is_empty());
    }
}

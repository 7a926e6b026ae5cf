//! Trailing-edge rate limiting for scroll-offset writes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::models::ScrollChannel;
use crate::persistence::Gateway;

pub const MIN_QUIET_WINDOW: Duration = Duration::from_millis(150);

pub type SinkFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Sink<T> = Arc<dyn Fn(T) -> SinkFuture + Send + Sync>;

struct Pending<T> {
    latest: Option<T>,
    /// Bumped by every call; a timer only delivers if no call came after it.
    generation: u64,
}

/// Delivers the most recent value once no new value has arrived for the
/// quiet window. Intermediate values are dropped. Deliveries never overlap,
/// and one that has started always runs to completion.
pub struct Debouncer<T> {
    window: Duration,
    sink: Sink<T>,
    pending: Arc<Mutex<Pending<T>>>,
    delivery: Arc<tokio::sync::Mutex<()>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(window: Duration, sink: Sink<T>) -> Self {
        Self {
            window,
            sink,
            pending: Arc::new(Mutex::new(Pending {
                latest: None,
                generation: 0,
            })),
            delivery: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Must be called from within a tokio runtime.
    pub fn call(&self, value: T) {
        let generation = {
            let mut pending = self.pending.lock();
            pending.latest = Some(value);
            pending.generation += 1;
            pending.generation
        };

        let pending = self.pending.clone();
        let delivery = self.delivery.clone();
        let sink = self.sink.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _delivering = delivery.lock().await;
            let value = {
                let mut pending = pending.lock();
                if pending.generation != generation {
                    return;
                }
                pending.latest.take()
            };
            if let Some(value) = value {
                sink(value).await;
            }
        });
    }

    pub fn is_pending(&self) -> bool {
        self.pending.lock().latest.is_some()
    }

    /// Delivers a pending value now instead of waiting out the window. A
    /// delivery already under way finishes first.
    pub async fn flush(&self) {
        let _delivering = self.delivery.lock().await;
        let value = self.pending.lock().latest.take();
        if let Some(value) = value {
            (self.sink)(value).await;
        }
    }
}

impl<T> Drop for Debouncer<T> {
    fn drop(&mut self) {
        // Outstanding timers find nothing left to deliver.
        self.pending.lock().latest = None;
    }
}

/// Persists one scroll channel's offset through a debouncer.
pub struct ScrollTracker {
    channel: ScrollChannel,
    gateway: Gateway,
    debouncer: Debouncer<f64>,
}

impl ScrollTracker {
    pub fn new(gateway: Gateway, channel: ScrollChannel, window: Duration) -> Self {
        let window = window.max(MIN_QUIET_WINDOW);
        let sink_gateway = gateway.clone();
        let sink: Sink<f64> = Arc::new(move |y: f64| {
            let gateway = sink_gateway.clone();
            Box::pin(async move {
                if let Err(err) = gateway.save_scroll_offset(channel, y).await {
                    warn!(?err, ?channel, "failed to persist scroll offset");
                }
            })
        });

        Self {
            channel,
            gateway,
            debouncer: Debouncer::new(window, sink),
        }
    }

    pub fn channel(&self) -> ScrollChannel {
        self.channel
    }

    pub fn record(&self, y: f64) {
        self.debouncer.call(y);
    }

    pub async fn restore(&self) -> f64 {
        self.gateway.load_scroll_offset(self.channel).await
    }

    pub async fn flush(&self) {
        self.debouncer.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn collecting_sink() -> (Sink<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: Sink<u32> = Arc::new(move |value: u32| {
            let seen = sink_seen.clone();
            Box::pin(async move {
                seen.lock().push(value);
            })
        });
        (sink, seen)
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_trailing_value_is_delivered() {
        let (sink, seen) = collecting_sink();
        let debouncer = Debouncer::new(Duration::from_millis(150), sink);

        for value in 1..=5 {
            debouncer.call(value);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(seen.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*seen.lock(), vec![5]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_bursts_each_deliver() {
        let (sink, seen) = collecting_sink();
        let debouncer = Debouncer::new(Duration::from_millis(150), sink);

        debouncer.call(1);
        tokio::time::sleep(Duration::from_millis(300)).await;
        debouncer.call(2);
        debouncer.call(3);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*seen.lock(), vec![1, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_delivers_immediately() {
        let (sink, seen) = collecting_sink();
        let debouncer = Debouncer::new(Duration::from_millis(150), sink);

        debouncer.call(7);
        debouncer.flush().await;
        assert_eq!(*seen.lock(), vec![7]);

        // The cancelled timer does not deliver again.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*seen.lock(), vec![7]);

        // Nothing pending, nothing delivered.
        debouncer.flush().await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_in_progress_is_not_lost() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: Sink<u32> = Arc::new(move |value: u32| {
            let seen = sink_seen.clone();
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                seen.lock().push(value);
            })
        });
        let debouncer = Debouncer::new(Duration::from_millis(150), sink);

        debouncer.call(1);
        // The timer has fired and the write of 1 is under way.
        tokio::time::sleep(Duration::from_millis(160)).await;
        assert!(!debouncer.is_pending());
        debouncer.call(2);
        debouncer.flush().await;
        assert_eq!(*seen.lock(), vec![1, 2]);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(*seen.lock(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_debouncer_delivers_nothing() {
        let (sink, seen) = collecting_sink();
        let debouncer = Debouncer::new(Duration::from_millis(150), sink);
        debouncer.call(4);
        drop(debouncer);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(seen.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_tracker_persists_settled_offset() {
        let store = Arc::new(MemoryStore::new());
        let gateway = Gateway::new(store.clone());
        let tracker = ScrollTracker::new(gateway.clone(), ScrollChannel::Sidebar, Duration::ZERO);

        tracker.record(10.0);
        tracker.record(20.0);
        tracker.record(35.0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tracker.restore().await, 0.0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tracker.restore().await, 35.0);
        assert_eq!(gateway.load_scroll_offset(ScrollChannel::Contents).await, 0.0);
        assert_eq!(store.write_log().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_tracker_window_has_floor() {
        let gateway = Gateway::new(Arc::new(MemoryStore::new()));
        let tracker = ScrollTracker::new(gateway, ScrollChannel::Contents, Duration::from_millis(5));
        assert_eq!(tracker.debouncer.window(), MIN_QUIET_WINDOW);
        assert_eq!(tracker.channel(), ScrollChannel::Contents);
    }
}

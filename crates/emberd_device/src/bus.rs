use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::DeviceError;
use crate::event::DeviceEvent;
use crate::event::EventKind;

/// Future returned by an event handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Async callback invoked for each delivered event of a subscribed kind.
pub type EventHandler = Arc<dyn Fn(DeviceEvent) -> HandlerFuture + Send + Sync>;

/// Cancellation token for one `subscribe` call.
///
/// Consumed by [`EventBus::unsubscribe`], so a token can be released at most
/// once; dropping it without unsubscribing leaves the handler registered.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

impl Subscription {
    /// The event kind this subscription delivers.
    pub fn kind(&self) -> EventKind {
        self.kind
    }
}

struct BusInner {
    next_id: u64,
    closed: bool,
    handlers: HashMap<EventKind, Vec<(u64, EventHandler)>>,
}

/// Publish/subscribe bus for one device.
///
/// The handler table lock is held for the whole of a delivery, so
/// `unsubscribe` serializes against an in-flight dispatch: either the handler
/// finishes before cancellation takes effect, or cancellation lands before
/// the next delivery. Once `unsubscribe` returns the handler is never invoked
/// again. Handlers must not call back into the bus, that deadlocks.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
    refresh_tx: mpsc::UnboundedSender<EventKind>,
}

impl EventBus {
    /// Create a bus and the receiving end of its refresh-request channel.
    ///
    /// The device's transport task consumes the receiver and turns each kind
    /// into a publish on the device's `get` topic.
    pub(crate) fn new() -> (Self, mpsc::UnboundedReceiver<EventKind>) {
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let bus = Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                closed: false,
                handlers: HashMap::new(),
            })),
            refresh_tx,
        };
        (bus, refresh_rx)
    }

    /// Register `handler` for events of `kind`.
    ///
    /// Every call registers an independent callback with its own token, even
    /// for a kind that already has handlers.
    pub async fn subscribe(
        &self,
        kind: EventKind,
        handler: EventHandler,
    ) -> Result<Subscription, DeviceError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(DeviceError::BusClosed);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.entry(kind).or_default().push((id, handler));
        debug!(%kind, id, "subscribed handler");
        Ok(Subscription { kind, id })
    }

    /// Cancel one subscription. Effective immediately: after this returns the
    /// handler receives no further deliveries.
    pub async fn unsubscribe(&self, sub: Subscription) {
        let mut inner = self.inner.lock().await;
        if let Some(list) = inner.handlers.get_mut(&sub.kind) {
            list.retain(|(id, _)| *id != sub.id);
            if list.is_empty() {
                inner.handlers.remove(&sub.kind);
            }
        }
        debug!(kind = %sub.kind, id = sub.id, "unsubscribed handler");
    }

    /// Deliver `event` to every handler currently subscribed to its kind.
    pub async fn dispatch(&self, event: DeviceEvent) {
        let inner = self.inner.lock().await;
        let Some(list) = inner.handlers.get(&event.kind()) else {
            return;
        };
        for (_, handler) in list {
            handler(event.clone()).await;
        }
    }

    /// Ask the device to re-emit its current value for `kind`.
    ///
    /// The re-emitted event arrives through normal dispatch. Fails if the
    /// device's transport task is gone.
    pub fn request_refresh(&self, kind: EventKind) -> Result<(), DeviceError> {
        self.refresh_tx.send(kind).map_err(|_| DeviceError::BusClosed)
    }

    /// Stop accepting subscriptions and drop all handlers.
    pub(crate) async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        inner.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;

    fn counting_handler(counter: Arc<AtomicUsize>) -> EventHandler {
        Arc::new(move |_event| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test]
    async fn dispatch_reaches_subscribed_kind_only() {
        let (bus, _refresh_rx) = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        bus.subscribe(EventKind::Battery, counting_handler(Arc::clone(&counter)))
            .await
            .unwrap();

        bus.dispatch(DeviceEvent::Battery { level: 80 }).await;
        bus.dispatch(DeviceEvent::Availability { available: false }).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let (bus, _refresh_rx) = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let sub = bus
            .subscribe(EventKind::Battery, counting_handler(Arc::clone(&counter)))
            .await
            .unwrap();

        bus.dispatch(DeviceEvent::Battery { level: 80 }).await;
        bus.unsubscribe(sub).await;
        bus.dispatch(DeviceEvent::Battery { level: 60 }).await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_serializes_with_inflight_dispatch() {
        let (bus, _refresh_rx) = EventBus::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let slow: EventHandler = {
            let counter = Arc::clone(&counter);
            Arc::new(move |_event| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
        };
        let sub = bus.subscribe(EventKind::Battery, slow).await.unwrap();

        let dispatch_bus = bus.clone();
        let dispatch = tokio::spawn(async move {
            dispatch_bus.dispatch(DeviceEvent::Battery { level: 80 }).await;
        });
        // Let the dispatch take the handler lock and start sleeping.
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Issued mid-delivery: must wait for the in-flight handler to
        // finish before taking effect.
        bus.unsubscribe(sub).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // And once it has returned, no further deliveries.
        bus.dispatch(DeviceEvent::Battery { level: 60 }).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        dispatch.await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_subscriptions_are_independent() {
        let (bus, _refresh_rx) = EventBus::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let sub_a = bus
            .subscribe(EventKind::Battery, counting_handler(Arc::clone(&first)))
            .await
            .unwrap();
        let _sub_b = bus
            .subscribe(EventKind::Battery, counting_handler(Arc::clone(&second)))
            .await
            .unwrap();

        bus.dispatch(DeviceEvent::Battery { level: 50 }).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        // Cancelling one must leave the other live.
        bus.unsubscribe(sub_a).await;
        bus.dispatch(DeviceEvent::Battery { level: 40 }).await;
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn subscribe_after_close_fails() {
        let (bus, _refresh_rx) = EventBus::new();
        bus.close().await;
        let counter = Arc::new(AtomicUsize::new(0));
        let err = bus
            .subscribe(EventKind::Battery, counting_handler(counter))
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::BusClosed));
    }

    #[tokio::test]
    async fn refresh_request_forwards_kind() {
        let (bus, mut refresh_rx) = EventBus::new();
        bus.request_refresh(EventKind::Status).unwrap();
        assert_eq!(refresh_rx.recv().await, Some(EventKind::Status));
    }
}

//! In-memory publish/subscribe hub for parsed packets.
//!
//! Every subscriber gets its own bounded FIFO. Publishing never blocks: a
//! subscriber whose queue is full simply loses that event, everyone else
//! still receives it. Events are tagged with the writer's callsign so
//! subscriber loops can avoid echoing a client's packets back to it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use tokio::sync::mpsc;

use crate::packet::ParsedPacket;

pub const DEFAULT_STREAM_CAPACITY: usize = 100;

/// Writer tag used for packets injected by the uplink bridge.
pub const UPLINK_WRITER: &str = "uplink";

#[derive(Debug, Clone)]
pub struct StreamData {
    pub packet: Arc<ParsedPacket>,
    pub writer: Arc<str>,
}

#[derive(Debug)]
pub struct DataStream {
    inner: Arc<StreamInner>,
}

#[derive(Debug)]
struct StreamInner {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<StreamData>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl DataStream {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(StreamInner {
                subscribers: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                capacity: capacity.max(1),
            }),
        })
    }

    /// Deliver one event to every current subscriber, skipping full queues.
    pub fn publish(&self, packet: Arc<ParsedPacket>, writer: &str) {
        let event = StreamData {
            packet,
            writer: Arc::from(writer),
        };

        let subscribers = match self.inner.subscribers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for tx in subscribers.values() {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    metrics::counter!("stream.events.dropped_total").increment(1);
                }
                // Receiver mid-teardown; unsubscribe will reap it
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        metrics::counter!("stream.events.published_total").increment(1);
    }

    /// Register a new bounded subscriber queue.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        match self.inner.subscribers.write() {
            Ok(mut guard) => {
                guard.insert(id, tx);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, tx);
            }
        }
        metrics::gauge!("stream.subscribers").increment(1.0);

        Subscription {
            id,
            rx,
            hub: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        match self.inner.subscribers.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl StreamInner {
    fn unsubscribe(&self, id: u64) {
        let removed = match self.subscribers.write() {
            Ok(mut guard) => guard.remove(&id).is_some(),
            Err(poisoned) => poisoned.into_inner().remove(&id).is_some(),
        };
        if removed {
            metrics::gauge!("stream.subscribers").decrement(1.0);
        }
    }
}

/// Receiving side of one subscriber queue. Dropping it unsubscribes; calling
/// [`Subscription::unsubscribe`] early is idempotent.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<StreamData>,
    hub: Weak<StreamInner>,
    active: bool,
}

impl Subscription {
    /// Next event in publish order; `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<StreamData> {
        self.rx.recv().await
    }

    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::parse;

    fn packet() -> Arc<ParsedPacket> {
        Arc::new(parse("CS1>APRS,qAC,T2TEST:>hi").unwrap())
    }

    #[tokio::test]
    async fn fan_out_to_all_subscribers() {
        let hub = DataStream::new(10);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(packet(), "CS1");

        let ev_a = a.recv().await.unwrap();
        let ev_b = b.recv().await.unwrap();
        assert_eq!(&*ev_a.writer, "CS1");
        assert_eq!(ev_a.packet.raw, ev_b.packet.raw);
    }

    #[tokio::test]
    async fn preserves_order_per_subscriber() {
        let hub = DataStream::new(10);
        let mut sub = hub.subscribe();

        for i in 0..5 {
            let p = Arc::new(parse(&format!("CS1>APRS:>msg {}", i)).unwrap());
            hub.publish(p, "CS1");
        }
        for i in 0..5 {
            let ev = sub.recv().await.unwrap();
            assert!(ev.packet.raw.ends_with(&format!("msg {}", i)));
        }
    }

    #[tokio::test]
    async fn full_queue_loses_event_for_that_subscriber_only() {
        let hub = DataStream::new(2);
        let mut fast = hub.subscribe();
        let mut slow = hub.subscribe();

        // The fast reader drains between publishes, the slow one never reads
        hub.publish(packet(), "CS1");
        hub.publish(packet(), "CS1");
        assert!(fast.recv().await.is_some());
        assert!(fast.recv().await.is_some());

        hub.publish(packet(), "CS1");
        hub.publish(packet(), "CS1");
        assert!(fast.recv().await.is_some());
        assert!(fast.recv().await.is_some());

        // Slow subscriber was full past two events: the rest were dropped
        // for it alone
        let mut slow_count = 0;
        while let Ok(Some(_)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), slow.recv()).await
        {
            slow_count += 1;
        }
        assert_eq!(slow_count, 2);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent_and_removes_channel() {
        let hub = DataStream::new(10);
        let mut sub = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert_eq!(hub.subscriber_count(), 0);

        // Publishing with no subscribers is a no-op
        hub.publish(packet(), "CS1");
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let hub = DataStream::new(10);
        {
            let _sub = hub.subscribe();
            assert_eq!(hub.subscriber_count(), 1);
        }
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn publish_from_many_tasks() {
        let hub = DataStream::new(1000);
        let mut sub = hub.subscribe();

        let mut handles = Vec::new();
        for t in 0..4 {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    let p = Arc::new(parse(&format!("CS{}>APRS:>m{}", t, i)).unwrap());
                    hub.publish(p, "CS1");
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let mut count = 0;
        while let Ok(Some(_)) =
            tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv()).await
        {
            count += 1;
        }
        assert_eq!(count, 100);
    }
}

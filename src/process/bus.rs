//! Fan-out of process events to observers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

use crate::core::ProcessEvent;

type Subscribers = Vec<(u64, mpsc::UnboundedSender<ProcessEvent>)>;

/// Delivers every [`ProcessEvent`] to each live subscriber, in emission order
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Subscribers>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn subscribers(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new observer
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers().push((id, tx));
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(self),
            active: true,
        }
    }

    /// Send `event` to everyone; subscribers whose receiver is gone are pruned
    pub fn emit(&self, event: ProcessEvent) {
        self.subscribers()
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    fn remove(&self, id: u64) {
        self.subscribers().retain(|(sub, _)| *sub != id);
    }
}

/// Receiving end of a bus registration. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<ProcessEvent>,
    bus: Weak<EventBus>,
    active: bool,
}

impl Subscription {
    /// Wait for the next event; `None` once unsubscribed and drained
    pub async fn recv(&mut self) -> Option<ProcessEvent> {
        self.rx.recv().await
    }

    /// Next queued event, if any
    pub fn try_recv(&mut self) -> Option<ProcessEvent> {
        self.rx.try_recv().ok()
    }

    /// Detach from the bus. Safe to call any number of times.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
        self.rx.close();
    }

    pub fn is_active(&self) -> bool {
        self.active
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

    fn spawned(id: &str) -> ProcessEvent {
        ProcessEvent::Spawned {
            id: id.to_string(),
            pid: 1,
        }
    }

    #[test]
    fn test_events_arrive_in_order() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.emit(spawned("proc_1"));
        bus.emit(spawned("proc_2"));

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.try_recv(), Some(spawned("proc_1")));
            assert_eq!(sub.try_recv(), Some(spawned("proc_2")));
            assert_eq!(sub.try_recv(), None);
        }
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        let _other = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit(spawned("proc_1"));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new();
        for _ in 0..3 {
            let _sub = bus.subscribe();
        }
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        drop(bus);
        sub.unsubscribe();
        assert!(!sub.is_active());
    }
}

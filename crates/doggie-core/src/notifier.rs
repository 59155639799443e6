//! Bus fan-out
//!
//! The notifier owns the only read side of the bus. Its delivery task pulls
//! frames with a short receive timeout and pushes a copy to every registered
//! listener's queue. Listeners register and deregister at any time; delivery
//! works on a snapshot of the registry so it never holds the lock while
//! sending.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::frame::CanFrame;
use crate::transport::SharedBus;

/// Receive timeout of the delivery loop; bounds how long `stop` waits
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Back-off after a transport receive error
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Opaque handle for deregistering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Registry = Arc<RwLock<HashMap<ListenerId, mpsc::UnboundedSender<CanFrame>>>>;

pub struct Notifier {
    bus: SharedBus,
    listeners: Registry,
    next_id: AtomicU64,
    running: Arc<AtomicBool>,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    /// Create a notifier over `bus`; nothing is spawned until [`Notifier::start`]
    pub fn new(bus: SharedBus) -> Self {
        Self {
            bus,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            running: Arc::new(AtomicBool::new(false)),
            handle: parking_lot::Mutex::new(None),
        }
    }

    /// Register a listener; it receives every frame delivered from now on
    pub fn add_listener(&self) -> (ListenerId, mpsc::UnboundedReceiver<CanFrame>) {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.write().insert(id, tx);
        trace!(listener = id.0, "listener added");
        (id, rx)
    }

    /// Deregister a listener; unknown ids are ignored
    pub fn remove_listener(&self, id: ListenerId) {
        if self.listeners.write().remove(&id).is_some() {
            trace!(listener = id.0, "listener removed");
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the delivery task. Calling `start` while running is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let bus = self.bus.clone();
        let listeners = self.listeners.clone();
        let running = self.running.clone();

        let handle = tokio::spawn(async move {
            debug!("notifier delivery loop started");
            while running.load(Ordering::SeqCst) {
                match bus.recv(POLL_TIMEOUT).await {
                    Ok(Some(frame)) => deliver(&listeners, frame),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "bus receive failed");
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                }
            }
            debug!("notifier delivery loop stopped");
        });

        *self.handle.lock() = Some(handle);
        info!("Notifier started");
    }

    /// Stop the delivery task and wait (bounded) for it to exit
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let abort = handle.abort_handle();
            if tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .is_err()
            {
                warn!("notifier delivery loop did not exit in time, aborting");
                abort.abort();
            }
        }
        info!("Notifier stopped");
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

fn deliver(listeners: &Registry, frame: CanFrame) {
    trace!(%frame, "bus rx");

    let snapshot: Vec<_> = listeners
        .read()
        .iter()
        .map(|(id, tx)| (*id, tx.clone()))
        .collect();

    let mut closed = Vec::new();
    for (id, tx) in snapshot {
        if tx.send(frame.clone()).is_err() {
            closed.push(id);
        }
    }

    if !closed.is_empty() {
        let mut registry = listeners.write();
        for id in closed {
            registry.remove(&id);
            debug!(listener = id.0, "pruned closed listener");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{CanTransport, VirtualCanBus};

    fn frame(id: u32, data: &[u8]) -> CanFrame {
        CanFrame::new(id, data.to_vec()).unwrap()
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<CanFrame>) -> Option<CanFrame> {
        tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_fan_out_to_all_listeners() {
        let bus = VirtualCanBus::new("vcan0");
        let injector = bus.open("injector");
        let notifier = Notifier::new(Arc::new(bus.open("notifier")));

        let (_a, mut rx_a) = notifier.add_listener();
        let (_b, mut rx_b) = notifier.add_listener();
        notifier.start();

        injector.send(&frame(0x100, &[0x01, 0x01])).await.unwrap();
        injector.send(&frame(0x100, &[0x02, 0x00, 0x10])).await.unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(next(rx).await, Some(frame(0x100, &[0x01, 0x01])));
            assert_eq!(next(rx).await, Some(frame(0x100, &[0x02, 0x00, 0x10])));
        }

        notifier.stop().await;
    }

    #[tokio::test]
    async fn test_removed_listener_receives_nothing_more() {
        let bus = VirtualCanBus::new("vcan0");
        let injector = bus.open("injector");
        let notifier = Notifier::new(Arc::new(bus.open("notifier")));

        let (id, mut rx) = notifier.add_listener();
        notifier.start();
        notifier.remove_listener(id);
        assert_eq!(notifier.listener_count(), 0);

        injector.send(&frame(0x600, &[])).await.unwrap();
        // Sender side was dropped with the registry entry
        assert_eq!(next(&mut rx).await, None);

        notifier.stop().await;
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_pruned() {
        let bus = VirtualCanBus::new("vcan0");
        let injector = bus.open("injector");
        let notifier = Notifier::new(Arc::new(bus.open("notifier")));

        let (_id, rx) = notifier.add_listener();
        let (_keep, mut keep_rx) = notifier.add_listener();
        drop(rx);
        notifier.start();

        injector.send(&frame(0x200, &[0x01])).await.unwrap();
        assert!(next(&mut keep_rx).await.is_some());
        assert_eq!(notifier.listener_count(), 1);

        notifier.stop().await;
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let bus = VirtualCanBus::new("vcan0");
        let notifier = Notifier::new(Arc::new(bus.open("notifier")));
        assert!(!notifier.is_running());

        notifier.stop().await;
        notifier.start();
        notifier.start();
        assert!(notifier.is_running());

        notifier.stop().await;
        notifier.stop().await;
        assert!(!notifier.is_running());
    }
}

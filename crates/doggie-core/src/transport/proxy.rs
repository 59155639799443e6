//! Split send/receive bus
//!
//! Lab setups often wire a transmit interface and a receive interface
//! separately (e.g. two ends of a gateway). `ProxyBus` presents them as one
//! transport and serializes sends so concurrent ECU tasks never interleave
//! inside a single send call.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CanTransport, SharedBus, TransportError};
use crate::frame::CanFrame;

pub struct ProxyBus {
    tx: SharedBus,
    rx: SharedBus,
    tx_lock: Mutex<()>,
}

impl ProxyBus {
    pub fn new(tx: SharedBus, rx: SharedBus) -> Self {
        Self {
            tx,
            rx,
            tx_lock: Mutex::new(()),
        }
    }

    /// Use one transport for both directions
    pub fn single(bus: SharedBus) -> Self {
        Self::new(bus.clone(), bus)
    }
}

#[async_trait]
impl CanTransport for ProxyBus {
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        let _guard = self.tx_lock.lock().await;
        self.tx.send(frame).await
    }

    async fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        self.rx.recv(timeout).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::transport::VirtualCanBus;

    #[tokio::test]
    async fn test_send_and_recv_use_separate_buses() {
        let tx_bus = VirtualCanBus::new("tx");
        let rx_bus = VirtualCanBus::new("rx");
        let tx_sniffer = tx_bus.open("sniffer");
        let rx_injector = rx_bus.open("injector");

        let proxy = ProxyBus::new(Arc::new(tx_bus.open("proxy")), Arc::new(rx_bus.open("proxy")));

        let out = CanFrame::new(0x500, vec![0x01, 0x20]).unwrap();
        proxy.send(&out).await.unwrap();
        let seen = tx_sniffer.recv(Duration::from_millis(100)).await.unwrap();
        assert_eq!(seen, Some(out));

        let incoming = CanFrame::new(0x600, vec![]).unwrap();
        rx_injector.send(&incoming).await.unwrap();
        let got = proxy.recv(Duration::from_millis(100)).await.unwrap();
        assert_eq!(got, Some(incoming));
    }

    #[tokio::test]
    async fn test_concurrent_sends_all_arrive() {
        let bus = VirtualCanBus::new("vcan0");
        let sniffer = bus.open("sniffer");
        let proxy = Arc::new(ProxyBus::single(Arc::new(bus.open("proxy"))));

        let mut handles = Vec::new();
        for i in 0..4u8 {
            let proxy = proxy.clone();
            handles.push(tokio::spawn(async move {
                let frame = CanFrame::new(0x100 + i as u32, vec![i]).unwrap();
                proxy.send(&frame).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let mut ids = Vec::new();
        while let Some(frame) = sniffer.recv(Duration::from_millis(50)).await.unwrap() {
            ids.push(frame.id());
        }
        ids.sort();
        assert_eq!(ids, vec![0x100, 0x101, 0x102, 0x103]);
    }
}

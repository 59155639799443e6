//! In-process virtual CAN bus
//!
//! A broadcast channel stands in for the wire. Every interface opened on the
//! bus sees every frame sent by any interface, its own included.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tokio::time::Instant;
use tracing::{trace, warn};

use super::{CanTransport, TransportError};
use crate::frame::CanFrame;

/// Default queue depth per interface
const DEFAULT_CAPACITY: usize = 1024;

/// Virtual bus shared by any number of interfaces
#[derive(Debug, Clone)]
pub struct VirtualCanBus {
    name: String,
    tx: broadcast::Sender<CanFrame>,
}

impl VirtualCanBus {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            name: name.into(),
            tx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a new interface; it receives frames sent from now on
    pub fn open(&self, label: impl Into<String>) -> VirtualCanInterface {
        VirtualCanInterface {
            label: label.into(),
            tx: self.tx.clone(),
            rx: Mutex::new(self.tx.subscribe()),
        }
    }
}

/// One endpoint on a [`VirtualCanBus`]
pub struct VirtualCanInterface {
    label: String,
    tx: broadcast::Sender<CanFrame>,
    rx: Mutex<broadcast::Receiver<CanFrame>>,
}

impl VirtualCanInterface {
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[async_trait]
impl CanTransport for VirtualCanInterface {
    async fn send(&self, frame: &CanFrame) -> Result<(), TransportError> {
        trace!(interface = %self.label, %frame, "vcan tx");
        // No subscribers just means nobody is listening; the frame is lost as
        // it would be on an empty wire.
        let _ = self.tx.send(frame.clone());
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Option<CanFrame>, TransportError> {
        let deadline = Instant::now() + timeout;
        let mut rx = self.rx.lock().await;

        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Err(_) => return Ok(None),
                Ok(Ok(frame)) => return Ok(Some(frame)),
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(interface = %self.label, skipped, "vcan receiver lagged, frames dropped");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(TransportError::ConnectionClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32, data: &[u8]) -> CanFrame {
        CanFrame::new(id, data.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_every_interface_sees_every_frame() {
        let bus = VirtualCanBus::new("vcan0");
        let a = bus.open("a");
        let b = bus.open("b");

        a.send(&frame(0x100, &[0x01, 0x01])).await.unwrap();

        let at_b = b.recv(Duration::from_millis(100)).await.unwrap();
        let at_a = a.recv(Duration::from_millis(100)).await.unwrap();
        assert_eq!(at_b, Some(frame(0x100, &[0x01, 0x01])));
        assert_eq!(at_a, at_b);
    }

    #[tokio::test]
    async fn test_recv_timeout_returns_none() {
        let bus = VirtualCanBus::new("vcan0");
        let a = bus.open("a");
        let got = a.recv(Duration::from_millis(20)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_order_preserved() {
        let bus = VirtualCanBus::new("vcan0");
        let tx = bus.open("tx");
        let rx = bus.open("rx");

        for i in 0..10u8 {
            tx.send(&frame(0x200, &[i])).await.unwrap();
        }
        for i in 0..10u8 {
            let got = rx.recv(Duration::from_millis(100)).await.unwrap().unwrap();
            assert_eq!(got.data(), &[i]);
        }
    }

    #[tokio::test]
    async fn test_lagged_receiver_skips_ahead() {
        let bus = VirtualCanBus::with_capacity("vcan0", 4);
        let tx = bus.open("tx");
        let rx = bus.open("rx");

        for i in 0..8u8 {
            tx.send(&frame(0x200, &[i])).await.unwrap();
        }
        let got = rx.recv(Duration::from_millis(100)).await.unwrap().unwrap();
        assert_eq!(got.data(), &[4]);
    }
}

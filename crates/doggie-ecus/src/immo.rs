//! Immobilizer ECU: periodic key-state broadcast

use std::time::Duration;

use async_trait::async_trait;
use doggie_core::messages::KeyState;
use doggie_core::CanFrame;
use tracing::info;

use crate::ecu::{Ecu, EcuBus};
use crate::error::EcuError;

pub const DEFAULT_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmoCommand {
    SetKeyInserted(bool),
}

pub struct ImmoEcu {
    key_inserted: bool,
    period: Duration,
}

impl ImmoEcu {
    /// Starts with the key inserted
    pub fn new(period: Duration) -> Self {
        Self {
            key_inserted: true,
            period,
        }
    }

    pub fn key_inserted(&self) -> bool {
        self.key_inserted
    }
}

#[async_trait]
impl Ecu for ImmoEcu {
    type Command = ImmoCommand;

    fn name(&self) -> &'static str {
        "Immobilizer ECU"
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    async fn on_frame(&mut self, _frame: &CanFrame, _bus: &EcuBus) -> Result<(), EcuError> {
        Ok(())
    }

    async fn on_tick(&mut self, bus: &EcuBus) -> Result<(), EcuError> {
        bus.send(&KeyState {
            inserted: self.key_inserted,
        })
        .await
    }

    async fn on_command(&mut self, command: ImmoCommand, bus: &EcuBus) -> Result<(), EcuError> {
        match command {
            ImmoCommand::SetKeyInserted(inserted) => {
                info!(ecu = %self.name(), inserted, "Key state changed");
                self.key_inserted = inserted;
                bus.send(&KeyState { inserted }).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use doggie_core::{CanTransport, EcuMessage, Notifier, SharedBus, VirtualCanBus};

    use super::*;
    use crate::ecu::{EcuRunner, Lifecycle};

    #[tokio::test]
    async fn test_key_removal_broadcast() {
        let vcan = VirtualCanBus::new("vcan0");
        let bus: SharedBus = Arc::new(vcan.open("ecus"));
        let tester = vcan.open("tester");
        let notifier = Arc::new(Notifier::new(bus.clone()));
        notifier.start();

        let mut runner = EcuRunner::new(ImmoEcu::new(DEFAULT_PERIOD), bus, notifier.clone());
        let handle = runner.handle();
        runner.start().await.unwrap();

        let first = loop {
            let frame = tester.recv(Duration::from_secs(1)).await.unwrap().unwrap();
            if let Some(key) = KeyState::from_frame(&frame) {
                break key;
            }
        };
        assert!(first.inserted);

        handle.send(ImmoCommand::SetKeyInserted(false)).unwrap();
        let mut removed = false;
        while let Some(frame) = tester.recv(Duration::from_millis(500)).await.unwrap() {
            if KeyState::from_frame(&frame) == Some(KeyState { inserted: false }) {
                removed = true;
                break;
            }
        }
        assert!(removed);

        runner.stop().await.unwrap();
        assert!(!runner.logic().unwrap().key_inserted());
        notifier.stop().await;
    }
}

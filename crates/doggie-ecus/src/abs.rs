//! ABS wheel-sensor ECU
//!
//! Sends an [`AbsPulse`] heartbeat every period while the sensor is
//! connected. Disconnecting it makes the central ECU latch an ABS fault.

use std::time::Duration;

use async_trait::async_trait;
use doggie_core::messages::AbsPulse;
use doggie_core::CanFrame;
use tracing::{info, warn};

use crate::ecu::{Ecu, EcuBus};
use crate::error::EcuError;

/// Four central ticks, one short of the fault threshold
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsCommand {
    SetSensorConnected(bool),
}

pub struct AbsEcu {
    sensor_connected: bool,
    period: Duration,
}

impl AbsEcu {
    pub fn new(period: Duration) -> Self {
        Self {
            sensor_connected: true,
            period,
        }
    }

    pub fn sensor_connected(&self) -> bool {
        self.sensor_connected
    }
}

#[async_trait]
impl Ecu for AbsEcu {
    type Command = AbsCommand;

    fn name(&self) -> &'static str {
        "ABS ECU"
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    async fn on_frame(&mut self, _frame: &CanFrame, _bus: &EcuBus) -> Result<(), EcuError> {
        Ok(())
    }

    async fn on_tick(&mut self, bus: &EcuBus) -> Result<(), EcuError> {
        if self.sensor_connected {
            bus.send(&AbsPulse).await?;
        }
        Ok(())
    }

    async fn on_command(&mut self, command: AbsCommand, _bus: &EcuBus) -> Result<(), EcuError> {
        match command {
            AbsCommand::SetSensorConnected(true) => {
                info!(ecu = %self.name(), "Wheel sensor connected");
                self.sensor_connected = true;
            }
            AbsCommand::SetSensorConnected(false) => {
                warn!(ecu = %self.name(), "Wheel sensor disconnected");
                self.sensor_connected = false;
            }
        }
        Ok(())
    }
}

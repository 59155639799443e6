//! Cruise-control ECU
//!
//! Runs a PID loop from the target speed (operator intent) to the last speed
//! broadcast by the central ECU and sends the result as a throttle request
//! every period. The request is always sent; the central ECU ignores it
//! unless it is flagged enabled.

pub mod pid;

use std::time::Duration;

use async_trait::async_trait;
use doggie_core::messages::{CruiseControl, SpeedStatus};
use doggie_core::{CanFrame, EcuMessage};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::ecu::{Ecu, EcuBus};
use crate::error::EcuError;
pub use pid::{PidController, PidGains};

pub const DEFAULT_PERIOD: Duration = Duration::from_millis(200);
/// Highest selectable set-point (km/h)
pub const MAX_TARGET_SPEED: u16 = 300;

/// Operator intents for the cruise-control ECU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CruiseCommand {
    /// Target speed in km/h
    SetTarget(u16),
    SetEnabled(bool),
}

pub struct CruiseControlEcu {
    target_speed: u16,
    measured_speed: u16,
    enabled: bool,
    pid: PidController,
    period: Duration,
}

impl CruiseControlEcu {
    pub fn new(period: Duration) -> Self {
        Self {
            target_speed: 0,
            measured_speed: 0,
            enabled: true,
            pid: PidController::new(PidGains::default()),
            period,
        }
    }

    pub fn target_speed(&self) -> u16 {
        self.target_speed
    }

    pub fn measured_speed(&self) -> u16 {
        self.measured_speed
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    /// Set the target speed, capped at [`MAX_TARGET_SPEED`]
    pub fn set_target(&mut self, speed: u16) {
        self.target_speed = speed.min(MAX_TARGET_SPEED);
    }

    /// Enable or disable; re-enabling clears the PID history
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        if enabled && !self.enabled {
            self.pid.reset_at(now);
        }
        self.enabled = enabled;
    }

    /// One control step: the request to broadcast
    pub fn control(&mut self, now: Instant) -> CruiseControl {
        let output = self.pid.update_at(
            self.target_speed as f64,
            self.measured_speed as f64,
            now,
        );
        CruiseControl {
            enabled: self.enabled,
            throttle: output.clamp(0.0, 100.0) as u8,
        }
    }
}

#[async_trait]
impl Ecu for CruiseControlEcu {
    type Command = CruiseCommand;

    fn name(&self) -> &'static str {
        "Cruise Control ECU"
    }

    fn period(&self) -> Option<Duration> {
        Some(self.period)
    }

    async fn on_frame(&mut self, frame: &CanFrame, _bus: &EcuBus) -> Result<(), EcuError> {
        if let Some(msg) = SpeedStatus::from_frame(frame) {
            self.measured_speed = msg.speed;
        }
        Ok(())
    }

    async fn on_tick(&mut self, bus: &EcuBus) -> Result<(), EcuError> {
        let request = self.control(Instant::now());
        bus.send(&request).await
    }

    async fn on_command(&mut self, command: CruiseCommand, _bus: &EcuBus) -> Result<(), EcuError> {
        match command {
            CruiseCommand::SetTarget(speed) => {
                debug!(ecu = %self.name(), speed, "Target speed set");
                self.set_target(speed);
            }
            CruiseCommand::SetEnabled(enabled) => {
                info!(ecu = %self.name(), enabled, "Cruise control toggled");
                self.set_enabled(enabled, Instant::now());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initially_enabled_with_zero_target() {
        let ecu = CruiseControlEcu::new(DEFAULT_PERIOD);
        assert!(ecu.is_enabled());
        assert_eq!(ecu.target_speed(), 0);
    }

    #[test]
    fn test_target_capped() {
        let mut ecu = CruiseControlEcu::new(DEFAULT_PERIOD);
        ecu.set_target(500);
        assert_eq!(ecu.target_speed(), MAX_TARGET_SPEED);
    }

    #[test]
    fn test_negative_output_clamped_to_zero_throttle() {
        let mut ecu = CruiseControlEcu::new(DEFAULT_PERIOD);
        ecu.measured_speed = 80;
        let request = ecu.control(Instant::now() + DEFAULT_PERIOD);
        assert_eq!(request.throttle, 0);
        assert!(request.enabled);
    }

    #[test]
    fn test_full_throttle_when_far_below_target() {
        let mut ecu = CruiseControlEcu::new(DEFAULT_PERIOD);
        ecu.set_target(120);
        let request = ecu.control(Instant::now() + DEFAULT_PERIOD);
        assert_eq!(request.throttle, 100);
    }

    #[test]
    fn test_disabled_still_reports() {
        let mut ecu = CruiseControlEcu::new(DEFAULT_PERIOD);
        ecu.set_target(30);
        ecu.set_enabled(false, Instant::now());
        let request = ecu.control(Instant::now() + DEFAULT_PERIOD);
        assert!(!request.enabled);
    }

    #[test]
    fn test_reenable_resets_pid() {
        let t0 = Instant::now();
        let mut ecu = CruiseControlEcu::new(DEFAULT_PERIOD);
        ecu.pid = PidController::new_at(PidGains::default(), t0);
        ecu.set_target(50);
        for i in 1..=5 {
            ecu.control(t0 + DEFAULT_PERIOD * i);
        }
        assert!(ecu.pid().integral() > 0.0);

        let t1 = t0 + DEFAULT_PERIOD * 10;
        ecu.set_enabled(false, t1);
        // Disabling alone keeps history
        assert!(ecu.pid().integral() > 0.0);
        ecu.set_enabled(true, t1);
        assert_eq!(ecu.pid().integral(), 0.0);

        let mut fresh = PidController::new_at(PidGains::default(), t1);
        let t2 = t1 + DEFAULT_PERIOD;
        let expected = fresh.update_at(50.0, 0.0, t2).clamp(0.0, 100.0) as u8;
        assert_eq!(ecu.control(t2).throttle, expected);
    }

    #[test]
    fn test_enable_while_enabled_keeps_history() {
        let t0 = Instant::now();
        let mut ecu = CruiseControlEcu::new(DEFAULT_PERIOD);
        ecu.pid = PidController::new_at(PidGains::default(), t0);
        ecu.set_target(10);
        ecu.control(t0 + DEFAULT_PERIOD);
        let before = ecu.pid().integral();
        ecu.set_enabled(true, t0 + DEFAULT_PERIOD * 2);
        assert_eq!(ecu.pid().integral(), before);
    }
}

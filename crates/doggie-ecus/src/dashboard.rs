//! Dashboard collaborator interface
//!
//! The instrument cluster ECU pushes decoded vehicle state into a
//! [`Dashboard`]. A GUI implements it with gauges and warning lamps; the
//! headless [`TracingDashboard`] renders the same updates as log events.

use std::fmt;

use doggie_core::messages::DoorSet;
use tracing::{info, trace};

/// Position of the start/stop button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonState {
    #[default]
    Off,
    Ignition,
    On,
}

impl fmt::Display for ButtonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ButtonState::Off => write!(f, "OFF"),
            ButtonState::Ignition => write!(f, "IGNITION"),
            ButtonState::On => write!(f, "ON"),
        }
    }
}

pub trait Dashboard: Send + Sync {
    /// Speed in km/h
    fn update_speed(&self, speed: u16);

    fn update_rpm(&self, rpm: u16);

    fn set_button_state(&self, state: ButtonState);

    /// Doors currently locked
    fn update_door_status(&self, locked: DoorSet);

    /// `abs_ok == false` lights the ABS lamp
    fn update_abs_warning(&self, abs_ok: bool);

    /// `airbag_enabled == false` lights the airbag lamp
    fn update_airbag_warning(&self, airbag_enabled: bool);

    /// Cruise-control indicator and optional set-point
    fn update_cruise_control(&self, enabled: bool, target_speed: Option<u16>);

    /// Throttle position in `0.0..=1.0`
    fn update_throttle(&self, throttle: f32);
}

/// Headless dashboard that logs every update
#[derive(Debug, Default)]
pub struct TracingDashboard;

impl Dashboard for TracingDashboard {
    fn update_speed(&self, speed: u16) {
        trace!(speed, "dashboard speed");
    }

    fn update_rpm(&self, rpm: u16) {
        trace!(rpm, "dashboard rpm");
    }

    fn set_button_state(&self, state: ButtonState) {
        info!(%state, "dashboard start button");
    }

    fn update_door_status(&self, locked: DoorSet) {
        trace!(%locked, "dashboard doors");
    }

    fn update_abs_warning(&self, abs_ok: bool) {
        trace!(abs_ok, "dashboard ABS lamp");
    }

    fn update_airbag_warning(&self, airbag_enabled: bool) {
        trace!(airbag_enabled, "dashboard airbag lamp");
    }

    fn update_cruise_control(&self, enabled: bool, target_speed: Option<u16>) {
        trace!(enabled, ?target_speed, "dashboard cruise control");
    }

    fn update_throttle(&self, throttle: f32) {
        trace!(throttle, "dashboard throttle");
    }
}

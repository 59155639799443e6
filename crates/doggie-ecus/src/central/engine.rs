//! Engine physics
//!
//! One call to [`Engine::step`] advances the simulation by one report period.
//! All arithmetic is integer, matching what the status frames carry.

use rand::Rng;

pub const IDLE_RPM: i32 = 800;
pub const MAX_RPM: i32 = 6000;
/// Crank speed before the first start
pub const INITIAL_RPM: i32 = 200;
/// Base rpm gained per step while below target
pub const RPM_ACCELERATION: i32 = 50;
/// Base rpm lost per step while above target
pub const RPM_DECELERATION: i32 = 30;
/// Target rpm noise, +/- this value
pub const RPM_JITTER: i32 = 10;

/// Speed per rpm above idle
const GEAR_RATIO: f32 = 0.1;
/// Weight of the previous speed in the smoothing filter
const SPEED_SMOOTHING: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Off,
    On,
}

#[derive(Debug, Clone)]
pub struct Engine {
    state: EngineState,
    throttle: u8,
    rpm: i32,
    speed: i32,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Off,
            throttle: 0,
            rpm: INITIAL_RPM,
            speed: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_on(&self) -> bool {
        self.state == EngineState::On
    }

    pub fn set_state(&mut self, state: EngineState) {
        self.state = state;
        if state == EngineState::Off {
            self.throttle = 0;
        }
    }

    /// Set throttle percentage; forced to 0 while the engine is off
    pub fn set_throttle(&mut self, throttle: u8) {
        self.throttle = match self.state {
            EngineState::On => throttle.min(100),
            EngineState::Off => 0,
        };
    }

    pub fn throttle(&self) -> u8 {
        self.throttle
    }

    pub fn rpm(&self) -> u16 {
        self.rpm as u16
    }

    /// Vehicle speed in km/h
    pub fn speed(&self) -> u16 {
        self.speed as u16
    }

    /// Rpm the engine is pulling toward this step
    fn target_rpm<R: Rng + ?Sized>(&self, rng: &mut R) -> i32 {
        if self.state == EngineState::Off {
            return 0;
        }

        let base = if self.throttle == 0 {
            IDLE_RPM
        } else {
            IDLE_RPM + (MAX_RPM - IDLE_RPM) * self.throttle as i32 / 100
        };
        base + rng.gen_range(-RPM_JITTER..=RPM_JITTER)
    }

    /// Advance one step
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let target = self.target_rpm(rng);
        let throttle = self.throttle as i32;

        if self.rpm < target {
            // Doubles only at full throttle
            let acceleration = RPM_ACCELERATION * (1 + throttle / 100);
            self.rpm += acceleration.min(target - self.rpm);
        } else if self.rpm > target {
            // Doubles only with the throttle fully closed
            let deceleration = RPM_DECELERATION * (1 + (100 - throttle) / 100);
            self.rpm -= deceleration.min(self.rpm - target);
        }
        self.rpm = self.rpm.clamp(0, MAX_RPM);

        self.speed = if self.rpm > IDLE_RPM {
            let driven = (self.rpm - IDLE_RPM) as f32 * GEAR_RATIO;
            (self.speed as f32 * SPEED_SMOOTHING + driven * (1.0 - SPEED_SMOOTHING)) as i32
        } else {
            0
        };
    }
}

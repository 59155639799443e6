//! PID controller with output clamping and integral anti-windup

use std::time::Duration;

use tokio::time::Instant;

/// Delta used when the measured time step is not positive
const MIN_DT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 2.0,
            ki: 0.5,
            kd: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    output_limits: (f64, f64),
    integral_limits: (f64, f64),
    integral: f64,
    previous_error: f64,
    last_update: Instant,
}

impl PidController {
    pub fn new(gains: PidGains) -> Self {
        Self::new_at(gains, Instant::now())
    }

    pub fn new_at(gains: PidGains, now: Instant) -> Self {
        Self {
            gains,
            output_limits: (-100.0, 100.0),
            integral_limits: (-50.0, 50.0),
            integral: 0.0,
            previous_error: 0.0,
            last_update: now,
        }
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn update(&mut self, setpoint: f64, measured: f64) -> f64 {
        self.update_at(setpoint, measured, Instant::now())
    }

    /// Compute the control output for the step ending at `now`
    pub fn update_at(&mut self, setpoint: f64, measured: f64, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_update);
        let dt = if elapsed.is_zero() { MIN_DT } else { elapsed }.as_secs_f64();

        let error = setpoint - measured;

        let proportional = self.gains.kp * error;

        self.integral = (self.integral + error * dt)
            .clamp(self.integral_limits.0, self.integral_limits.1);
        let integral = self.gains.ki * self.integral;

        let derivative = self.gains.kd * (error - self.previous_error) / dt;

        self.previous_error = error;
        self.last_update = now;

        (proportional + integral + derivative).clamp(self.output_limits.0, self.output_limits.1)
    }

    /// Clear accumulated state; gains are kept
    pub fn reset(&mut self) {
        self.reset_at(Instant::now());
    }

    pub fn reset_at(&mut self, now: Instant) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.last_update = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: Duration = Duration::from_millis(200);

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_first_update() {
        let t0 = Instant::now();
        let mut pid = PidController::new_at(PidGains::default(), t0);
        // error 10, dt 0.2: P = 20, I = 0.5 * 2 = 1, D = 0.1 * 10 / 0.2 = 5
        let out = pid.update_at(10.0, 0.0, t0 + STEP);
        assert!(approx(out, 26.0), "{out}");
        assert!(approx(pid.integral(), 2.0));
    }

    #[test]
    fn test_output_clamped() {
        let t0 = Instant::now();
        let mut pid = PidController::new_at(PidGains::default(), t0);
        assert_eq!(pid.update_at(200.0, 0.0, t0 + STEP), 100.0);
        assert_eq!(pid.update_at(0.0, 300.0, t0 + STEP * 2), -100.0);
    }

    #[test]
    fn test_integral_anti_windup() {
        let t0 = Instant::now();
        let mut pid = PidController::new_at(PidGains::default(), t0);
        for i in 1..=100 {
            pid.update_at(100.0, 0.0, t0 + STEP * i);
        }
        assert_eq!(pid.integral(), 50.0);
    }

    #[test]
    fn test_zero_dt_floored() {
        let t0 = Instant::now();
        let mut pid = PidController::new_at(PidGains::default(), t0);
        // dt 0.01: P = 2, I = 0.5 * 0.01 = 0.005, D = 0.1 * 1 / 0.01 = 10
        let out = pid.update_at(1.0, 0.0, t0);
        assert!(approx(out, 12.005), "{out}");
    }

    #[test]
    fn test_reset_matches_fresh_controller() {
        let t0 = Instant::now();
        let mut used = PidController::new_at(PidGains::default(), t0);
        for i in 1..=10 {
            used.update_at(50.0, 10.0, t0 + STEP * i);
        }

        let t_reset = t0 + STEP * 20;
        used.reset_at(t_reset);
        let mut fresh = PidController::new_at(PidGains::default(), t_reset);

        let t_next = t_reset + STEP;
        assert_eq!(
            used.update_at(30.0, 20.0, t_next),
            fresh.update_at(30.0, 20.0, t_next)
        );
        assert_eq!(used.gains(), fresh.gains());
    }
}

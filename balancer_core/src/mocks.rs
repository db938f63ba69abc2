//! Test and helper mocks for balancer_core

use balancer_traits::{AnalogIn, Channel, MotorDrive, MotorOutput};

/// An ADC that always errors on read; useful when driving the control loop
/// with externally sampled raw values via `step_from_sample`.
pub struct NoopAdc;

impl AnalogIn for NoopAdc {
    fn read(
        &mut self,
        _channel: Channel,
        _timeout: std::time::Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop adc")))
    }
}

/// A motor drive that records every command it receives.
#[derive(Default)]
pub struct SpyMotor {
    pub commands: Vec<(MotorOutput, MotorOutput)>,
    pub stops: usize,
}

impl MotorDrive for SpyMotor {
    fn drive(
        &mut self,
        motor_a: MotorOutput,
        motor_b: MotorOutput,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.commands.push((motor_a, motor_b));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.stops += 1;
        Ok(())
    }
}

impl SpyMotor {
    pub fn last(&self) -> Option<(MotorOutput, MotorOutput)> {
        self.commands.last().copied()
    }
}

/// Deterministic clock for driving the loop in tests; `sleep` advances
/// simulated time instead of blocking.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: std::time::Instant,
    offset: std::sync::Arc<std::sync::Mutex<std::time::Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
            offset: std::sync::Arc::new(std::sync::Mutex::new(std::time::Duration::ZERO)),
        }
    }

    pub fn advance(&self, d: std::time::Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }
}

impl balancer_traits::Clock for ManualClock {
    fn now(&self) -> std::time::Instant {
        let off = self
            .offset
            .lock()
            .map(|g| *g)
            .unwrap_or(std::time::Duration::ZERO);
        self.origin + off
    }

    fn sleep(&self, d: std::time::Duration) {
        self.advance(d);
    }
}

#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Hardware backends for the balancer.
//!
//! The default build ships a physics-backed simulated rig good enough to
//! exercise the whole control loop on a dev machine. The `hardware`
//! feature adds a Raspberry Pi backend (MCP3008 ADC over SPI, software
//! PWM motor drive).

pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use balancer_traits::{AnalogIn, Channel, Direction, MotorDrive, MotorOutput};
use error::HwError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// Device model constants; 10-bit codes, same scaling the control core
// expects from the real sensors.
const ADC_MID: f32 = 512.0;
const ADC_MAX: f32 = 1023.0;
const GYRO_RAD_PER_CODE: f32 = (150.0 * 2.0 / 1024.0) * 0.017_453_292_5;
const ACCEL_G_PER_CODE: f32 = 1.7 * 2.0 / 1024.0;
/// Mounting offset the real accelerometer exhibits on X; the core's
/// configured x_offset cancels it.
const X_MOUNT_OFFSET_CODES: f32 = 8.0;

const TICK_DT_S: f32 = 1.0 / 976.0;
/// Gravity over pendulum length, 1/s^2.
const G_OVER_L: f32 = 50.0;
/// Wheel torque per unit duty, rad/s^2 at full scale.
const TORQUE_PER_DUTY: f32 = 0.015;
const DAMPING: f32 = 0.25;

#[derive(Debug)]
struct RigState {
    /// Pendulum angle from vertical, rad. ±π/2 is flat on the ground.
    theta: f32,
    theta_dot: f32,
    /// Signed duty currently applied by the drive.
    torque_duty: f32,
    pots: [u16; 3],
    /// When set, all ADC reads fail with a timeout.
    fail_reads: bool,
}

impl RigState {
    fn advance(&mut self) {
        if self.theta.abs() >= std::f32::consts::FRAC_PI_2 {
            // flat on the ground; wheels can no longer right it
            self.theta = self.theta.clamp(
                -std::f32::consts::FRAC_PI_2,
                std::f32::consts::FRAC_PI_2,
            );
            self.theta_dot = 0.0;
            return;
        }
        let accel = G_OVER_L * self.theta.sin() - TORQUE_PER_DUTY * self.torque_duty
            - DAMPING * self.theta_dot;
        self.theta_dot += accel * TICK_DT_S;
        self.theta += self.theta_dot * TICK_DT_S;
    }
}

fn code_clamped(v: f32) -> u16 {
    v.clamp(0.0, ADC_MAX) as u16
}

/// Shared control of a simulated rig: perturb it, turn the pots, inspect
/// its true state, inject read failures.
#[derive(Clone)]
pub struct RigHandle {
    state: Arc<Mutex<RigState>>,
}

impl RigHandle {
    pub fn tilt_rad(&self) -> f32 {
        self.state.lock().map(|s| s.theta).unwrap_or(0.0)
    }

    pub fn is_upright(&self) -> bool {
        self.tilt_rad().abs() < 0.5
    }

    /// Knock the pendulum by `rad` instantaneously.
    pub fn nudge(&self, rad: f32) {
        if let Ok(mut s) = self.state.lock() {
            s.theta += rad;
        }
    }

    pub fn set_pots(&self, d_tilt: u16, tilt: u16, gyro_offset: u16) {
        if let Ok(mut s) = self.state.lock() {
            s.pots = [d_tilt, tilt, gyro_offset];
        }
    }

    /// Make every subsequent ADC read time out.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut s) = self.state.lock() {
            s.fail_reads = failing;
        }
    }
}

/// Simulated IMU + pot bank. One physics step per gyro read, so the rig
/// advances at exactly the loop's tick rate.
pub struct SimulatedImu {
    state: Arc<Mutex<RigState>>,
}

impl AnalogIn for SimulatedImu {
    fn read(
        &mut self,
        channel: Channel,
        _timeout: Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self
            .state
            .lock()
            .map_err(|_| HwError::Gpio("rig state poisoned".into()))?;
        if s.fail_reads {
            return Err(Box::new(HwError::Timeout));
        }
        let code = match channel {
            Channel::GyroRate => {
                s.advance();
                // gyro sense is inverted: positive rate reads below midpoint
                code_clamped(ADC_MID - s.theta_dot / GYRO_RAD_PER_CODE)
            }
            Channel::AccelX => {
                code_clamped(ADC_MID - X_MOUNT_OFFSET_CODES + s.theta.sin() / ACCEL_G_PER_CODE)
            }
            Channel::AccelY => code_clamped(ADC_MID + s.theta.cos() / ACCEL_G_PER_CODE),
            Channel::DTiltPot => s.pots[0],
            Channel::TiltPot => s.pots[1],
            Channel::GyroOffsetPot => s.pots[2],
        };
        Ok(code)
    }
}

/// Simulated dual motor drive; applies wheel torque to the rig.
pub struct SimulatedDrive {
    state: Arc<Mutex<RigState>>,
}

impl MotorDrive for SimulatedDrive {
    fn drive(
        &mut self,
        motor_a: MotorOutput,
        motor_b: MotorOutput,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self
            .state
            .lock()
            .map_err(|_| HwError::Gpio("rig state poisoned".into()))?;
        let mean = (f32::from(motor_a.duty) + f32::from(motor_b.duty)) / 2.0;
        s.torque_duty = match motor_a.direction {
            Direction::Forward => mean,
            Direction::Reverse => -mean,
        };
        tracing::trace!(torque_duty = s.torque_duty, "sim drive");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Ok(mut s) = self.state.lock() {
            s.torque_duty = 0.0;
        }
        Ok(())
    }
}

/// Build a simulated rig starting upright with centered pots.
pub fn simulated_rig() -> (SimulatedImu, SimulatedDrive, RigHandle) {
    let state = Arc::new(Mutex::new(RigState {
        theta: 0.0,
        theta_dot: 0.0,
        torque_duty: 0.0,
        pots: [512, 512, 512],
        fail_reads: false,
    }));
    (
        SimulatedImu {
            state: Arc::clone(&state),
        },
        SimulatedDrive {
            state: Arc::clone(&state),
        },
        RigHandle { state },
    )
}

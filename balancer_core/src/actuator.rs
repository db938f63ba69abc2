//! Signed speed to per-motor direction and PWM duty.

use balancer_traits::{Direction, MotorOutput};

/// Device PWM ceiling.
pub const MAX_DUTY: u8 = 0xff;

#[derive(Debug, Clone, PartialEq)]
pub struct ActuatorCfg {
    /// Multiplier for the square-root magnitude law.
    pub sqrt_scale: f32,
    /// Mechanical trim for motor A, nominally 1.0.
    pub motor_a_trim: f32,
    /// Mechanical trim for motor B, nominally 1.0.
    pub motor_b_trim: f32,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            sqrt_scale: 7.0,
            motor_a_trim: 1.0,
            motor_b_trim: 1.0,
        }
    }
}

/// Map a signed speed command to the two motor outputs.
///
/// Both motors always share the direction (no independent steering).
/// Magnitude is `sqrt_scale * sqrt(|speed|)`: the square root lifts small
/// commands over the motors' static-friction floor at the cost of gain
/// compression for large ones. Clamped to the device range, then trimmed
/// and clamped again per motor.
pub fn map_speed(speed: f32, cfg: &ActuatorCfg) -> (MotorOutput, MotorOutput) {
    let direction = if speed < 0.0 {
        Direction::Reverse
    } else {
        Direction::Forward
    };
    let magnitude = (cfg.sqrt_scale * speed.abs().sqrt()).min(f32::from(MAX_DUTY));
    let duty_a = (magnitude * cfg.motor_a_trim).min(f32::from(MAX_DUTY)) as u8;
    let duty_b = (magnitude * cfg.motor_b_trim).min(f32::from(MAX_DUTY)) as u8;
    (
        MotorOutput {
            direction,
            duty: duty_a,
        },
        MotorOutput {
            direction,
            duty: duty_b,
        },
    )
}

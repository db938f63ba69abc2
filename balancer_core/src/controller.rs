//! The balance control law.

use crate::estimator::Attitude;
use crate::gains::BalanceGains;

/// Signed speed command from the current attitude.
///
/// PID-like, except the derivative term is the directly measured tilt rate
/// rather than a differenced estimate (cheaper and less noisy). Returns 0
/// whenever the law is not active: awaiting level, the seeding tick, or a
/// fall this tick. No saturation here; the actuator mapper clamps.
pub fn speed_command(attitude: &Attitude, gains: &BalanceGains) -> f32 {
    if !attitude.active {
        return 0.0;
    }
    attitude.tilt_rad * gains.tilt
        + attitude.tilt_integral * gains.tilt_integral
        + attitude.tilt_rate_rad_s * gains.d_tilt
}

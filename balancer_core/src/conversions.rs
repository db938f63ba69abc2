//! `From` implementations bridging `balancer_config` types to core types.
//!
//! These keep the field-by-field mapping out of the CLI.

use crate::actuator::ActuatorCfg;
use crate::estimator::EstimatorCfg;
use crate::LoopCfg;

impl From<&balancer_config::Config> for LoopCfg {
    fn from(c: &balancer_config::Config) -> Self {
        Self {
            sample_rate_hz: c.timing.sample_rate_hz,
            pot_cycle_ticks: c.timing.pot_cycle_ticks,
            d_tilt_pot_tick: c.timing.d_tilt_pot_tick,
            tilt_pot_tick: c.timing.tilt_pot_tick,
            x_offset_codes: c.offsets.x_offset_codes,
            sensor_timeout_ms: c.hardware.sensor_read_timeout_ms,
        }
    }
}

impl From<&balancer_config::Estimator> for EstimatorCfg {
    fn from(c: &balancer_config::Estimator) -> Self {
        let defaults = EstimatorCfg::default();
        Self {
            fall_y_threshold_g: c.fall_y_threshold_g,
            fall_x_threshold_g: c.fall_x_threshold_g,
            level_band_g: c.level_band_g,
            max_tilt_integral: c.max_tilt_integral.unwrap_or(defaults.max_tilt_integral),
        }
    }
}

impl From<&balancer_config::Actuator> for ActuatorCfg {
    fn from(c: &balancer_config::Actuator) -> Self {
        Self {
            sqrt_scale: c.sqrt_scale,
            motor_a_trim: c.motor_a_trim,
            motor_b_trim: c.motor_b_trim,
        }
    }
}

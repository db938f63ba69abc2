//! Tilt estimation and the upright/fallen state machine.

use crate::units::{GYRO_RAD_PER_ADC_UNIT, PhysicalReading};

/// Default clamp for the accumulated tilt integral, sized so the integral
/// term saturates at the same output contribution as on the AVR build.
pub const MAX_TILT_INTEGRAL: f32 =
    300.0 * GYRO_RAD_PER_ADC_UNIT / crate::gains::TILT_INTEGRAL_GAIN;

/// Operating state of the estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceMode {
    /// Initial state, re-entered on any fall. Waiting for the user to
    /// right the vehicle; motors are held at zero.
    #[default]
    AwaitingLevel,
    /// Upright and under closed-loop control.
    Balancing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorCfg {
    /// Fall when accel Y drops below this many g...
    pub fall_y_threshold_g: f32,
    /// ...while |filtered accel X| exceeds this many g.
    pub fall_x_threshold_g: f32,
    /// Band around zero tilt (raw accel X, g) accepted as "level".
    pub level_band_g: f32,
    /// Symmetric clamp for the tilt integral.
    pub max_tilt_integral: f32,
}

impl Default for EstimatorCfg {
    fn default() -> Self {
        Self {
            fall_y_threshold_g: 0.1,
            fall_x_threshold_g: 0.6,
            level_band_g: 0.02,
            max_tilt_integral: MAX_TILT_INTEGRAL,
        }
    }
}

/// Estimator output for one tick, handed to the control law.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attitude {
    pub mode: BalanceMode,
    /// Fall condition fired this tick; command is forced to zero.
    pub fell: bool,
    /// Control law may run this tick (balancing at tick entry, no fall).
    pub active: bool,
    pub tilt_rad: f32,
    pub tilt_integral: f32,
    pub tilt_rate_rad_s: f32,
}

/// Fuses the integrated gyro rate with the filtered accelerometer tilt
/// proxy and tracks the upright/fallen state machine. One instance per
/// vehicle; state persists across ticks.
#[derive(Debug, Clone)]
pub struct AttitudeEstimator {
    cfg: EstimatorCfg,
    tilt_rad: f32,
    tilt_integral: f32,
    mode: BalanceMode,
}

impl AttitudeEstimator {
    pub fn new(cfg: EstimatorCfg) -> Self {
        Self {
            cfg,
            tilt_rad: 0.0,
            tilt_integral: 0.0,
            mode: BalanceMode::AwaitingLevel,
        }
    }

    pub fn mode(&self) -> BalanceMode {
        self.mode
    }

    pub fn tilt_rad(&self) -> f32 {
        self.tilt_rad
    }

    pub fn tilt_integral(&self) -> f32 {
        self.tilt_integral
    }

    /// Advance the estimate by one tick.
    ///
    /// The fall condition is evaluated first, in every mode: a fall forces
    /// AwaitingLevel and zero output for the tick. Leveling is judged on
    /// the raw accel X reading while the tilt update uses the filtered
    /// one. The accelerometer term is added to the gyro integration
    /// unweighted each tick; the persistent bias pulls the drifting gyro
    /// estimate toward the accelerometer's absolute signal.
    pub fn update(&mut self, reading: &PhysicalReading, accel_x_filt_g: f32) -> Attitude {
        let fell = reading.accel_y_g < self.cfg.fall_y_threshold_g
            && accel_x_filt_g.abs() > self.cfg.fall_x_threshold_g;
        let mut active = false;

        if fell {
            self.mode = BalanceMode::AwaitingLevel;
        } else {
            match self.mode {
                BalanceMode::AwaitingLevel => {
                    if reading.accel_x_g > -self.cfg.level_band_g
                        && reading.accel_x_g < self.cfg.level_band_g
                    {
                        // Seed from the absolute tilt proxy; the law only
                        // engages on the next tick.
                        self.tilt_rad = reading.accel_x_g;
                        self.tilt_integral = 0.0;
                        self.mode = BalanceMode::Balancing;
                    }
                }
                BalanceMode::Balancing => {
                    self.tilt_rad += reading.tilt_rate_rad_s + accel_x_filt_g;
                    self.tilt_integral = (self.tilt_integral + self.tilt_rad)
                        .clamp(-self.cfg.max_tilt_integral, self.cfg.max_tilt_integral);
                    active = true;
                }
            }
        }

        Attitude {
            mode: self.mode,
            fell,
            active,
            tilt_rad: self.tilt_rad,
            tilt_integral: self.tilt_integral,
            tilt_rate_rad_s: reading.tilt_rate_rad_s,
        }
    }
}

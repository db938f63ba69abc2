#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the balancing vehicle.
//!
//! `Config` and sub-structs are deserialized from TOML and validated.
//! Every section has hardware-matching defaults, so an empty file yields
//! the stock tuning of the AVR build.
use serde::Deserialize;

/// Analog channel and GPIO pin assignment. Channels address the ADC mux;
/// PWM/direction pins are consumed by real GPIO backends only.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Pins {
    pub gyro_ch: u8,
    pub accel_x_ch: u8,
    pub accel_y_ch: u8,
    pub d_tilt_pot_ch: u8,
    pub tilt_pot_ch: u8,
    pub gyro_offset_pot_ch: u8,
    pub pwm_a: u8,
    pub pwm_b: u8,
    pub dir_a: u8,
    pub dir_b: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            gyro_ch: 2,
            accel_x_ch: 0,
            accel_y_ch: 1,
            d_tilt_pot_ch: 3,
            tilt_pot_ch: 5,
            gyro_offset_pot_ch: 4,
            pwm_a: 3,
            pwm_b: 11,
            dir_a: 12,
            dir_b: 13,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Timing {
    /// Control tick rate in Hz.
    pub sample_rate_hz: u32,
    /// Length of the trim-pot refresh cycle in ticks.
    pub pot_cycle_ticks: u32,
    /// Tick within the cycle at which the d-tilt pot is read.
    pub d_tilt_pot_tick: u32,
    /// Tick within the cycle at which the tilt pot is read.
    pub tilt_pot_tick: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            sample_rate_hz: 976,
            pot_cycle_ticks: 1500,
            d_tilt_pot_tick: 500,
            tilt_pot_tick: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Estimator {
    /// Fall when accel Y drops below this (g)...
    pub fall_y_threshold_g: f32,
    /// ...while |filtered accel X| exceeds this (g).
    pub fall_x_threshold_g: f32,
    /// Band around zero tilt accepted as level (g).
    pub level_band_g: f32,
    /// Optional override for the tilt integral clamp; the core derives the
    /// hardware-equivalent value when absent.
    pub max_tilt_integral: Option<f32>,
}

impl Default for Estimator {
    fn default() -> Self {
        Self {
            fall_y_threshold_g: 0.1,
            fall_x_threshold_g: 0.6,
            level_band_g: 0.02,
            max_tilt_integral: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Actuator {
    /// Multiplier for the square-root duty law.
    pub sqrt_scale: f32,
    /// Mechanical trim for motor A.
    pub motor_a_trim: f32,
    /// Mechanical trim for motor B.
    pub motor_b_trim: f32,
}

impl Default for Actuator {
    fn default() -> Self {
        Self {
            sqrt_scale: 7.0,
            motor_a_trim: 1.0,
            motor_b_trim: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Offsets {
    /// Accelerometer X mounting offset in ADC codes.
    pub x_offset_codes: f32,
}

impl Default for Offsets {
    fn default() -> Self {
        Self { x_offset_codes: 8.0 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct Hardware {
    /// Max time to wait for one ADC conversion before failing.
    pub sensor_read_timeout_ms: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            sensor_read_timeout_ms: 5,
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub timing: Timing,
    pub estimator: Estimator,
    pub actuator: Actuator,
    pub offsets: Offsets,
    pub hardware: Hardware,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins: the six analog channels must be distinct and addressable
        let chans = [
            self.pins.gyro_ch,
            self.pins.accel_x_ch,
            self.pins.accel_y_ch,
            self.pins.d_tilt_pot_ch,
            self.pins.tilt_pot_ch,
            self.pins.gyro_offset_pot_ch,
        ];
        for (i, a) in chans.iter().enumerate() {
            if *a > 7 {
                eyre::bail!("pins: analog channel {a} out of range (0..=7)");
            }
            for b in &chans[i + 1..] {
                if a == b {
                    eyre::bail!("pins: analog channel {a} assigned twice");
                }
            }
        }
        let gpio = [self.pins.pwm_a, self.pins.pwm_b, self.pins.dir_a, self.pins.dir_b];
        for (i, a) in gpio.iter().enumerate() {
            for b in &gpio[i + 1..] {
                if a == b {
                    eyre::bail!("pins: GPIO pin {a} assigned twice");
                }
            }
        }

        // Timing
        if self.timing.sample_rate_hz == 0 || self.timing.sample_rate_hz > 20_000 {
            eyre::bail!("timing.sample_rate_hz must be in 1..=20000");
        }
        if self.timing.d_tilt_pot_tick == 0 {
            eyre::bail!("timing.d_tilt_pot_tick must be >= 1");
        }
        if self.timing.d_tilt_pot_tick >= self.timing.tilt_pot_tick {
            eyre::bail!("timing.d_tilt_pot_tick must be < timing.tilt_pot_tick");
        }
        if self.timing.tilt_pot_tick >= self.timing.pot_cycle_ticks {
            eyre::bail!("timing.tilt_pot_tick must be < timing.pot_cycle_ticks");
        }

        // Estimator
        if !(self.estimator.fall_y_threshold_g.is_finite()
            && self.estimator.fall_x_threshold_g.is_finite())
        {
            eyre::bail!("estimator fall thresholds must be finite");
        }
        if !(self.estimator.level_band_g.is_finite() && self.estimator.level_band_g > 0.0) {
            eyre::bail!("estimator.level_band_g must be > 0");
        }
        if let Some(m) = self.estimator.max_tilt_integral
            && !(m.is_finite() && m > 0.0)
        {
            eyre::bail!("estimator.max_tilt_integral must be > 0");
        }

        // Actuator
        if !(self.actuator.sqrt_scale.is_finite() && self.actuator.sqrt_scale > 0.0) {
            eyre::bail!("actuator.sqrt_scale must be > 0");
        }
        if !(self.actuator.motor_a_trim.is_finite() && self.actuator.motor_a_trim >= 0.0) {
            eyre::bail!("actuator.motor_a_trim must be >= 0");
        }
        if !(self.actuator.motor_b_trim.is_finite() && self.actuator.motor_b_trim >= 0.0) {
            eyre::bail!("actuator.motor_b_trim must be >= 0");
        }

        // Offsets
        if !self.offsets.x_offset_codes.is_finite() {
            eyre::bail!("offsets.x_offset_codes must be finite");
        }
        if self.offsets.x_offset_codes.abs() > 512.0 {
            eyre::bail!("offsets.x_offset_codes exceeds half the ADC range");
        }

        // Hardware
        if self.hardware.sensor_read_timeout_ms == 0 {
            eyre::bail!("hardware.sensor_read_timeout_ms must be >= 1");
        }

        // Logging: rotation is restricted to known policies
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of: never, daily, hourly");
        }

        Ok(())
    }
}

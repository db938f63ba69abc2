//! Live-tunable control gains derived from the trim potentiometers.

use crate::units::GYRO_RAD_PER_ADC_UNIT;

/// Fixed integral gain. The AVR board reserved a pot for it but
/// drove the formula with the midpoint constant, so it is not live-tunable.
pub const TILT_INTEGRAL_GAIN: f32 = 0.002 / GYRO_RAD_PER_ADC_UNIT;

/// Gains consumed by the control law for one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceGains {
    pub d_tilt: f32,
    pub tilt: f32,
    pub tilt_integral: f32,
}

/// Latest raw codes read from the three trim pots.
///
/// Each pot is refreshed on its own round-robin cadence by the control
/// loop, so the three codes are eventually consistent with the knobs but
/// never guaranteed to be from the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimPots {
    pub d_tilt: u16,
    pub tilt: u16,
    pub gyro_offset: u16,
}

impl Default for TrimPots {
    fn default() -> Self {
        // midpoint until the first refresh of each channel
        Self {
            d_tilt: 512,
            tilt: 512,
            gyro_offset: 512,
        }
    }
}

impl TrimPots {
    /// Control-law gains scaled from the current pot codes.
    pub fn gains(&self) -> BalanceGains {
        BalanceGains {
            d_tilt: (3.5 / 512.0) * f32::from(self.d_tilt) / GYRO_RAD_PER_ADC_UNIT,
            tilt: (0.025 / 512.0) * f32::from(self.tilt) / GYRO_RAD_PER_ADC_UNIT,
            tilt_integral: TILT_INTEGRAL_GAIN,
        }
    }

    /// Gyro zero-rate correction in ADC codes, consumed by unit conversion.
    pub fn gyro_offset(&self) -> f32 {
        (f32::from(self.gyro_offset) - 512.0) * 0.1
    }
}

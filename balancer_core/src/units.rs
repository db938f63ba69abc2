//! Raw ADC codes to physical units.
//!
//! The platform samples a single-axis rate gyro and a two-axis accelerometer
//! through a 10-bit ADC. 0 represents GND, 1023 represents Vcc - 1 LSB, so
//! 512 is the zero-signal midpoint for every channel.

/// Number of distinct ADC codes.
pub const ADC_RANGE: u16 = 1024;
/// ADC code corresponding to zero physical signal.
pub const ADC_MID: f32 = 512.0;

/// Gyro rated full scale, degrees per second over half the code range.
pub const GYRO_MAX_DEG_PER_SEC: f32 = 150.0;
const DEG_PER_RAD: f32 = 0.017_453_292_5;
/// Radians per second represented by one ADC code step.
pub const GYRO_RAD_PER_ADC_UNIT: f32 =
    GYRO_MAX_DEG_PER_SEC * 2.0 / ADC_RANGE as f32 * DEG_PER_RAD;

/// Accelerometer rated full scale in g over half the code range.
pub const ACCEL_MAX_G: f32 = 1.7;
/// g represented by one ADC code step.
pub const ACCEL_G_PER_ADC_UNIT: f32 = ACCEL_MAX_G * 2.0 / ADC_RANGE as f32;

/// Raw codes for the three sensor channels, produced once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorSample {
    pub gyro: u16,
    pub accel_x: u16,
    pub accel_y: u16,
}

/// Per-tick physical view of a [`SensorSample`]. No cross-tick memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalReading {
    /// Tilt rate about the balance axis, rad/s.
    pub tilt_rate_rad_s: f32,
    /// Accelerometer X in g; small-angle proxy for absolute tilt.
    pub accel_x_g: f32,
    /// Accelerometer Y in g; near 1.0 when upright, collapses when fallen.
    pub accel_y_g: f32,
}

/// Affine conversion from raw codes to physical units.
///
/// The gyro channel's sense is inverted (codes above midpoint mean the
/// vehicle is rotating backwards). `gyro_offset` comes from the trim pot,
/// `x_offset` is the accelerometer's mechanical zero correction in codes
/// (more negative tilts the balance point forwards).
pub fn convert(sample: SensorSample, gyro_offset: f32, x_offset: f32) -> PhysicalReading {
    PhysicalReading {
        tilt_rate_rad_s: GYRO_RAD_PER_ADC_UNIT
            * (ADC_MID - f32::from(sample.gyro) + gyro_offset),
        accel_x_g: ACCEL_G_PER_ADC_UNIT * (f32::from(sample.accel_x) - ADC_MID + x_offset),
        accel_y_g: ACCEL_G_PER_ADC_UNIT * (f32::from(sample.accel_y) - ADC_MID),
    }
}

//! Second-order IIR low-pass filters for the sensor channels.

/// Direct-form two-zero, two-pole low-pass filter.
///
/// One instance owns the history for exactly one channel; instantiate one
/// filter per channel. The coefficients bake in the loop's sample rate:
/// `filter()` must be called exactly once per tick, calling at any other
/// rate silently shifts the effective cutoff frequency.
#[derive(Debug, Clone)]
pub struct BiquadLpf {
    gain: f32,
    fb0: f32,
    fb1: f32,
    x: [f32; 3],
    y: [f32; 3],
}

impl BiquadLpf {
    /// Build from an input gain divisor and the two feedback coefficients.
    pub fn new(gain: f32, fb0: f32, fb1: f32) -> Self {
        Self {
            gain,
            fb0,
            fb1,
            x: [0.0; 3],
            y: [0.0; 3],
        }
    }

    /// Low-pass for the accelerometer tilt-proxy channel.
    pub fn accel_lowpass() -> Self {
        Self::new(1.013_464_636e3, -0.913_148_772_1, 1.909_201_915_1)
    }

    /// Low-pass for the gyro rate channel. Defined for symmetry with the
    /// accelerometer channel but not currently fed by the estimator, which
    /// integrates the raw rate; enabling it is a tuning decision, not a
    /// code change.
    pub fn gyro_lowpass() -> Self {
        Self::new(1.565_078_650, -0.412_801_598_1, -1.142_980_502_5)
    }

    /// Advance the filter by one sample and return the new output.
    pub fn filter(&mut self, input: f32) -> f32 {
        self.x[0] = self.x[1];
        self.x[1] = self.x[2];
        self.x[2] = input / self.gain;
        self.y[0] = self.y[1];
        self.y[1] = self.y[2];
        self.y[2] = (self.x[0] + self.x[2])
            + 2.0 * self.x[1]
            + self.fb0 * self.y[0]
            + self.fb1 * self.y[1];
        self.y[2]
    }

    /// Zero both history buffers.
    pub fn reset(&mut self) {
        self.x = [0.0; 3];
        self.y = [0.0; 3];
    }

    /// Closed-form steady-state gain for a constant input.
    pub fn dc_gain(&self) -> f32 {
        4.0 / (self.gain * (1.0 - self.fb0 - self.fb1))
    }
}

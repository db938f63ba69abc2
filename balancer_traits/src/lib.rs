pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Analog input channels of the balance platform. Three sensor channels are
/// sampled every tick; the three trim-pot channels are sampled on a slow
/// round-robin cadence by the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    GyroRate,
    AccelX,
    AccelY,
    DTiltPot,
    TiltPot,
    GyroOffsetPot,
}

/// Multiplexed ADC front-end. Codes are 10-bit (0..1024).
pub trait AnalogIn {
    fn read(
        &mut self,
        channel: Channel,
        timeout: std::time::Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>>;
}

/// Motor rotation direction. Both wheels always share one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

/// One motor's command: direction bit plus 8-bit PWM duty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotorOutput {
    pub direction: Direction,
    pub duty: u8,
}

/// Dual H-bridge style drive: both motor commands are written together,
/// once per tick.
pub trait MotorDrive {
    fn drive(
        &mut self,
        motor_a: MotorOutput,
        motor_b: MotorOutput,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: AnalogIn + ?Sized> AnalogIn for Box<T> {
    fn read(
        &mut self,
        channel: Channel,
        timeout: std::time::Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(channel, timeout)
    }
}

impl<T: MotorDrive + ?Sized> MotorDrive for Box<T> {
    fn drive(
        &mut self,
        motor_a: MotorOutput,
        motor_b: MotorOutput,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).drive(motor_a, motor_b)
    }
    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).stop()
    }
}

//! Raspberry Pi backend: MCP3008 ADC over SPI plus software-PWM motor
//! drive. Only compiled with the `hardware` feature on Linux.

use crate::error::HwError;
use balancer_traits::{AnalogIn, Channel, Direction, MotorDrive, MotorOutput};
use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use std::time::Duration;

const SPI_CLOCK_HZ: u32 = 1_350_000;
const PWM_FREQUENCY_HZ: f64 = 490.0;

/// ADC mux assignment for the six analog inputs.
#[derive(Debug, Clone, Copy)]
pub struct ChannelMap {
    pub gyro: u8,
    pub accel_x: u8,
    pub accel_y: u8,
    pub d_tilt_pot: u8,
    pub tilt_pot: u8,
    pub gyro_offset_pot: u8,
}

/// MCP3008: 10-bit, 8-channel SPI ADC; code range matches the AVR
/// board's on-chip converter.
pub struct Mcp3008 {
    spi: Spi,
    map: ChannelMap,
}

impl Mcp3008 {
    pub fn new(map: ChannelMap) -> Result<Self, HwError> {
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, SPI_CLOCK_HZ, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self { spi, map })
    }

    fn mux(&self, channel: Channel) -> u8 {
        match channel {
            Channel::GyroRate => self.map.gyro,
            Channel::AccelX => self.map.accel_x,
            Channel::AccelY => self.map.accel_y,
            Channel::DTiltPot => self.map.d_tilt_pot,
            Channel::TiltPot => self.map.tilt_pot,
            Channel::GyroOffsetPot => self.map.gyro_offset_pot,
        }
    }

    fn convert(&mut self, mux: u8) -> Result<u16, HwError> {
        // start bit, single-ended + channel, clock-out byte
        let tx = [0x01, 0x80 | (mux << 4), 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok((u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]))
    }
}

impl AnalogIn for Mcp3008 {
    fn read(
        &mut self,
        channel: Channel,
        _timeout: Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        let mux = self.mux(channel);
        let code = self.convert(mux)?;
        tracing::trace!(?channel, mux, code, "adc sample");
        Ok(code)
    }
}

/// Dual motor drive: one direction pin and one software-PWM pin per motor.
pub struct PwmDrive {
    pwm_a: OutputPin,
    pwm_b: OutputPin,
    dir_a: OutputPin,
    dir_b: OutputPin,
}

impl PwmDrive {
    pub fn new(pwm_a: u8, pwm_b: u8, dir_a: u8, dir_b: u8) -> Result<Self, HwError> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut get = |pin: u8| -> Result<OutputPin, HwError> {
            Ok(gpio
                .get(pin)
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .into_output())
        };
        Ok(Self {
            pwm_a: get(pwm_a)?,
            pwm_b: get(pwm_b)?,
            dir_a: get(dir_a)?,
            dir_b: get(dir_b)?,
        })
    }

    fn apply(pwm: &mut OutputPin, dir: &mut OutputPin, out: MotorOutput) -> Result<(), HwError> {
        match out.direction {
            Direction::Forward => dir.set_high(),
            Direction::Reverse => dir.set_low(),
        }
        pwm.set_pwm_frequency(PWM_FREQUENCY_HZ, f64::from(out.duty) / 255.0)
            .map_err(|e| HwError::Gpio(e.to_string()))
    }
}

impl MotorDrive for PwmDrive {
    fn drive(
        &mut self,
        motor_a: MotorOutput,
        motor_b: MotorOutput,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Self::apply(&mut self.pwm_a, &mut self.dir_a, motor_a)?;
        Self::apply(&mut self.pwm_b, &mut self.dir_b, motor_b)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pwm_a
            .clear_pwm()
            .map_err(|e| HwError::Gpio(e.to_string()))?;
        self.pwm_b
            .clear_pwm()
            .map_err(|e| HwError::Gpio(e.to_string()))?;
        self.pwm_a.set_low();
        self.pwm_b.set_low();
        Ok(())
    }
}

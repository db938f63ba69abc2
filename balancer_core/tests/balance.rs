use balancer_core::actuator::ActuatorCfg;
use balancer_core::estimator::{BalanceMode, EstimatorCfg};
use balancer_core::mocks::{ManualClock, SpyMotor};
use balancer_core::{LoopCfg, build_control_loop};
use balancer_traits::{AnalogIn, Channel, Direction};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// ADC backed by a shared sensor frame the test can rewrite mid-run.
/// Pot channels always read midpoint.
#[derive(Clone)]
struct RigAdc {
    frame: Arc<Mutex<(u16, u16, u16)>>,
}

impl RigAdc {
    fn new(gyro: u16, accel_x: u16, accel_y: u16) -> Self {
        Self {
            frame: Arc::new(Mutex::new((gyro, accel_x, accel_y))),
        }
    }

    fn set(&self, gyro: u16, accel_x: u16, accel_y: u16) {
        *self.frame.lock().unwrap() = (gyro, accel_x, accel_y);
    }
}

impl AnalogIn for RigAdc {
    fn read(
        &mut self,
        channel: Channel,
        _timeout: Duration,
    ) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        let f = *self.frame.lock().unwrap();
        Ok(match channel {
            Channel::GyroRate => f.0,
            Channel::AccelX => f.1,
            Channel::AccelY => f.2,
            _ => 512,
        })
    }
}

fn rig(adc: RigAdc) -> balancer_core::ControlLoop<RigAdc, SpyMotor> {
    build_control_loop(
        adc,
        SpyMotor::default(),
        LoopCfg::default(),
        EstimatorCfg::default(),
        ActuatorCfg::default(),
        Some(Box::new(ManualClock::new())),
        false,
    )
    .unwrap()
}

#[test]
fn level_seed_then_active_control() {
    // x = 504 cancels the 8-code mount offset; y upright
    let adc = RigAdc::new(512, 504, 900);
    let mut lp = rig(adc.clone());

    let r = lp.step().unwrap();
    assert_eq!(r.mode, BalanceMode::Balancing);
    assert_eq!(r.speed, 0.0);
    assert_eq!(r.motor_a.duty, 0);

    // positive tilt rate: gyro below midpoint reads as forward rotation
    adc.set(502, 504, 900);
    let r = lp.step().unwrap();
    assert!(r.speed > 0.0);
    assert_eq!(r.motor_a.direction, Direction::Forward);
    assert_eq!(r.motor_b.direction, Direction::Forward);
    assert!(r.motor_a.duty > 0);
    assert_eq!(r.motor_a.duty, r.motor_b.duty);
}

#[test]
fn fall_cuts_power_until_releveled() {
    let adc = RigAdc::new(512, 504, 900);
    let mut lp = rig(adc.clone());
    lp.step().unwrap(); // seed upright

    // knocked flat: y collapses, x pegged; the filtered x signal has to
    // climb past the fall threshold before the detector fires
    adc.set(512, 1023, 512);
    let mut fell_at = None;
    for i in 0..2000 {
        let r = lp.step().unwrap();
        if r.fell {
            assert_eq!(r.mode, BalanceMode::AwaitingLevel);
            assert_eq!(r.speed, 0.0);
            assert_eq!(r.motor_a.duty, 0);
            assert_eq!(r.motor_b.duty, 0);
            fell_at = Some(i);
            break;
        }
    }
    let fell_at = fell_at.expect("fall detector never fired");
    assert!(fell_at > 0, "filtered signal cannot trip on the first tick");

    // still flat: power stays off
    for _ in 0..5 {
        let r = lp.step().unwrap();
        assert_eq!(r.mode, BalanceMode::AwaitingLevel);
        assert_eq!(r.motor_a.duty, 0);
    }

    // righted by hand: level reading re-seeds and re-arms
    adc.set(512, 504, 900);
    let r = lp.step().unwrap();
    assert_eq!(r.mode, BalanceMode::Balancing);
    assert_eq!(r.speed, 0.0);
}

#[test]
fn sustained_rotation_reverses_with_sign() {
    let adc = RigAdc::new(512, 504, 900);
    let mut lp = rig(adc.clone());
    lp.step().unwrap();

    // gyro above midpoint reads as negative tilt rate
    adc.set(530, 504, 900);
    let r = lp.step().unwrap();
    assert!(r.speed < 0.0);
    assert_eq!(r.motor_a.direction, Direction::Reverse);
    assert_eq!(r.motor_b.direction, Direction::Reverse);
}

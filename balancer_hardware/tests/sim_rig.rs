use balancer_hardware::error::HwError;
use balancer_hardware::simulated_rig;
use balancer_traits::{AnalogIn, Channel, Direction, MotorDrive, MotorOutput};
use rstest::rstest;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_millis(5);

#[test]
fn upright_rig_reads_centered_codes() {
    let (mut imu, _drive, _rig) = simulated_rig();
    let gyro = imu.read(Channel::GyroRate, TIMEOUT).unwrap();
    let x = imu.read(Channel::AccelX, TIMEOUT).unwrap();
    let y = imu.read(Channel::AccelY, TIMEOUT).unwrap();
    assert_eq!(gyro, 512);
    // mount offset shifts X below midpoint
    assert_eq!(x, 504);
    // 1 g vertical is well above midpoint
    assert!(y > 700, "y code {y}");
    assert_eq!(imu.read(Channel::TiltPot, TIMEOUT).unwrap(), 512);
}

#[test]
fn unpowered_pendulum_falls_over() {
    let (mut imu, _drive, rig) = simulated_rig();
    rig.nudge(0.05);
    for _ in 0..5000 {
        imu.read(Channel::GyroRate, TIMEOUT).unwrap();
    }
    assert!(!rig.is_upright(), "pendulum should topple without control");
    // flat: vertical acceleration component collapses toward zero
    let y = imu.read(Channel::AccelY, TIMEOUT).unwrap();
    assert!(y < 560, "fallen y code {y}");
}

#[test]
fn wheel_torque_opposes_the_lean() {
    let (mut imu, mut drive, rig) = simulated_rig();
    rig.nudge(0.05);
    let forward = MotorOutput {
        direction: Direction::Forward,
        duty: 255,
    };
    drive.drive(forward, forward).unwrap();
    let mut torqued = rig.tilt_rad();
    for _ in 0..400 {
        imu.read(Channel::GyroRate, TIMEOUT).unwrap();
        torqued = rig.tilt_rad();
    }

    let (mut imu2, _d2, rig2) = simulated_rig();
    rig2.nudge(0.05);
    let mut free = rig2.tilt_rad();
    for _ in 0..400 {
        imu2.read(Channel::GyroRate, TIMEOUT).unwrap();
        free = rig2.tilt_rad();
    }
    assert!(
        torqued < free,
        "driven rig ({torqued}) should lean less than the free one ({free})"
    );
}

#[rstest]
#[case::d_tilt(Channel::DTiltPot, 100)]
#[case::tilt(Channel::TiltPot, 200)]
#[case::gyro_offset(Channel::GyroOffsetPot, 300)]
fn pots_are_settable_and_stable(#[case] channel: Channel, #[case] expected: u16) {
    let (mut imu, _drive, rig) = simulated_rig();
    rig.set_pots(100, 200, 300);
    assert_eq!(imu.read(channel, TIMEOUT).unwrap(), expected);
    assert_eq!(imu.read(channel, TIMEOUT).unwrap(), expected);
}

#[test]
fn injected_failures_surface_as_timeouts() {
    let (mut imu, _drive, rig) = simulated_rig();
    rig.set_failing(true);
    let err = imu.read(Channel::GyroRate, TIMEOUT).unwrap_err();
    assert!(matches!(err.downcast_ref::<HwError>(), Some(HwError::Timeout)));
    rig.set_failing(false);
    assert!(imu.read(Channel::GyroRate, TIMEOUT).is_ok());
}

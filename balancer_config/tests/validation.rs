use balancer_config::load_toml;
use rstest::rstest;

#[test]
fn empty_config_parses_with_stock_tuning() {
    let cfg = load_toml("").expect("parse TOML");
    cfg.validate().expect("defaults should validate");
    assert_eq!(cfg.timing.sample_rate_hz, 976);
    assert_eq!(cfg.timing.pot_cycle_ticks, 1500);
    assert_eq!(cfg.pins.gyro_ch, 2);
    assert_eq!(cfg.actuator.sqrt_scale, 7.0);
    assert_eq!(cfg.offsets.x_offset_codes, 8.0);
}

#[test]
fn accepts_full_custom_config() {
    let toml = r#"
[pins]
gyro_ch = 6
accel_x_ch = 0
accel_y_ch = 1
d_tilt_pot_ch = 3
tilt_pot_ch = 5
gyro_offset_pot_ch = 4
pwm_a = 9
pwm_b = 10
dir_a = 7
dir_b = 8

[timing]
sample_rate_hz = 500
pot_cycle_ticks = 900
d_tilt_pot_tick = 300
tilt_pot_tick = 600

[estimator]
fall_y_threshold_g = 0.15
fall_x_threshold_g = 0.5
level_band_g = 0.03
max_tilt_integral = 100.0

[actuator]
sqrt_scale = 6.5
motor_a_trim = 0.95
motor_b_trim = 1.05

[offsets]
x_offset_codes = -4.0

[hardware]
sensor_read_timeout_ms = 2

[logging]
level = "debug"
rotation = "daily"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.timing.pot_cycle_ticks, 900);
    assert_eq!(cfg.estimator.max_tilt_integral, Some(100.0));
}

#[rstest]
#[case::zero_rate("[timing]\nsample_rate_hz = 0\n", "sample_rate_hz")]
#[case::rate_too_high("[timing]\nsample_rate_hz = 50000\n", "sample_rate_hz")]
#[case::pot_tick_zero("[timing]\nd_tilt_pot_tick = 0\n", "d_tilt_pot_tick")]
#[case::pot_order(
    "[timing]\nd_tilt_pot_tick = 1000\ntilt_pot_tick = 500\n",
    "d_tilt_pot_tick must be <"
)]
#[case::pot_cycle_short("[timing]\npot_cycle_ticks = 800\n", "tilt_pot_tick must be <")]
#[case::dup_channel("[pins]\ngyro_ch = 0\n", "assigned twice")]
#[case::channel_range("[pins]\ngyro_ch = 9\n", "out of range")]
#[case::dup_gpio("[pins]\npwm_a = 11\n", "assigned twice")]
#[case::level_band("[estimator]\nlevel_band_g = 0.0\n", "level_band_g")]
#[case::integral_clamp("[estimator]\nmax_tilt_integral = -1.0\n", "max_tilt_integral")]
#[case::sqrt_scale("[actuator]\nsqrt_scale = 0.0\n", "sqrt_scale")]
#[case::trim("[actuator]\nmotor_b_trim = -0.5\n", "motor_b_trim")]
#[case::x_offset("[offsets]\nx_offset_codes = 600.0\n", "x_offset_codes")]
#[case::timeout("[hardware]\nsensor_read_timeout_ms = 0\n", "sensor_read_timeout_ms")]
#[case::rotation("[logging]\nrotation = \"weekly\"\n", "rotation")]
fn rejects_invalid_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error `{err}` should mention `{needle}`"
    );
}

#[test]
fn unknown_rotation_rejected_but_absent_ok() {
    let cfg = load_toml("[logging]\nlevel = \"info\"\n").expect("parse TOML");
    cfg.validate().expect("absent rotation is fine");
}

use balancer_core::actuator::{ActuatorCfg, MAX_DUTY, map_speed};
use balancer_core::estimator::{AttitudeEstimator, EstimatorCfg};
use balancer_core::units::PhysicalReading;
use proptest::prelude::*;

prop_compose! {
    fn readings_strategy()(
        len in 10usize..400,
        seed in any::<u64>(),
    ) -> Vec<(f32, f32)> {
        // bounded (tilt rate, filtered accel) pairs; a cheap LCG keeps the
        // generated case shrinkable by length
        let mut s = seed;
        let mut v = Vec::with_capacity(len);
        for _ in 0..len {
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let rate = ((s >> 33) as f32 / u32::MAX as f32 - 0.25) * 0.6;
            s = s.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let x_filt = ((s >> 33) as f32 / u32::MAX as f32 - 0.25) * 0.2;
            v.push((rate, x_filt));
        }
        v
    }
}

proptest! {
    #[test]
    fn tilt_integral_never_escapes_the_clamp(pairs in readings_strategy()) {
        let cfg = EstimatorCfg { max_tilt_integral: 5.0, ..EstimatorCfg::default() };
        let bound = cfg.max_tilt_integral;
        let mut est = AttitudeEstimator::new(cfg);
        // seed upright so the estimator integrates
        est.update(&PhysicalReading { tilt_rate_rad_s: 0.0, accel_x_g: 0.0, accel_y_g: 1.0 }, 0.0);
        for (rate, x_filt) in pairs {
            let att = est.update(
                &PhysicalReading { tilt_rate_rad_s: rate, accel_x_g: 0.3, accel_y_g: 1.0 },
                x_filt,
            );
            prop_assert!(att.tilt_integral.abs() <= bound + 1e-6,
                "integral {} escaped clamp {}", att.tilt_integral, bound);
        }
    }

    #[test]
    fn actuator_duty_is_bounded_and_directions_match(speed in -1.0e7f32..1.0e7f32) {
        let (a, b) = map_speed(speed, &ActuatorCfg::default());
        prop_assert!(a.duty <= MAX_DUTY);
        prop_assert!(b.duty <= MAX_DUTY);
        prop_assert_eq!(a.direction, b.direction);
    }

    #[test]
    fn actuator_magnitude_is_monotonic(lo in 0.0f32..1.0e6f32, delta in 0.0f32..1.0e6f32) {
        let cfg = ActuatorCfg::default();
        let (small, _) = map_speed(lo, &cfg);
        let (large, _) = map_speed(lo + delta, &cfg);
        prop_assert!(large.duty >= small.duty);
        // symmetric on the reverse side
        let (small_r, _) = map_speed(-lo, &cfg);
        let (large_r, _) = map_speed(-(lo + delta), &cfg);
        prop_assert!(large_r.duty >= small_r.duty);
    }

    #[test]
    fn trims_never_unbound_the_duty(speed in -1.0e7f32..1.0e7f32, trim in 0.0f32..50.0f32) {
        let cfg = ActuatorCfg { motor_a_trim: trim, motor_b_trim: 1.0 / (trim + 0.01), ..ActuatorCfg::default() };
        let (a, b) = map_speed(speed, &cfg);
        prop_assert!(a.duty <= MAX_DUTY);
        prop_assert!(b.duty <= MAX_DUTY);
    }
}

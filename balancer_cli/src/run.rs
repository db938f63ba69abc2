//! Command execution: hardware assembly, RT setup, and loop supervision.

use crate::cli::RtLock;
use crate::rt::setup_rt_once;
use balancer_core::error::Result as CoreResult;
use balancer_core::runner::{LoopStats, RunParams};
use balancer_core::{LoopCfg, Snapshot};
use balancer_core::actuator::ActuatorCfg;
use balancer_core::estimator::EstimatorCfg;
use balancer_traits::{AnalogIn, MotorDrive};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Options carried from the `run` subcommand.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOpts {
    pub ticks: Option<u64>,
    pub rt: bool,
    pub rt_prio: Option<i32>,
    pub rt_lock: Option<RtLock>,
    pub rt_cpu: Option<usize>,
}

/// Assemble the ADC and motor backends selected at compile time.
///
/// With the `hardware` feature on Linux this opens the MCP3008 and the GPIO
/// motor driver from `[pins]`; otherwise a simulated rig stands in.
pub fn make_hw(
    cfg: &balancer_config::Config,
) -> CoreResult<(
    impl AnalogIn + Send + 'static,
    impl MotorDrive + Send + 'static,
)> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        use balancer_hardware::gpio::{ChannelMap, Mcp3008, PwmDrive};
        use eyre::WrapErr;
        let map = ChannelMap {
            gyro: cfg.pins.gyro_ch,
            accel_x: cfg.pins.accel_x_ch,
            accel_y: cfg.pins.accel_y_ch,
            d_tilt_pot: cfg.pins.d_tilt_pot_ch,
            tilt_pot: cfg.pins.tilt_pot_ch,
            gyro_offset_pot: cfg.pins.gyro_offset_pot_ch,
        };
        let adc = Mcp3008::new(map).wrap_err("open MCP3008")?;
        let motor = PwmDrive::new(
            cfg.pins.pwm_a,
            cfg.pins.pwm_b,
            cfg.pins.dir_a,
            cfg.pins.dir_b,
        )
        .wrap_err("open motor pins")?;
        Ok((adc, motor))
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        let _ = cfg;
        let (imu, drive, _rig) = balancer_hardware::simulated_rig();
        Ok((imu, drive))
    }
}

fn params_from_config(cfg: &balancer_config::Config, diagnostics: bool) -> RunParams {
    RunParams {
        cfg: LoopCfg::from(cfg),
        estimator: EstimatorCfg::from(&cfg.estimator),
        actuator: ActuatorCfg::from(&cfg.actuator),
        diagnostics,
        max_ticks: None,
    }
}

/// Run the balance loop until Ctrl-C or the tick budget is exhausted.
pub fn run_balance(
    cfg: &balancer_config::Config,
    opts: RunOpts,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<LoopStats> {
    // Real-time mode setup (Linux/macOS), once per process
    #[cfg(target_os = "linux")]
    setup_rt_once(
        opts.rt,
        opts.rt_prio,
        opts.rt_lock.unwrap_or(RtLock::os_default()),
        opts.rt_cpu,
    );
    #[cfg(target_os = "macos")]
    setup_rt_once(opts.rt, opts.rt_lock.unwrap_or(RtLock::os_default()));

    let (adc, motor) = make_hw(cfg)?;
    let mut params = params_from_config(cfg, false);
    params.max_ticks = opts.ticks;
    balancer_core::runner::run(adc, motor, params, shutdown, None, None)
}

/// Run the pipeline with the control law suppressed, printing the latest
/// snapshot at a fixed interval. Motors stay at zero for the whole run.
pub fn run_diag(
    cfg: &balancer_config::Config,
    interval_ms: u64,
    ticks: Option<u64>,
    shutdown: Arc<AtomicBool>,
) -> CoreResult<LoopStats> {
    let (adc, motor) = make_hw(cfg)?;
    let mut params = params_from_config(cfg, true);
    params.max_ticks = ticks;

    let latch = Arc::new(Mutex::new(Snapshot::default()));
    let loop_latch = Arc::clone(&latch);
    let loop_shutdown = Arc::clone(&shutdown);
    let worker = std::thread::spawn(move || {
        balancer_core::runner::run(adc, motor, params, loop_shutdown, Some(loop_latch), None)
    });

    let interval = Duration::from_millis(interval_ms.max(1));
    while !worker.is_finished() {
        std::thread::sleep(interval);
        let snap = latch.lock().map(|s| *s).unwrap_or_default();
        println!(
            "tick={} mode={:?} tilt_rad={:.4} gyro={} ax={} ay={} pots={}/{}/{} overruns={}",
            snap.ticks,
            snap.mode,
            snap.tilt_rad,
            snap.sample.gyro,
            snap.sample.accel_x,
            snap.sample.accel_y,
            snap.pots.d_tilt,
            snap.pots.tilt,
            snap.pots.gyro_offset,
            snap.overruns,
        );
    }
    worker
        .join()
        .map_err(|_| eyre::eyre!("diagnostics loop panicked"))?
}

/// Exercise every analog channel and the motor drive once.
pub fn self_check(cfg: &balancer_config::Config) -> CoreResult<()> {
    use balancer_traits::{Channel, MotorOutput};

    let (mut adc, mut motor) = make_hw(cfg)?;
    let timeout = Duration::from_millis(cfg.hardware.sensor_read_timeout_ms);
    for channel in [
        Channel::GyroRate,
        Channel::AccelX,
        Channel::AccelY,
        Channel::DTiltPot,
        Channel::TiltPot,
        Channel::GyroOffsetPot,
    ] {
        let code = adc
            .read(channel, timeout)
            .map_err(|e| eyre::eyre!("self-check read {channel:?}: {e}"))?;
        tracing::info!(?channel, code, "self-check channel ok");
    }
    motor
        .drive(MotorOutput::default(), MotorOutput::default())
        .map_err(|e| eyre::eyre!("self-check motor drive: {e}"))?;
    motor
        .stop()
        .map_err(|e| eyre::eyre!("self-check motor stop: {e}"))?;
    Ok(())
}
